// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::ffi::OsString;
use std::io::IsTerminal;

use log::{debug, info};
use nix::unistd::{self, Uid};

use crate::error::{self, Error};
use crate::getmyip::{GetMyIp, IpDetector};
use crate::hosts;
use crate::launch::{self, Identity, Launch};
use crate::mapping;
use crate::settings::{Paths, Settings};

/// Container entrypoint.
///
/// Configures the media server from its [`Settings`] and produces the [`Launch`] that replaces
/// the current process.
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub struct Entrypoint {
    settings: Settings,
    paths: Paths,
    #[derivative(Debug = "ignore")]
    detector: Box<dyn IpDetector>,
    euid: Uid,
    color: bool,
}

/// Builder for [`Entrypoint`].
#[derive(derivative::Derivative)]
#[derivative(Debug)]
pub struct Builder {
    settings: Settings,
    paths: Paths,
    #[derivative(Debug = "ignore")]
    detector: Option<Box<dyn IpDetector>>,
    euid: Option<Uid>,
    color: Option<bool>,
}

impl Entrypoint {
    pub fn builder(settings: Settings) -> Builder {
        Builder {
            settings,
            paths: Paths::default(),
            detector: None,
            euid: None,
            color: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Patches the configuration and decides how to start the server.
    ///
    /// `args` are forwarded to the server verbatim, without the program name.
    pub fn prepare(&self, args: Vec<OsString>) -> Result<Launch, Error> {
        if !self.euid.is_root() {
            return Err(error::NotRoot {
                euid: self.euid.as_raw(),
            }
            .into());
        }

        let edits = mapping::plan_edits(&self.settings, &*self.detector);
        debug!("Applying {} parameter edits", edits.len());
        mapping::apply_edits(&edits, &self.paths)?;

        hosts::remove_ipv6_loopback(&self.paths.hosts);

        let mut env = vec![(
            String::from("GST_DEBUG"),
            String::from(self.settings.gst_debug()),
        )];
        info!("GST_DEBUG={}", self.settings.gst_debug());

        let logs_path = self
            .settings
            .logs_path
            .clone()
            .or_else(|| launch::logs_path_from_args(&args));

        if !self.color {
            env.push((String::from("GST_DEBUG_NO_COLOR"), String::from("1")));
        }

        let allocator = launch::find_allocator(&self.paths.library_dirs)?;
        info!("Preloading allocator {}", allocator.display());
        env.push((
            String::from("LD_PRELOAD"),
            allocator.to_string_lossy().into_owned(),
        ));
        env.push((
            String::from("MALLOC_CONF"),
            String::from(launch::MALLOC_CONF),
        ));

        let identity = Identity::decide(self.settings.uid, self.euid);

        Ok(Launch {
            program: self.paths.server.clone(),
            args,
            env,
            identity,
            logs_path,
        })
    }
}

impl Builder {
    pub fn paths(mut self, paths: Paths) -> Self {
        self.paths = paths;

        self
    }

    /// Sets the external IP detector, [`GetMyIp`] by default.
    pub fn detector<D: IpDetector + 'static>(mut self, detector: D) -> Self {
        self.detector = Some(Box::new(detector));

        self
    }

    /// Overrides the effective UID the entrypoint assumes it runs as.
    pub fn effective_uid(mut self, euid: Uid) -> Self {
        self.euid = Some(euid);

        self
    }

    /// Whether the server may use colored log output. Defaults to stdout being a terminal.
    pub fn color(mut self, color: bool) -> Self {
        self.color = Some(color);

        self
    }

    pub fn build(self) -> Entrypoint {
        let Builder {
            settings,
            paths,
            detector,
            euid,
            color,
        } = self;

        Entrypoint {
            settings,
            paths,
            detector: detector.unwrap_or_else(|| Box::new(GetMyIp::default())),
            euid: euid.unwrap_or_else(unistd::geteuid),
            color: color.unwrap_or_else(|| std::io::stdout().is_terminal()),
        }
    }
}
