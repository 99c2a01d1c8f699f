// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! External IP address autodetection.

use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use log::trace;

/// Address family to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    fn flag(self) -> &'static str {
        match self {
            IpFamily::V4 => "--ipv4",
            IpFamily::V6 => "--ipv6",
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Detection did not produce an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectError(pub String);

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DetectError {}

/// Something that can find out the public address of this host.
pub trait IpDetector {
    fn detect(&self, family: IpFamily) -> Result<String, DetectError>;
}

/// Runs the `getmyip` helper script.
#[derive(Debug, Clone)]
pub struct GetMyIp {
    program: PathBuf,
}

impl Default for GetMyIp {
    fn default() -> Self {
        GetMyIp {
            program: PathBuf::from("getmyip"),
        }
    }
}

impl GetMyIp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        GetMyIp {
            program: program.into(),
        }
    }
}

impl IpDetector for GetMyIp {
    fn detect(&self, family: IpFamily) -> Result<String, DetectError> {
        trace!("Running {} {}", self.program.display(), family.flag());

        let output = Command::new(&self.program)
            .arg(family.flag())
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .map_err(|err| {
                DetectError(format!(
                    "Failed to run {}: {}",
                    self.program.display(),
                    err
                ))
            })?;

        if !output.status.success() {
            return Err(DetectError(format!(
                "{} {} failed: {}",
                self.program.display(),
                family.flag(),
                output.status
            )));
        }

        let addr = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if addr.is_empty() {
            return Err(DetectError(format!(
                "{} {} returned no address",
                self.program.display(),
                family.flag()
            )));
        }

        Ok(addr)
    }
}
