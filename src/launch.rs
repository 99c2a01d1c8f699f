// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Final process setup and replacement of the entrypoint with the media server.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::{self, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use nix::unistd::{Gid, Uid};

use crate::error::{self, Error};

/// jemalloc tuning passed through `MALLOC_CONF`.
pub const MALLOC_CONF: &str = "abort_conf:true,background_thread:true,metadata_thp:always";

/// Name of the service user and group that runs the server.
pub const SERVICE_USER: &str = "kurento";

/// File inside the logs directory that receives the server's standard error.
pub const ERROR_LOG_FILE: &str = "errors.log";

const ALLOCATOR_PATTERN: &str = "libjemalloc.so*";

/// Returns the logs directory passed with `--logs-path`/`-d` in `args`, if any.
///
/// `args` are the server arguments, without the program name. The first occurrence wins.
pub fn logs_path_from_args<S: AsRef<OsStr>>(args: &[S]) -> Option<PathBuf> {
    let mut iter = args.iter().map(AsRef::as_ref);

    while let Some(arg) = iter.next() {
        if arg == "--logs-path" || arg == "-d" {
            return iter.next().map(PathBuf::from);
        }

        if let Some(path) = arg.to_str().and_then(|a| a.strip_prefix("--logs-path=")) {
            return Some(PathBuf::from(path));
        }
    }

    None
}

/// Finds the jemalloc shared library below any of `dirs`.
///
/// Directories are searched in order, matches within one directory in lexical order.
pub fn find_allocator(dirs: &[PathBuf]) -> Result<PathBuf, Error> {
    for dir in dirs {
        let pattern = dir.join("**").join(ALLOCATOR_PATTERN);
        let pattern = pattern.to_string_lossy();

        let entries = glob::glob(&pattern)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

        // Unreadable directories are skipped
        if let Some(path) = entries.filter_map(Result::ok).find(|p| p.is_file()) {
            debug!("Found allocator {}", path.display());
            return Ok(path);
        }
    }

    Err(error::AllocatorNotFound {
        searched: dirs.to_vec(),
    }
    .into())
}

/// Identity the server runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// Keep the identity of the entrypoint.
    Current,
    /// Renumber the service user and group, then run as them.
    Remap { uid: Uid, gid: Gid },
}

impl Identity {
    /// Decides on the identity from `KMS_UID` and the current effective UID.
    pub fn decide(requested: Option<u32>, euid: Uid) -> Self {
        match requested {
            Some(uid) if Uid::from_raw(uid) != euid => Identity::Remap {
                uid: Uid::from_raw(uid),
                gid: Gid::from_raw(uid),
            },
            _ => Identity::Current,
        }
    }
}

/// Renumbers the service group and user to `gid`/`uid`.
fn remap_service_user(uid: Uid, gid: Gid) -> Result<(), Error> {
    info!("Changing {} user/group to UID {} GID {}", SERVICE_USER, uid, gid);

    let gid = gid.to_string();
    run_tool("groupmod", &["--gid", gid.as_str(), SERVICE_USER])?;
    let uid = uid.to_string();
    run_tool("usermod", &["--uid", uid.as_str(), SERVICE_USER])?;

    Ok(())
}

fn run_tool(program: &str, args: &[&str]) -> Result<(), Error> {
    debug!("Running {} {}", program, args.join(" "));

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .map_err(|err| error::Identity(format!("Failed to run {}: {}", program, err)))?;

    if !status.success() {
        return Err(error::Identity(format!(
            "{} {} failed: {}",
            program,
            args.join(" "),
            status
        ))
        .into());
    }

    Ok(())
}

/// Everything needed to start the media server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub identity: Identity,
    /// Directory whose error log receives standard error.
    pub logs_path: Option<PathBuf>,
}

impl Launch {
    /// Path of the error log file, if standard error is redirected.
    pub fn error_log(&self) -> Option<PathBuf> {
        self.logs_path.as_ref().map(|dir| dir.join(ERROR_LOG_FILE))
    }

    /// Builds the command without redirections or identity changes.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.env.iter().cloned());

        if let Identity::Remap { uid, gid } = self.identity {
            cmd.uid(uid.as_raw()).gid(gid.as_raw());
        }

        cmd
    }

    /// Replaces the current process with the media server.
    ///
    /// Only returns if something went wrong.
    pub fn exec(self) -> Error {
        match self.prepare_exec() {
            Ok(mut cmd) => {
                info!("Starting {}", self.program.display());
                let err = cmd.exec();
                error::Exec {
                    program: self.program,
                    err,
                }
                .into()
            }
            Err(err) => err,
        }
    }

    fn prepare_exec(&self) -> Result<Command, Error> {
        if let Identity::Remap { uid, gid } = self.identity {
            remap_service_user(uid, gid)?;
        }

        let mut cmd = self.command();

        if let Some(path) = self.error_log() {
            info!("Appending server errors to {}", path.display());
            let file = open_error_log(&path)?;
            cmd.stderr(Stdio::from(file));
        }

        Ok(cmd)
    }
}

/// Opens `path` for appending and writes a banner for this run.
pub fn open_error_log(path: &Path) -> Result<fs::File, Error> {
    use chrono::prelude::*;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    writeln!(file)?;
    writeln!(file, "{} -- New execution", Local::now().to_rfc3339())?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_path_flags() {
        assert_eq!(
            logs_path_from_args(&["--logs-path", "/var/log/kms"]),
            Some(PathBuf::from("/var/log/kms"))
        );
        assert_eq!(
            logs_path_from_args(&["--gst-debug=3", "-d", "/logs"]),
            Some(PathBuf::from("/logs"))
        );
        assert_eq!(
            logs_path_from_args(&["--logs-path=/a", "-d", "/b"]),
            Some(PathBuf::from("/a"))
        );
        assert_eq!(logs_path_from_args(&["--logs-path"]), None);
        assert_eq!(logs_path_from_args::<&str>(&[]), None);
        assert_eq!(logs_path_from_args(&["--logs-paths=/x", "-dx"]), None);
    }

    #[test]
    fn identity_decision() {
        let root = Uid::from_raw(0);
        assert_eq!(Identity::decide(None, root), Identity::Current);
        assert_eq!(Identity::decide(Some(0), root), Identity::Current);
        assert_eq!(
            Identity::decide(Some(1000), root),
            Identity::Remap {
                uid: Uid::from_raw(1000),
                gid: Gid::from_raw(1000),
            }
        );
    }

    #[test]
    fn allocator_search_order() {
        let empty = tempfile::tempdir().unwrap();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir(first.path().join("x86_64-linux-gnu")).unwrap();
        fs::write(first.path().join("x86_64-linux-gnu/libjemalloc.so.2"), b"").unwrap();
        fs::write(second.path().join("libjemalloc.so.2"), b"").unwrap();

        let dirs = vec![
            empty.path().to_path_buf(),
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ];
        assert_eq!(
            find_allocator(&dirs).unwrap(),
            first.path().join("x86_64-linux-gnu/libjemalloc.so.2")
        );
    }

    #[test]
    fn allocator_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_allocator(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(err.is::<error::AllocatorNotFound>());
    }

    #[test]
    fn error_log_gets_banner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ERROR_LOG_FILE);
        fs::write(&path, "old\n").unwrap();

        drop(open_error_log(&path).unwrap());

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("old\n\n"));
        assert!(content.trim_end().ends_with("-- New execution"));
    }

    #[test]
    fn command_carries_environment() {
        let launch = Launch {
            program: PathBuf::from("/usr/bin/kurento-media-server"),
            args: vec![OsString::from("--gst-debug-no-color")],
            env: vec![(String::from("MALLOC_CONF"), String::from(MALLOC_CONF))],
            identity: Identity::Current,
            logs_path: None,
        };

        let cmd = launch.command();
        let envs = cmd.get_envs().collect::<Vec<_>>();
        assert_eq!(
            envs,
            vec![(OsStr::new("MALLOC_CONF"), Some(OsStr::new(MALLOC_CONF)))]
        );
        assert_eq!(cmd.get_args().collect::<Vec<_>>(), vec!["--gst-debug-no-color"]);
        assert_eq!(launch.error_log(), None);
    }
}
