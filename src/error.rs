// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use std::any::{Any, TypeId};
use std::path::PathBuf;
use std::sync::Arc;
use std::{error, fmt, io, ops};

/// Exit code used when the server binary could not be executed.
pub const EXIT_EXEC_FAILED: i32 = 127;

#[derive(Debug, Clone)]
pub struct Error(Arc<dyn SetupError>);

impl ops::Deref for Error {
    type Target = dyn SetupError;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl Error {
    pub fn is<T: SetupError>(&self) -> bool {
        <dyn SetupError as Any>::type_id(&*self.0) == TypeId::of::<T>()
    }

    pub fn downcast<T: SetupError>(&self) -> Option<&T> {
        if self.is::<T>() {
            unsafe { Some(&*(&*self.0 as *const dyn SetupError as *const T)) }
        } else {
            None
        }
    }
}

/// Errors that abort the entrypoint before the server is started.
pub trait SetupError: Any + std::error::Error + Send + Sync {
    /// Process exit code to terminate with.
    fn exit_code(&self) -> i32 {
        1
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, fmt)
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        error::Error::source(&*self.0)
    }
}

impl<T: SetupError + 'static> From<T> for Error {
    fn from(v: T) -> Error {
        Error(Arc::new(v))
    }
}

impl SetupError for io::Error {}

/// The entrypoint was not started as root.
#[derive(Debug)]
pub struct NotRoot {
    pub euid: u32,
}

impl fmt::Display for NotRoot {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "Must run as root (effective UID is {}); use KMS_UID to run the server as another user",
            self.euid
        )
    }
}

impl error::Error for NotRoot {}

impl SetupError for NotRoot {}

/// Reading or writing an INI configuration file failed.
#[derive(Debug)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub err: io::Error,
}

impl fmt::Display for ConfigFile {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Config file {}: {}", self.path.display(), self.err)
    }
}

impl error::Error for ConfigFile {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}

impl SetupError for ConfigFile {}

/// More than one line of a config file matches the same key.
#[derive(Debug)]
pub struct AmbiguousParameter {
    pub path: Option<PathBuf>,
    pub key: String,
    /// Zero-based indices of all matching lines.
    pub lines: Vec<usize>,
}

impl fmt::Display for AmbiguousParameter {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self
            .lines
            .iter()
            .map(|l| (l + 1).to_string())
            .collect::<Vec<_>>()
            .join(", ");

        match self.path {
            Some(ref path) => write!(
                fmt,
                "Parameter '{}' is defined more than once in {} (lines {})",
                self.key,
                path.display(),
                lines
            ),
            None => write!(
                fmt,
                "Parameter '{}' is defined more than once (lines {})",
                self.key, lines
            ),
        }
    }
}

impl error::Error for AmbiguousParameter {}

impl SetupError for AmbiguousParameter {}

/// No jemalloc shared library was found in any of the searched directories.
#[derive(Debug)]
pub struct AllocatorNotFound {
    pub searched: Vec<PathBuf>,
}

impl fmt::Display for AllocatorNotFound {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dirs = self
            .searched
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(fmt, "No libjemalloc.so found in {}", dirs)
    }
}

impl error::Error for AllocatorNotFound {}

impl SetupError for AllocatorNotFound {}

/// Remapping the service user/group failed.
#[derive(Debug)]
pub struct Identity(pub String);

impl fmt::Display for Identity {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Identity remap failed: {}", self.0)
    }
}

impl error::Error for Identity {}

impl SetupError for Identity {}

/// Replacing the process with the server binary failed.
#[derive(Debug)]
pub struct Exec {
    pub program: PathBuf,
    pub err: io::Error,
}

impl fmt::Display for Exec {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "Failed to exec {}: {}", self.program.display(), self.err)
    }
}

impl error::Error for Exec {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.err)
    }
}

impl SetupError for Exec {
    fn exit_code(&self) -> i32 {
        EXIT_EXEC_FAILED
    }
}
