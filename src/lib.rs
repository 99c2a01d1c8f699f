// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! # Kurento Media Server Container Entrypoint
//!
//! Prepares the environment of a Kurento Media Server container and then replaces itself with
//! the server process.
//!
//! ## Overview of the components
//!
//! ### `Settings`
//!
//! [`settings::Settings`] is read once from the `KMS_*`, `GST_DEBUG` and `KURENTO_LOGS_PATH`
//! environment variables. Unset and empty variables leave the defaults baked into the image
//! untouched. [`settings::Paths`] holds the locations of the configuration files, the server
//! binary and the library directories.
//!
//! ### Parameter patching
//!
//! [`mapping::plan_edits`] turns the settings into a list of [`mapping::ParameterEdit`]s for the
//! `BaseRtpEndpoint` and `WebRtcEndpoint` configuration files, resolving `auto` external
//! addresses through an [`getmyip::IpDetector`]. Each edit is applied with
//! [`ini::set_parameter`], which activates a commented-out line, replaces an existing one or
//! appends a new line.
//!
//! ### Launching
//!
//! [`entrypoint::Entrypoint::prepare`] runs all of the above and produces a [`launch::Launch`]:
//! the server command with jemalloc preloaded, the debug configuration, the identity to run as
//! and the optional error log. [`launch::Launch::exec`] then replaces the current process.
//!
//! All failures before that point are fatal and reported as [`error::Error`].

pub mod entrypoint;
pub mod error;
pub mod getmyip;
pub mod hosts;
pub mod ini;
pub mod launch;
pub mod mapping;
pub mod settings;

pub use entrypoint::Entrypoint;
pub use error::Error;
pub use settings::{Paths, Settings};
