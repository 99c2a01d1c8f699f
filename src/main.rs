// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

use env_logger::Env;
use log::error;

use kms_entrypoint::{Entrypoint, Error, Settings};

fn run() -> Error {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => return err,
    };

    let args = std::env::args_os().skip(1).collect::<Vec<_>>();

    match Entrypoint::builder(settings).build().prepare(args) {
        Ok(launch) => launch.exec(),
        Err(err) => err,
    }
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let err = run();
    let code = err.exit_code();

    error!("Startup failed with exit status {}: {}", code, err);

    std::process::exit(code);
}
