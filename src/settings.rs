// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Entrypoint configuration read from the environment.

use std::path::PathBuf;

use once_cell::sync::Lazy;

use crate::error::{self, Error};

/// Value of `KMS_EXTERNAL_IPV4`/`KMS_EXTERNAL_IPV6` that requests autodetection.
pub const AUTO: &str = "auto";

/// Debug categories used when `GST_DEBUG` is not provided.
pub const DEFAULT_GST_DEBUG: &str = "2,Kurento*:4,kms*:4,sdp*:4,webrtc*:4,*rtpendpoint:4,rtp*handler:4,rtpsynchronizer:4,agnosticbin:4";

/// An external address setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalAddress {
    /// Ask the autodetection helper.
    Auto,
    /// Use this value verbatim.
    Literal(String),
}

impl From<String> for ExternalAddress {
    fn from(s: String) -> Self {
        if s == AUTO {
            ExternalAddress::Auto
        } else {
            ExternalAddress::Literal(s)
        }
    }
}

/// STUN server, only meaningful with both address and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunServer {
    pub address: String,
    pub port: String,
}

/// All environment-provided settings.
///
/// Unset and empty variables are both `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// `KMS_UID`
    pub uid: Option<u32>,
    /// `KMS_MIN_PORT`
    pub min_port: Option<String>,
    /// `KMS_MAX_PORT`
    pub max_port: Option<String>,
    /// `KMS_MTU`
    pub mtu: Option<String>,
    /// `KMS_EXTERNAL_IPV4`
    pub external_ipv4: Option<ExternalAddress>,
    /// `KMS_EXTERNAL_IPV6`
    pub external_ipv6: Option<ExternalAddress>,
    /// `KMS_NETWORK_INTERFACES`
    pub network_interfaces: Option<String>,
    /// `KMS_ICE_TCP`
    pub ice_tcp: Option<String>,
    /// `KMS_STUN_IP` and `KMS_STUN_PORT`
    pub stun: Option<StunServer>,
    /// `KMS_TURN_URL`
    pub turn_url: Option<String>,
    /// `KMS_PEM_CERTIFICATE_RSA`
    pub pem_certificate_rsa: Option<String>,
    /// `KMS_PEM_CERTIFICATE_ECDSA`
    pub pem_certificate_ecdsa: Option<String>,
    /// `GST_DEBUG`
    pub gst_debug: Option<String>,
    /// `KURENTO_LOGS_PATH`
    pub logs_path: Option<PathBuf>,
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, which returns the value of a variable if it is set.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, Error> {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let uid = var("KMS_UID")
            .map(|v| {
                v.trim().parse::<u32>().map_err(|_| {
                    Error::from(error::Identity(format!("Invalid KMS_UID '{}'", v)))
                })
            })
            .transpose()?;

        let stun = match (var("KMS_STUN_IP"), var("KMS_STUN_PORT")) {
            (Some(address), Some(port)) => Some(StunServer { address, port }),
            _ => None,
        };

        Ok(Settings {
            uid,
            min_port: var("KMS_MIN_PORT"),
            max_port: var("KMS_MAX_PORT"),
            mtu: var("KMS_MTU"),
            external_ipv4: var("KMS_EXTERNAL_IPV4").map(ExternalAddress::from),
            external_ipv6: var("KMS_EXTERNAL_IPV6").map(ExternalAddress::from),
            network_interfaces: var("KMS_NETWORK_INTERFACES"),
            ice_tcp: var("KMS_ICE_TCP"),
            stun,
            turn_url: var("KMS_TURN_URL"),
            pem_certificate_rsa: var("KMS_PEM_CERTIFICATE_RSA"),
            pem_certificate_ecdsa: var("KMS_PEM_CERTIFICATE_ECDSA"),
            gst_debug: var("GST_DEBUG"),
            logs_path: var("KURENTO_LOGS_PATH").map(PathBuf::from),
        })
    }

    /// `GST_DEBUG` value to pass to the server.
    pub fn gst_debug(&self) -> &str {
        self.gst_debug.as_deref().unwrap_or(DEFAULT_GST_DEBUG)
    }
}

/// Filesystem locations the entrypoint works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// `BaseRtpEndpoint.conf.ini`
    pub base_rtp_config: PathBuf,
    /// `WebRtcEndpoint.conf.ini`
    pub webrtc_config: PathBuf,
    /// Host resolution table.
    pub hosts: PathBuf,
    /// The media server binary.
    pub server: PathBuf,
    /// Directories searched for the allocator library, in order.
    pub library_dirs: Vec<PathBuf>,
}

static DEFAULT_PATHS: Lazy<Paths> = Lazy::new(|| Paths {
    base_rtp_config: PathBuf::from("/etc/kurento/modules/kurento/BaseRtpEndpoint.conf.ini"),
    webrtc_config: PathBuf::from("/etc/kurento/modules/kurento/WebRtcEndpoint.conf.ini"),
    hosts: PathBuf::from("/etc/hosts"),
    server: PathBuf::from("/usr/bin/kurento-media-server"),
    library_dirs: vec![
        PathBuf::from("/usr/lib"),
        PathBuf::from("/usr/lib64"),
        PathBuf::from("/lib"),
    ],
});

impl Default for Paths {
    fn default() -> Self {
        DEFAULT_PATHS.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, Error> {
        let vars = vars
            .iter()
            .map(|(k, v)| (String::from(*k), String::from(*v)))
            .collect::<HashMap<_, _>>();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment() {
        let s = settings(&[]).unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.gst_debug(), DEFAULT_GST_DEBUG);
    }

    #[test]
    fn empty_values_are_unset() {
        let s = settings(&[("KMS_MTU", ""), ("KMS_UID", "")]).unwrap();
        assert_eq!(s.mtu, None);
        assert_eq!(s.uid, None);
    }

    #[test]
    fn stun_requires_both() {
        assert_eq!(settings(&[("KMS_STUN_IP", "1.2.3.4")]).unwrap().stun, None);
        assert_eq!(settings(&[("KMS_STUN_PORT", "3478")]).unwrap().stun, None);
        assert_eq!(
            settings(&[("KMS_STUN_IP", "1.2.3.4"), ("KMS_STUN_PORT", "3478")])
                .unwrap()
                .stun,
            Some(StunServer {
                address: String::from("1.2.3.4"),
                port: String::from("3478"),
            })
        );
    }

    #[test]
    fn external_address_auto() {
        let s = settings(&[
            ("KMS_EXTERNAL_IPV4", "auto"),
            ("KMS_EXTERNAL_IPV6", "2001:db8::1"),
        ])
        .unwrap();
        assert_eq!(s.external_ipv4, Some(ExternalAddress::Auto));
        assert_eq!(
            s.external_ipv6,
            Some(ExternalAddress::Literal(String::from("2001:db8::1")))
        );
    }

    #[test]
    fn invalid_uid_is_fatal() {
        let err = settings(&[("KMS_UID", "kurento")]).unwrap_err();
        assert!(err.is::<error::Identity>());
    }

    #[test]
    fn gst_debug_override() {
        let s = settings(&[("GST_DEBUG", "3")]).unwrap();
        assert_eq!(s.gst_debug(), "3");
    }
}
