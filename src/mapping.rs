// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Mapping of [`Settings`] to configuration file parameters.

use std::fmt;
use std::path::Path;

use log::{info, warn};

use crate::error::Error;
use crate::getmyip::{IpDetector, IpFamily};
use crate::ini::{self, Patched};
use crate::settings::{ExternalAddress, Paths, Settings};

/// Configuration file a parameter lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigTarget {
    BaseRtp,
    WebRtc,
}

impl ConfigTarget {
    pub fn path(self, paths: &Paths) -> &Path {
        match self {
            ConfigTarget::BaseRtp => &paths.base_rtp_config,
            ConfigTarget::WebRtc => &paths.webrtc_config,
        }
    }
}

impl fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigTarget::BaseRtp => write!(f, "BaseRtpEndpoint"),
            ConfigTarget::WebRtc => write!(f, "WebRtcEndpoint"),
        }
    }
}

/// A single parameter to set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEdit {
    pub target: ConfigTarget,
    pub key: &'static str,
    pub value: String,
}

impl ParameterEdit {
    fn new(target: ConfigTarget, key: &'static str, value: impl Into<String>) -> Self {
        ParameterEdit {
            target,
            key,
            value: value.into(),
        }
    }
}

/// Computes all parameter edits requested by `settings`, in a fixed order.
///
/// External addresses set to `auto` are resolved with `detector`. If detection fails the edit is
/// skipped and the configured default stays in effect.
pub fn plan_edits(settings: &Settings, detector: &dyn IpDetector) -> Vec<ParameterEdit> {
    use ConfigTarget::*;

    let ipv4 = resolve_address(settings.external_ipv4.as_ref(), IpFamily::V4, detector);
    let ipv6 = resolve_address(settings.external_ipv6.as_ref(), IpFamily::V6, detector);
    let (stun_address, stun_port) = match settings.stun {
        Some(ref stun) => (Some(stun.address.clone()), Some(stun.port.clone())),
        None => (None, None),
    };

    let requested = vec![
        (BaseRtp, "minPort", settings.min_port.clone()),
        (BaseRtp, "maxPort", settings.max_port.clone()),
        (BaseRtp, "mtu", settings.mtu.clone()),
        (WebRtc, "externalIPv4", ipv4),
        (WebRtc, "externalIPv6", ipv6),
        (WebRtc, "networkInterfaces", settings.network_interfaces.clone()),
        (WebRtc, "iceTcp", settings.ice_tcp.clone()),
        (WebRtc, "stunServerAddress", stun_address),
        (WebRtc, "stunServerPort", stun_port),
        (WebRtc, "turnURL", settings.turn_url.clone()),
        (WebRtc, "pemCertificateRSA", settings.pem_certificate_rsa.clone()),
        (WebRtc, "pemCertificateECDSA", settings.pem_certificate_ecdsa.clone()),
    ];

    requested
        .into_iter()
        .filter_map(|(target, key, value)| {
            value.map(|value| ParameterEdit::new(target, key, value))
        })
        .collect()
}

fn resolve_address(
    address: Option<&ExternalAddress>,
    family: IpFamily,
    detector: &dyn IpDetector,
) -> Option<String> {
    match address? {
        ExternalAddress::Literal(addr) => Some(addr.clone()),
        ExternalAddress::Auto => match detector.detect(family) {
            Ok(addr) => {
                info!("Detected external {} address {}", family, addr);
                Some(addr)
            }
            Err(err) => {
                warn!(
                    "Can't detect external {} address, keeping default: {}",
                    family, err
                );
                None
            }
        },
    }
}

/// Applies `edits` to the files in `paths`, stopping at the first failure.
pub fn apply_edits(edits: &[ParameterEdit], paths: &Paths) -> Result<(), Error> {
    for edit in edits {
        let path = edit.target.path(paths);
        match ini::set_parameter(path, edit.key, &edit.value)? {
            Patched::Appended => info!("{}: added {}={}", edit.target, edit.key, edit.value),
            Patched::Replaced { previous, .. } => info!(
                "{}: set {}={} (was '{}')",
                edit.target, edit.key, edit.value, previous
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::getmyip::DetectError;
    use crate::settings::StunServer;

    struct Fixed(Option<&'static str>);

    impl IpDetector for Fixed {
        fn detect(&self, _family: IpFamily) -> Result<String, DetectError> {
            self.0
                .map(String::from)
                .ok_or_else(|| DetectError(String::from("offline")))
        }
    }

    fn keys(edits: &[ParameterEdit]) -> Vec<&'static str> {
        edits.iter().map(|e| e.key).collect()
    }

    #[test]
    fn nothing_set_nothing_edited() {
        assert!(plan_edits(&Settings::default(), &Fixed(None)).is_empty());
    }

    #[test]
    fn all_set_in_order() {
        let v = || Some(String::from("x"));
        let settings = Settings {
            min_port: v(),
            max_port: v(),
            mtu: v(),
            external_ipv4: Some(ExternalAddress::Literal(String::from("1.2.3.4"))),
            external_ipv6: Some(ExternalAddress::Auto),
            network_interfaces: v(),
            ice_tcp: v(),
            stun: Some(StunServer {
                address: String::from("5.6.7.8"),
                port: String::from("3478"),
            }),
            turn_url: v(),
            pem_certificate_rsa: v(),
            pem_certificate_ecdsa: v(),
            ..Default::default()
        };

        let edits = plan_edits(&settings, &Fixed(Some("2001:db8::1")));
        assert_eq!(
            keys(&edits),
            vec![
                "minPort",
                "maxPort",
                "mtu",
                "externalIPv4",
                "externalIPv6",
                "networkInterfaces",
                "iceTcp",
                "stunServerAddress",
                "stunServerPort",
                "turnURL",
                "pemCertificateRSA",
                "pemCertificateECDSA",
            ]
        );
        assert!(edits[..3].iter().all(|e| e.target == ConfigTarget::BaseRtp));
        assert!(edits[3..].iter().all(|e| e.target == ConfigTarget::WebRtc));
        assert_eq!(edits[4].value, "2001:db8::1");
        assert_eq!(edits[8].value, "3478");
    }

    #[test]
    fn failed_detection_skips_edit() {
        let settings = Settings {
            external_ipv4: Some(ExternalAddress::Auto),
            mtu: Some(String::from("1500")),
            ..Default::default()
        };

        let edits = plan_edits(&settings, &Fixed(None));
        assert_eq!(keys(&edits), vec!["mtu"]);
    }
}
