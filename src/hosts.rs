//! Host resolution table cleanup.

use std::fs;
use std::path::Path;

use log::debug;

use crate::ini::write_in_place;

/// Returns `true` for host table entries of the IPv6 loopback address.
fn is_ipv6_loopback(line: &str) -> bool {
    line.split_whitespace().next() == Some("::1")
}

/// Removes all IPv6 loopback entries from `content`.
///
/// Returns `None` if there is nothing to remove.
pub fn strip_ipv6_loopback(content: &str) -> Option<String> {
    if !content.lines().any(is_ipv6_loopback) {
        return None;
    }

    Some(
        content
            .split_inclusive('\n')
            .filter(|line| !is_ipv6_loopback(line))
            .collect(),
    )
}

/// Removes the IPv6 loopback alias from the hosts file at `path`.
///
/// Errors are logged and otherwise ignored.
pub fn remove_ipv6_loopback(path: &Path) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            debug!("Can't read {}: {}", path.display(), err);
            return;
        }
    };

    if let Some(new) = strip_ipv6_loopback(&content) {
        match write_in_place(path, new.as_bytes()) {
            Ok(()) => debug!("Removed IPv6 loopback from {}", path.display()),
            Err(err) => debug!("Can't update {}: {}", path.display(), err),
        }
    }
}
