// Kurento Media Server entrypoint
//
// Copyright (C) 2020-2021 Sebastian Dröge <sebastian@centricular.com>
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v2.0.
// If a copy of the MPL was not distributed with this file, You can obtain one at
// <https://mozilla.org/MPL/2.0/>.
//
// SPDX-License-Identifier: MPL-2.0

//! Setting single parameters in `;`-commented INI files.
//!
//! Only lines of the form `key=value` are understood. A line is considered to define `key` if it
//! starts with an optional `;` comment marker, followed by optional whitespace, the literal key
//! and `=`. Everything else, including sections, is passed through untouched.

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;

use crate::error::{self, Error};

const COMMENT_MARKER: char = ';';

/// What [`patch`] did to the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patched {
    /// The line with the given zero-based index was rewritten.
    Replaced { line: usize, previous: String },
    /// A new line was added at the end.
    Appended,
}

/// Returns `true` if `line` defines `key`, either active or commented out.
pub fn matches_key(line: &str, key: &str) -> bool {
    let rest = line.strip_prefix(COMMENT_MARKER).unwrap_or(line);
    rest.trim_start()
        .strip_prefix(key)
        .map_or(false, |rest| rest.starts_with('='))
}

/// Sets `key` to `value` in `content`.
///
/// Returns the new content together with what was changed. Fails if more than one line defines
/// `key`, in which case there is no unambiguous line to rewrite.
pub fn patch(content: &str, key: &str, value: &str) -> Result<(String, Patched), Error> {
    let matching = content
        .lines()
        .enumerate()
        .filter(|(_, line)| matches_key(line, key))
        .map(|(idx, _)| idx)
        .collect::<Vec<_>>();

    let replacement = format!("{}={}", key, value);

    match matching.as_slice() {
        [] => {
            let mut new = String::with_capacity(content.len() + replacement.len() + 1);
            new.push_str(content);
            if !content.is_empty() && !content.ends_with('\n') {
                new.push('\n');
            }
            new.push_str(&replacement);
            new.push('\n');

            Ok((new, Patched::Appended))
        }
        [idx] => {
            let idx = *idx;
            let mut previous = String::new();
            let mut new = String::with_capacity(content.len() + replacement.len());

            // split_inclusive keeps the original line endings of all other lines intact
            for (i, line) in content.split_inclusive('\n').enumerate() {
                if i != idx {
                    new.push_str(line);
                    continue;
                }

                let (body, ending) = split_line_ending(line);
                previous.push_str(body);
                new.push_str(&replacement);
                new.push_str(ending);
            }

            Ok((
                new,
                Patched::Replaced {
                    line: idx,
                    previous,
                },
            ))
        }
        _ => Err(error::AmbiguousParameter {
            path: None,
            key: String::from(key),
            lines: matching,
        }
        .into()),
    }
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Sets `key` to `value` in the INI file at `path`.
///
/// The file is rewritten in place so that bind-mounted files keep working. Nothing is written if
/// the value is already active.
pub fn set_parameter(path: &Path, key: &str, value: &str) -> Result<Patched, Error> {
    let config_error = |err| error::ConfigFile {
        path: path.to_path_buf(),
        err,
    };

    let content = fs::read_to_string(path).map_err(config_error)?;

    let (new, patched) = patch(&content, key, value).map_err(|err| {
        match err.downcast::<error::AmbiguousParameter>() {
            Some(ambiguous) => Error::from(error::AmbiguousParameter {
                path: Some(path.to_path_buf()),
                key: ambiguous.key.clone(),
                lines: ambiguous.lines.clone(),
            }),
            None => err,
        }
    })?;

    if new == content {
        debug!("{}: {}={} already set", path.display(), key, value);
        return Ok(patched);
    }

    write_in_place(path, new.as_bytes()).map_err(config_error)?;

    Ok(patched)
}

/// Overwrites the content of `path` without replacing the file itself.
pub(crate) fn write_in_place(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(content)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_active_commented_and_indented() {
        assert!(matches_key("minPort=1000", "minPort"));
        assert!(matches_key(";minPort=1000", "minPort"));
        assert!(matches_key(";  minPort=", "minPort"));
        assert!(matches_key("\tminPort=1", "minPort"));
    }

    #[test]
    fn does_not_match_other_keys() {
        assert!(!matches_key("minPorts=1000", "minPort"));
        assert!(!matches_key("xminPort=1000", "minPort"));
        assert!(!matches_key(";; minPort=1000", "minPort"));
        assert!(!matches_key("minPort = 1000", "minPort"));
        assert!(!matches_key("[minPort]", "minPort"));
    }

    #[test]
    fn activates_commented_line() {
        let (new, patched) = patch("[ports]\n;minPort=1000\n", "minPort", "2000").unwrap();
        assert_eq!(new, "[ports]\nminPort=2000\n");
        assert_eq!(
            patched,
            Patched::Replaced {
                line: 1,
                previous: String::from(";minPort=1000"),
            }
        );
    }

    #[test]
    fn replaces_active_line_in_place() {
        let content = "a=1\nmtu=1200\nb=2\n";
        let (new, _) = patch(content, "mtu", "1500").unwrap();
        assert_eq!(new, "a=1\nmtu=1500\nb=2\n");
    }

    #[test]
    fn appends_missing_key() {
        let (new, patched) = patch("; comment\na=1\n", "mtu", "1500").unwrap();
        assert_eq!(new, "; comment\na=1\nmtu=1500\n");
        assert_eq!(patched, Patched::Appended);
    }

    #[test]
    fn appends_after_unterminated_last_line() {
        let (new, _) = patch("a=1", "mtu", "1500").unwrap();
        assert_eq!(new, "a=1\nmtu=1500\n");

        let (new, _) = patch("", "mtu", "1500").unwrap();
        assert_eq!(new, "mtu=1500\n");
    }

    #[test]
    fn keeps_crlf_line_endings() {
        let (new, _) = patch("a=1\r\n;mtu=1\r\nb=2\r\n", "mtu", "1500").unwrap();
        assert_eq!(new, "a=1\r\nmtu=1500\r\nb=2\r\n");
    }

    #[test]
    fn value_is_inserted_literally() {
        let value = "user:p@ss/&\\1@1.2.3.4:3478";
        let (new, _) = patch(";turnURL=\n", "turnURL", value).unwrap();
        assert_eq!(new, "turnURL=user:p@ss/&\\1@1.2.3.4:3478\n");
    }

    #[test]
    fn rejects_duplicate_definitions() {
        let err = patch(";mtu=1200\nmtu=1300\n", "mtu", "1500").unwrap_err();
        let ambiguous = err.downcast::<error::AmbiguousParameter>().unwrap();
        assert_eq!(ambiguous.lines, vec![0, 1]);
    }
}
