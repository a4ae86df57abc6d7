// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hierarchical path helpers.

use crate::error::{KvError, Result};

/// Normalize a slash-delimited path.
///
/// Leading and trailing slashes are dropped. Empty, `.` and `..` segments are
/// rejected. The root (`""` or `"/"`) is only accepted when `allow_root` is set.
pub fn normalize(path: &str, allow_root: bool) -> Result<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        if allow_root {
            return Ok(String::new());
        }
        return Err(KvError::InvalidPath {
            path: path.to_string(),
            reason: "path must not be empty",
        });
    }

    for segment in trimmed.split('/') {
        match segment {
            "" => {
                return Err(KvError::InvalidPath {
                    path: path.to_string(),
                    reason: "empty path segment",
                });
            }
            "." | ".." => {
                return Err(KvError::InvalidPath {
                    path: path.to_string(),
                    reason: "relative path segment",
                });
            }
            _ => {}
        }
    }

    Ok(trimmed.to_string())
}

/// Join a parent path and a child name.
pub fn join(parent: &str, child: &str) -> String {
    let parent = parent.trim_matches('/');
    let child = child.trim_matches('/');
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Name of the direct child of `parent` that `path` lives under, if any.
pub(crate) fn child_of<'a>(parent: &str, path: &'a str) -> Option<&'a str> {
    let rest = if parent.is_empty() {
        path
    } else {
        path.strip_prefix(parent)?.strip_prefix('/')?
    };
    rest.split('/').next().filter(|name| !name.is_empty())
}
