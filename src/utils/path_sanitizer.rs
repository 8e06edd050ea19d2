// SPDX-License-Identifier: GPL-3.0-only
use std::path::{Component, Path};

/// Longest file name most filesystems accept
const MAX_NAME_LENGTH: usize = 255;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum UnsafeName {
    #[error("name is empty")]
    Empty,

    #[error("name exceeds {MAX_NAME_LENGTH} bytes: {0}")]
    TooLong(String),

    #[error("name contains a path separator: {0}")]
    Separator(String),

    #[error("name is hidden or a directory reference: {0}")]
    Hidden(String),

    #[error("name contains control characters: {0:?}")]
    ControlChar(String),

    #[error("path escapes the mirror root: {0}")]
    Escapes(String),
}

/// Check that an artifact name taken from the remote index is a plain file
/// name that stays inside its directory.
///
/// Names starting with '.' are refused so they can never collide with
/// in-progress downloads.
pub fn validate_artifact_name(name: &str) -> Result<(), UnsafeName> {
    if name.is_empty() {
        return Err(UnsafeName::Empty);
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(UnsafeName::TooLong(name.to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(UnsafeName::Separator(name.to_string()));
    }
    if name.starts_with('.') {
        return Err(UnsafeName::Hidden(name.to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(UnsafeName::ControlChar(name.to_string()));
    }
    Ok(())
}

/// Check that a `/`-separated path relative to the mirror root only descends.
pub fn validate_relative_path(path: &str) -> Result<(), UnsafeName> {
    if path.is_empty() {
        return Err(UnsafeName::Empty);
    }
    if path.contains('\\') || path.chars().any(char::is_control) {
        return Err(UnsafeName::ControlChar(path.to_string()));
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => {}
            _ => return Err(UnsafeName::Escapes(path.to_string())),
        }
    }
    Ok(())
}
