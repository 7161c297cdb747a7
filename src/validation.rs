//! Request validation utilities.

use std::path::{Component, Path};
use std::time::Duration;

use crate::types::{Error, Result};

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.trim().is_empty() {
        return Err(Error::validation(format!("{} cannot be empty", field)));
    }
    Ok(())
}

/// Parse a monitoring duration such as `30s`, `5m` or `1h`.
///
/// Only a run of ASCII digits followed by exactly one unit is accepted.
/// Zero is rejected.
pub fn parse_interval(raw: &str, field: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || {
        Error::validation(format!(
            "invalid {} format: '{}' (expected <integer><s|m|h>, e.g. 30s, 5m, 1h)",
            field, raw
        ))
    };

    let unit = raw.chars().last().ok_or_else(invalid)?;
    let digits = &raw[..raw.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let value: u64 = digits.parse().map_err(|_| invalid())?;

    let seconds = match unit {
        's' => Some(value),
        'm' => value.checked_mul(60),
        'h' => value.checked_mul(3600),
        _ => return Err(invalid()),
    }
    .ok_or_else(invalid)?;

    if seconds == 0 {
        return Err(Error::validation(format!("{} must be positive", field)));
    }
    Ok(Duration::from_secs(seconds))
}

/// Validate a caller-supplied name that becomes a single file name.
pub fn validate_file_name(name: &str, field: &str) -> Result<()> {
    validate_non_empty(name, field)?;
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(Error::validation(format!(
            "{} must not contain path separators: '{}'",
            field, name
        )));
    }
    if name == "." || name == ".." || name.starts_with("..") {
        return Err(Error::validation(format!(
            "{} leads outside the storage directory: '{}'",
            field, name
        )));
    }
    Ok(())
}

/// Reject paths with `..` components.
pub fn validate_no_parent_components(path: &Path, field: &str) -> Result<()> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::validation(format!(
            "{} must not contain '..' components: '{}'",
            field,
            path.display()
        )));
    }
    Ok(())
}
