// src/filesystem/path.rs

//! Stage filename safety policy
//!
//! Clients name the files they stream into a stage. Those names come from an
//! untrusted party, so they must be a single path component: no separators,
//! no traversal, no characters that cannot round-trip through common
//! filesystems.
//!
//! # Security
//!
//! A malicious installer could otherwise escape its private stage directory
//! with names like `../../etc/passwd` or `splits/../../x`. The policy here
//! is the single gate for every name that ends up joined onto a stage
//! directory.

use crate::error::{Error, Result};

/// Check whether `name` is acceptable as a staged filename.
///
/// Accepts a single non-empty path component without separators, traversal
/// components, NUL or other control characters. Both client-chosen names and
/// the canonical names produced during validation pass through this check.
pub fn is_valid_stage_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    if name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    if name.chars().any(|c| c.is_control()) {
        return false;
    }
    true
}

/// Validate a client-supplied stage filename, returning it on success.
///
/// # Examples
///
/// ```
/// use stagekit::filesystem::path::validate_stage_name;
///
/// assert!(validate_stage_name("app.pkg").is_ok());
/// assert!(validate_stage_name("../escape").is_err());
/// assert!(validate_stage_name("a/b").is_err());
/// ```
pub fn validate_stage_name(name: &str) -> Result<&str> {
    if is_valid_stage_name(name) {
        Ok(name)
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
