// src/archive.rs

//! Lightweight archive metadata and the parser collaborator
//!
//! Validation only needs a small slice of what a full package parse would
//! produce: the package identity, the version code, the optional split
//! discriminator, and the recorded signature set. The [`ArchiveSource`]
//! trait is the seam to whatever format-specific parser the host wires in;
//! this crate never parses archive bytes itself.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The set of signing certificates recorded for an archive.
///
/// Signature verification is out of scope here; the set is an opaque value
/// compared for exact equality across the archives of one install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureSet(Vec<String>);

impl SignatureSet {
    pub fn new(signatures: Vec<String>) -> Self {
        Self(signatures)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exact-match comparison, the only operation installs perform on
    /// signature sets.
    pub fn exact_match(&self, other: &SignatureSet) -> bool {
        self == other
    }
}

/// Metadata parsed from a single staged archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveLite {
    /// Canonical package name declared by the archive
    pub package_name: String,
    /// Monotonic version code
    pub version_code: u32,
    /// Split discriminator; `None` marks the unsplit base archive
    pub split_name: Option<String>,
    /// Signature set recorded in the archive
    pub signatures: SignatureSet,
}

/// Format-specific archive parsing, supplied by the host.
pub trait ArchiveSource: Send + Sync {
    /// Parse the lightweight metadata of the archive at `path`.
    fn parse_lite(&self, path: &Path) -> Result<ArchiveLite>;

    /// Whether `path` looks like a package archive at all. Used by the
    /// splicer to skip stray files sitting next to an installed application.
    fn is_archive_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}
