// src/error.rs

//! Error types for staged installation sessions
//!
//! Every fallible operation on the session surface returns [`Result`]. The
//! variants mirror the failure classes a client can observe: mutation after
//! seal, malformed input, premature commit, validation-phase inconsistency,
//! splice I/O failures, and abandonment.

use crate::backend::InstallStatus;
use std::io;
use std::path::PathBuf;

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by sessions and their collaborators
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write-surface mutation was attempted after the session was sealed
    #[error("{operation} not allowed after seal")]
    SealedState {
        /// The operation that was rejected
        operation: String,
    },

    /// A client-supplied stage filename violates the filename-safety policy
    #[error("invalid stage filename: {0}")]
    InvalidName(String),

    /// A staged file could not be parsed as a package archive
    #[error("failed to parse {path}: {reason}")]
    InvalidArchive {
        path: PathBuf,
        reason: String,
    },

    /// Commit was requested while the stage holds no files
    #[error("no packages staged")]
    NoPackagesStaged,

    /// Commit was requested while a write conduit is still open
    #[error("files still open")]
    FilesStillOpen,

    /// Two staged archives declare the same split discriminator
    #[error("split {} was defined multiple times", split_display(.split))]
    DuplicateSplit {
        /// `None` is the unsplit base archive
        split: Option<String>,
    },

    /// A staged archive (or the existing base) disagrees with the canonical
    /// package identity established by the first archive
    #[error("{artifact}: {reason}")]
    InconsistentPackage {
        /// Which artifact disagreed (staged file path or "existing base")
        artifact: String,
        reason: String,
    },

    /// A full install was committed without an unsplit base archive
    #[error("full install must include a base archive")]
    MissingBase,

    /// An inherit-mode install has no existing installation to extend
    #[error("missing existing base package for {package}")]
    MissingExistingBase {
        package: String,
    },

    /// Hard-linking an existing installed file into the stage failed
    #[error("failed to splice {path} into stage")]
    SpliceFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The session was abandoned, rejected by the user, or is already gone
    #[error("session aborted: {0}")]
    Aborted(String),

    /// An operation was invoked in a lifecycle state that forbids it
    #[error("illegal session state: {0}")]
    IllegalState(String),

    /// Underlying filesystem or storage failure
    #[error("I/O error")]
    Io(#[from] io::Error),

    /// Unexpected backend or storage failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to the terminal status reported through completion
    /// callbacks when it aborts a commit.
    pub fn install_status(&self) -> InstallStatus {
        match self {
            Self::Aborted(_) => InstallStatus::FailedAborted,
            Self::InvalidName(_)
            | Self::InvalidArchive { .. }
            | Self::NoPackagesStaged
            | Self::DuplicateSplit { .. }
            | Self::InconsistentPackage { .. }
            | Self::MissingBase
            | Self::MissingExistingBase { .. } => InstallStatus::FailedInvalid,
            Self::Io(_) | Self::SpliceFailed { .. } => InstallStatus::FailedStorage,
            Self::SealedState { .. }
            | Self::FilesStillOpen
            | Self::IllegalState(_)
            | Self::Internal(_) => InstallStatus::FailedInternal,
        }
    }
}

fn split_display(split: &Option<String>) -> &str {
    split.as_deref().unwrap_or("<base>")
}
