// src/backend.rs

//! Installer backend and storage collaborators
//!
//! The session engine stops at the handoff: actually activating a validated
//! stage is the installer backend's job, storage reservation is the quota
//! collaborator's, and the remote party that requested the commit listens on
//! a [`CommitObserver`]. All three are traits so hosts and tests can wire in
//! their own implementations.

use crate::error::Result;
use crate::filesystem::StageLocation;
use crate::session::SessionParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Terminal disposition of a session, as reported to completion callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    /// The backend activated the stage
    Success,
    /// User rejection or explicit abandonment
    FailedAborted,
    /// Malformed or inconsistent staged archives
    FailedInvalid,
    /// Storage or splice I/O failure
    FailedStorage,
    /// Unexpected backend or engine failure
    FailedInternal,
}

impl InstallStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// An application currently installed on the device, as known to the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledApp {
    /// Canonical package name
    pub package_name: String,
    /// Directory holding the installed archive files
    pub code_dir: PathBuf,
    /// Path of the installed base archive
    pub base_path: PathBuf,
}

/// Everything the backend needs to activate a sealed, validated stage
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    /// Canonical package name derived during validation
    pub package_name: String,
    /// Where the staged data lives
    pub location: StageLocation,
    /// Immutable parameters the session was created with
    pub params: SessionParams,
    /// Package identity of the installing party
    pub installer_package: String,
    /// Credential of the installing party
    pub installer_uid: u32,
    /// User the install targets
    pub user_id: u32,
}

/// Signal sent to the remote observer when a commit pauses for user consent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionPrompt {
    /// Session awaiting the decision
    pub session_id: u32,
    /// Package the user is being asked about, when already derived
    pub package_name: Option<String>,
}

/// One-shot sink the backend drives to its terminal result.
///
/// The backend invokes `on_package_installed` exactly once per handoff,
/// whether the activation succeeded or failed.
pub trait InstallResultSink: Send {
    fn on_package_installed(
        self: Box<Self>,
        package_name: Option<String>,
        status: InstallStatus,
        message: String,
    );
}

/// Remote completion handle supplied with a commit request.
///
/// Receives at most one non-terminal [`PermissionPrompt`] and exactly one
/// terminal `on_package_installed` over the lifetime of the session.
pub trait CommitObserver: Send + Sync {
    /// The commit is paused until the user decides; not a failure.
    fn on_user_action_required(&self, prompt: PermissionPrompt);

    /// Terminal disposition of the session.
    fn on_package_installed(
        &self,
        package_name: Option<&str>,
        status: InstallStatus,
        message: &str,
    );
}

/// The installer backend that performs actual package activation
pub trait InstallerBackend: Send + Sync {
    /// Look up the currently installed application for `package_name`, if
    /// any. Consulted during inherit-mode validation and splicing.
    fn installed_app(&self, package_name: &str, user_id: u32) -> Option<InstalledApp>;

    /// Resolve the uid owning `package_name` for `user_id`.
    fn package_uid(&self, package_name: &str, user_id: u32) -> Option<u32>;

    /// Whether `package_name` running as `uid` already holds blanket
    /// install permission, letting sessions skip the permission pause.
    fn holds_install_permission(&self, package_name: &str, uid: u32) -> bool;

    /// Take ownership of a sealed, validated stage and eventually drive
    /// `sink` to exactly one terminal result. Must not block the caller on
    /// the activation itself.
    fn install_stage(&self, request: HandoffRequest, sink: Box<dyn InstallResultSink>);
}

/// Storage-quota reservation collaborator.
///
/// Consulted before preallocating a staged file that must grow; a failed
/// reservation fails that write.
pub trait StorageQuota: Send + Sync {
    fn reserve(&self, additional_bytes: u64) -> Result<()>;
}

/// Quota collaborator that always grants the reservation
#[derive(Debug, Default)]
pub struct UnlimitedQuota;

impl StorageQuota for UnlimitedQuota {
    fn reserve(&self, _additional_bytes: u64) -> Result<()> {
        Ok(())
    }
}
