// src/session/params.rs

//! Immutable session parameters
//!
//! Supplied once at session creation and never mutated afterwards. The
//! parameters travel with the handoff so the installer backend sees exactly
//! what the client asked for.

use serde::{Deserialize, Serialize};

/// How the staged archives relate to any existing installation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    /// The stage must be a complete application including a base archive
    FullInstall,
    /// Files not present in the stage are carried over from the currently
    /// installed version
    InheritExisting,
}

/// Immutable configuration of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Install mode chosen by the client
    pub mode: InstallMode,
    /// Expected total size of the staged data in bytes, if declared
    pub size_bytes: Option<u64>,
    /// Package name hint for display before validation derives the real one
    pub app_package_name: Option<String>,
    /// Human-readable label shown to the end user
    pub app_label: Option<String>,
}

impl SessionParams {
    /// Full-install parameters with no display metadata.
    pub fn full_install() -> Self {
        Self {
            mode: InstallMode::FullInstall,
            size_bytes: None,
            app_package_name: None,
            app_label: None,
        }
    }

    /// Inherit-existing parameters with no display metadata.
    pub fn inherit_existing() -> Self {
        Self {
            mode: InstallMode::InheritExisting,
            ..Self::full_install()
        }
    }

    pub fn with_size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_app_label(mut self, label: impl Into<String>) -> Self {
        self.app_label = Some(label.into());
        self
    }

    pub fn with_app_package_name(mut self, name: impl Into<String>) -> Self {
        self.app_package_name = Some(name.into());
        self
    }
}
