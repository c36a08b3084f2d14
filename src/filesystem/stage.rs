// src/filesystem/stage.rs

//! Stage storage locations
//!
//! A session stages into exactly one of two places: a private internal
//! directory, or an external removable container identified by an opaque
//! container id. The two-case enum makes the illegal both-or-neither state
//! unrepresentable.
//!
//! Container ids are resolved to mount paths through the [`ContainerResolver`]
//! capability; this crate never implements the storage driver itself.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Where a session's staged data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageLocation {
    /// Private directory on internal storage, created by the registry
    Internal(PathBuf),
    /// Identifier of an external removable container
    External(String),
}

impl StageLocation {
    /// The internal stage directory, if this is an internal location
    pub fn internal_dir(&self) -> Option<&Path> {
        match self {
            Self::Internal(dir) => Some(dir.as_path()),
            Self::External(_) => None,
        }
    }

    /// The external container id, if this is an external location
    pub fn container_id(&self) -> Option<&str> {
        match self {
            Self::Internal(_) => None,
            Self::External(cid) => Some(cid.as_str()),
        }
    }
}

/// Path-resolution capability for external staging containers.
///
/// Implemented by the storage layer that owns container mounting. Sessions
/// only ever ask for the mount path of a container and, on destruction, for
/// the container to be released.
pub trait ContainerResolver: Send + Sync {
    /// Resolve the filesystem path where the container's contents are
    /// accessible. May be called repeatedly; the session caches the result.
    fn resolve(&self, container_id: &str) -> Result<PathBuf>;

    /// Release the container and all data inside it.
    fn destroy(&self, container_id: &str) -> Result<()>;
}

/// Resolver used when no external-container storage layer is wired in.
///
/// Every lookup fails, so sessions created with an external location fail at
/// the first operation that touches the stage.
#[derive(Debug, Default)]
pub struct NoContainers;

impl ContainerResolver for NoContainers {
    fn resolve(&self, container_id: &str) -> Result<PathBuf> {
        Err(Error::Internal(format!(
            "no container storage configured, cannot resolve {container_id}"
        )))
    }

    fn destroy(&self, _container_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Resolve the on-disk directory backing `location`.
pub fn resolve_stage_dir(
    location: &StageLocation,
    containers: &dyn ContainerResolver,
) -> Result<PathBuf> {
    match location {
        StageLocation::Internal(dir) => Ok(dir.clone()),
        StageLocation::External(cid) => containers.resolve(cid),
    }
}

/// Release all staging storage behind `location`.
///
/// Idempotent and best-effort: storage that is already gone is not an error,
/// and residual failures are logged rather than propagated because
/// destruction runs on paths that must not fail (abandon, terminal commit).
pub fn destroy_stage(location: &StageLocation, containers: &dyn ContainerResolver) {
    match location {
        StageLocation::Internal(dir) => {
            if let Err(e) = delete_dir_contents(dir) {
                warn!("failed to clear stage dir {}: {}", dir.display(), e);
            }
            if let Err(e) = fs::remove_dir(dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("failed to remove stage dir {}: {}", dir.display(), e);
                }
            }
            debug!("destroyed internal stage {}", dir.display());
        }
        StageLocation::External(cid) => {
            if let Err(e) = containers.destroy(cid) {
                warn!("failed to destroy stage container {}: {}", cid, e);
            }
            debug!("destroyed external stage container {}", cid);
        }
    }
}

fn delete_dir_contents(dir: &Path) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_accessors() {
        let internal = StageLocation::Internal(PathBuf::from("/tmp/stage-1"));
        assert_eq!(internal.internal_dir(), Some(Path::new("/tmp/stage-1")));
        assert_eq!(internal.container_id(), None);

        let external = StageLocation::External("cid-7".to_string());
        assert_eq!(external.internal_dir(), None);
        assert_eq!(external.container_id(), Some("cid-7"));
    }

    #[test]
    fn test_no_containers_fails_resolution() {
        let resolver = NoContainers;
        assert!(resolver.resolve("cid-1").is_err());
        assert!(resolver.destroy("cid-1").is_ok());
    }

    #[test]
    fn test_destroy_internal_stage_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let stage = root.path().join("stage-1");
        fs::create_dir_all(stage.join("sub")).unwrap();
        fs::write(stage.join("base"), b"data").unwrap();
        fs::write(stage.join("sub/inner"), b"data").unwrap();

        let location = StageLocation::Internal(stage.clone());
        destroy_stage(&location, &NoContainers);
        assert!(!stage.exists());

        // Second destruction of missing storage must not panic or error
        destroy_stage(&location, &NoContainers);
    }
}
