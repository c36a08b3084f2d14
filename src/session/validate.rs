// src/session/validate.rs

//! Stage validation
//!
//! Inspects every archive staged at the top level of the stage directory and
//! proves the set is internally consistent before anything is handed to the
//! installer backend: one archive per split, one package identity, one
//! version code, one signature set. Files are renamed in place to the
//! canonical `base` / `split_<name>` scheme so the stage is self-describing,
//! and the canonical base archive path is resolved (possibly falling back to
//! the existing installation in inherit mode).
//!
//! Validation never mutates anything outside the stage directory.

use crate::archive::{ArchiveLite, ArchiveSource, SignatureSet};
use crate::backend::InstallerBackend;
use crate::error::{Error, Result};
use crate::filesystem::path::is_valid_stage_name;
use crate::session::params::InstallMode;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity and layout facts proven by one validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedStage {
    /// Canonical package name shared by every staged archive
    pub package_name: String,
    /// Version code shared by every staged archive
    pub version_code: u32,
    /// Signature set shared by every staged archive
    pub signatures: SignatureSet,
    /// Absolute path of the base archive after canonical renaming; points
    /// into the existing installation when an inherit-mode stage carries no
    /// base of its own
    pub base_path: PathBuf,
}

/// Validate the stage at `stage_dir` for an install in `mode`.
///
/// Files are visited in sorted name order so failures are deterministic
/// regardless of directory enumeration order. Subdirectories are skipped;
/// installers cannot stage them, so entries like `lost+found` are ignored.
pub(crate) fn validate_stage(
    stage_dir: &Path,
    mode: InstallMode,
    user_id: u32,
    archives: &dyn ArchiveSource,
    backend: &dyn InstallerBackend,
) -> Result<ValidatedStage> {
    let mut files = Vec::new();
    for entry in fs::read_dir(stage_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();

    if files.is_empty() {
        return Err(Error::NoPackagesStaged);
    }

    let mut seen_splits: HashSet<Option<String>> = HashSet::new();
    let mut identity: Option<(String, u32, SignatureSet)> = None;
    let mut base_path: Option<PathBuf> = None;

    for file in &files {
        let info = parse_lite(archives, file)?;

        if !seen_splits.insert(info.split_name.clone()) {
            return Err(Error::DuplicateSplit {
                split: info.split_name,
            });
        }

        // The first archive establishes the canonical identity
        let (package_name, version_code, signatures) = identity.get_or_insert_with(|| {
            (
                info.package_name.clone(),
                info.version_code,
                info.signatures.clone(),
            )
        });
        assert_consistent(
            &file.display().to_string(),
            package_name,
            *version_code,
            signatures,
            &info,
        )?;

        // Enforce uniform naming while we are here
        let target_name = match &info.split_name {
            None => "base".to_string(),
            Some(split) => format!("split_{split}"),
        };
        if !is_valid_stage_name(&target_name) {
            return Err(Error::InvalidName(target_name));
        }

        let target = stage_dir.join(&target_name);
        if *file != target {
            fs::rename(file, &target)?;
        }

        // Base is coming from the stage itself
        if info.split_name.is_none() {
            base_path = Some(target);
        }
    }

    // `files` was non-empty, so the identity is always established here
    let (package_name, version_code, signatures) = identity
        .ok_or_else(|| Error::Internal("validation finished without identity".to_string()))?;

    let base_path = match mode {
        InstallMode::FullInstall => {
            // Full installs must bring their own base archive
            base_path.ok_or(Error::MissingBase)?
        }
        InstallMode::InheritExisting => {
            let app = backend
                .installed_app(&package_name, user_id)
                .ok_or_else(|| Error::MissingExistingBase {
                    package: package_name.clone(),
                })?;

            // The existing base must agree with the staged archives too
            let existing = parse_lite(archives, &app.base_path)?;
            assert_consistent(
                "existing base",
                &package_name,
                version_code,
                &signatures,
                &existing,
            )?;

            // Base may be inherited from the existing install
            base_path.unwrap_or(app.base_path)
        }
    };

    debug!(
        "validated stage for {} version {} ({} archives)",
        package_name,
        version_code,
        files.len()
    );

    Ok(ValidatedStage {
        package_name,
        version_code,
        signatures,
        base_path,
    })
}

fn parse_lite(archives: &dyn ArchiveSource, path: &Path) -> Result<ArchiveLite> {
    archives.parse_lite(path).map_err(|e| Error::InvalidArchive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn assert_consistent(
    artifact: &str,
    package_name: &str,
    version_code: u32,
    signatures: &SignatureSet,
    info: &ArchiveLite,
) -> Result<()> {
    if info.package_name != package_name {
        return Err(Error::InconsistentPackage {
            artifact: artifact.to_string(),
            reason: format!(
                "package {} inconsistent with {}",
                info.package_name, package_name
            ),
        });
    }
    if info.version_code != version_code {
        return Err(Error::InconsistentPackage {
            artifact: artifact.to_string(),
            reason: format!(
                "version code {} inconsistent with {}",
                info.version_code, version_code
            ),
        });
    }
    if !info.signatures.exact_match(signatures) {
        return Err(Error::InconsistentPackage {
            artifact: artifact.to_string(),
            reason: "signatures are inconsistent".to_string(),
        });
    }
    Ok(())
}
