// src/session/splice.rs

//! Stage splicing for inherit-mode installs
//!
//! An inherit-mode stage only carries the archives the client wants to
//! change. Before handoff the splicer hard-links every other archive of the
//! currently installed application into the stage, under its original name,
//! so the backend receives a self-contained application.
//!
//! The installed files are never mutated; hard links share their content
//! read-only. Any link failure is fatal to the commit: a half-spliced stage
//! is not an acceptable end state, so callers must not retry file by file.

use crate::archive::ArchiveSource;
use crate::backend::InstalledApp;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Hard-link archives of `app` that the stage does not override.
///
/// Returns the number of files spliced in.
pub(crate) fn splice_existing_files(
    stage_dir: &Path,
    app: &InstalledApp,
    archives: &dyn ArchiveSource,
) -> Result<usize> {
    let mut spliced = 0;

    for entry in fs::read_dir(&app.code_dir)? {
        let entry = entry?;
        let old_file = entry.path();
        if !archives.is_archive_file(&old_file) {
            continue;
        }

        let new_file = stage_dir.join(entry.file_name());
        if new_file.exists() {
            // Overridden by the stage; client-provided content wins
            continue;
        }

        fs::hard_link(&old_file, &new_file).map_err(|source| Error::SpliceFailed {
            path: old_file.clone(),
            source,
        })?;
        spliced += 1;
    }

    debug!(
        "spliced {} existing archives of {} into stage",
        spliced, app.package_name
    );
    Ok(spliced)
}
