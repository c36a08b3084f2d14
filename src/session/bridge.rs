// src/session/bridge.rs

//! Write conduits
//!
//! Each `open_write` call produces one conduit: a registry entry the session
//! keeps forever, and a [`StageWriter`] handed to the client. Bytes flow
//! client -> writer -> staged file without the session lock being held, so a
//! slow writer cannot stall progress queries or other writers.
//!
//! Conduits are never removed from the session's registry, only marked
//! closed when the client-facing writer closes or drops. The commit-time
//! "no writers remain" check is then a plain scan over the registry.

use crate::backend::StorageQuota;
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Session-side record of one write stream
#[derive(Debug)]
pub(crate) struct WriteConduit {
    name: String,
    closed: AtomicBool,
}

impl WriteConduit {
    pub(crate) fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Open (creating if needed) the staged target file, reserve storage for a
/// declared total length, and seek to the requested offset.
///
/// Preallocation asks the quota collaborator for the growth delta before
/// extending the file, so partial writes land in already-reserved space.
pub(crate) fn open_stage_file(
    target: &Path,
    offset: u64,
    length: Option<u64>,
    quota: &dyn StorageQuota,
) -> Result<File> {
    let mut file = OpenOptions::new().create(true).write(true).open(target)?;

    if let Some(length) = length {
        let current = file.metadata()?.len();
        if length > current {
            quota.reserve(length - current)?;
            file.set_len(length)?;
        }
    }

    if offset > 0 {
        file.seek(SeekFrom::Start(offset))?;
    }

    debug!("opened stage file {} at offset {}", target.display(), offset);
    Ok(file)
}

/// Client end of a write conduit.
///
/// Implements [`io::Write`]; closing (or dropping) it marks the conduit
/// closed in the owning session's registry.
#[derive(Debug)]
pub struct StageWriter {
    file: File,
    conduit: Arc<WriteConduit>,
}

impl StageWriter {
    pub(crate) fn new(file: File, conduit: Arc<WriteConduit>) -> Self {
        Self { file, conduit }
    }

    /// The stage filename this writer streams into.
    pub fn name(&self) -> &str {
        self.conduit.name()
    }

    /// Flush and close the stream, marking the conduit closed.
    pub fn close(mut self) -> io::Result<()> {
        self.file.flush()?;
        self.conduit.mark_closed();
        Ok(())
    }
}

impl Write for StageWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Drop for StageWriter {
    fn drop(&mut self) {
        // A dropped client end counts as closed; only the closedness matters
        // to the commit check.
        self.conduit.mark_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::UnlimitedQuota;

    #[test]
    fn test_conduit_close_tracking() {
        let conduit = WriteConduit::new("base");
        assert!(!conduit.is_closed());
        conduit.mark_closed();
        assert!(conduit.is_closed());
    }

    #[test]
    fn test_writer_drop_marks_closed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("base");
        let file = open_stage_file(&target, 0, None, &UnlimitedQuota).unwrap();

        let conduit = WriteConduit::new("base");
        let writer = StageWriter::new(file, conduit.clone());
        drop(writer);
        assert!(conduit.is_closed());
    }

    #[test]
    fn test_preallocation_and_offset() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("base");

        let mut file = open_stage_file(&target, 4, Some(16), &UnlimitedQuota).unwrap();
        assert_eq!(std::fs::metadata(&target).unwrap().len(), 16);

        file.write_all(b"abcd").unwrap();
        drop(file);
        let content = std::fs::read(&target).unwrap();
        assert_eq!(&content[4..8], b"abcd");
    }
}
