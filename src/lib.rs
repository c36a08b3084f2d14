// src/lib.rs

//! stagekit - staged package-installation sessions
//!
//! A session engine for multi-file package installs: clients open a session,
//! stream archive files into its private staging area, and commit. The
//! engine seals the session, validates the staged archives as one coherent
//! package (one archive per split, one identity, one signature set), splices
//! in inherited files for delta installs, and hands the finished stage off
//! to a pluggable installer backend. Each queued commit attempt performs its
//! own handoff, but the terminal disposition is delivered to observers
//! exactly once per session.
//!
//! Integrators supply the platform-specific collaborators as trait objects:
//! an [`ArchiveSource`](archive::ArchiveSource) that parses archive
//! identity, an [`InstallerBackend`](backend::InstallerBackend) that
//! performs the actual install, plus storage quota and container resolution
//! hooks. Everything stateful lives in [`SessionRegistry`] and the
//! [`Session`]s it owns.

pub mod archive;
pub mod backend;
pub mod error;
pub mod filesystem;
pub mod progress;
pub mod registry;
pub mod session;

pub use error::{Error, Result};
pub use registry::{NoopCallback, SessionCallback, SessionRegistry, SessionServices};
pub use session::{InstallMode, Session, SessionInfo, SessionParams, StageWriter};
