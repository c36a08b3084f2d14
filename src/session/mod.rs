// src/session/mod.rs

//! Staged package-installation sessions
//!
//! A [`Session`] is a client-driven installation transaction with its own
//! private staging area. Clients stream archive files in through write
//! conduits, then request a commit; the session seals its write surface,
//! validates the staged archives for internal consistency, optionally
//! splices in files inherited from the currently installed application, and
//! hands the stage off to the installer backend exactly once.
//!
//! # Lifecycle
//!
//! ```text
//! Open -> Sealed -> Validating -> [AwaitingPermission] -> Committing -> Finished
//!   \________________________________________________________________/
//!                       abandon() -> Destroyed (terminal)
//! ```
//!
//! Sealing is a one-way transition. Destruction releases the staging storage
//! exactly once and gates every terminal-notification path, so a late
//! installer callback can never resurrect a destroyed session.
//!
//! All mutable state lives behind one mutex; the commit pipeline itself runs
//! on a per-session serialized worker so at most one attempt is ever in
//! flight.

pub mod params;

mod bridge;
mod queue;
mod splice;
mod validate;

pub use bridge::StageWriter;
pub use params::{InstallMode, SessionParams};

use crate::backend::{
    CommitObserver, HandoffRequest, InstallResultSink, InstallStatus, PermissionPrompt,
};
use crate::error::{Error, Result};
use crate::filesystem::{stage, StageLocation};
use crate::filesystem::path::validate_stage_name;
use crate::progress::ProgressState;
use crate::registry::SessionServices;
use bridge::WriteConduit;
use chrono::{DateTime, Utc};
use queue::CommitQueue;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};
use validate::{validate_stage, ValidatedStage};

/// Read-only point-in-time snapshot of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: u32,
    pub installer_package: String,
    /// Base archive path once validation has resolved it
    pub resolved_base_path: Option<PathBuf>,
    pub progress: f32,
    pub sealed: bool,
    pub open: bool,
    pub mode: InstallMode,
    pub size_bytes: Option<u64>,
    pub app_package_name: Option<String>,
    pub app_label: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Mutable session state, all guarded by one mutex
struct SessionState {
    sealed: bool,
    permissions_accepted: bool,
    destroyed: bool,
    /// Terminal notifications delivered; gates every finish path
    finished: bool,
    /// Lazily resolved stage directory
    resolved_stage_dir: Option<PathBuf>,
    progress: ProgressState,
    /// Every conduit ever opened; entries are only marked closed, never
    /// removed, so the commit check is a plain scan
    conduits: Vec<Arc<WriteConduit>>,
    /// Remote completion handle, set by the first commit request
    observer: Option<Arc<dyn CommitObserver>>,
    /// Facts proven by the last successful validation pass
    derived: Option<ValidatedStage>,
}

impl SessionState {
    fn assert_not_sealed(&self, operation: &str) -> Result<()> {
        if self.sealed {
            Err(Error::SealedState {
                operation: operation.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// One staged package-installation transaction
pub struct Session {
    session_id: u32,
    user_id: u32,
    installer_package: String,
    installer_uid: u32,
    created_at: DateTime<Utc>,
    params: SessionParams,
    location: StageLocation,
    services: SessionServices,
    open_count: AtomicU32,
    state: Mutex<SessionState>,
    queue: CommitQueue,
}

impl Session {
    /// Create a session and spawn its commit worker.
    ///
    /// `sealed` supports restoring a previously persisted session after a
    /// restart; freshly created sessions pass `false`. The installing
    /// party's uid is always derived at runtime from the backend, and the
    /// permission pause is pre-granted when the installer already holds
    /// blanket install permission.
    pub fn new(
        session_id: u32,
        user_id: u32,
        installer_package: impl Into<String>,
        params: SessionParams,
        location: StageLocation,
        sealed: bool,
        services: SessionServices,
    ) -> Result<Arc<Self>> {
        let installer_package = installer_package.into();
        let installer_uid = services
            .backend
            .package_uid(&installer_package, user_id)
            .ok_or_else(|| {
                Error::Internal(format!("unknown installer package {installer_package}"))
            })?;
        let permissions_accepted = services
            .backend
            .holds_install_permission(&installer_package, installer_uid);

        let session = Arc::new_cyclic(|weak: &Weak<Session>| Self {
            session_id,
            user_id,
            installer_package,
            installer_uid,
            created_at: Utc::now(),
            params,
            location,
            services,
            open_count: AtomicU32::new(0),
            state: Mutex::new(SessionState {
                sealed,
                permissions_accepted,
                destroyed: false,
                finished: false,
                resolved_stage_dir: None,
                progress: ProgressState::new(),
                conduits: Vec::new(),
                observer: None,
                derived: None,
            }),
            queue: CommitQueue::start(weak.clone()),
        });
        Ok(session)
    }

    pub fn id(&self) -> u32 {
        self.session_id
    }

    pub fn user_id(&self) -> u32 {
        self.user_id
    }

    pub fn installer_package(&self) -> &str {
        &self.installer_package
    }

    pub fn installer_uid(&self) -> u32 {
        self.installer_uid
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn location(&self) -> &StageLocation {
        &self.location
    }

    pub fn is_sealed(&self) -> bool {
        self.state().sealed
    }

    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Take a read-only snapshot of the session.
    pub fn generate_info(&self) -> SessionInfo {
        let state = self.state();
        SessionInfo {
            session_id: self.session_id,
            installer_package: self.installer_package.clone(),
            resolved_base_path: state.derived.as_ref().map(|d| d.base_path.clone()),
            progress: state.progress.computed(),
            sealed: state.sealed,
            open: self.open_count.load(Ordering::Relaxed) > 0,
            mode: self.params.mode,
            size_bytes: self.params.size_bytes,
            app_package_name: self.params.app_package_name.clone(),
            app_label: self.params.app_label.clone(),
            created_at: self.created_at,
        }
    }

    /// Register an active client reference. The zero-to-one transition is
    /// reported to the registry callback.
    pub fn open(&self) {
        if self.open_count.fetch_add(1, Ordering::AcqRel) == 0 {
            self.services.callback.on_session_opened(self.session_id);
        }
    }

    /// Drop an active client reference. The one-to-zero transition is
    /// reported to the registry callback.
    pub fn close(&self) {
        if self.open_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.services.callback.on_session_closed(self.session_id);
        }
    }

    /// Replace the client-reported progress.
    pub fn set_client_progress(&self, progress: f32) {
        let publishable = {
            let mut state = self.state();
            state.progress.set_client(progress);
            state.progress.take_publishable()
        };
        self.publish_progress(publishable);
    }

    /// Add to the client-reported progress.
    pub fn add_client_progress(&self, progress: f32) {
        let publishable = {
            let mut state = self.state();
            state.progress.add_client(progress);
            state.progress.take_publishable()
        };
        self.publish_progress(publishable);
    }

    /// List the names currently staged. Like reads, blocked once sealed.
    pub fn names(&self) -> Result<Vec<String>> {
        self.state().assert_not_sealed("names")?;
        let stage_dir = self.resolve_stage_dir()?;
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&stage_dir)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    /// Open a write conduit for the staged file `name`.
    ///
    /// When `length` declares the total size, that much storage is reserved
    /// up front (asking the quota collaborator for any growth); `offset`
    /// positions the stream for resumed writes. The returned writer streams
    /// bytes to disk without holding the session lock.
    pub fn open_write(
        &self,
        name: &str,
        offset: u64,
        length: Option<u64>,
    ) -> Result<StageWriter> {
        // Register the conduit under the lock; the disk work happens after.
        let conduit = {
            let mut state = self.state();
            state.assert_not_sealed("open_write")?;
            let conduit = WriteConduit::new(name);
            state.conduits.push(conduit.clone());
            conduit
        };

        match self.open_write_target(name, offset, length) {
            Ok(file) => Ok(StageWriter::new(file, conduit)),
            Err(e) => {
                // A failed open must not leave a forever-open conduit that
                // would wedge every future commit.
                conduit.mark_closed();
                Err(e)
            }
        }
    }

    fn open_write_target(&self, name: &str, offset: u64, length: Option<u64>) -> Result<File> {
        validate_stage_name(name)?;
        let stage_dir = self.resolve_stage_dir()?;
        bridge::open_stage_file(
            &stage_dir.join(name),
            offset,
            length,
            self.services.quota.as_ref(),
        )
    }

    /// Open a staged file read-only. Mirrors the write-phase rules: invalid
    /// once the session is sealed.
    pub fn open_read(&self, name: &str) -> Result<File> {
        self.state().assert_not_sealed("open_read")?;
        validate_stage_name(name)?;
        let stage_dir = self.resolve_stage_dir()?;
        Ok(File::open(stage_dir.join(name))?)
    }

    /// Request that this session be committed.
    ///
    /// Never blocks: the commit pipeline runs on the session's serialized
    /// worker. Synchronously verifies that no write conduit remains open
    /// (failing with [`Error::FilesStillOpen`] and leaving the session
    /// usable for a retry), seals the session, installs `observer` as the
    /// completion handle if none is set yet, and enqueues one attempt.
    /// Duplicate calls enqueue further attempts; the worker runs them one
    /// at a time.
    pub fn commit(&self, observer: Arc<dyn CommitObserver>) -> Result<()> {
        let newly_sealed = {
            let mut state = self.state();
            if state.destroyed {
                return Err(Error::Aborted("session destroyed".to_string()));
            }
            if state.observer.is_none() {
                state.observer = Some(observer);
            }
            if state.sealed {
                false
            } else {
                if state.conduits.iter().any(|c| !c.is_closed()) {
                    return Err(Error::FilesStillOpen);
                }
                state.sealed = true;
                true
            }
        };

        if newly_sealed {
            // Sealing is persisted/observed before any validation touches
            // the stage, so hard links created later stay immutable.
            self.services.callback.on_session_sealed(self.session_id);
        }

        self.queue.enqueue();
        Ok(())
    }

    /// Deliver the user's permission decision for a sealed session.
    ///
    /// Granting re-enqueues the suspended commit; rejection destroys the
    /// session and reports an aborted install.
    pub fn set_permissions_result(&self, granted: bool) -> Result<()> {
        {
            let state = self.state();
            if state.destroyed {
                return Err(Error::Aborted("session destroyed".to_string()));
            }
            if !state.sealed {
                return Err(Error::IllegalState(
                    "must be sealed to accept permissions".to_string(),
                ));
            }
        }

        if granted {
            self.state().permissions_accepted = true;
            self.queue.enqueue();
        } else {
            self.destroy_and_finish(InstallStatus::FailedAborted, "user rejected permissions");
        }
        Ok(())
    }

    /// Abandon the session from any state.
    ///
    /// Destroys the staging storage and reports an aborted install; wins
    /// any race with an in-flight commit. Idempotent on an already-finished
    /// session.
    pub fn abandon(&self) {
        self.destroy_and_finish(InstallStatus::FailedAborted, "session was abandoned");
    }

    /// One commit attempt, run on the session's serialized worker.
    pub(crate) async fn run_commit_attempt(self: Arc<Self>) {
        if let Err(e) = self.commit_attempt() {
            warn!("session {} commit failed: {}", self.session_id, e);
            self.destroy_and_finish(e.install_status(), &e.to_string());
        }
    }

    fn commit_attempt(self: &Arc<Self>) -> Result<()> {
        // An attempt that lost the race with abandon() is a no-op.
        if self.state().destroyed {
            debug!("session {} destroyed, dropping commit attempt", self.session_id);
            return Ok(());
        }

        let stage_dir = self.resolve_stage_dir()?;

        let validated = validate_stage(
            &stage_dir,
            self.params.mode,
            self.user_id,
            self.services.archives.as_ref(),
            self.services.backend.as_ref(),
        )?;

        // Record the derived identity, holding prior passes to it exactly.
        let (permissions_accepted, observer) = {
            let mut state = self.state();
            if let Some(previous) = &state.derived {
                if *previous != validated {
                    return Err(Error::InconsistentPackage {
                        artifact: "staged archives".to_string(),
                        reason: "package identity changed between validation passes".to_string(),
                    });
                }
            }
            state.derived = Some(validated.clone());
            (state.permissions_accepted, state.observer.clone())
        };

        if !permissions_accepted {
            // Not a failure: the queue stays idle until the user decides
            // and set_permissions_result() re-enqueues.
            info!("session {} awaiting user permission", self.session_id);
            if let Some(observer) = observer {
                observer.on_user_action_required(PermissionPrompt {
                    session_id: self.session_id,
                    package_name: Some(validated.package_name.clone()),
                });
            }
            return Ok(());
        }

        // Carry over whatever the client did not override.
        if self.params.mode == InstallMode::InheritExisting {
            let app = self
                .services
                .backend
                .installed_app(&validated.package_name, self.user_id)
                .ok_or_else(|| Error::MissingExistingBase {
                    package: validated.package_name.clone(),
                })?;
            splice::splice_existing_files(&stage_dir, &app, self.services.archives.as_ref())?;
        }

        // The band above 0.8 belongs to the backend; mark the handoff.
        self.services
            .callback
            .on_session_progress_changed(self.session_id, 0.9);

        let request = HandoffRequest {
            package_name: validated.package_name.clone(),
            location: self.location.clone(),
            params: self.params.clone(),
            installer_package: self.installer_package.clone(),
            installer_uid: self.installer_uid,
            user_id: self.user_id,
        };
        let sink = Box::new(BackendResultSink {
            session: Arc::downgrade(self),
        });

        info!(
            "session {} handing off {} to installer backend",
            self.session_id, validated.package_name
        );
        self.services.backend.install_stage(request, sink);
        Ok(())
    }

    /// Resolve (and cache) the directory backing this session's stage.
    fn resolve_stage_dir(&self) -> Result<PathBuf> {
        let mut state = self.state();
        if let Some(dir) = &state.resolved_stage_dir {
            return Ok(dir.clone());
        }
        let dir = stage::resolve_stage_dir(&self.location, self.services.containers.as_ref())?;
        state.resolved_stage_dir = Some(dir.clone());
        Ok(dir)
    }

    /// Release staging storage and deliver the terminal notifications,
    /// exactly once no matter which path gets here first.
    fn destroy_and_finish(&self, status: InstallStatus, message: &str) {
        let (observer, package_name) = {
            let mut state = self.state();
            if state.finished {
                return;
            }
            state.finished = true;
            state.sealed = true;
            state.destroyed = true;
            (
                state.observer.clone(),
                state.derived.as_ref().map(|d| d.package_name.clone()),
            )
        };

        // Storage goes first so no notification ever observes a live stage.
        stage::destroy_stage(&self.location, self.services.containers.as_ref());

        if let Some(observer) = observer {
            observer.on_package_installed(package_name.as_deref(), status, message);
        }
        self.services
            .callback
            .on_session_finished(self.session_id, status.is_success());

        info!(
            "session {} finished: {:?} ({})",
            self.session_id, status, message
        );
    }

    fn publish_progress(&self, publishable: Option<f32>) {
        if let Some(progress) = publishable {
            self.services
                .callback
                .on_session_progress_changed(self.session_id, progress);
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("user_id", &self.user_id)
            .field("installer_package", &self.installer_package)
            .field("location", &self.location)
            .field("sealed", &state.sealed)
            .field("destroyed", &state.destroyed)
            .field("conduits", &state.conduits.len())
            .finish()
    }
}

/// One-shot sink the backend drives; holds only a weak reference so a
/// callback arriving after abandonment finds nothing to resurrect.
struct BackendResultSink {
    session: Weak<Session>,
}

impl InstallResultSink for BackendResultSink {
    fn on_package_installed(
        self: Box<Self>,
        _package_name: Option<String>,
        status: InstallStatus,
        message: String,
    ) {
        if let Some(session) = self.session.upgrade() {
            session.destroy_and_finish(status, &message);
        }
    }
}
