// src/registry.rs

//! Session registry
//!
//! Owns every live [`Session`], allocates session ids, provisions internal
//! staging directories, and restores previously persisted sessions after a
//! restart. All service collaborators (installer backend, archive parser,
//! quota, container resolver, event callback) are bundled here once and
//! shared by every session the registry creates.

use crate::archive::ArchiveSource;
use crate::backend::{InstallerBackend, StorageQuota};
use crate::error::{Error, Result};
use crate::filesystem::{ContainerResolver, StageLocation};
use crate::session::{Session, SessionInfo, SessionParams};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Observer for session lifecycle events.
///
/// Every method has a no-op default so implementations subscribe only to
/// what they care about. Callbacks are invoked outside the session lock.
pub trait SessionCallback: Send + Sync {
    fn on_session_created(&self, _session_id: u32) {}
    fn on_session_opened(&self, _session_id: u32) {}
    fn on_session_closed(&self, _session_id: u32) {}
    fn on_session_sealed(&self, _session_id: u32) {}
    fn on_session_progress_changed(&self, _session_id: u32, _progress: f32) {}
    fn on_session_finished(&self, _session_id: u32, _success: bool) {}
}

/// Callback that ignores every event
pub struct NoopCallback;

impl SessionCallback for NoopCallback {}

/// Shared collaborators handed to every session
#[derive(Clone)]
pub struct SessionServices {
    pub backend: Arc<dyn InstallerBackend>,
    pub archives: Arc<dyn ArchiveSource>,
    pub quota: Arc<dyn StorageQuota>,
    pub containers: Arc<dyn ContainerResolver>,
    pub callback: Arc<dyn SessionCallback>,
}

/// Registry of live installation sessions
pub struct SessionRegistry {
    stage_root: PathBuf,
    services: SessionServices,
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    sessions: HashMap<u32, Arc<Session>>,
    next_id: u32,
}

impl SessionRegistry {
    /// Create a registry whose internal stages live under `stage_root`.
    pub fn new(stage_root: impl Into<PathBuf>, services: SessionServices) -> Result<Self> {
        let stage_root = stage_root.into();
        fs::create_dir_all(&stage_root)?;
        Ok(Self {
            stage_root,
            services,
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                next_id: 1,
            }),
        })
    }

    /// Create a fresh session with a newly provisioned internal stage
    /// directory.
    pub fn create_session(
        &self,
        user_id: u32,
        installer_package: &str,
        params: SessionParams,
    ) -> Result<Arc<Session>> {
        let session_id = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            id
        };

        let stage_dir = self.stage_root.join(format!("stage-{session_id}"));
        fs::create_dir_all(&stage_dir)?;

        let session = match Session::new(
            session_id,
            user_id,
            installer_package,
            params,
            StageLocation::Internal(stage_dir.clone()),
            false,
            self.services.clone(),
        ) {
            Ok(session) => session,
            Err(e) => {
                // The freshly provisioned directory must not outlive a
                // session that was never registered
                let _ = fs::remove_dir(&stage_dir);
                return Err(e);
            }
        };

        self.inner
            .lock()
            .unwrap()
            .sessions
            .insert(session_id, session.clone());
        self.services.callback.on_session_created(session_id);

        info!(
            "created session {} for {} (user {})",
            session_id, installer_package, user_id
        );
        Ok(session)
    }

    /// Re-register a session persisted before a restart.
    ///
    /// Only sealed sessions are worth restoring; an unsealed stage has no
    /// committed intent behind it and its writers are gone. The restored
    /// session resumes at the validation step on its next commit attempt.
    pub fn restore_session(
        &self,
        session_id: u32,
        user_id: u32,
        installer_package: &str,
        params: SessionParams,
        location: StageLocation,
    ) -> Result<Arc<Session>> {
        let session = Session::new(
            session_id,
            user_id,
            installer_package,
            params,
            location,
            true,
            self.services.clone(),
        )?;

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.sessions.contains_key(&session_id) {
                return Err(Error::IllegalState(format!(
                    "session {session_id} already registered"
                )));
            }
            inner.sessions.insert(session_id, session.clone());
            // Keep allocation clear of every restored id
            if session_id >= inner.next_id {
                inner.next_id = session_id + 1;
            }
        }

        debug!("restored sealed session {}", session_id);
        Ok(session)
    }

    /// Look up a live session by id.
    pub fn session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.inner.lock().unwrap().sessions.get(&session_id).cloned()
    }

    /// Abandon and deregister a session. Missing ids are a no-op so the
    /// call is safe to repeat.
    pub fn abandon_session(&self, session_id: u32) {
        let session = self.inner.lock().unwrap().sessions.remove(&session_id);
        if let Some(session) = session {
            session.abandon();
        }
    }

    /// Drop a finished session from the registry without touching it.
    pub fn remove_session(&self, session_id: u32) -> Option<Arc<Session>> {
        self.inner.lock().unwrap().sessions.remove(&session_id)
    }

    /// Snapshot every live session.
    pub fn snapshots(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self
            .inner
            .lock()
            .unwrap()
            .sessions
            .values()
            .cloned()
            .collect();
        let mut infos: Vec<SessionInfo> = sessions.iter().map(|s| s.generate_info()).collect();
        infos.sort_by_key(|info| info.session_id);
        infos
    }
}
