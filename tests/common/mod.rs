// tests/common/mod.rs

//! Shared test collaborators for session integration tests.
//!
//! Archives use a line-oriented text format (`package=`, `version=`,
//! `split=`, `sig=`) so tests can stage packages with plain writes. The
//! backend, observer, and callback fakes record every interaction so tests
//! can assert on exact notification counts.

#![allow(dead_code)]

use stagekit::archive::{ArchiveLite, ArchiveSource, SignatureSet};
use stagekit::backend::{
    CommitObserver, HandoffRequest, InstallResultSink, InstallStatus, InstalledApp,
    PermissionPrompt, StorageQuota,
};
use stagekit::filesystem::NoContainers;
use stagekit::{
    Error, NoopCallback, Result, SessionCallback, SessionRegistry, SessionServices,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Parser for the text archive format used throughout the tests.
pub struct TextArchives;

impl ArchiveSource for TextArchives {
    fn parse_lite(&self, path: &Path) -> Result<ArchiveLite> {
        let raw = std::fs::read_to_string(path)?;
        let mut package_name = None;
        let mut version_code = None;
        let mut split_name = None;
        let mut signatures = Vec::new();
        for line in raw.lines() {
            match line.split_once('=') {
                Some(("package", v)) => package_name = Some(v.to_string()),
                Some(("version", v)) => {
                    version_code = Some(
                        v.parse()
                            .map_err(|_| Error::Internal(format!("bad version: {v}")))?,
                    )
                }
                Some(("split", v)) => split_name = Some(v.to_string()),
                Some(("sig", v)) => signatures.push(v.to_string()),
                _ => {}
            }
        }
        Ok(ArchiveLite {
            package_name: package_name
                .ok_or_else(|| Error::Internal("missing package".to_string()))?,
            version_code: version_code
                .ok_or_else(|| Error::Internal("missing version".to_string()))?,
            split_name,
            signatures: SignatureSet::new(signatures),
        })
    }
}

/// Serialize an archive in the text format.
pub fn archive_text(package: &str, version: u32, split: Option<&str>) -> String {
    let mut raw = format!("package={package}\nversion={version}\nsig=cafe\n");
    if let Some(split) = split {
        raw.push_str(&format!("split={split}\n"));
    }
    raw
}

/// What the scripted backend should do with a handoff.
#[derive(Clone)]
pub enum HandoffScript {
    /// Immediately drive the sink to `Success`
    Succeed,
    /// Immediately drive the sink to the given failure
    Fail(InstallStatus, String),
    /// Park the sink; the test releases it later via `complete_handoff`
    Hold,
}

/// Scripted installer backend recording every handoff.
pub struct FakeBackend {
    script: Mutex<HandoffScript>,
    handoffs: Mutex<Vec<HandoffRequest>>,
    held_sinks: Mutex<Vec<Box<dyn InstallResultSink>>>,
    installed: Mutex<Vec<InstalledApp>>,
    pub grants_install_permission: bool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(HandoffScript::Succeed),
            handoffs: Mutex::new(Vec::new()),
            held_sinks: Mutex::new(Vec::new()),
            installed: Mutex::new(Vec::new()),
            grants_install_permission: true,
        })
    }

    /// Backend whose installer does not hold blanket install permission, so
    /// every commit pauses for user consent.
    pub fn new_requiring_permission() -> Arc<Self> {
        Arc::new(Self {
            grants_install_permission: false,
            ..Self::unwrapped()
        })
    }

    fn unwrapped() -> Self {
        Self {
            script: Mutex::new(HandoffScript::Succeed),
            handoffs: Mutex::new(Vec::new()),
            held_sinks: Mutex::new(Vec::new()),
            installed: Mutex::new(Vec::new()),
            grants_install_permission: true,
        }
    }

    pub fn set_script(&self, script: HandoffScript) {
        *self.script.lock().unwrap() = script;
    }

    pub fn add_installed_app(&self, app: InstalledApp) {
        self.installed.lock().unwrap().push(app);
    }

    pub fn handoff_count(&self) -> usize {
        self.handoffs.lock().unwrap().len()
    }

    pub fn last_handoff(&self) -> Option<HandoffRequest> {
        self.handoffs.lock().unwrap().last().cloned()
    }

    /// Release every held sink with the given result.
    pub fn complete_handoffs(&self, status: InstallStatus, message: &str) {
        let sinks: Vec<_> = self.held_sinks.lock().unwrap().drain(..).collect();
        for sink in sinks {
            sink.on_package_installed(None, status, message.to_string());
        }
    }
}

impl stagekit::backend::InstallerBackend for FakeBackend {
    fn installed_app(&self, package_name: &str, _user_id: u32) -> Option<InstalledApp> {
        self.installed
            .lock()
            .unwrap()
            .iter()
            .find(|app| app.package_name == package_name)
            .cloned()
    }

    fn package_uid(&self, _package_name: &str, user_id: u32) -> Option<u32> {
        Some(user_id * 100_000 + 10_123)
    }

    fn holds_install_permission(&self, _package_name: &str, _uid: u32) -> bool {
        self.grants_install_permission
    }

    fn install_stage(&self, request: HandoffRequest, sink: Box<dyn InstallResultSink>) {
        let package_name = request.package_name.clone();
        self.handoffs.lock().unwrap().push(request);
        let script = self.script.lock().unwrap().clone();
        match script {
            HandoffScript::Succeed => sink.on_package_installed(
                Some(package_name),
                InstallStatus::Success,
                "installed".to_string(),
            ),
            HandoffScript::Fail(status, message) => {
                sink.on_package_installed(Some(package_name), status, message)
            }
            HandoffScript::Hold => self.held_sinks.lock().unwrap().push(sink),
        }
    }
}

/// Everything a recording observer saw.
#[derive(Debug, Default)]
pub struct ObservedEvents {
    pub prompts: Vec<PermissionPrompt>,
    pub terminals: Vec<(Option<String>, InstallStatus, String)>,
}

/// Commit observer recording every notification.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<ObservedEvents>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn prompt_count(&self) -> usize {
        self.events.lock().unwrap().prompts.len()
    }

    pub fn terminal_count(&self) -> usize {
        self.events.lock().unwrap().terminals.len()
    }

    pub fn last_terminal(&self) -> Option<(Option<String>, InstallStatus, String)> {
        self.events.lock().unwrap().terminals.last().cloned()
    }
}

impl CommitObserver for RecordingObserver {
    fn on_user_action_required(&self, prompt: PermissionPrompt) {
        self.events.lock().unwrap().prompts.push(prompt);
    }

    fn on_package_installed(
        &self,
        package_name: Option<&str>,
        status: InstallStatus,
        message: &str,
    ) {
        self.events.lock().unwrap().terminals.push((
            package_name.map(str::to_string),
            status,
            message.to_string(),
        ));
    }
}

/// Registry callback recording lifecycle transitions.
#[derive(Default)]
pub struct RecordingCallback {
    pub finished: Mutex<Vec<(u32, bool)>>,
    pub sealed: Mutex<Vec<u32>>,
    pub progress: Mutex<Vec<(u32, f32)>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn finished_events(&self) -> Vec<(u32, bool)> {
        self.finished.lock().unwrap().clone()
    }

    pub fn progress_events(&self) -> Vec<(u32, f32)> {
        self.progress.lock().unwrap().clone()
    }
}

impl SessionCallback for RecordingCallback {
    fn on_session_sealed(&self, session_id: u32) {
        self.sealed.lock().unwrap().push(session_id);
    }

    fn on_session_progress_changed(&self, session_id: u32, progress: f32) {
        self.progress.lock().unwrap().push((session_id, progress));
    }

    fn on_session_finished(&self, session_id: u32, success: bool) {
        self.finished.lock().unwrap().push((session_id, success));
    }
}

/// Quota collaborator that rejects every reservation.
pub struct DeniedQuota;

impl StorageQuota for DeniedQuota {
    fn reserve(&self, additional_bytes: u64) -> Result<()> {
        Err(Error::Internal(format!(
            "quota exhausted, cannot reserve {additional_bytes} bytes"
        )))
    }
}

/// Quota collaborator that always grants.
pub struct GrantedQuota;

impl StorageQuota for GrantedQuota {
    fn reserve(&self, _additional_bytes: u64) -> Result<()> {
        Ok(())
    }
}

/// A registry wired with recording fakes and a temp stage root.
///
/// Keep the `TempDir` alive for the duration of the test.
pub struct TestHarness {
    pub temp: TempDir,
    pub registry: SessionRegistry,
    pub backend: Arc<FakeBackend>,
    pub callback: Arc<RecordingCallback>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_backend(FakeBackend::new())
    }

    pub fn with_backend(backend: Arc<FakeBackend>) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let callback = RecordingCallback::new();
        let services = SessionServices {
            backend: backend.clone(),
            archives: Arc::new(TextArchives),
            quota: Arc::new(GrantedQuota),
            containers: Arc::new(NoContainers),
            callback: callback.clone(),
        };
        let registry = SessionRegistry::new(temp.path().join("stages"), services).unwrap();
        Self {
            temp,
            registry,
            backend,
            callback,
        }
    }

    /// A harness whose callback drops every event.
    pub fn silent() -> (TempDir, SessionRegistry, Arc<FakeBackend>) {
        let temp = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new();
        let services = SessionServices {
            backend: backend.clone(),
            archives: Arc::new(TextArchives),
            quota: Arc::new(GrantedQuota),
            containers: Arc::new(NoContainers),
            callback: Arc::new(NoopCallback),
        };
        let registry = SessionRegistry::new(temp.path().join("stages"), services).unwrap();
        (temp, registry, backend)
    }

    /// Directory where an installed app's archives can be planted.
    pub fn installed_dir(&self, package: &str) -> PathBuf {
        let dir = self.temp.path().join("installed").join(package);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

/// Stage an archive into `session` through a write conduit.
pub fn stage_archive(
    session: &stagekit::Session,
    name: &str,
    package: &str,
    version: u32,
    split: Option<&str>,
) {
    let mut writer = session.open_write(name, 0, None).unwrap();
    writer
        .write_all(archive_text(package, version, split).as_bytes())
        .unwrap();
    writer.close().unwrap();
}

/// Poll until `predicate` holds or two seconds elapse.
pub async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}
