//! Update lifecycle controller.
//!
//! Owns the only mutable update state. Every trigger (user action, scheduler tick,
//! consent answer, progress callback, fetch completion) takes the same lock, checks
//! that it still applies to the current phase and operation, and only then
//! transitions. Long-running work runs as tasks on the supplied Tokio runtime and
//! reports back through the same guarded entry points, tagged with the token of the
//! operation that started it so late results from abandoned work are dropped.
//!
//! Collaborators are invoked while the lock is held, which keeps the status stream
//! ordered; they must not call back into the controller synchronously.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use semver::Version;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::state::events::StatusEvent;

use super::classify::classify;
use super::gateway::{ConsentGateway, StatusSink};
use super::source::{ProgressCallback, UpdateSource};
use super::types::{
    ConsentKind, ConsentRequest, ConsentResponse, ControllerState, DownloadProgress, Phase,
    UpdateInfo,
};

/// Static configuration of a controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub current_version: Version,
    pub allow_prerelease: bool,
}

impl ControllerOptions {
    /// Options for the version this binary was built as.
    pub fn for_running_app(allow_prerelease: bool) -> Result<Self> {
        Ok(Self { current_version: env!("CARGO_PKG_VERSION").parse()?, allow_prerelease })
    }
}

/// Whether `candidate` should be offered over `current`.
///
/// Equal or older versions are never offered. Pre-releases are offered only when
/// allowed, or when the running build is itself a pre-release.
pub fn is_newer(current: &Version, candidate: &str, allow_prerelease: bool) -> Result<bool> {
    let candidate: Version = candidate.strip_prefix('v').unwrap_or(candidate).parse()?;
    if !candidate.pre.is_empty() && !allow_prerelease && current.pre.is_empty() {
        return Ok(false);
    }
    Ok(candidate > *current)
}

/// Handle returned by [`UpdateController::on_before_quit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type BeforeQuitListener = Box<dyn Fn() -> bool + Send + Sync>;

#[derive(Default)]
struct BeforeQuitListeners {
    next_id: u64,
    listeners: Vec<(ListenerId, BeforeQuitListener)>,
    /// Held aside while an install is underway; restored if it fails.
    parked: Vec<(ListenerId, BeforeQuitListener)>,
}

impl BeforeQuitListeners {
    fn park(&mut self) -> usize {
        self.parked = std::mem::take(&mut self.listeners);
        self.parked.len()
    }

    fn restore(&mut self) {
        let added = std::mem::take(&mut self.listeners);
        self.listeners = std::mem::take(&mut self.parked);
        self.listeners.extend(added);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Check,
    Download,
    Install,
}

#[derive(Default)]
struct Inner {
    state: ControllerState,
    pending_consent: Option<ConsentRequest>,
    next_consent_id: u64,
    /// Identifies the operation currently allowed to report back.
    op_token: u64,
    failed_operation: Option<Operation>,
    last_percent: f64,
    last_emitted_percent: Option<u8>,
    in_flight: Option<JoinHandle<()>>,
    shut_down: bool,
}

impl Inner {
    fn next_token(&mut self) -> u64 {
        self.op_token += 1;
        self.op_token
    }

    fn is_current(&self, token: u64, phase: Phase) -> bool {
        !self.shut_down && self.op_token == token && self.state.phase == phase
    }
}

struct Shared {
    runtime: Handle,
    options: ControllerOptions,
    source: Arc<dyn UpdateSource>,
    consent: Arc<dyn ConsentGateway>,
    status: Arc<dyn StatusSink>,
    inner: Mutex<Inner>,
    before_quit: Mutex<BeforeQuitListeners>,
    shutdown_tx: watch::Sender<bool>,
}

/// Cheaply cloneable handle to the update state machine.
#[derive(Clone)]
pub struct UpdateController {
    shared: Arc<Shared>,
}

/// Non-owning handle; used by the scheduler so it never keeps the controller alive.
#[derive(Clone)]
pub struct WeakController {
    shared: Weak<Shared>,
}

impl WeakController {
    pub fn upgrade(&self) -> Option<UpdateController> {
        self.shared.upgrade().map(|shared| UpdateController { shared })
    }
}

impl UpdateController {
    pub fn new(
        runtime: Handle,
        options: ControllerOptions,
        source: Arc<dyn UpdateSource>,
        consent: Arc<dyn ConsentGateway>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        log::info!("Update controller ready (running v{})", options.current_version);
        Self {
            shared: Arc::new(Shared {
                runtime,
                options,
                source,
                consent,
                status,
                inner: Mutex::new(Inner::default()),
                before_quit: Mutex::new(BeforeQuitListeners::default()),
                shutdown_tx,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakController {
        WeakController { shared: Arc::downgrade(&self.shared) }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ControllerState {
        self.shared.inner.lock().state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.shared.inner.lock().state.phase
    }

    pub fn current_version(&self) -> &Version {
        &self.shared.options.current_version
    }

    /// Start a metadata check. No-op while a check, download, or install is underway
    /// or a downloaded update is waiting to be installed.
    pub fn check_for_updates(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return;
        }
        let phase = inner.state.phase;
        match phase {
            Phase::Idle | Phase::Error | Phase::Available => self.shared.start_check(&mut inner),
            phase => log::debug!("Update check ignored while {phase}"),
        }
    }

    /// Download the pending update. No-op unless an update is available and not yet
    /// downloaded.
    pub fn download_update(&self) {
        let mut inner = self.shared.inner.lock();
        self.shared.try_download(&mut inner);
    }

    /// Close down and hand over to the installer. No-op unless a download completed.
    pub fn quit_and_install(&self) {
        let mut inner = self.shared.inner.lock();
        self.shared.try_install(&mut inner);
    }

    /// Deliver the user's answer to a consent prompt. Answers to anything but the
    /// currently outstanding request are discarded.
    pub fn respond(&self, response: ConsentResponse) {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down {
            return;
        }
        if inner.pending_consent.as_ref() != Some(&response.request) {
            log::info!(
                "Discarding stale {:?} consent for v{}",
                response.request.kind,
                response.request.info.version
            );
            return;
        }
        inner.pending_consent = None;

        if !response.accepted {
            log::info!(
                "User declined {:?} of v{}",
                response.request.kind,
                response.request.info.version
            );
            return;
        }

        match response.request.kind {
            ConsentKind::Download => self.shared.try_download(&mut inner),
            ConsentKind::Install => self.shared.try_install(&mut inner),
        }
    }

    /// Re-run the operation that failed, if its error allows a retry.
    /// A download retry starts again from zero.
    pub fn retry(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.shut_down || inner.state.phase != Phase::Error {
            return;
        }
        let retryable = inner.state.last_error.as_ref().is_some_and(|e| e.retryable);
        if !retryable {
            log::info!("Last update error is not retryable");
            return;
        }

        let failed = inner.failed_operation;
        let pending = inner.state.pending_update_info.clone();
        match (failed, pending) {
            (Some(Operation::Download), Some(info)) => {
                self.shared.start_download(&mut inner, info)
            }
            (Some(Operation::Check | Operation::Download), _) => {
                self.shared.start_check(&mut inner)
            }
            _ => {}
        }
    }

    /// The user dismissed the error report.
    pub fn acknowledge_error(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state.phase != Phase::Error {
            return;
        }
        inner.state = ControllerState::default();
        inner.failed_operation = None;
    }

    /// Register a hook consulted by [`confirm_quit`](Self::confirm_quit); returning
    /// `false` vetoes a normal quit. Hooks are detached while installing and come
    /// back if the install fails.
    ///
    /// Listeners run under an internal lock and must not call back into the
    /// controller.
    pub fn on_before_quit(
        &self,
        listener: impl Fn() -> bool + Send + Sync + 'static,
    ) -> ListenerId {
        let mut listeners = self.shared.before_quit.lock();
        listeners.next_id += 1;
        let id = ListenerId(listeners.next_id);
        listeners.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_before_quit(&self, id: ListenerId) -> bool {
        let mut listeners = self.shared.before_quit.lock();
        let before = listeners.listeners.len() + listeners.parked.len();
        listeners.listeners.retain(|(existing, _)| *existing != id);
        listeners.parked.retain(|(existing, _)| *existing != id);
        listeners.listeners.len() + listeners.parked.len() != before
    }

    /// Ask every before-quit hook whether the application may close.
    pub fn confirm_quit(&self) -> bool {
        self.shared.before_quit.lock().listeners.iter().all(|(_, listener)| listener())
    }

    /// Abandon in-flight work and stop reacting to triggers. Ignored once
    /// installation has begun.
    pub fn shutdown(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state.phase == Phase::Installing || inner.shut_down {
            return;
        }
        inner.shut_down = true;
        inner.pending_consent = None;
        if let Some(task) = inner.in_flight.take() {
            log::info!("Abandoning in-flight update work ({})", inner.state.phase);
            task.abort();
        }
        drop(inner);
        self.shared.shutdown_tx.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shared.shutdown_tx.borrow()
    }

    /// Flips to `true` once the controller shuts down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shared.shutdown_tx.subscribe()
    }
}

impl Shared {
    fn start_check(self: &Arc<Self>, inner: &mut Inner) {
        let token = inner.next_token();
        inner.state = ControllerState { phase: Phase::Checking, ..Default::default() };
        inner.pending_consent = None;
        inner.failed_operation = None;

        log::info!("Checking for updates...");
        self.status.emit(StatusEvent::status("Checking for updates..."));

        let shared = Arc::clone(self);
        let source = Arc::clone(&self.source);
        inner.in_flight = Some(self.runtime.spawn(async move {
            let result = source.fetch_metadata().await;
            shared.finish_check(token, result);
        }));
    }

    fn finish_check(self: &Arc<Self>, token: u64, result: Result<UpdateInfo>) {
        let mut inner = self.inner.lock();
        if !inner.is_current(token, Phase::Checking) {
            log::debug!("Discarding stale update check result");
            return;
        }
        inner.in_flight = None;

        let info = match result {
            Ok(info) => info,
            Err(e) => return self.fail(&mut inner, Operation::Check, e),
        };

        let current = &self.options.current_version;
        match is_newer(current, &info.version, self.options.allow_prerelease) {
            Ok(true) => {
                log::info!("Update found: v{current} -> v{}", info.version);
                inner.state.phase = Phase::Available;
                inner.state.pending_update_info = Some(info.clone());
                let message = format!("Version {} is available.", info.version);
                self.status.emit(StatusEvent::status(message));
                self.request_consent(&mut inner, ConsentKind::Download);
            }
            Ok(false) => {
                log::info!("Already running latest version (remote v{})", info.version);
                inner.state = ControllerState::default();
                self.status.emit(StatusEvent::status("You are using the latest version."));
            }
            Err(e) => self.fail(&mut inner, Operation::Check, e),
        }
    }

    fn try_download(self: &Arc<Self>, inner: &mut Inner) {
        if inner.shut_down
            || inner.state.phase != Phase::Available
            || inner.state.download_complete
        {
            log::debug!("Download request ignored while {}", inner.state.phase);
            return;
        }
        if let Some(info) = inner.state.pending_update_info.clone() {
            self.start_download(inner, info);
        }
    }

    fn start_download(self: &Arc<Self>, inner: &mut Inner, info: UpdateInfo) {
        let token = inner.next_token();
        inner.state.phase = Phase::Downloading;
        inner.state.download_complete = false;
        inner.state.last_error = None;
        inner.pending_consent = None;
        inner.failed_operation = None;
        inner.last_percent = 0.0;
        inner.last_emitted_percent = None;

        log::info!("Downloading update v{}", info.version);
        self.status.emit(StatusEvent::status(format!("Downloading version {}...", info.version)));

        let progress_target = Arc::clone(self);
        let on_progress: ProgressCallback =
            Arc::new(move |progress| progress_target.on_progress(token, progress));
        let shared = Arc::clone(self);
        let source = Arc::clone(&self.source);
        inner.in_flight = Some(self.runtime.spawn(async move {
            let result = source.fetch_package(&info, on_progress).await;
            shared.finish_download(token, result);
        }));
    }

    fn on_progress(&self, token: u64, progress: DownloadProgress) {
        let mut inner = self.inner.lock();
        if !inner.is_current(token, Phase::Downloading) || progress.percent < inner.last_percent {
            return;
        }
        inner.last_percent = progress.percent;

        let rounded = progress.percent.round() as u8;
        if inner.last_emitted_percent == Some(rounded) {
            return;
        }
        inner.last_emitted_percent = Some(rounded);
        log::debug!(
            "Update download {}/{} bytes ({rounded}%)",
            progress.transferred_bytes,
            progress.total_bytes
        );
        self.status.emit(StatusEvent::progress(progress.percent));
    }

    fn finish_download(self: &Arc<Self>, token: u64, result: Result<()>) {
        let mut inner = self.inner.lock();
        if !inner.is_current(token, Phase::Downloading) {
            log::debug!("Discarding stale download result");
            return;
        }
        inner.in_flight = None;

        match result {
            Ok(()) => {
                log::info!("Update download complete");
                inner.state.download_complete = true;
                inner.state.phase = Phase::Downloaded;
                self.status.emit(StatusEvent::complete());
                self.request_consent(&mut inner, ConsentKind::Install);
            }
            Err(e) => self.fail(&mut inner, Operation::Download, e),
        }
    }

    fn try_install(self: &Arc<Self>, inner: &mut Inner) {
        if inner.shut_down
            || inner.state.phase != Phase::Downloaded
            || !inner.state.download_complete
        {
            log::debug!("Install request ignored while {}", inner.state.phase);
            return;
        }

        let token = inner.next_token();
        inner.state.phase = Phase::Installing;
        inner.pending_consent = None;

        log::info!("Quitting to install update");
        self.status.emit(StatusEvent::status("Installing update..."));

        // Nothing may hold the application open once the installer takes over.
        let detached = self.before_quit.lock().park();
        if detached > 0 {
            log::debug!("Detached {detached} before-quit listener(s)");
        }

        let shared = Arc::clone(self);
        let source = Arc::clone(&self.source);
        inner.in_flight = Some(self.runtime.spawn(async move {
            match source.apply().await {
                Ok(never) => match never {},
                Err(e) => shared.finish_install(token, e),
            }
        }));
    }

    fn finish_install(self: &Arc<Self>, token: u64, error: Error) {
        let mut inner = self.inner.lock();
        if inner.op_token != token || inner.state.phase != Phase::Installing {
            return;
        }
        inner.in_flight = None;
        // The app keeps running, so its quit guards apply again.
        self.before_quit.lock().restore();
        self.fail(&mut inner, Operation::Install, error);
    }

    fn request_consent(&self, inner: &mut Inner, kind: ConsentKind) {
        let Some(info) = inner.state.pending_update_info.clone() else {
            return;
        };
        inner.next_consent_id += 1;
        let request = ConsentRequest { id: inner.next_consent_id, kind, info };
        inner.pending_consent = Some(request.clone());
        self.consent.request(request);
    }

    fn fail(&self, inner: &mut Inner, operation: Operation, error: Error) {
        let mut classified = classify(&error);
        // The install consent is spent; never loop back into it.
        if operation == Operation::Install {
            classified.retryable = false;
        }
        log::error!("Update {operation:?} failed: {error} ({:?})", classified.kind);

        inner.state.phase = Phase::Error;
        inner.state.download_complete = false;
        inner.pending_consent = None;
        inner.failed_operation = Some(operation);

        self.status.emit(StatusEvent::Error {
            message: classified.message.clone(),
            retryable: classified.retryable,
        });
        inner.state.last_error = Some(classified);
    }
}
