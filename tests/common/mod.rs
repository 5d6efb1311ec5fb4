//! Scripted collaborators for controller and scheduler integration tests.
//!
//! `FakeSource` answers each `fetch_metadata` / `fetch_package` call from a queue
//! of scripted outcomes, so a test decides exactly when and how each operation
//! completes. Status events and consent requests land on channels the test reads.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt as _;
use futures::channel::mpsc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use vidshelf::error::{Error, Result};
use vidshelf::state::StatusEvent;
use vidshelf::updater::{
    ConsentRequest, ControllerOptions, DownloadProgress, Phase, ProgressCallback,
    ReachabilityProbe, UpdateController, UpdateInfo, UpdateSource,
};

pub const WAIT: Duration = Duration::from_secs(2);

/// One scripted event of a package download.
pub enum Step {
    Progress(u64, u64),
    /// Park until the sender fires (or is dropped).
    Hold(oneshot::Receiver<()>),
    /// Keep the progress callback so the test can call it after the download ends.
    Stash,
    Fail(Error),
}

#[derive(Default)]
pub struct FakeSource {
    metadata: Mutex<VecDeque<oneshot::Receiver<Result<UpdateInfo>>>>,
    downloads: Mutex<VecDeque<Vec<Step>>>,
    apply_error: Mutex<Option<Error>>,
    stashed_progress: Arc<Mutex<Option<ProgressCallback>>>,
    pub metadata_calls: AtomicUsize,
    pub package_calls: AtomicUsize,
    pub apply_calls: AtomicUsize,
}

impl FakeSource {
    pub fn push_metadata(&self, result: Result<UpdateInfo>) {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        self.metadata.lock().push_back(rx);
    }

    /// Queue a metadata fetch that stays in flight until the returned sender fires.
    pub fn hold_metadata(&self) -> oneshot::Sender<Result<UpdateInfo>> {
        let (tx, rx) = oneshot::channel();
        self.metadata.lock().push_back(rx);
        tx
    }

    /// Queue the steps of the next download. Running out of steps means success.
    pub fn push_download(&self, steps: Vec<Step>) {
        self.downloads.lock().push_back(steps);
    }

    pub fn fail_apply(&self, error: Error) {
        *self.apply_error.lock() = Some(error);
    }

    pub fn stashed_progress(&self) -> Option<ProgressCallback> {
        self.stashed_progress.lock().clone()
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    pub fn package_calls(&self) -> usize {
        self.package_calls.load(Ordering::SeqCst)
    }

    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

impl UpdateSource for FakeSource {
    fn fetch_metadata(&self) -> BoxFuture<'static, Result<UpdateInfo>> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.metadata.lock().pop_front();
        Box::pin(async move {
            match next {
                Some(rx) => rx.await.unwrap_or_else(|_| Err(Error::Timeout("dropped".into()))),
                None => Err(Error::ManifestNotFound("unscripted".into())),
            }
        })
    }

    fn fetch_package(
        &self,
        _info: &UpdateInfo,
        on_progress: ProgressCallback,
    ) -> BoxFuture<'static, Result<()>> {
        self.package_calls.fetch_add(1, Ordering::SeqCst);
        let steps = self.downloads.lock().pop_front().unwrap_or_default();
        let stash = Arc::clone(&self.stashed_progress);
        Box::pin(async move {
            for step in steps {
                match step {
                    Step::Progress(transferred, total) => {
                        on_progress(DownloadProgress::new(transferred, total));
                        tokio::task::yield_now().await;
                    }
                    Step::Hold(rx) => {
                        let _ = rx.await;
                    }
                    Step::Stash => {
                        *stash.lock() = Some(Arc::clone(&on_progress));
                    }
                    Step::Fail(e) => return Err(e),
                }
            }
            Ok(())
        })
    }

    fn apply(&self) -> BoxFuture<'static, Result<Infallible>> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let error = self.apply_error.lock().take();
        Box::pin(async move {
            match error {
                Some(e) => Err(e),
                // A real installer never comes back
                None => futures::future::pending().await,
            }
        })
    }
}

pub struct FakeProbe {
    pub reachable: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self { reachable: AtomicBool::new(reachable), calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReachabilityProbe for FakeProbe {
    fn is_reachable(&self, _host: &str, _timeout: Duration) -> BoxFuture<'static, bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reachable = self.reachable.load(Ordering::SeqCst);
        Box::pin(async move { reachable })
    }
}

/// A controller wired to a `FakeSource` and channel-backed presentation.
/// Must be created inside a Tokio runtime.
pub struct Harness {
    pub controller: UpdateController,
    pub source: Arc<FakeSource>,
    status: mpsc::UnboundedReceiver<StatusEvent>,
    consent: mpsc::UnboundedReceiver<ConsentRequest>,
}

impl Harness {
    pub fn new(current_version: &str) -> Self {
        let source = Arc::new(FakeSource::default());
        let (status_tx, status) = mpsc::unbounded();
        let (consent_tx, consent) = mpsc::unbounded();
        let options = ControllerOptions {
            current_version: current_version.parse().expect("valid version"),
            allow_prerelease: false,
        };
        let controller = UpdateController::new(
            tokio::runtime::Handle::current(),
            options,
            source.clone(),
            Arc::new(consent_tx),
            Arc::new(status_tx),
        );
        Self { controller, source, status, consent }
    }

    pub async fn next_status(&mut self) -> StatusEvent {
        tokio::time::timeout(WAIT, self.status.next())
            .await
            .expect("timed out waiting for status event")
            .expect("status channel closed")
    }

    pub async fn next_consent(&mut self) -> ConsentRequest {
        tokio::time::timeout(WAIT, self.consent.next())
            .await
            .expect("timed out waiting for consent request")
            .expect("consent channel closed")
    }

    /// Status events until (and including) the first one matching `stop`.
    pub async fn status_until(&mut self, stop: impl Fn(&StatusEvent) -> bool) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        loop {
            let event = self.next_status().await;
            let done = stop(&event);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    /// Whatever status events arrive within a short quiet period.
    pub async fn drain_status(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(50), self.status.next()).await
        {
            events.push(event);
        }
        events
    }

    pub async fn drain_consent(&mut self) -> Vec<ConsentRequest> {
        let mut requests = Vec::new();
        while let Ok(Some(request)) =
            tokio::time::timeout(Duration::from_millis(50), self.consent.next()).await
        {
            requests.push(request);
        }
        requests
    }

    pub async fn wait_for_phase(&self, phase: Phase) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.controller.phase() != phase {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {phase}, still {}",
                self.controller.phase()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Let spawned controller tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

pub fn info(version: &str) -> UpdateInfo {
    UpdateInfo::new(version)
}

pub fn progress_values(events: &[StatusEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|event| match event {
            StatusEvent::Progress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect()
}
