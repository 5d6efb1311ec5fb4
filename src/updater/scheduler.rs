//! Periodic probe-then-check driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::state::settings::UpdateSettings;

use super::controller::{UpdateController, WeakController};
use super::probe::ReachabilityProbe;

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub period: Duration,
    pub probe_host: String,
    pub probe_timeout: Duration,
}

impl From<&UpdateSettings> for ScheduleConfig {
    fn from(settings: &UpdateSettings) -> Self {
        Self {
            period: settings.check_interval(),
            probe_host: settings.probe_host.clone(),
            probe_timeout: settings.probe_timeout(),
        }
    }
}

/// Probe reachability and, only if reachable, ask the controller to check.
///
/// Returns whether a check was requested. An unreachable host leaves the
/// controller untouched.
pub async fn probe_and_check(
    controller: &UpdateController,
    probe: &dyn ReachabilityProbe,
    host: &str,
    timeout: Duration,
) -> bool {
    if !probe.is_reachable(host, timeout).await {
        log::warn!("Offline, skipping update check");
        return false;
    }
    log::info!("Online, checking for updates...");
    controller.check_for_updates();
    true
}

/// Background timer: one probe-and-check immediately, then one per period.
///
/// Stops when dropped, when the controller shuts down, or when the controller
/// itself is gone. Ticks during an install are ignored by the controller.
pub struct Scheduler {
    task: JoinHandle<()>,
}

impl Scheduler {
    pub fn start(
        runtime: &Handle,
        controller: &UpdateController,
        probe: Arc<dyn ReachabilityProbe>,
        config: ScheduleConfig,
    ) -> Self {
        let weak = controller.downgrade();
        let shutdown = controller.shutdown_signal();
        log::info!("Scheduling update checks every {:?}", config.period);
        let task = runtime.spawn(run(weak, shutdown, probe, config));
        Self { task }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(
    weak: WeakController,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
    probe: Arc<dyn ReachabilityProbe>,
    config: ScheduleConfig,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + config.period, config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(controller) = weak.upgrade() else {
            break;
        };
        probe_and_check(&controller, probe.as_ref(), &config.probe_host, config.probe_timeout)
            .await;
        drop(controller);

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    log::debug!("Update scheduler stopped");
}
