#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::io::Write as _;
use std::sync::Arc;

use anyhow::Context as _;
use futures::StreamExt as _;
use futures::channel::mpsc;

use vidshelf::state::{AppSettings, ConfigManager, StatusEvent, StatusLevel, StatusMessage};
use vidshelf::updater::{
    ConsentRequest, ControllerOptions, DnsProbe, FeedSource, ScheduleConfig, Scheduler,
    UpdateController,
};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let sha = env!("VIDSHELF_GIT_SHA");
    let short_sha = &sha[..7.min(sha.len())];
    log::info!("Vidshelf v{} ({short_sha}) starting...", env!("CARGO_PKG_VERSION"));

    let settings = match ConfigManager::new().and_then(|config| config.load_settings()) {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("Failed to load settings, using defaults: {err:#}");
            AppSettings::default()
        }
    };
    let updates = settings.updates;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let (status_tx, mut status_rx) = mpsc::unbounded::<StatusEvent>();
    let (consent_tx, mut consent_rx) = mpsc::unbounded::<ConsentRequest>();

    let source = FeedSource::new(updates.feed_url.clone(), FeedSource::default_cache_dir())
        .context("Failed to create update client")?;
    let controller = UpdateController::new(
        runtime.handle().clone(),
        ControllerOptions::for_running_app(updates.allow_prerelease)?,
        Arc::new(source),
        Arc::new(consent_tx),
        Arc::new(status_tx),
    );

    let scheduler = if updates.auto_check {
        Some(Scheduler::start(
            runtime.handle(),
            &controller,
            Arc::new(DnsProbe),
            ScheduleConfig::from(&updates),
        ))
    } else {
        log::info!("Automatic update checks are disabled");
        None
    };

    runtime.block_on(async {
        loop {
            tokio::select! {
                Some(event) = status_rx.next() => show_status(&controller, event).await,
                Some(request) = consent_rx.next() => {
                    let accepted = ask(request.kind.prompt(&request.info)).await;
                    controller.respond(if accepted { request.accept() } else { request.decline() });
                }
                _ = tokio::signal::ctrl_c() => {
                    if controller.confirm_quit() {
                        break;
                    }
                }
            }
        }
    });

    log::info!("Shutting down");
    controller.shutdown();
    drop(scheduler);
    Ok(())
}

/// Print a status event and, for errors, offer the retry the error allows.
async fn show_status(controller: &UpdateController, event: StatusEvent) {
    let message = StatusMessage::from_event(&event);
    match (&message.level, message.progress) {
        (StatusLevel::Error, _) => eprintln!("[update] {}", message.text),
        (StatusLevel::Info, Some(pct)) => println!("[update] {} [{pct:>3}%]", message.text),
        (StatusLevel::Info, None) => println!("[update] {}", message.text),
    }

    if let StatusEvent::Error { retryable, .. } = event {
        if retryable && ask("Retry?".to_string()).await {
            controller.retry();
        } else {
            controller.acknowledge_error();
        }
    }
}

/// Yes/no prompt on the terminal; anything but an explicit yes is a no.
async fn ask(question: String) -> bool {
    tokio::task::spawn_blocking(move || {
        print!("{question} [y/N] ");
        let _ = std::io::stdout().flush();
        let mut answer = String::new();
        if std::io::stdin().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    })
    .await
    .unwrap_or(false)
}
