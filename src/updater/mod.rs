//! Self-update lifecycle.
//!
//! This module provides:
//! - `UpdateController`: the phase state machine and its public triggers
//! - `classify`: failure taxonomy and retry disposition
//! - `probe` / `scheduler`: periodic best-effort checks
//! - `source` / `feed`: the update backend and its release-feed implementation
//! - `gateway`: consent and status collaborators of the presentation layer

pub mod classify;
pub mod controller;
pub mod feed;
pub mod gateway;
pub mod probe;
pub mod scheduler;
pub mod source;
pub mod types;

pub use classify::{ClassifiedError, ErrorKind, classify};
pub use controller::{ControllerOptions, ListenerId, UpdateController, WeakController, is_newer};
pub use feed::FeedSource;
pub use gateway::{ConsentGateway, StatusSink};
pub use probe::{DnsProbe, ReachabilityProbe};
pub use scheduler::{ScheduleConfig, Scheduler, probe_and_check};
pub use source::{ProgressCallback, UpdateSource};
pub use types::{
    ConsentKind, ConsentRequest, ConsentResponse, ControllerState, DownloadProgress, Phase,
    UpdateInfo,
};
