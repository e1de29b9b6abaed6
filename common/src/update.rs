//! Over-the-air update channel.
//!
//! The transport lives in the board crate. The station only services the
//! channel once per iteration and logs the lifecycle callbacks it reports.

use log::{error, info};

/// What an incoming update replaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    Sketch,
    Filesystem,
}

impl UpdateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateKind::Sketch => "sketch",
            UpdateKind::Filesystem => "filesystem",
        }
    }
}

/// Failure of a single update attempt. The station keeps running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("Auth Failed")]
    Auth,
    #[error("Begin Failed")]
    Begin,
    #[error("Connect Failed")]
    Connect,
    #[error("Receive Failed")]
    Receive,
    #[error("End Failed")]
    End,
}

impl UpdateError {
    pub fn code(self) -> u32 {
        match self {
            UpdateError::Auth => 0,
            UpdateError::Begin => 1,
            UpdateError::Connect => 2,
            UpdateError::Receive => 3,
            UpdateError::End => 4,
        }
    }
}

/// Lifecycle callbacks of an update attempt.
pub trait UpdateObserver {
    fn on_start(&mut self, kind: UpdateKind);
    fn on_progress(&mut self, done: u32, total: u32);
    fn on_end(&mut self);
    fn on_error(&mut self, error: UpdateError);
}

pub trait UpdateChannel {
    /// Announces the device under `hostname` and starts listening.
    fn begin(&mut self, hostname: &str);

    /// Services pending update traffic. Must be called on every loop iteration;
    /// may block for the duration of an update.
    fn handle(&mut self, observer: &mut dyn UpdateObserver);
}

/// Channel for targets without an update transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoUpdates;

impl UpdateChannel for NoUpdates {
    fn begin(&mut self, hostname: &str) {
        info!("Updates disabled for {}", hostname);
    }

    fn handle(&mut self, _observer: &mut dyn UpdateObserver) {}
}

/// Logs update progress to the console.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateLog;

impl UpdateObserver for UpdateLog {
    fn on_start(&mut self, kind: UpdateKind) {
        info!("Start updating {}", kind.as_str());
    }

    fn on_progress(&mut self, done: u32, total: u32) {
        info!("Progress: {}%", progress_percent(done, total));
    }

    fn on_end(&mut self) {
        info!("End");
    }

    fn on_error(&mut self, error: UpdateError) {
        error!("Error[{}]: {}", error.code(), error);
    }
}

/// Whole percent of `total` covered by `done`, capped at 100.
pub fn progress_percent(done: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let percent = u64::from(done) * 100 / u64::from(total);
    percent.min(100) as u32
}
