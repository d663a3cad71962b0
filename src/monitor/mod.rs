//! Convergence monitor.
//!
//! Detects one state transition of a watched resource purely by polling:
//! creation of an absent resource, or modification/deletion of a present one.
//! Progress is rendered as a single rewritten line.
//!
//! **Architecture**:
//! - `source`: fingerprint sources (`LocalFile`, `RemoteFile`)
//! - `ticker`: poll pacing (`IntervalTicker`)
//! - `MonitorTarget`: the watched resource and its `WatchState`

pub mod source;
pub mod ticker;

pub use source::{Fingerprint, FingerprintSource, LocalFile, RemoteFile};
pub use ticker::{IntervalTicker, Ticker};

use chrono::{DateTime, Local};
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::MonitorError;
use crate::system::format_duration;

/// Watch lifecycle. The first two states are initial, the rest terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    AwaitingCreation,
    AwaitingChange,
    Created,
    Modified,
    Deleted,
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WatchState::Created | WatchState::Modified | WatchState::Deleted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchState::AwaitingCreation => "waiting for creation",
            WatchState::AwaitingChange => "waiting for change",
            WatchState::Created => "created",
            WatchState::Modified => "modified",
            WatchState::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for WatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A watched resource. Transitions at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    pub path: String,
    pub exists: bool,
    /// Baseline fingerprint taken at initialization.
    pub fingerprint: Option<Fingerprint>,
    pub state: WatchState,
}

impl MonitorTarget {
    /// Start watching from an initial observation.
    pub fn new(path: impl Into<String>, initial: Option<Fingerprint>) -> Self {
        let state = if initial.is_some() {
            WatchState::AwaitingChange
        } else {
            WatchState::AwaitingCreation
        };
        MonitorTarget {
            path: path.into(),
            exists: initial.is_some(),
            fingerprint: initial,
            state,
        }
    }

    /// Apply one observation. Returns true when it caused the transition.
    /// Observations after the terminal state are ignored.
    pub fn observe(&mut self, observed: Option<Fingerprint>) -> bool {
        let next = match (self.state, &observed) {
            (WatchState::AwaitingCreation, Some(_)) => WatchState::Created,
            (WatchState::AwaitingChange, None) => WatchState::Deleted,
            (WatchState::AwaitingChange, Some(fp)) if Some(fp) != self.fingerprint.as_ref() => {
                WatchState::Modified
            }
            _ => return false,
        };
        self.exists = observed.is_some();
        self.state = next;
        true
    }
}

/// Result of a completed watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub state: WatchState,
    pub elapsed: Duration,
    pub completed_at: DateTime<Local>,
}

/// Timestamp format of the completion line.
pub const COMPLETED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Polls a [`FingerprintSource`] on a [`Ticker`] and renders progress to `out`.
pub struct ConvergenceMonitor<T, W> {
    ticker: T,
    out: W,
}

impl<T: Ticker, W: Write> ConvergenceMonitor<T, W> {
    pub fn new(ticker: T, out: W) -> Self {
        ConvergenceMonitor { ticker, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Take the initial observation now, then watch.
    pub async fn watch<F: FingerprintSource>(
        &mut self,
        source: &F,
    ) -> Result<WatchOutcome, MonitorError> {
        let started = Instant::now();
        let initial = source.query().await?;
        self.watch_from(source, initial, started).await
    }

    /// Watch starting from an observation captured earlier, measuring elapsed
    /// time from `started`. Lets callers fingerprint before they trigger the
    /// change they want to observe.
    pub async fn watch_from<F: FingerprintSource>(
        &mut self,
        source: &F,
        initial: Option<Fingerprint>,
        started: Instant,
    ) -> Result<WatchOutcome, MonitorError> {
        let mut target = MonitorTarget::new(source.describe(), initial);
        log::info!(
            "[Monitor] watching {} ({})",
            target.path,
            target.state
        );

        while !target.state.is_terminal() {
            self.ticker.tick().await;
            let observed = source.query().await?;
            target.observe(observed);
            write!(
                self.out,
                "\r{} {}: {}",
                target.path,
                target.state,
                format_duration(started.elapsed())
            )?;
            self.out.flush()?;
        }

        let elapsed = started.elapsed();
        let completed_at = Local::now();
        writeln!(self.out)?;
        writeln!(
            self.out,
            "{} {} at {} after {}",
            target.path,
            target.state,
            completed_at.format(COMPLETED_AT_FORMAT),
            format_duration(elapsed)
        )?;
        self.out.flush()?;
        log::info!(
            "[Monitor] {} {} after {}",
            target.path,
            target.state,
            format_duration(elapsed)
        );

        Ok(WatchOutcome {
            state: target.state,
            elapsed,
            completed_at,
        })
    }
}
