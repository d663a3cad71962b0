//! Decoupled logging pipeline for provisioning runs.
//!
//! # Architecture
//!
//! ```text
//! log::info!/debug!/... and log_parsed!
//!     |
//! [LogCollector] (log::Log impl, non-blocking)
//!     |                         \
//!     | (crossbeam channel)      \ (synchronous, filtered by verbosity)
//!     v                           v
//! [DiskPersister thread]       stderr
//! <log_dir>/tierup-<ts>.log
//! ```
//!
//! Every record reaches the run's log file at debug level regardless of what
//! the terminal shows. If the log directory cannot be created the collector
//! still echoes to stderr and drops file output.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Internal log line or flush marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker with channel sender to signal completion
    Flush(std::sync::mpsc::Sender<()>),
}

/// How much reaches the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Warnings and errors only
    Quiet,
    #[default]
    Normal,
    /// Everything, including remote command lines
    Verbose,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }

    fn terminal_level(&self) -> Level {
        match self {
            Verbosity::Quiet => Level::Warn,
            Verbosity::Normal => Level::Info,
            Verbosity::Verbose => Level::Debug,
        }
    }
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub message: String,
    pub level: Level,
    /// Milestone line (target "parsed")
    pub parsed: bool,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: Level, message: String) -> Self {
        LogLine {
            message,
            level,
            parsed: false,
            timestamp: Local::now().format("%H:%M:%S%.3f").to_string(),
        }
    }

    pub fn parsed(level: Level, message: String) -> Self {
        LogLine {
            parsed: true,
            ..LogLine::new(level, message)
        }
    }

    fn file_format(&self) -> String {
        let marker = if self.parsed { "*" } else { " " };
        format!("[{}] {}{:<5} {}\n", self.timestamp, marker, self.level, self.message)
    }
}

/// Name of the log file for a run started now.
pub fn session_log_name() -> String {
    format!("tierup-{}.log", Local::now().format("%Y%m%d-%H%M%S"))
}

/// Unified logger: disk persistence plus terminal echo
#[derive(Clone)]
pub struct LogCollector {
    /// Channel to the disk persister; crossbeam unbounded, never blocks
    tx: Sender<LogMessage>,
    /// `None` when the log directory was unusable
    log_path: Option<PathBuf>,
    verbosity: Verbosity,
}

impl LogCollector {
    /// Create a collector writing to a fresh file in `log_dir`.
    pub fn new(log_dir: &Path, verbosity: Verbosity) -> Self {
        let log_path = match std::fs::create_dir_all(log_dir) {
            Ok(()) => Some(log_dir.join(session_log_name())),
            Err(e) => {
                eprintln!(
                    "[Log] cannot create {}: {} (logging to terminal only)",
                    log_dir.display(),
                    e
                );
                None
            }
        };

        let (tx, rx) = unbounded::<LogMessage>();
        let thread_path = log_path.clone();

        // OS thread, independent of the tokio runtime.
        std::thread::spawn(move || {
            let mut file: Option<File> = thread_path.as_ref().and_then(|path| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| eprintln!("[Log] cannot open {}: {}", path.display(), e))
                    .ok()
            });

            while let Ok(msg) = rx.recv() {
                match msg {
                    LogMessage::Line(line) => {
                        if let Some(f) = file.as_mut() {
                            let _ = f.write_all(line.file_format().as_bytes());
                        }
                    }
                    LogMessage::Flush(done) => {
                        if let Some(f) = file.as_mut() {
                            let _ = f.flush();
                        }
                        let _ = done.send(());
                    }
                }
            }
        });

        LogCollector {
            tx,
            log_path,
            verbosity,
        }
    }

    /// Path of this run's log file, if file logging is active.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Send a log line (non-blocking)
    pub fn log_line(&self, line: LogLine) {
        if line.level <= self.verbosity.terminal_level() {
            eprintln!("{}", line.message);
        }
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Write a line to the log file without echoing it.
    pub fn log_to_file(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Wait until every line sent so far is on disk.
    pub async fn wait_for_empty(&self) -> Result<(), String> {
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        rx.recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))?;
        Ok(())
    }

    /// Install a clone of this collector as the global `log` backend.
    pub fn install(&self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self.clone()))?;
        log::set_max_level(LevelFilter::Debug);
        Ok(())
    }
}

/// Wires log::info!(), log::warn!(), ... and log_parsed! into the collector.
impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        let line = if record.target() == "parsed" {
            LogLine::parsed(record.level(), message)
        } else {
            LogLine::new(record.level(), message)
        };
        self.log_line(line);
    }

    fn flush(&self) {}
}
