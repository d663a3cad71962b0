//! tierup: four-tier content distribution bring-up
//!
//! Provisions an authority, a replica, a caching proxy and an edge client
//! over ssh, in a fixed fail-fast phase order, and measures how long a change
//! published at the authority takes to become visible at the edge.
//!
//! The crate is organized into functional modules:
//! - **error**: Unified error type hierarchy and exit codes
//! - **models**: Hosts, roles, execution results, credential artifacts
//! - **system**: Duration formatting, shell quoting, logging macros, paths
//! - **config**: TOML configuration loading, defaults and validation
//! - **remote**: The `RemoteSession` seam, ssh and in-memory sessions, executor
//! - **monitor**: Polling convergence monitor
//! - **orchestrator**: Idempotency guard, phases, key distribution
//! - **cli**: clap command line and dispatch

// Core foundational modules
pub mod error;
pub mod models;

// Duration formatting, quoting, logging macros
pub mod system;

// Configuration management
pub mod config;

// Decoupled logging
pub mod log_collector;

// Remote execution
pub mod remote;

// Convergence monitoring
pub mod monitor;

// Provisioning pipeline
pub mod orchestrator;

// Command line
pub mod cli;

// Re-export the log crate for macro usage
pub use log;

pub use log_collector::{LogCollector, LogLine, Verbosity};

// ============================================================================
// PUBLIC RE-EXPORTS FOR CONVENIENCE
// ============================================================================

pub use error::{
    AppError, ConfigError, MonitorError, OrchestratorError, RemoteError, Result,
};

pub use models::{CredentialArtifact, ExecMode, ExecutionResult, Host, Role};

pub use config::DeploymentConfig;

pub use remote::{MockSession, RemoteExecutor, RemoteSession, SessionOutput, SshSession};

pub use monitor::{ConvergenceMonitor, IntervalTicker, WatchOutcome, WatchState};

pub use orchestrator::{Phase, PhaseOrchestrator, PhaseRecord, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert_eq!(VERSION, "0.1.0");
    }

    #[test]
    fn test_reexports() {
        let _: Result<i32> = Ok(42);
        assert_eq!(Role::ALL.len(), 4);
        assert_eq!(Phase::ALL.len(), 8);
    }
}
