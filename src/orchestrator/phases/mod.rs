//! Orchestrator phases: command construction for each pipeline stage.
//!
//! This module keeps the remote command lines out of the orchestrator so
//! each one can be checked without a session:
//! - **guard**: idempotency markers probed before a full run
//! - **rebuild**: re-imaging command lines (Phase 1)
//! - **setup**: per-role setup invocations and publisher account (Phases 2-3, 5-7)
//! - **document**: repository index page and key bundle (Phase 5)
//! - **populate**: initial content and test changes (Phase 8, `test-update`)
//!
//! Scripts are addressed relative to the login home, so every command runs
//! from the home directory.

pub mod document;
pub mod guard;
pub mod populate;
pub mod rebuild;
pub mod setup;

pub use guard::configured_roles;

/// Script that publishes initial content into one repository.
pub const POPULATE_SCRIPT: &str = "populate-repo.sh";

/// Script that writes a timestamp into a repository file and publishes it.
pub const PUBLISH_SCRIPT: &str = "publish-change.sh";

/// Name of the monitor utility on the edge host.
pub const MONITOR_UTILITY: &str = "tierup";
