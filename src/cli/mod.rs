//! CLI module for tierup
//!
//! Provides the command-line interface:
//! - full runs: reset-all, setup-all
//! - checks: test-update, watch
//! - inspection: list-repos, show-config, ssh-<role>
//! - single phases: rebuild-vm, copy-scripts, copy-pubkeys, run-scripts,
//!   document-repos, populate-repos

mod args;
mod commands;

pub use args::{Cli, Command};
pub use commands::run;
