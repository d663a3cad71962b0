//! Unified error type hierarchy for tierup
//!
//! Provides structured error handling with ConfigError, RemoteError,
//! OrchestratorError, MonitorError, and the top-level AppError that maps
//! every failure onto a process exit code.

use std::io;
use thiserror::Error;

use crate::models::Role;

/// Exit code for operational failures (guard refusal, remote command failure).
pub const EXIT_FAILURE: i32 = 1;
/// Exit code for usage and configuration errors.
pub const EXIT_USAGE: i32 = 2;
/// Exit code for internal or unsupported-environment errors.
pub const EXIT_INTERNAL: i32 = 3;

/// Configuration file parsing and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("IO error during config operations: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

/// Remote execution and transfer errors.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The local ssh/scp process could not be started at all.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The remote command ran and exited non-zero.
    #[error("Command failed on {host} (exit {code}): {command}\n{output}")]
    CommandFailed {
        host: String,
        command: String,
        code: String,
        output: String,
    },

    /// The ssh transport itself failed (exit 255 or killed), so the remote
    /// command's answer is unknown.
    #[error("Host {host} is unreachable: {output}")]
    Unreachable { host: String, output: String },

    /// A file copy to or from a host failed.
    #[error("Transfer {from} -> {to} failed: {output}")]
    Transfer {
        from: String,
        to: String,
        output: String,
    },

    /// Interactive session ended with a non-zero status.
    #[error("Interactive session to {host} exited with {code}")]
    Interactive { host: String, code: String },
}

/// Pipeline-level errors raised by the phase orchestrator.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Refusing to run: already configured host(s): {}", list_roles(.0))]
    AlreadyConfigured(Vec<Role>),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Remote state inconsistent with what an earlier step should have produced.
    #[error("Unexpected environment: {0}")]
    Environment(String),

    /// A phase was started out of order or twice within one run.
    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Local I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convergence monitor errors.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Cannot read fingerprint of {path}: {reason}")]
    Fingerprint { path: String, reason: String },

    #[error("Progress display error: {0}")]
    Display(#[from] io::Error),
}

fn list_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Global error type for every tierup command.
///
/// Provides unified error categorization, user-facing messages, and the
/// exit code the binary terminates with.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) => EXIT_USAGE,
            AppError::Orchestrator(OrchestratorError::Environment(_))
            | AppError::Orchestrator(OrchestratorError::InvalidTransition { .. }) => EXIT_INTERNAL,
            AppError::Monitor(MonitorError::Fingerprint { .. }) => EXIT_INTERNAL,
            AppError::Orchestrator(_)
            | AppError::Monitor(_)
            | AppError::Remote(_)
            | AppError::Io(_) => EXIT_FAILURE,
        }
    }

    /// Get a user-facing error message suitable for the terminal
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => format!("Configuration error: {}", e),
            AppError::Orchestrator(OrchestratorError::AlreadyConfigured(roles)) => format!(
                "Deployment already configured on: {}. Use reset-all to re-image the hosts first.",
                list_roles(roles)
            ),
            AppError::Orchestrator(OrchestratorError::Environment(msg)) => {
                format!("Internal error: {}", msg)
            }
            AppError::Orchestrator(e) => format!("Provisioning failed: {}", e),
            AppError::Monitor(e) => format!("Convergence check failed: {}", e),
            AppError::Remote(e) => format!("Remote operation failed: {}", e),
            AppError::Io(e) => format!("File operation failed: {}", e),
        }
    }
}

/// Top-level result type for command handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingParameter("repo_org");
        assert_eq!(err.to_string(), "Missing required parameter: repo_org");
    }

    #[test]
    fn test_already_configured_lists_roles() {
        let err = OrchestratorError::AlreadyConfigured(vec![Role::Cache, Role::Edge]);
        assert_eq!(
            err.to_string(),
            "Refusing to run: already configured host(s): cache, edge"
        );
    }

    #[test]
    fn test_exit_codes() {
        let config: AppError = ConfigError::MissingParameter("repos").into();
        assert_eq!(config.exit_code(), EXIT_USAGE);

        let guard: AppError = OrchestratorError::AlreadyConfigured(vec![Role::Edge]).into();
        assert_eq!(guard.exit_code(), EXIT_FAILURE);

        let remote: AppError = OrchestratorError::Remote(RemoteError::CommandFailed {
            host: "edge".into(),
            command: "false".into(),
            code: "1".into(),
            output: String::new(),
        })
        .into();
        assert_eq!(remote.exit_code(), EXIT_FAILURE);

        let env: AppError = OrchestratorError::Environment("no keys".into()).into();
        assert_eq!(env.exit_code(), EXIT_INTERNAL);
    }

    #[test]
    fn test_command_failure_surfaces_output_verbatim() {
        let err = RemoteError::CommandFailed {
            host: "root@10.0.0.1".into(),
            command: "bash provision/cache-setup.sh".into(),
            code: "2".into(),
            output: "squid: bad acl line 4".into(),
        };
        assert!(err.to_string().contains("squid: bad acl line 4"));
    }
}
