//! Core data types for tierup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Role a host plays in the four-tier deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Origin: sole writable copy of the content.
    Authority,
    /// Full read-only copy kept in sync with the authority.
    Replica,
    /// Caching proxy in front of the replica.
    Cache,
    /// Client host exposing content to end users.
    Edge,
}

impl Role {
    /// All roles in bring-up order.
    pub const ALL: [Role; 4] = [Role::Authority, Role::Replica, Role::Cache, Role::Edge];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Authority => "authority",
            Role::Replica => "replica",
            Role::Cache => "cache",
            Role::Edge => "edge",
        }
    }

    /// File name of the setup script shipped for this role.
    pub fn setup_script(&self) -> String {
        format!("{}-setup.sh", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "authority" => Ok(Role::Authority),
            "replica" => Ok(Role::Replica),
            "cache" => Ok(Role::Cache),
            "edge" => Ok(Role::Edge),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A remote machine taking part in the deployment.
///
/// Hosts are built once from configuration and never mutated. The only
/// derived form is [`Host::as_account`], which yields a view of the same
/// machine under a different login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub role: Role,
    pub address: String,
    pub account: String,
}

impl Host {
    pub fn new(role: Role, address: impl Into<String>, account: impl Into<String>) -> Self {
        Host {
            role,
            address: address.into(),
            account: account.into(),
        }
    }

    /// `account@address`, as handed to ssh and scp.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.account, self.address)
    }

    /// Same machine, different login account.
    pub fn as_account(&self, account: &str) -> Host {
        Host {
            role: self.role,
            address: self.address.clone(),
            account: account.to_string(),
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.role, self.destination())
    }
}

/// How a remote command's output is treated when the command succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecMode {
    /// Output logged at debug level.
    #[default]
    Normal,
    /// Output echoed at info level (long-running setup steps).
    Echo,
    /// Output never shown unless the command fails.
    Quiet,
}

/// Outcome of a single remote invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Remote exit status; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout followed by stderr.
    pub output: String,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A public verification key produced on the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialArtifact {
    /// File name, e.g. `software.example.org.pub`.
    pub name: String,
    /// Absolute path on the authority.
    pub origin: String,
    /// Absolute paths it was pushed to, one per dependent host.
    pub destinations: Vec<String>,
}
