//! Configuration module for deployment bring-up.
//!
//! Configuration is a flat TOML table of named parameters. Each parameter is
//! required, optional, or defaulted. Everything is resolved and range-checked
//! up front, so a bad value is reported before the first remote command.
//!
//! # Module Structure
//!
//! - `loader`: locates the config file and parses/serializes it
//! - `validator`: per-parameter checks (addresses, accounts, sizes, CIDRs)
//!
//! # Configuration Flow
//!
//! 1. `loader` finds the file (`--config` or the default search list)
//! 2. TOML is parsed into [`RawConfig`] (every field optional)
//! 3. [`RawConfig::resolve`] applies defaults and rejects missing required keys
//! 4. `validator::validate_all` range-checks the result
//! 5. The immutable [`DeploymentConfig`] is threaded through every component

pub mod loader;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::{Host, Role};

pub const DEFAULT_ACCOUNT: &str = "root";
pub const DEFAULT_PUBLISH_MAX_SIZE_MB: u64 = 4096;
pub const DEFAULT_CACHE_DISK_MB: u64 = 5000;
pub const DEFAULT_CACHE_MEM_MB: u64 = 256;
pub const DEFAULT_REBUILD_COMMAND: &str =
    "openstack server rebuild --wait --image {image} {server}";
/// Time given to package-manager locks on freshly imaged hosts to clear.
pub const DEFAULT_SETTLE_SECS: u64 = 180;
pub const DEFAULT_DISTRIBUTION_ROOT: &str = "/cvmfs";
pub const DEFAULT_CACHE_CONFIG_ROOT: &str = "/etc/squid";
pub const DEFAULT_KEY_DIR: &str = "/etc/cvmfs/keys";
pub const DEFAULT_WEB_ROOT: &str = "/var/www/html";
pub const DEFAULT_REMOTE_WORKDIR: &str = "provision";
pub const DEFAULT_TEST_FILE: &str = "convergence-probe.txt";
pub const DEFAULT_SSH_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Parameters exactly as they appear in the file. Unknown keys are rejected
/// so that a typo never silently falls back to a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_org: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repos: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_max_size_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_disk_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_mem_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_allow: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub populate_repos: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuild_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_config_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_workdir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Re-imaging parameters. Only consulted by the rebuild phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildSettings {
    pub base_image: Option<String>,
    /// Local command template with `{image}` and `{server}` placeholders.
    pub command: String,
    /// Cloud server names, indexed like [`Role::ALL`].
    pub servers: [String; 4],
    pub settle: Duration,
}

/// Remote filesystem layout shared by all hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    /// Idempotency marker for authority, replica and edge.
    pub distribution_root: String,
    /// Idempotency marker for the cache.
    pub cache_config_root: String,
    pub key_dir: String,
    pub web_root: String,
    /// Relative to the login account's home directory.
    pub workdir: String,
    pub test_file: String,
}

/// Fully resolved, validated, immutable deployment description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentConfig {
    pub authority: Host,
    pub replica: Host,
    pub cache: Host,
    pub edge: Host,
    pub publisher_account: String,
    pub repo_org: String,
    pub repos: Vec<String>,
    pub publish_max_size_mb: u64,
    pub cache_disk_mb: u64,
    pub cache_mem_mb: u64,
    pub cache_allow: Vec<String>,
    pub content_source: PathBuf,
    pub scripts_dir: PathBuf,
    pub populate_repos: bool,
    pub rebuild: RebuildSettings,
    pub layout: RemoteLayout,
    pub ssh_connect_timeout_secs: u64,
    pub log_dir: PathBuf,
}

fn required<T>(value: Option<T>, key: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::MissingParameter(key))
}

impl RawConfig {
    /// Apply defaults, reject missing required parameters, then validate.
    pub fn resolve(self) -> Result<DeploymentConfig, ConfigError> {
        let account =
            |v: Option<String>| v.unwrap_or_else(|| DEFAULT_ACCOUNT.to_string());

        let authority_address = required(self.authority_address, "authority_address")?;
        let replica_address = required(self.replica_address, "replica_address")?;
        let cache_address = required(self.cache_address, "cache_address")?;
        let edge_address = required(self.edge_address, "edge_address")?;

        let authority =
            Host::new(Role::Authority, authority_address, account(self.authority_account));
        let replica = Host::new(Role::Replica, replica_address, account(self.replica_account));
        let cache = Host::new(Role::Cache, cache_address, account(self.cache_account));
        let edge = Host::new(Role::Edge, edge_address, account(self.edge_account));

        let servers = [
            self.authority_server.unwrap_or_else(|| authority.address.clone()),
            self.replica_server.unwrap_or_else(|| replica.address.clone()),
            self.cache_server.unwrap_or_else(|| cache.address.clone()),
            self.edge_server.unwrap_or_else(|| edge.address.clone()),
        ];

        let config = DeploymentConfig {
            publisher_account: self
                .publisher_account
                .unwrap_or_else(|| authority.account.clone()),
            authority,
            replica,
            cache,
            edge,
            repo_org: required(self.repo_org, "repo_org")?,
            repos: required(self.repos, "repos")?,
            publish_max_size_mb: self.publish_max_size_mb.unwrap_or(DEFAULT_PUBLISH_MAX_SIZE_MB),
            cache_disk_mb: self.cache_disk_mb.unwrap_or(DEFAULT_CACHE_DISK_MB),
            cache_mem_mb: self.cache_mem_mb.unwrap_or(DEFAULT_CACHE_MEM_MB),
            cache_allow: required(self.cache_allow, "cache_allow")?,
            content_source: self.content_source.unwrap_or_else(|| PathBuf::from("./content")),
            scripts_dir: self.scripts_dir.unwrap_or_else(|| PathBuf::from("./provision")),
            populate_repos: self.populate_repos.unwrap_or(false),
            rebuild: RebuildSettings {
                base_image: self.base_image,
                command: self
                    .rebuild_command
                    .unwrap_or_else(|| DEFAULT_REBUILD_COMMAND.to_string()),
                servers,
                settle: Duration::from_secs(self.settle_secs.unwrap_or(DEFAULT_SETTLE_SECS)),
            },
            layout: RemoteLayout {
                distribution_root: self
                    .distribution_root
                    .unwrap_or_else(|| DEFAULT_DISTRIBUTION_ROOT.to_string()),
                cache_config_root: self
                    .cache_config_root
                    .unwrap_or_else(|| DEFAULT_CACHE_CONFIG_ROOT.to_string()),
                key_dir: self.key_dir.unwrap_or_else(|| DEFAULT_KEY_DIR.to_string()),
                web_root: self.web_root.unwrap_or_else(|| DEFAULT_WEB_ROOT.to_string()),
                workdir: self
                    .remote_workdir
                    .unwrap_or_else(|| DEFAULT_REMOTE_WORKDIR.to_string()),
                test_file: self.test_file.unwrap_or_else(|| DEFAULT_TEST_FILE.to_string()),
            },
            ssh_connect_timeout_secs: self
                .ssh_connect_timeout_secs
                .unwrap_or(DEFAULT_SSH_CONNECT_TIMEOUT_SECS),
            log_dir: self.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
        };

        validator::validate_all(&config)?;
        Ok(config)
    }
}

impl DeploymentConfig {
    pub fn host(&self, role: Role) -> &Host {
        match role {
            Role::Authority => &self.authority,
            Role::Replica => &self.replica,
            Role::Cache => &self.cache,
            Role::Edge => &self.edge,
        }
    }

    /// All four hosts in bring-up order.
    pub fn hosts(&self) -> [&Host; 4] {
        [&self.authority, &self.replica, &self.cache, &self.edge]
    }

    /// The authority as seen by the publishing account.
    pub fn publisher(&self) -> Host {
        self.authority.as_account(&self.publisher_account)
    }

    /// True when publishing happens under an account other than the
    /// authority's login and therefore has to be created first.
    pub fn has_custom_publisher(&self) -> bool {
        self.publisher_account != self.authority.account
    }

    /// Fully qualified repository names, e.g. `software.example.org`.
    pub fn repo_names(&self) -> Vec<String> {
        self.repos
            .iter()
            .map(|r| format!("{}.{}", r, self.repo_org))
            .collect()
    }

    /// Cloud server name used when re-imaging `role`.
    pub fn server_name(&self, role: Role) -> &str {
        let idx = Role::ALL.iter().position(|r| *r == role).unwrap_or(0);
        &self.rebuild.servers[idx]
    }

    /// Path of a provisioning file inside the remote work directory.
    pub fn remote_path(&self, file: &str) -> String {
        format!("{}/{}", self.layout.workdir, file)
    }

    /// Role-specific idempotency marker: a directory that only exists once
    /// the role has been set up.
    pub fn marker_path(&self, role: Role) -> &str {
        match role {
            Role::Cache => &self.layout.cache_config_root,
            Role::Authority | Role::Replica | Role::Edge => &self.layout.distribution_root,
        }
    }

    /// Flatten back into the file representation, every default spelled out.
    pub fn to_raw(&self) -> RawConfig {
        let server = |role: Role| Some(self.server_name(role).to_string());
        RawConfig {
            authority_address: Some(self.authority.address.clone()),
            authority_account: Some(self.authority.account.clone()),
            authority_server: server(Role::Authority),
            replica_address: Some(self.replica.address.clone()),
            replica_account: Some(self.replica.account.clone()),
            replica_server: server(Role::Replica),
            cache_address: Some(self.cache.address.clone()),
            cache_account: Some(self.cache.account.clone()),
            cache_server: server(Role::Cache),
            edge_address: Some(self.edge.address.clone()),
            edge_account: Some(self.edge.account.clone()),
            edge_server: server(Role::Edge),
            publisher_account: Some(self.publisher_account.clone()),
            repo_org: Some(self.repo_org.clone()),
            repos: Some(self.repos.clone()),
            publish_max_size_mb: Some(self.publish_max_size_mb),
            cache_disk_mb: Some(self.cache_disk_mb),
            cache_mem_mb: Some(self.cache_mem_mb),
            cache_allow: Some(self.cache_allow.clone()),
            content_source: Some(self.content_source.clone()),
            scripts_dir: Some(self.scripts_dir.clone()),
            populate_repos: Some(self.populate_repos),
            base_image: self.rebuild.base_image.clone(),
            rebuild_command: Some(self.rebuild.command.clone()),
            settle_secs: Some(self.rebuild.settle.as_secs()),
            distribution_root: Some(self.layout.distribution_root.clone()),
            cache_config_root: Some(self.layout.cache_config_root.clone()),
            key_dir: Some(self.layout.key_dir.clone()),
            web_root: Some(self.layout.web_root.clone()),
            remote_workdir: Some(self.layout.workdir.clone()),
            test_file: Some(self.layout.test_file.clone()),
            ssh_connect_timeout_secs: Some(self.ssh_connect_timeout_secs),
            log_dir: Some(self.log_dir.clone()),
        }
    }
}
