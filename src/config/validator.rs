//! Config validation.
//!
//! Every check runs before any remote operation. A value that passes here is
//! safe to splice into a remote command once quoted.

use crate::error::ConfigError;
use crate::config::DeploymentConfig;
use regex::Regex;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Smallest accepted publish size limit (MB).
pub const MIN_PUBLISH_MAX_SIZE_MB: u64 = 1;
/// Smallest accepted cache disk size (MB).
pub const MIN_CACHE_DISK_MB: u64 = 100;
/// Smallest accepted cache memory size (MB).
pub const MIN_CACHE_MEM_MB: u64 = 16;

/// Validate a host address (DNS name or IPv4 literal, no whitespace).
pub fn validate_address(key: &'static str, address: &str) -> Result<(), ConfigError> {
    if address.is_empty() {
        return Err(ConfigError::invalid(key, "address cannot be empty"));
    }
    let re = Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9.-]*[A-Za-z0-9])?$")
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
    if !re.is_match(address) {
        return Err(ConfigError::invalid(
            key,
            format!("'{}' is not a host name or IPv4 address", address),
        ));
    }
    Ok(())
}

/// Validate a POSIX login account name.
pub fn validate_account(key: &'static str, account: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$")
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
    if !re.is_match(account) {
        return Err(ConfigError::invalid(
            key,
            format!("'{}' is not a valid account name", account),
        ));
    }
    Ok(())
}

/// Validate the repository organization domain (e.g. `example.org`).
pub fn validate_repo_org(org: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
    if !re.is_match(org) {
        return Err(ConfigError::invalid(
            "repo_org",
            format!("'{}' must be a lowercase dotted domain", org),
        ));
    }
    Ok(())
}

/// Validate the repository list: non-empty, well-formed, no duplicates.
pub fn validate_repos(repos: &[String]) -> Result<(), ConfigError> {
    if repos.is_empty() {
        return Err(ConfigError::invalid("repos", "at least one repository is required"));
    }
    let re = Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$")
        .map_err(|e| ConfigError::ValidationFailed(e.to_string()))?;
    let mut seen = HashSet::new();
    for repo in repos {
        if !re.is_match(repo) {
            return Err(ConfigError::invalid(
                "repos",
                format!("'{}' must be lowercase alphanumeric with hyphens", repo),
            ));
        }
        if !seen.insert(repo.as_str()) {
            return Err(ConfigError::invalid(
                "repos",
                format!("'{}' is listed more than once", repo),
            ));
        }
    }
    Ok(())
}

/// Validate that a size is at least `floor`.
pub fn validate_min(key: &'static str, value: u64, floor: u64) -> Result<(), ConfigError> {
    if value < floor {
        return Err(ConfigError::invalid(
            key,
            format!("{} is below the minimum of {}", value, floor),
        ));
    }
    Ok(())
}

/// Validate one IPv4 CIDR block such as `10.0.0.0/24`.
pub fn validate_cidr(block: &str) -> Result<(), ConfigError> {
    let (addr, prefix) = block.split_once('/').ok_or_else(|| {
        ConfigError::invalid("cache_allow", format!("'{}' is missing a /prefix", block))
    })?;
    addr.parse::<Ipv4Addr>().map_err(|_| {
        ConfigError::invalid("cache_allow", format!("'{}' has an invalid address", block))
    })?;
    match prefix.parse::<u8>() {
        Ok(p) if p <= 32 => Ok(()),
        _ => Err(ConfigError::invalid(
            "cache_allow",
            format!("'{}' has an invalid prefix length", block),
        )),
    }
}

/// Validate the cache allow-list.
pub fn validate_allow_list(blocks: &[String]) -> Result<(), ConfigError> {
    if blocks.is_empty() {
        return Err(ConfigError::invalid(
            "cache_allow",
            "at least one address range is required",
        ));
    }
    blocks.iter().try_for_each(|b| validate_cidr(b))
}

/// Validate an absolute remote path.
pub fn validate_absolute(key: &'static str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') || path.len() < 2 {
        return Err(ConfigError::invalid(
            key,
            format!("'{}' must be an absolute path below /", path),
        ));
    }
    if path.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(key, "path cannot contain whitespace"));
    }
    Ok(())
}

/// Validate the remote work directory (relative to home, no `..`).
pub fn validate_workdir(workdir: &str) -> Result<(), ConfigError> {
    if workdir.is_empty() || workdir.starts_with('/') {
        return Err(ConfigError::invalid(
            "remote_workdir",
            "must be a non-empty path relative to the login home",
        ));
    }
    if workdir.split('/').any(|c| c == ".." || c.is_empty()) {
        return Err(ConfigError::invalid(
            "remote_workdir",
            format!("'{}' contains an empty or '..' component", workdir),
        ));
    }
    Ok(())
}

/// Validate the probe file name used by `test-update`.
pub fn validate_test_file(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ConfigError::invalid(
            "test_file",
            "must be a single file name without '/'",
        ));
    }
    Ok(())
}

/// Validate the re-imaging command template.
pub fn validate_rebuild_command(template: &str) -> Result<(), ConfigError> {
    for placeholder in ["{image}", "{server}"] {
        if !template.contains(placeholder) {
            return Err(ConfigError::invalid(
                "rebuild_command",
                format!("template must contain {}", placeholder),
            ));
        }
    }
    Ok(())
}

/// Extra requirement checked only when re-imaging was requested.
pub fn validate_for_rebuild(config: &DeploymentConfig) -> Result<(), ConfigError> {
    match config.rebuild.base_image.as_deref() {
        Some(image) if !image.trim().is_empty() => Ok(()),
        _ => Err(ConfigError::MissingParameter("base_image")),
    }
}

/// Comprehensive validation of all config params.
pub fn validate_all(config: &DeploymentConfig) -> Result<(), ConfigError> {
    validate_address("authority_address", &config.authority.address)?;
    validate_address("replica_address", &config.replica.address)?;
    validate_address("cache_address", &config.cache.address)?;
    validate_address("edge_address", &config.edge.address)?;
    validate_account("authority_account", &config.authority.account)?;
    validate_account("replica_account", &config.replica.account)?;
    validate_account("cache_account", &config.cache.account)?;
    validate_account("edge_account", &config.edge.account)?;
    validate_account("publisher_account", &config.publisher_account)?;
    validate_repo_org(&config.repo_org)?;
    validate_repos(&config.repos)?;
    validate_min("publish_max_size_mb", config.publish_max_size_mb, MIN_PUBLISH_MAX_SIZE_MB)?;
    validate_min("cache_disk_mb", config.cache_disk_mb, MIN_CACHE_DISK_MB)?;
    validate_min("cache_mem_mb", config.cache_mem_mb, MIN_CACHE_MEM_MB)?;
    validate_min("ssh_connect_timeout_secs", config.ssh_connect_timeout_secs, 1)?;
    validate_allow_list(&config.cache_allow)?;
    validate_absolute("distribution_root", &config.layout.distribution_root)?;
    validate_absolute("cache_config_root", &config.layout.cache_config_root)?;
    validate_absolute("key_dir", &config.layout.key_dir)?;
    validate_absolute("web_root", &config.layout.web_root)?;
    validate_workdir(&config.layout.workdir)?;
    validate_test_file(&config.layout.test_file)?;
    validate_rebuild_command(&config.rebuild.command)?;
    Ok(())
}
