//! Per-role setup invocations.
//!
//! Every argument derived from configuration is shell-quoted. Lists travel as
//! one space-separated argument.

use crate::config::DeploymentConfig;
use crate::models::Role;
use crate::system::{quote, quote_list};

/// Command creating the remote work directory.
pub fn workdir_command(config: &DeploymentConfig) -> String {
    format!("mkdir -p {}", quote(&config.layout.workdir))
}

/// `bash <workdir>/<script> <args...>`
pub fn script_command(config: &DeploymentConfig, script: &str, args: &[String]) -> String {
    let mut parts = vec![
        "bash".to_string(),
        quote(&config.remote_path(script)),
    ];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

/// Arguments handed to a role's setup script.
pub fn setup_args(config: &DeploymentConfig, role: Role) -> Vec<String> {
    let repos = quote_list(&config.repo_names());
    let key_dir = quote(&config.layout.key_dir);
    match role {
        Role::Authority => vec![
            repos,
            quote(&config.publisher_account),
            config.publish_max_size_mb.to_string(),
        ],
        Role::Replica => vec![quote(&config.authority.address), key_dir, repos],
        Role::Cache => vec![
            quote(&config.replica.address),
            quote_list(&config.cache_allow),
            config.cache_disk_mb.to_string(),
            config.cache_mem_mb.to_string(),
        ],
        Role::Edge => vec![
            quote(&config.replica.address),
            quote(&config.cache.address),
            key_dir,
            repos,
        ],
    }
}

/// Full setup invocation for `role`.
pub fn setup_command(config: &DeploymentConfig, role: Role) -> String {
    script_command(config, &role.setup_script(), &setup_args(config, role))
}

/// Create the publishing account if it does not exist yet.
pub fn create_publisher_command(account: &str) -> String {
    let account = quote(account);
    format!(
        "id -u {a} >/dev/null 2>&1 || useradd --create-home --shell /bin/bash {a}",
        a = account
    )
}

/// Seed the publishing account's `authorized_keys` from the login account so
/// the operator can log in as the publisher with the same key.
pub fn seed_publisher_keys_command(account: &str) -> String {
    let account = quote(account);
    format!(
        "home=$(getent passwd {a} | cut -d: -f6) && \
         install -d -m 700 -o {a} -g {a} \"$home/.ssh\" && \
         install -m 600 -o {a} -g {a} \"$HOME/.ssh/authorized_keys\" \
         \"$home/.ssh/authorized_keys\"",
        a = account
    )
}
