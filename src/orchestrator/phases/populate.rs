//! Content population and test changes, both run as the publishing account.

use super::{setup::script_command, POPULATE_SCRIPT, PUBLISH_SCRIPT};
use crate::config::DeploymentConfig;
use crate::system::quote;

/// One `populate-repo.sh <content> <repo>` invocation per repository.
pub fn populate_commands(config: &DeploymentConfig) -> Vec<String> {
    config
        .repos
        .iter()
        .zip(config.repo_names())
        .map(|(repo, fqdn)| {
            let content = config.content_source.join(repo);
            script_command(
                config,
                POPULATE_SCRIPT,
                &[quote(&content.display().to_string()), quote(&fqdn)],
            )
        })
        .collect()
}

/// `publish-change.sh <repo> <file>` for the test change.
pub fn publish_change_command(config: &DeploymentConfig, fqdn: &str) -> String {
    script_command(
        config,
        PUBLISH_SCRIPT,
        &[quote(fqdn), quote(&config.layout.test_file)],
    )
}

/// Where the test file appears on the edge.
pub fn propagated_path(config: &DeploymentConfig, fqdn: &str) -> String {
    format!(
        "{}/{}/{}",
        config.layout.distribution_root.trim_end_matches('/'),
        fqdn,
        config.layout.test_file
    )
}
