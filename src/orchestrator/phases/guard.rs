//! Idempotency guard.

use crate::config::DeploymentConfig;
use crate::error::RemoteError;
use crate::models::Role;
use crate::remote::{RemoteExecutor, RemoteSession};
use crate::system::quote;

/// Probe command for a role's marker directory.
pub fn marker_probe(config: &DeploymentConfig, role: Role) -> String {
    format!("test -d {}", quote(config.marker_path(role)))
}

/// Roles whose marker is already present. Every host is probed, so the
/// result names all configured hosts, not just the first one found.
pub async fn configured_roles<S: RemoteSession>(
    executor: &RemoteExecutor<S>,
    config: &DeploymentConfig,
) -> Result<Vec<Role>, RemoteError> {
    let mut found = Vec::new();
    for host in config.hosts() {
        let probe = marker_probe(config, host.role);
        if executor.probe(host, &probe).await? {
            log::warn!(
                "[Guard] {} already has {}",
                host,
                config.marker_path(host.role)
            );
            found.push(host.role);
        } else {
            log::debug!("[Guard] {} is clean", host);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::minimal_raw;
    use crate::remote::MockSession;

    #[tokio::test]
    async fn test_guard_reports_every_configured_host() {
        let config = minimal_raw().resolve().unwrap();
        let session = MockSession::new()
            .with_path(Role::Replica, "/cvmfs")
            .with_path(Role::Cache, "/etc/squid")
            .with_path(Role::Edge, "/etc/squid");
        let executor = RemoteExecutor::new(session);

        let roles = configured_roles(&executor, &config).await.unwrap();
        assert_eq!(roles, vec![Role::Replica, Role::Cache]);
        assert_eq!(executor.history().len(), 4);
        assert!(executor.mutating_calls().is_empty());
    }

    #[test]
    fn test_marker_probe_per_role() {
        let config = minimal_raw().resolve().unwrap();
        assert_eq!(marker_probe(&config, Role::Cache), "test -d /etc/squid");
        assert_eq!(marker_probe(&config, Role::Authority), "test -d /cvmfs");
    }
}
