//! Provisioning orchestration: idempotency guard, then the fail-fast phase
//! pipeline (RebuildHosts -> DistributeArtifacts -> ConfigureAuthority ->
//! DistributeCredentials -> ConfigureReplica -> ConfigureCache ->
//! ConfigureEdge -> PopulateContent).

pub mod keys;
pub mod phases;
pub mod state;

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::RwLock;
use tokio::time::Instant;

pub use keys::KeyDistributor;
pub use state::{Phase, PhaseRecord, RunReport};

use crate::config::DeploymentConfig;
use crate::error::{AppError, ConfigError, OrchestratorError};
use crate::log_parsed;
use crate::models::{CredentialArtifact, ExecMode, Host, Role};
use crate::monitor::{ConvergenceMonitor, FingerprintSource, RemoteFile, Ticker, WatchOutcome};
use crate::remote::{RemoteExecutor, RemoteSession};
use crate::system::format_duration;
use phases::{document, populate, rebuild, setup};

/// Drives the four hosts through the bring-up phases.
///
/// Each public phase method is usable on its own (standalone subcommands);
/// [`PhaseOrchestrator::run`] chains them. Every executed phase is recorded
/// in the run report, which stays readable after a failure.
pub struct PhaseOrchestrator<S> {
    config: DeploymentConfig,

    executor: RemoteExecutor<S>,

    /// Local file pushed to the edge as the monitor utility
    monitor_utility: PathBuf,

    /// Phase records of the current run
    state: RwLock<RunReport>,
}

impl<S: RemoteSession> PhaseOrchestrator<S> {
    pub fn new(
        config: DeploymentConfig,
        executor: RemoteExecutor<S>,
        monitor_utility: impl Into<PathBuf>,
    ) -> Self {
        PhaseOrchestrator {
            config,
            executor,
            monitor_utility: monitor_utility.into(),
            state: RwLock::new(RunReport::new()),
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn executor(&self) -> &RemoteExecutor<S> {
        &self.executor
    }

    /// Snapshot of the phases executed so far.
    pub async fn report_snapshot(&self) -> RunReport {
        self.state.read().await.clone()
    }

    /// Full run: optional re-imaging, guard, then phases 2-7, then 8 if
    /// enabled.
    pub async fn run(&self, rebuild_requested: bool) -> Result<RunReport, OrchestratorError> {
        self.preflight(rebuild_requested)?;

        // After re-imaging the guard confirms every host really came back clean.
        if rebuild_requested {
            self.rebuild_hosts().await?;
        }
        self.guard().await?;

        self.distribute_artifacts().await?;
        self.run_scripts().await?;
        if self.config.populate_repos {
            self.populate_content().await?;
        }

        let report = self.report_snapshot().await;
        log_parsed!(
            "[Deploy] [DONE] {} phase(s) in {}",
            report.records().len(),
            format_duration(report.total_elapsed())
        );
        Ok(report)
    }

    /// Refuse to touch a deployment that is already (partly) configured.
    /// Issues probes only.
    pub async fn guard(&self) -> Result<(), OrchestratorError> {
        let configured = phases::configured_roles(&self.executor, &self.config).await?;
        if configured.is_empty() {
            log_parsed!("[Deploy] [GUARD] all hosts clean");
            return Ok(());
        }
        for role in &configured {
            log::error!(
                "[Deploy] [GUARD] {} is already configured ({} exists)",
                self.config.host(*role),
                self.config.marker_path(*role)
            );
        }
        Err(OrchestratorError::AlreadyConfigured(configured))
    }

    /// Phase 1.
    pub async fn rebuild_hosts(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::RebuildHosts, self.rebuild_body()).await
    }

    /// Phase 2.
    pub async fn distribute_artifacts(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::DistributeArtifacts, self.distribute_body()).await
    }

    /// Phases 3 to 7.
    pub async fn run_scripts(&self) -> Result<(), OrchestratorError> {
        self.configure_authority().await?;
        self.distribute_credentials().await?;
        self.configure_replica().await?;
        self.configure_cache().await?;
        self.configure_edge().await
    }

    /// Phase 3.
    pub async fn configure_authority(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::ConfigureAuthority, self.authority_body()).await
    }

    /// Phase 4.
    pub async fn distribute_credentials(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::DistributeCredentials, async {
            self.fan_out_keys().await.map(|_| ())
        })
        .await
    }

    /// Phase 5.
    pub async fn configure_replica(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::ConfigureReplica, async {
            self.run_setup(Role::Replica).await?;
            self.document_repos().await
        })
        .await
    }

    /// Phase 6.
    pub async fn configure_cache(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::ConfigureCache, self.run_setup(Role::Cache)).await
    }

    /// Phase 7.
    pub async fn configure_edge(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::ConfigureEdge, self.run_setup(Role::Edge)).await
    }

    /// Phase 8.
    pub async fn populate_content(&self) -> Result<(), OrchestratorError> {
        self.timed(Phase::PopulateContent, self.populate_body()).await
    }

    /// Copy the authority's public keys to the replica and edge.
    pub async fn fan_out_keys(&self) -> Result<Vec<CredentialArtifact>, OrchestratorError> {
        let distributor = KeyDistributor::new(&self.executor, &self.config.layout.key_dir);
        let artifacts = distributor
            .distribute(&self.config.authority, &[&self.config.replica, &self.config.edge])
            .await?;
        log_parsed!(
            "[Deploy] [KEYS] {} key(s) distributed to replica and edge",
            artifacts.len()
        );
        Ok(artifacts)
    }

    /// Publish the repository index and key bundle on the replica.
    pub async fn document_repos(&self) -> Result<(), OrchestratorError> {
        let replica = &self.config.replica;
        let staging = TempDir::new()?;
        let index = staging.path().join(document::INDEX_FILE);
        std::fs::write(&index, document::render_index(&self.config))?;

        self.executor
            .push(replica, &index, &document::index_path(&self.config))
            .await?;
        self.executor
            .execute(replica, &document::bundle_command(&self.config), ExecMode::Normal)
            .await?;
        log_parsed!(
            "[Deploy] [DOCS] index and {} published on {}",
            document::KEY_BUNDLE,
            replica
        );
        Ok(())
    }

    /// Apply a test change at the authority and watch it arrive at the edge.
    ///
    /// The edge fingerprint is taken before the change is published, and
    /// elapsed time is measured from that moment.
    pub async fn test_update<T: Ticker, W: Write>(
        &self,
        repo: Option<&str>,
        monitor: &mut ConvergenceMonitor<T, W>,
    ) -> Result<WatchOutcome, AppError> {
        let fqdn = self.resolve_repo(repo)?;
        let script = self.local_script(phases::PUBLISH_SCRIPT)?;
        let path = populate::propagated_path(&self.config, &fqdn);
        let target = RemoteFile::new(&self.executor, self.config.edge.clone(), path);

        let started = Instant::now();
        let initial = target.query().await?;
        log_parsed!(
            "[Update] watching {} ({})",
            target.describe(),
            if initial.is_some() { "present" } else { "absent" }
        );

        let publisher = self.config.publisher();
        self.ship_script(&publisher, &script, phases::PUBLISH_SCRIPT)
            .await?;
        self.executor
            .execute(
                &publisher,
                &populate::publish_change_command(&self.config, &fqdn),
                ExecMode::Echo,
            )
            .await?;
        log_parsed!("[Update] change published to {}", fqdn);

        Ok(monitor.watch_from(&target, initial, started).await?)
    }

    /// Fully qualified repository name for `--repo`, defaulting to the first.
    fn resolve_repo(&self, repo: Option<&str>) -> Result<String, ConfigError> {
        let names = self.config.repo_names();
        let Some(wanted) = repo else {
            return names
                .into_iter()
                .next()
                .ok_or(ConfigError::MissingParameter("repos"));
        };
        self.config
            .repos
            .iter()
            .zip(names)
            .find(|(short, fqdn)| short.as_str() == wanted || fqdn.as_str() == wanted)
            .map(|(_, fqdn)| fqdn)
            .ok_or_else(|| {
                ConfigError::invalid("repo", format!("'{}' is not a configured repository", wanted))
            })
    }

    /// Check every local file a run will push before anything remote happens.
    fn preflight(&self, rebuild_requested: bool) -> Result<(), OrchestratorError> {
        for role in Role::ALL {
            self.local_script(&role.setup_script())?;
        }
        if self.config.populate_repos {
            self.local_script(phases::POPULATE_SCRIPT)?;
        }
        if !self.monitor_utility.is_file() {
            return Err(OrchestratorError::Environment(format!(
                "monitor utility not found at {}",
                self.monitor_utility.display()
            )));
        }
        if rebuild_requested && self.config.rebuild.base_image.is_none() {
            return Err(OrchestratorError::Environment(
                "re-imaging requested without base_image".to_string(),
            ));
        }
        Ok(())
    }

    fn local_script(&self, name: &str) -> Result<PathBuf, OrchestratorError> {
        let path = self.config.scripts_dir.join(name);
        if !path.is_file() {
            return Err(OrchestratorError::Environment(format!(
                "provisioning script not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Run a phase body, recording its elapsed time whatever the outcome.
    async fn timed<F>(&self, phase: Phase, body: F) -> Result<(), OrchestratorError>
    where
        F: Future<Output = Result<(), OrchestratorError>>,
    {
        self.state.read().await.check_can_begin(phase)?;
        log_parsed!("[Deploy] [PHASE {}/8] {} started", phase.ordinal(), phase);

        let started = Instant::now();
        let result = body.await;
        let elapsed = started.elapsed();

        self.state.write().await.record(PhaseRecord {
            phase,
            elapsed,
            succeeded: result.is_ok(),
        })?;

        match &result {
            Ok(()) => log_parsed!(
                "[Deploy] [PHASE {}/8] {} completed in {}",
                phase.ordinal(),
                phase,
                format_duration(elapsed)
            ),
            Err(e) => log::error!(
                "[Deploy] [PHASE {}/8] {} failed after {}: {}",
                phase.ordinal(),
                phase,
                format_duration(elapsed),
                e
            ),
        }
        result
    }

    async fn rebuild_body(&self) -> Result<(), OrchestratorError> {
        let rebuild = &self.config.rebuild;
        let image = rebuild.base_image.as_deref().ok_or_else(|| {
            OrchestratorError::Environment("re-imaging requested without base_image".to_string())
        })?;

        for host in self.config.hosts() {
            let server = self.config.server_name(host.role);
            let (program, args) = rebuild::rebuild_argv(&rebuild.command, image, server)
                .ok_or_else(|| {
                    OrchestratorError::Environment("empty rebuild_command".to_string())
                })?;
            log::info!("[Rebuild] re-imaging {} from '{}'", host, image);
            self.executor.run_local(&program, &args, ExecMode::Echo).await?;
            self.executor.forget_host(host).await?;
        }

        // Fixed wait: package-manager locks on fresh images are not observable.
        log::info!(
            "[Rebuild] waiting {} for hosts to settle",
            format_duration(rebuild.settle)
        );
        tokio::time::sleep(rebuild.settle).await;
        Ok(())
    }

    async fn distribute_body(&self) -> Result<(), OrchestratorError> {
        if !self.monitor_utility.is_file() {
            return Err(OrchestratorError::Environment(format!(
                "monitor utility not found at {}",
                self.monitor_utility.display()
            )));
        }
        for host in self.config.hosts() {
            let script_name = host.role.setup_script();
            let script = self.local_script(&script_name)?;
            self.ship_script(host, &script, &script_name).await?;

            if host.role == Role::Edge {
                let remote = self.config.remote_path(phases::MONITOR_UTILITY);
                self.executor.push(host, &self.monitor_utility, &remote).await?;
                self.executor
                    .execute(
                        host,
                        &format!("chmod 0755 {}", crate::system::quote(&remote)),
                        ExecMode::Quiet,
                    )
                    .await?;
                log::info!("[Deploy] monitor utility installed on {} at {}", host, remote);
            }
        }
        Ok(())
    }

    async fn authority_body(&self) -> Result<(), OrchestratorError> {
        let authority = &self.config.authority;
        if self.config.has_custom_publisher() {
            let account = &self.config.publisher_account;
            log::info!("[Deploy] preparing publishing account '{}'", account);
            self.executor
                .execute(authority, &setup::create_publisher_command(account), ExecMode::Normal)
                .await?;
            self.executor
                .execute(
                    authority,
                    &setup::seed_publisher_keys_command(account),
                    ExecMode::Normal,
                )
                .await?;
        }
        self.run_setup(Role::Authority).await
    }

    async fn populate_body(&self) -> Result<(), OrchestratorError> {
        let script = self.local_script(phases::POPULATE_SCRIPT)?;
        let publisher = self.config.publisher();
        self.ship_script(&publisher, &script, phases::POPULATE_SCRIPT).await?;
        for command in populate::populate_commands(&self.config) {
            self.executor.execute(&publisher, &command, ExecMode::Echo).await?;
        }
        Ok(())
    }

    async fn run_setup(&self, role: Role) -> Result<(), OrchestratorError> {
        let host = self.config.host(role);
        log::info!("[Deploy] running {} on {}", role.setup_script(), host);
        self.executor
            .execute(host, &setup::setup_command(&self.config, role), ExecMode::Echo)
            .await?;
        Ok(())
    }

    /// Create the work directory on `host` and copy a script into it.
    async fn ship_script(
        &self,
        host: &Host,
        local: &Path,
        name: &str,
    ) -> Result<(), OrchestratorError> {
        self.executor
            .execute(host, &setup::workdir_command(&self.config), ExecMode::Quiet)
            .await?;
        self.executor
            .push(host, local, &self.config.remote_path(name))
            .await?;
        Ok(())
    }
}
