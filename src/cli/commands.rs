//! Command handlers: one dispatch table over the `Command` enum.

use log::Level;
use std::io;
use std::path::{Path, PathBuf};

use super::args::{Cli, Command};
use crate::config::{loader, validator, DeploymentConfig};
use crate::error::{AppError, OrchestratorError, Result};
use crate::log_collector::{LogCollector, LogLine, Verbosity};
use crate::log_parsed;
use crate::monitor::{ConvergenceMonitor, IntervalTicker, LocalFile, WatchOutcome};
use crate::orchestrator::PhaseOrchestrator;
use crate::remote::{RemoteExecutor, SshSession};
use crate::system::paths;

/// Parse-independent entry point: load configuration, start logging, run
/// the command, flush logs.
pub async fn run(cli: Cli) -> Result<()> {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.verbose);

    let config = if cli.command.needs_config() {
        let path = loader::locate_config(cli.config.as_deref())?;
        let config = loader::load_config_from_file(&path)?;
        Some((path, config))
    } else {
        None
    };

    let log_dir = config
        .as_ref()
        .map(|(_, c)| c.log_dir.clone())
        .unwrap_or_else(|| paths::state_dir().join("logs"));
    let logs = LogCollector::new(&log_dir, verbosity);
    if let Err(e) = logs.install() {
        eprintln!("[Log] logger already installed: {}", e);
    }
    if let Some((path, _)) = &config {
        log::debug!("[Config] using {}", path.display());
    }
    if let Some(log_path) = logs.log_path() {
        log::debug!("[Log] writing {}", log_path.display());
    }

    let result = match config {
        Some((_, config)) => dispatch(&cli.command, config, verbosity).await,
        None => match &cli.command {
            Command::Watch { path } => watch_local(path).await.map(|_| ()),
            _ => Ok(()),
        },
    };

    if let Err(e) = &result {
        logs.log_to_file(LogLine::new(Level::Error, e.to_string()));
    }
    if let Err(e) = logs.wait_for_empty().await {
        eprintln!("[Log] {}", e);
    }
    result
}

async fn dispatch(command: &Command, config: DeploymentConfig, verbosity: Verbosity) -> Result<()> {
    if let Some(role) = command.ssh_role() {
        let executor = executor_for(&config, verbosity);
        executor.interactive(config.host(role)).await?;
        return Ok(());
    }

    match command {
        Command::ListRepos => {
            for name in config.repo_names() {
                println!("{}", name);
            }
            Ok(())
        }
        Command::ShowConfig => {
            print!("{}", loader::render_config(&config)?);
            Ok(())
        }
        Command::ResetAll | Command::RebuildVm => {
            validator::validate_for_rebuild(&config)?;
            let orch = orchestrator(config, verbosity)?;
            let result = if *command == Command::ResetAll {
                orch.run(true).await.map(|_| ())
            } else {
                orch.rebuild_hosts().await
            };
            finish(&orch, result).await
        }
        Command::SetupAll => {
            let orch = orchestrator(config, verbosity)?;
            let result = orch.run(false).await.map(|_| ());
            finish(&orch, result).await
        }
        Command::CopyScripts => {
            let orch = orchestrator(config, verbosity)?;
            let result = orch.distribute_artifacts().await;
            finish(&orch, result).await
        }
        Command::CopyPubkeys => {
            let orch = orchestrator(config, verbosity)?;
            let result = orch.distribute_credentials().await;
            finish(&orch, result).await
        }
        Command::RunScripts => {
            let orch = orchestrator(config, verbosity)?;
            let result = orch.run_scripts().await;
            finish(&orch, result).await
        }
        Command::PopulateRepos => {
            let orch = orchestrator(config, verbosity)?;
            let result = orch.populate_content().await;
            finish(&orch, result).await
        }
        Command::DocumentRepos => {
            let orch = orchestrator(config, verbosity)?;
            orch.document_repos().await?;
            Ok(())
        }
        Command::TestUpdate { repo } => {
            let orch = orchestrator(config, verbosity)?;
            let mut monitor = ConvergenceMonitor::new(IntervalTicker::default(), io::stdout());
            let outcome = orch.test_update(repo.as_deref(), &mut monitor).await?;
            report_outcome(&outcome);
            Ok(())
        }
        Command::Watch { path } => watch_local(path).await.map(|_| ()),
        Command::SshAuthority | Command::SshReplica | Command::SshCache | Command::SshEdge => {
            Ok(())
        }
    }
}

fn executor_for(config: &DeploymentConfig, verbosity: Verbosity) -> RemoteExecutor<SshSession> {
    let session = SshSession::new(config.ssh_connect_timeout_secs, &paths::state_dir());
    RemoteExecutor::new(session).with_quiet(verbosity == Verbosity::Quiet)
}

fn orchestrator(
    config: DeploymentConfig,
    verbosity: Verbosity,
) -> Result<PhaseOrchestrator<SshSession>> {
    let executor = executor_for(&config, verbosity);
    Ok(PhaseOrchestrator::new(config, executor, monitor_utility()?))
}

/// This executable, shipped to the edge as the monitor utility.
fn monitor_utility() -> Result<PathBuf> {
    std::env::current_exe().map_err(|e| {
        AppError::Orchestrator(OrchestratorError::Environment(format!(
            "cannot locate own executable: {}",
            e
        )))
    })
}

/// Print the phase summary whether or not the run succeeded.
async fn finish(
    orch: &PhaseOrchestrator<SshSession>,
    result: std::result::Result<(), OrchestratorError>,
) -> Result<()> {
    let report = orch.report_snapshot().await;
    if !report.records().is_empty() {
        for line in report.summary_lines() {
            log_parsed!("[Summary] {}", line);
        }
    }
    result.map_err(AppError::from)
}

async fn watch_local(path: &Path) -> Result<WatchOutcome> {
    let source = LocalFile::new(path);
    let mut monitor = ConvergenceMonitor::new(IntervalTicker::default(), io::stdout());
    let outcome = monitor.watch(&source).await?;
    report_outcome(&outcome);
    Ok(outcome)
}

fn report_outcome(outcome: &WatchOutcome) {
    log::debug!(
        "[Monitor] {} at {} ({:?})",
        outcome.state,
        outcome.completed_at.to_rfc3339(),
        outcome.elapsed
    );
}
