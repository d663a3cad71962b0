//! Integration tests for the provisioning pipeline against the in-memory
//! session.
//!
//! Test Organization:
//! - Idempotency guard (clean, blocked, all hosts reported, unreachable host)
//! - Phase ordering and fail-fast timing
//! - Re-imaging, publisher account, content population
//! - Standalone phases
//! - End-to-end propagation through `test_update`

use std::cell::Cell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;

use tierup::config::loader::parse_config;
use tierup::monitor::{ConvergenceMonitor, IntervalTicker, WatchState};
use tierup::remote::mock::MockCall;
use tierup::remote::{CallKind, MockSession, RemoteExecutor, SessionOutput};
use tierup::{DeploymentConfig, OrchestratorError, Phase, PhaseOrchestrator, RemoteError, Role};

const SCRIPTS: [&str; 6] = [
    "authority-setup.sh",
    "replica-setup.sh",
    "cache-setup.sh",
    "edge-setup.sh",
    "populate-repo.sh",
    "publish-change.sh",
];

struct Fixture {
    _dir: TempDir,
    config: DeploymentConfig,
    utility: PathBuf,
}

fn fixture(extra: &str) -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let scripts = dir.path().join("provision");
    fs::create_dir_all(&scripts).unwrap();
    for name in SCRIPTS {
        fs::write(scripts.join(name), format!("#!/bin/bash\n# {}\n", name)).unwrap();
    }
    let utility = dir.path().join("tierup");
    fs::write(&utility, "monitor-binary").unwrap();

    let toml = format!(
        r#"
authority_address = "10.0.0.1"
replica_address = "10.0.0.2"
cache_address = "10.0.0.3"
edge_address = "10.0.0.4"
repo_org = "example.org"
repos = ["software", "data"]
cache_allow = ["10.0.0.0/24"]
scripts_dir = '{}'
{}
"#,
        scripts.display(),
        extra
    );
    let config = parse_config(&toml).expect("fixture config");
    Fixture {
        _dir: dir,
        config,
        utility,
    }
}

/// Session where the authority has produced two public keys.
fn keyed_session() -> MockSession {
    MockSession::new()
        .with_path(Role::Authority, "/etc/cvmfs/keys")
        .respond(
            Role::Authority,
            "ls -1",
            SessionOutput::ok(
                "data.example.org.pub\ndata.example.org.masterkey\nsoftware.example.org.pub\n",
            ),
        )
        .with_remote_file(Role::Authority, "/etc/cvmfs/keys/data.example.org.pub", "KEY-DATA")
        .with_remote_file(
            Role::Authority,
            "/etc/cvmfs/keys/software.example.org.pub",
            "KEY-SOFTWARE",
        )
}

fn orchestrator(fx: &Fixture, session: MockSession) -> PhaseOrchestrator<MockSession> {
    PhaseOrchestrator::new(fx.config.clone(), RemoteExecutor::new(session), &fx.utility)
}

fn position(calls: &[MockCall], pred: impl Fn(&MockCall) -> bool) -> Option<usize> {
    calls.iter().position(pred)
}

fn runs_script(call: &MockCall, role: Role, script: &str) -> bool {
    matches!(call, MockCall::Run { role: r, command, .. } if *r == role && command.contains(script))
}

// ============================================================================
// Idempotency guard
// ============================================================================

#[tokio::test]
async fn test_clean_run_executes_phases_in_order() {
    let fx = fixture("");
    let orch = orchestrator(&fx, keyed_session());

    let report = orch.run(false).await.expect("clean run succeeds");
    assert_eq!(
        report.phases(),
        vec![
            Phase::DistributeArtifacts,
            Phase::ConfigureAuthority,
            Phase::DistributeCredentials,
            Phase::ConfigureReplica,
            Phase::ConfigureCache,
            Phase::ConfigureEdge,
        ]
    );
    assert!(report.succeeded());

    let session = orch.executor().session();
    let calls = session.calls();

    // Credentials reach the replica before its setup script runs.
    let last_key_push = calls
        .iter()
        .rposition(|c| {
            matches!(c, MockCall::CopyTo { role: Role::Replica, remote, .. }
                if remote.ends_with(".pub"))
        })
        .expect("keys pushed to replica");
    let replica_setup = position(&calls, |c| runs_script(c, Role::Replica, "replica-setup.sh"))
        .expect("replica setup ran");
    assert!(last_key_push < replica_setup);

    let authority_setup =
        position(&calls, |c| runs_script(c, Role::Authority, "authority-setup.sh")).unwrap();
    let key_listing = position(&calls, |c| runs_script(c, Role::Authority, "ls -1")).unwrap();
    assert!(authority_setup < key_listing);

    assert_eq!(
        session.pushed_file(Role::Edge, "/etc/cvmfs/keys/software.example.org.pub").as_deref(),
        Some("KEY-SOFTWARE")
    );
    assert!(session
        .pushed_file(Role::Replica, "/etc/cvmfs/keys/data.example.org.masterkey")
        .is_none());
    assert_eq!(
        session.pushed_file(Role::Edge, "provision/tierup").as_deref(),
        Some("monitor-binary")
    );
    assert!(session.pushed_file(Role::Cache, "provision/tierup").is_none());
    let index = session
        .pushed_file(Role::Replica, "/var/www/html/index.html")
        .expect("index published");
    assert!(index.contains("software.example.org"));
    assert!(session
        .commands_for(Role::Replica)
        .iter()
        .any(|c| c.contains("pubkeys.tar.gz")));

    // No population unless enabled.
    assert!(!calls.iter().any(|c| {
        matches!(c, MockCall::Run { command, .. } if command.contains("populate-repo.sh"))
    }));
}

#[tokio::test]
async fn test_blocked_run_issues_no_mutating_calls() {
    let fx = fixture("");
    let session = keyed_session().with_path(Role::Edge, "/cvmfs");
    let orch = orchestrator(&fx, session);

    let err = orch.run(false).await.unwrap_err();
    match err {
        OrchestratorError::AlreadyConfigured(roles) => assert_eq!(roles, vec![Role::Edge]),
        other => panic!("unexpected error: {:?}", other),
    }

    let history = orch.executor().history();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|c| c.kind == CallKind::Probe));
    assert!(orch.executor().mutating_calls().is_empty());
    assert!(orch.report_snapshot().await.records().is_empty());
}

#[tokio::test]
async fn test_guard_names_every_configured_host() {
    let fx = fixture("");
    let session = keyed_session()
        .with_path(Role::Authority, "/cvmfs")
        .with_path(Role::Cache, "/etc/squid");
    let orch = orchestrator(&fx, session);

    match orch.run(false).await {
        Err(OrchestratorError::AlreadyConfigured(roles)) => {
            assert_eq!(roles, vec![Role::Authority, Role::Cache]);
        }
        other => panic!("expected guard refusal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_host_stops_guard() {
    let fx = fixture("");
    let session = keyed_session().respond_with(Some(Role::Edge), "", |_| {
        SessionOutput::failed(255, "ssh: connect to host 10.0.0.4 port 22: Connection refused")
    });
    let orch = orchestrator(&fx, session);

    match orch.run(false).await {
        Err(OrchestratorError::Remote(RemoteError::Unreachable { host, output })) => {
            assert_eq!(host, "root@10.0.0.4");
            assert!(output.contains("Connection refused"));
        }
        other => panic!("expected unreachable edge, got {:?}", other),
    }
    assert!(orch.executor().mutating_calls().is_empty());
    assert!(orch.report_snapshot().await.records().is_empty());
}

// ============================================================================
// Fail-fast and timing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_failing_phase_stops_the_run() {
    let fx = fixture("");
    let session = keyed_session()
        .respond(
            Role::Cache,
            "bash provision/cache-setup.sh",
            SessionOutput::failed(2, "squid: bad acl line 4"),
        )
        .with_latency(Duration::from_secs(1));
    let orch = orchestrator(&fx, session);

    let err = orch.run(false).await.unwrap_err();
    match &err {
        OrchestratorError::Remote(RemoteError::CommandFailed { code, output, .. }) => {
            assert_eq!(code, "2");
            assert_eq!(output, "squid: bad acl line 4");
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let report = orch.report_snapshot().await;
    assert_eq!(report.failed_phase(), Some(Phase::ConfigureCache));
    assert_eq!(report.phases().last(), Some(&Phase::ConfigureCache));
    assert!(!report.phases().contains(&Phase::ConfigureEdge));

    let sum: Duration = report.records().iter().map(|r| r.elapsed).sum();
    assert_eq!(report.total_elapsed(), sum);
    // The failing phase ran one call of simulated latency.
    let failed = report.records().last().unwrap();
    assert!(!failed.succeeded);
    assert_eq!(failed.elapsed, Duration::from_secs(1));

    let edge_commands = orch.executor().session().commands_for(Role::Edge);
    assert!(!edge_commands.iter().any(|c| c.contains("edge-setup.sh")));
}

#[tokio::test]
async fn test_missing_keys_is_environment_error() {
    let fx = fixture("");
    let session = MockSession::new().with_path(Role::Authority, "/etc/cvmfs/keys");
    let orch = orchestrator(&fx, session);

    let err = orch.run(false).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Environment(_)));
    let report = orch.report_snapshot().await;
    assert_eq!(report.failed_phase(), Some(Phase::DistributeCredentials));
    assert!(orch
        .executor()
        .session()
        .commands_for(Role::Replica)
        .iter()
        .all(|c| !c.contains("replica-setup.sh")));
}

#[tokio::test]
async fn test_missing_key_dir_is_environment_error() {
    let fx = fixture("");
    let orch = orchestrator(&fx, MockSession::new());

    let err = orch.fan_out_keys().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Environment(_)), "{:?}", err);
    assert!(err.to_string().contains("/etc/cvmfs/keys"));
    assert!(orch
        .executor()
        .session()
        .commands_for(Role::Authority)
        .iter()
        .all(|c| !c.starts_with("ls")));
}

#[tokio::test]
async fn test_missing_local_script_touches_nothing() {
    let fx = fixture("");
    fs::remove_file(fx.config.scripts_dir.join("cache-setup.sh")).unwrap();
    let orch = orchestrator(&fx, keyed_session());

    assert!(matches!(
        orch.run(false).await,
        Err(OrchestratorError::Environment(_))
    ));
    assert!(orch.executor().history().is_empty());
}

// ============================================================================
// Re-imaging, publisher, population
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_run_reimages_then_guards() {
    let fx = fixture(
        "base_image = \"ubuntu-22.04\"\nsettle_secs = 30\nedge_server = \"cvmfs-edge\"",
    );
    let orch = orchestrator(&fx, keyed_session());

    let started = Instant::now();
    let report = orch.run(true).await.expect("reset run succeeds");
    assert_eq!(report.phases().first(), Some(&Phase::RebuildHosts));
    assert_eq!(report.phases().get(1), Some(&Phase::DistributeArtifacts));
    assert!(report.records()[0].elapsed >= Duration::from_secs(30));
    assert!(started.elapsed() >= Duration::from_secs(30));

    let calls = orch.executor().session().calls();
    let rebuilds: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            MockCall::Local { program, args } => Some((program.clone(), args.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(rebuilds.len(), 4);
    assert!(rebuilds
        .iter()
        .all(|(p, a)| p == "openstack" && a.contains(&"ubuntu-22.04".to_string())));
    assert_eq!(rebuilds[3].1.last().map(String::as_str), Some("cvmfs-edge"));
    assert_eq!(
        calls.iter().filter(|c| matches!(c, MockCall::Forget { .. })).count(),
        4
    );

    // Marker checks follow the last re-image and precede every remote change.
    let history = orch.executor().history();
    let last_local = history.iter().rposition(|c| c.kind == CallKind::Local).unwrap();
    let probes: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, c)| c.command.starts_with("test -d"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(probes.len(), 4);
    assert!(probes.iter().all(|&i| i > last_local));
    let first_remote_change = history
        .iter()
        .position(|c| c.kind.is_mutating() && c.kind != CallKind::Local)
        .unwrap();
    assert!(probes.iter().all(|&i| i < first_remote_change));
}

#[tokio::test(start_paused = true)]
async fn test_reset_refused_when_marker_survives_reimage() {
    let fx = fixture("base_image = \"ubuntu-22.04\"\nsettle_secs = 30");
    let session = keyed_session().with_path(Role::Cache, "/etc/squid");
    let orch = orchestrator(&fx, session);

    match orch.run(true).await {
        Err(OrchestratorError::AlreadyConfigured(roles)) => assert_eq!(roles, vec![Role::Cache]),
        other => panic!("expected guard refusal, got {:?}", other),
    }

    assert_eq!(orch.report_snapshot().await.phases(), vec![Phase::RebuildHosts]);
    let mutating = orch.executor().mutating_calls();
    assert_eq!(mutating.len(), 4);
    assert!(mutating.iter().all(|c| c.kind == CallKind::Local));
}

#[tokio::test]
async fn test_reset_without_base_image_refused_before_remote_calls() {
    let fx = fixture("");
    let orch = orchestrator(&fx, keyed_session());
    assert!(matches!(
        orch.run(true).await,
        Err(OrchestratorError::Environment(_))
    ));
    assert!(orch.executor().history().is_empty());
}

#[tokio::test]
async fn test_custom_publisher_and_population() {
    let fx = fixture("publisher_account = \"publisher\"\npopulate_repos = true");
    let orch = orchestrator(&fx, keyed_session());

    let report = orch.run(false).await.expect("run succeeds");
    assert_eq!(report.phases().last(), Some(&Phase::PopulateContent));

    let calls = orch.executor().session().calls();
    let create = position(&calls, |c| runs_script(c, Role::Authority, "useradd")).unwrap();
    let seed = position(&calls, |c| runs_script(c, Role::Authority, "authorized_keys")).unwrap();
    let setup =
        position(&calls, |c| runs_script(c, Role::Authority, "authority-setup.sh")).unwrap();
    assert!(create < seed && seed < setup);

    let populate: Vec<_> = calls
        .iter()
        .filter_map(|c| match c {
            MockCall::Run {
                role: Role::Authority,
                account,
                command,
            } if command.contains("populate-repo.sh") => Some((account.clone(), command.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(populate.len(), 2);
    assert!(populate.iter().all(|(account, _)| account == "publisher"));
    assert!(populate[0].1.ends_with("./content/software software.example.org"));
}

// ============================================================================
// Standalone phases
// ============================================================================

#[tokio::test]
async fn test_standalone_key_distribution() {
    let fx = fixture("");
    let orch = orchestrator(&fx, keyed_session());

    let artifacts = orch.fan_out_keys().await.expect("keys distributed");
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0].name, "data.example.org.pub");
    assert_eq!(artifacts[0].origin, "/etc/cvmfs/keys/data.example.org.pub");
    assert_eq!(artifacts[0].destinations.len(), 2);

    let edge = orch.executor().session().commands_for(Role::Edge);
    assert!(edge.contains(&"chmod 0644 /etc/cvmfs/keys/data.example.org.pub".to_string()));
}

#[tokio::test]
async fn test_standalone_phase_skips_guard() {
    let fx = fixture("");
    let session = keyed_session().with_path(Role::Edge, "/cvmfs");
    let orch = orchestrator(&fx, session);

    orch.configure_edge().await.expect("edge setup re-runs");
    assert_eq!(orch.report_snapshot().await.phases(), vec![Phase::ConfigureEdge]);
    assert!(orch.configure_edge().await.is_err());
}

// ============================================================================
// End-to-end propagation
// ============================================================================

/// Edge sees the new mtime `delay` after the publish command ran.
fn propagating_session(delay: Duration, initially_present: bool) -> MockSession {
    let published_at: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));
    let publish_mark = Rc::clone(&published_at);
    let edge_view = Rc::clone(&published_at);

    MockSession::new()
        .respond_with(Some(Role::Authority), "bash provision/publish-change.sh", move |_| {
            publish_mark.set(Some(Instant::now()));
            SessionOutput::ok("published")
        })
        .respond_with(Some(Role::Edge), "stat -c %Y", move |_| {
            match edge_view.get() {
                Some(at) if at.elapsed() >= delay => SessionOutput::ok("1700000100\n"),
                _ if initially_present => SessionOutput::ok("1700000000\n"),
                _ => SessionOutput::ok("absent\n"),
            }
        })
}

#[tokio::test(start_paused = true)]
async fn test_update_observes_propagation() {
    let fx = fixture("");
    let orch = orchestrator(&fx, propagating_session(Duration::from_secs(5), true));
    let mut monitor = ConvergenceMonitor::new(IntervalTicker::default(), Vec::new());

    let outcome = orch.test_update(None, &mut monitor).await.expect("update converges");
    assert_eq!(outcome.state, WatchState::Modified);
    assert!(outcome.elapsed >= Duration::from_secs(5));
    assert!(outcome.elapsed <= Duration::from_secs(6));

    let edge_probe = orch.executor().session().commands_for(Role::Edge);
    assert!(edge_probe[0].contains("/cvmfs/software.example.org/convergence-probe.txt"));

    let output = String::from_utf8(monitor.into_output()).unwrap();
    assert!(output.contains('\r'));
    assert!(output.contains("modified at "));
}

#[tokio::test(start_paused = true)]
async fn test_update_catches_instant_propagation() {
    let fx = fixture("");
    let orch = orchestrator(&fx, propagating_session(Duration::ZERO, true));
    let mut monitor = ConvergenceMonitor::new(IntervalTicker::default(), Vec::new());

    let outcome = orch
        .test_update(Some("software"), &mut monitor)
        .await
        .expect("update converges");
    assert_eq!(outcome.state, WatchState::Modified);
    assert_eq!(outcome.elapsed, Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_update_reports_creation_of_new_file() {
    let fx = fixture("");
    let orch = orchestrator(&fx, propagating_session(Duration::from_secs(2), false));
    let mut monitor = ConvergenceMonitor::new(IntervalTicker::default(), Vec::new());

    let outcome = orch.test_update(Some("data"), &mut monitor).await.unwrap();
    assert_eq!(outcome.state, WatchState::Created);

    let publish = orch.executor().session().commands_for(Role::Authority);
    assert!(publish
        .iter()
        .any(|c| c == "bash provision/publish-change.sh data.example.org convergence-probe.txt"));
}

#[tokio::test]
async fn test_update_unknown_repo_is_config_error() {
    let fx = fixture("");
    let orch = orchestrator(&fx, MockSession::new());
    let mut monitor = ConvergenceMonitor::new(IntervalTicker::default(), Vec::new());

    let err = orch
        .test_update(Some("nope"), &mut monitor)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(orch.executor().history().is_empty());
}
