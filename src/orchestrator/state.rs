//! Phase tracking for a provisioning run.
//!
//! **Architecture**:
//! - `Phase`: the eight ordered bring-up phases
//! - `PhaseRecord`: timing and outcome of one executed phase
//! - `RunReport`: the records of one run, in order, with transition checks
//!
//! A run may start at any phase (standalone subcommands), but once started
//! every further phase must be a legal successor of the last one, and only
//! after that one succeeded.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::system::format_duration;

/// Bring-up phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Phase {
    /// Phase 1: re-image every host from the base image
    RebuildHosts,

    /// Phase 2: work directories, setup scripts, monitor utility
    DistributeArtifacts,

    /// Phase 3: publisher account and authority setup
    ConfigureAuthority,

    /// Phase 4: public keys from authority to replica and edge
    DistributeCredentials,

    /// Phase 5: replica setup and documentation
    ConfigureReplica,

    /// Phase 6: caching proxy setup
    ConfigureCache,

    /// Phase 7: edge client setup
    ConfigureEdge,

    /// Phase 8: initial repository content
    PopulateContent,
}

impl Phase {
    pub const ALL: [Phase; 8] = [
        Phase::RebuildHosts,
        Phase::DistributeArtifacts,
        Phase::ConfigureAuthority,
        Phase::DistributeCredentials,
        Phase::ConfigureReplica,
        Phase::ConfigureCache,
        Phase::ConfigureEdge,
        Phase::PopulateContent,
    ];

    /// 1-based position in the pipeline.
    pub fn ordinal(&self) -> u8 {
        match self {
            Phase::RebuildHosts => 1,
            Phase::DistributeArtifacts => 2,
            Phase::ConfigureAuthority => 3,
            Phase::DistributeCredentials => 4,
            Phase::ConfigureReplica => 5,
            Phase::ConfigureCache => 6,
            Phase::ConfigureEdge => 7,
            Phase::PopulateContent => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::RebuildHosts => "rebuild-hosts",
            Phase::DistributeArtifacts => "distribute-artifacts",
            Phase::ConfigureAuthority => "configure-authority",
            Phase::DistributeCredentials => "distribute-credentials",
            Phase::ConfigureReplica => "configure-replica",
            Phase::ConfigureCache => "configure-cache",
            Phase::ConfigureEdge => "configure-edge",
            Phase::PopulateContent => "populate-content",
        }
    }

    /// Phases that may directly follow this one.
    pub fn valid_next_phases(&self) -> Vec<Phase> {
        match self {
            Phase::RebuildHosts => vec![Phase::DistributeArtifacts],
            Phase::DistributeArtifacts => vec![Phase::ConfigureAuthority],
            Phase::ConfigureAuthority => vec![Phase::DistributeCredentials],
            Phase::DistributeCredentials => vec![Phase::ConfigureReplica],
            Phase::ConfigureReplica => vec![Phase::ConfigureCache],
            Phase::ConfigureCache => vec![Phase::ConfigureEdge],
            Phase::ConfigureEdge => vec![Phase::PopulateContent],
            Phase::PopulateContent => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        self.valid_next_phases().contains(&next)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and outcome of one phase. A failing phase is recorded with the
/// time it ran before failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub elapsed: Duration,
    pub succeeded: bool,
}

/// Ordered phase records of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    records: Vec<PhaseRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `next` may start now.
    pub fn check_can_begin(&self, next: Phase) -> Result<(), OrchestratorError> {
        let Some(last) = self.records.last() else {
            return Ok(());
        };
        if !last.succeeded || !last.phase.can_transition_to(next) {
            return Err(OrchestratorError::InvalidTransition {
                from: if last.succeeded {
                    last.phase.to_string()
                } else {
                    format!("{} (failed)", last.phase)
                },
                to: next.to_string(),
            });
        }
        Ok(())
    }

    /// Append a finished phase.
    pub fn record(&mut self, record: PhaseRecord) -> Result<(), OrchestratorError> {
        self.check_can_begin(record.phase)?;
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.records.iter().map(|r| r.phase).collect()
    }

    /// Sum of all recorded phases, including a partial failing one.
    pub fn total_elapsed(&self) -> Duration {
        self.records.iter().map(|r| r.elapsed).sum()
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        self.records.iter().find(|r| !r.succeeded).map(|r| r.phase)
    }

    pub fn succeeded(&self) -> bool {
        self.failed_phase().is_none()
    }

    /// One line per phase plus the total, for the end-of-run summary.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .records
            .iter()
            .map(|r| {
                format!(
                    "phase {} {:<24} {:>9}  {}",
                    r.phase.ordinal(),
                    r.phase.as_str(),
                    format_duration(r.elapsed),
                    if r.succeeded { "ok" } else { "FAILED" }
                )
            })
            .collect();
        lines.push(format!("total {}", format_duration(self.total_elapsed())));
        lines
    }
}
