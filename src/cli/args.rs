//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::Role;

/// tierup - bring up a four-tier content distribution deployment and check
/// that changes converge from the authority to the edge
#[derive(Parser, Debug)]
#[command(name = "tierup")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (default: ./tierup.toml, then the user
    /// and system config directories)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only show warnings and errors
    #[arg(long, short, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show remote command lines and their output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Re-image all hosts, then run the full setup
    ResetAll,

    /// Run the full setup on clean hosts
    SetupAll,

    /// Publish a test change at the authority and time its arrival at the edge
    TestUpdate {
        /// Repository to change (short or fully qualified name; default: first)
        #[arg(long)]
        repo: Option<String>,
    },

    /// Print fully qualified repository names
    ListRepos,

    /// Print the resolved configuration as TOML
    ShowConfig,

    /// Open a shell on the authority
    SshAuthority,

    /// Open a shell on the replica
    SshReplica,

    /// Open a shell on the cache
    SshCache,

    /// Open a shell on the edge
    SshEdge,

    /// Re-image all hosts (phase 1)
    RebuildVm,

    /// Copy setup scripts and the monitor utility (phase 2)
    CopyScripts,

    /// Copy public keys from the authority to the replica and edge (phase 4)
    CopyPubkeys,

    /// Run the role setup scripts (phases 3-7)
    RunScripts,

    /// Publish the repository index on the replica
    DocumentRepos,

    /// Publish initial repository content (phase 8)
    PopulateRepos,

    /// Watch a local file until it is created, modified or deleted
    Watch {
        /// File to watch
        path: PathBuf,
    },
}

impl Command {
    /// Target of an `ssh-<role>` command.
    pub fn ssh_role(&self) -> Option<Role> {
        match self {
            Command::SshAuthority => Some(Role::Authority),
            Command::SshReplica => Some(Role::Replica),
            Command::SshCache => Some(Role::Cache),
            Command::SshEdge => Some(Role::Edge),
            _ => None,
        }
    }

    /// Whether the command reads the deployment configuration.
    pub fn needs_config(&self) -> bool {
        !matches!(self, Command::Watch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_names() {
        let cli = Cli::try_parse_from(["tierup", "ssh-authority"]).unwrap();
        assert_eq!(cli.command.ssh_role(), Some(Role::Authority));

        let cli = Cli::try_parse_from(["tierup", "copy-pubkeys", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.command, Command::CopyPubkeys);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));

        let cli = Cli::try_parse_from(["tierup", "test-update", "--repo", "data"]).unwrap();
        assert_eq!(
            cli.command,
            Command::TestUpdate {
                repo: Some("data".into())
            }
        );
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        let err = Cli::try_parse_from(["tierup", "-q", "-v", "setup-all"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_watch_needs_no_config() {
        let cli = Cli::try_parse_from(["tierup", "watch", "/tmp/f"]).unwrap();
        assert!(!cli.command.needs_config());
    }
}
