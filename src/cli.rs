//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// ledgerline - deploy and reconcile on-chain resources
#[derive(Parser, Debug)]
#[command(name = "ledgerline")]
#[command(version)]
#[command(about = "Deploy interdependent on-chain resources and keep them wired together")]
#[command(
    long_about = "ledgerline deploys the resources a manifest declares in dependency order, runs their configuration steps, \
                  keeps the address registry and dependent caches in sync, and refreshes the aggregate debt snapshot. \
                  Every run is idempotent: anything already in place is left alone."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand; each overrides the matching config value.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Network name, used for reporting and explorer links
    #[arg(long, global = true)]
    pub network: Option<String>,

    /// Directory holding the manifests, record and ledger
    #[arg(short = 'd', long, global = true, default_value = ".")]
    pub deployment_dir: PathBuf,

    /// Read everything, write nothing
    #[arg(long, global = true, default_value_t = false)]
    pub dry_run: bool,

    /// Maximum concurrent reads
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// JSON-RPC endpoint of the ledger
    #[arg(long, global = true)]
    pub rpc_url: Option<String>,

    /// Account writes are sent from
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Prompt for owner-only actions instead of only queueing them
    #[arg(short, long, global = true, default_value_t = false)]
    pub interactive: bool,

    /// Assign nonces locally
    #[arg(long, global = true, default_value_t = false)]
    pub use_nonce_sequencer: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Deploy, configure, sync the registry and refresh the snapshot
    Deploy,

    /// Import missing registry entries and rebuild stale caches
    SyncRegistry,

    /// Refresh the aggregate debt snapshot if it needs it
    Snapshot,

    /// List owner actions waiting in the ledger
    Pending {
        /// Only show actions not yet marked complete
        #[arg(long, default_value_t = false)]
        incomplete: bool,
    },

    /// Print the deployment order without touching the ledger
    Plan,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ledgerline",
            "deploy",
            "--dry-run",
            "--concurrency",
            "4",
            "--deployment-dir",
            "deployments/sepolia",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Deploy);
        assert!(cli.global.dry_run);
        assert_eq!(cli.global.concurrency, Some(4));
        assert_eq!(cli.global.deployment_dir, PathBuf::from("deployments/sepolia"));
    }

    #[test]
    fn test_pending_incomplete_flag() {
        let cli = Cli::try_parse_from(["ledgerline", "pending", "--incomplete"]).unwrap();
        assert_eq!(cli.command, Commands::Pending { incomplete: true });
        assert_eq!(cli.global.deployment_dir, PathBuf::from("."));
    }

    #[test]
    fn test_subcommand_names_are_kebab_case() {
        let cli = Cli::try_parse_from(["ledgerline", "sync-registry", "--interactive"]).unwrap();
        assert_eq!(cli.command, Commands::SyncRegistry);
        assert!(cli.global.interactive);
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["ledgerline"]).is_err());
    }
}
