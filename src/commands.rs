//! CLI command handlers.
//!
//! Every handler loads the layered configuration, applies the global CLI
//! flags on top, and then drives one piece of the pipeline.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ledgerline_core::{load_config, Config};
use ledgerline_deployer::{decide, Accounts, Decision, FsArtifactRegistry, RecordStore};
use ledgerline_executor::{
    Address, ExecutorConfig, InteractiveConfirm, OwnerActionStrategy, PendingActionLedger,
    QueueForLater, StepExecutor, StepOutcome,
};
use ledgerline_planner::{Manifest, ManifestPaths};
use ledgerline_reconciler::{plan, Pipeline, PipelineConfig, RegistryReport, RunReport, SnapshotReport};
use tracing::{info, warn};

use crate::cli::{Commands, GlobalArgs};
use crate::rpc::RpcBackend;

/// Execute a CLI command.
///
/// # Errors
///
/// Returns any configuration, backend, consistency or storage failure.
/// Actions queued for the owner are not errors.
pub async fn execute_command(command: Commands, global: &GlobalArgs) -> Result<()> {
    let config = load_settings(global)?;
    info!(
        network = %config.network,
        dry_run = config.dry_run,
        dir = %global.deployment_dir.display(),
        "Configuration loaded"
    );

    match command {
        Commands::Deploy => cmd_deploy(&config).await,
        Commands::SyncRegistry => cmd_sync_registry(&config).await,
        Commands::Snapshot => cmd_snapshot(&config).await,
        Commands::Pending { incomplete } => cmd_pending(&config, incomplete).await,
        Commands::Plan => cmd_plan(&config),
    }
}

/// Layered configuration with the CLI flags applied last.
///
/// # Errors
///
/// Returns an error if the config file or environment is invalid, or if the
/// overrides produce an invalid configuration.
pub fn load_settings(global: &GlobalArgs) -> Result<Config> {
    let mut config = load_config(&global.deployment_dir).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            global.deployment_dir.display()
        )
    })?;
    apply_overrides(&mut config, global);
    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, global: &GlobalArgs) {
    if let Some(network) = &global.network {
        config.network.clone_from(network);
    }
    if let Some(url) = &global.rpc_url {
        config.rpc.url.clone_from(url);
    }
    if let Some(account) = &global.account {
        config.accounts.deployer.clone_from(account);
    }
    if let Some(concurrency) = global.concurrency {
        config.concurrency = concurrency;
    }
    config.dry_run |= global.dry_run;
    config.interactive |= global.interactive;
    config.use_nonce_sequencer |= global.use_nonce_sequencer;
}

fn load_manifest(config: &Config) -> Result<Manifest> {
    let files = &config.files;
    Manifest::load(&ManifestPaths {
        deployment: &files.deployment,
        config: &files.config,
        params: &files.params,
        steps: &files.steps,
    })
    .context("Failed to load manifest")
}

fn open_record(path: &Path) -> Result<RecordStore> {
    RecordStore::open(path)
        .with_context(|| format!("Failed to open deployment record {}", path.display()))
}

/// Dry runs keep queued actions in memory so the ledger file is untouched.
fn open_ledger(config: &Config) -> Result<Arc<PendingActionLedger>> {
    if config.dry_run {
        return Ok(Arc::new(PendingActionLedger::in_memory()));
    }
    PendingActionLedger::open(&config.files.ledger)
        .map(Arc::new)
        .with_context(|| {
            format!(
                "Failed to open owner action ledger {}",
                config.files.ledger.display()
            )
        })
}

fn build_pipeline(config: &Config, ledger: &Arc<PendingActionLedger>) -> Result<Pipeline> {
    if config.accounts.deployer.trim().is_empty() {
        bail!("No deployer account configured; set accounts.deployer or pass --account");
    }
    let account = Address::new(&config.accounts.deployer);

    let backend = RpcBackend::new(&config.rpc).context("Failed to create RPC client")?;
    let strategy: Arc<dyn OwnerActionStrategy> = if config.interactive {
        Arc::new(InteractiveConfirm::on_terminal(Arc::clone(ledger)))
    } else {
        Arc::new(QueueForLater::new(Arc::clone(ledger)))
    };

    let executor_config = ExecutorConfig {
        account: account.clone(),
        dry_run: config.dry_run,
        concurrency: config.concurrency,
        deploy_gas_limit: config.gas.deploy_limit,
        method_call_gas_limit: config.gas.method_call_limit,
        max_price_wei: config.gas.max_price_wei,
        explorer_url: config.explorer_url.clone(),
    };
    let mut executor = StepExecutor::new(Arc::new(backend), executor_config, strategy);
    if config.use_nonce_sequencer {
        executor = executor.with_nonce_sequencer();
    }

    Ok(Pipeline::new(
        Arc::new(executor),
        Arc::new(FsArtifactRegistry::new(&config.files.build_dir)),
        Accounts::new(account, config.accounts.owner.as_deref().map(Address::new)),
        PipelineConfig::from(config),
    ))
}

/// Full run: deploy, configure, sync registry, refresh snapshot.
async fn cmd_deploy(config: &Config) -> Result<()> {
    let manifest = load_manifest(config)?;
    let mut store = open_record(&config.files.record)?;
    let ledger = open_ledger(config)?;
    let pipeline = build_pipeline(config, &ledger)?;

    let report = pipeline.run(&manifest, &mut store).await?;
    print_run(&report);
    print_queued(config, &ledger).await;
    Ok(())
}

async fn cmd_sync_registry(config: &Config) -> Result<()> {
    let store = open_record(&config.files.record)?;
    let ledger = open_ledger(config)?;
    let pipeline = build_pipeline(config, &ledger)?;

    match pipeline.sync_registry(store.record()).await? {
        Some(report) => print_registry(&report),
        None => println!("Registry is not configured or not deployed; nothing to sync"),
    }
    print_queued(config, &ledger).await;
    Ok(())
}

async fn cmd_snapshot(config: &Config) -> Result<()> {
    let store = open_record(&config.files.record)?;
    let ledger = open_ledger(config)?;
    let pipeline = build_pipeline(config, &ledger)?;

    match pipeline.refresh_snapshot(store.record()).await? {
        Some(report) => print_snapshot(&report),
        None => println!("Snapshot resource is not configured or not deployed"),
    }
    print_queued(config, &ledger).await;
    Ok(())
}

/// List the owner action ledger.
async fn cmd_pending(config: &Config, incomplete: bool) -> Result<()> {
    let ledger = PendingActionLedger::open(&config.files.ledger).with_context(|| {
        format!(
            "Failed to open owner action ledger {}",
            config.files.ledger.display()
        )
    })?;
    let entries = if incomplete {
        ledger.incomplete().await
    } else {
        ledger.entries().await
    };

    if entries.is_empty() {
        println!("No owner actions");
        return Ok(());
    }

    for (key, action) in &entries {
        let mark = if action.complete { "x" } else { " " };
        println!("[{mark}] {key}  {}: {}", action.target, action.action);
        println!("      data: {}", action.data);
        if let Some(link) = &action.link {
            println!("      {link}");
        }
    }
    println!("\n{} action(s)", entries.len());
    Ok(())
}

/// Print the deployment order with what would happen to each resource.
fn cmd_plan(config: &Config) -> Result<()> {
    let manifest = load_manifest(config)?;
    let store = open_record(&config.files.record)?;
    let record = store.record();
    let order = plan(&manifest, record)?;

    for (index, spec) in order.iter().enumerate() {
        let decision = decide(spec, manifest.deploy_flag(&spec.name), record)?;
        let action = match decision {
            Decision::Deploy(reason) => format!("deploy ({reason:?})").to_lowercase(),
            Decision::Reuse(address) => format!("reuse {address}"),
        };
        println!("{:>3}. {:<32} {action}", index + 1, spec.name);
    }
    Ok(())
}

fn describe(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::NoOp => "already in place".to_string(),
        StepOutcome::Submitted { id } => format!("submitted {id}"),
        StepOutcome::Queued { key } => format!("queued for owner ({key})"),
    }
}

fn print_run(report: &RunReport) {
    println!("Run {}", report.run_id);
    for deployed in &report.deploy.deployed {
        println!(
            "  deployed {:<32} {} ({:?})",
            deployed.name, deployed.address, deployed.reason
        );
    }
    println!("  reused {} resource(s)", report.deploy.reused.len());
    for step in &report.steps.steps {
        println!("  {} {}: {}", step.target, step.call, describe(&step.outcome));
    }
    if let Some(registry) = &report.registry {
        print_registry(registry);
    }
    if let Some(snapshot) = &report.snapshot {
        print_snapshot(snapshot);
    }
    println!(
        "  {} write(s), {} queued, {} already in place",
        report.writes(),
        report.stats.queued,
        report.stats.noops
    );
    if report.is_halted() {
        warn!("Registry import is waiting for the owner; later phases were skipped");
        println!("Halted: re-run once the owner has sent the queued registry import");
    }
}

fn print_registry(report: &RegistryReport) {
    println!(
        "  registry: {} imported, {} cache rebuild(s) {:?}",
        report.imported.len(),
        report.rebuilt_chunks.len(),
        report.rebuilt_chunks
    );
    for skipped in &report.skipped {
        println!(
            "  registry: skipped {} (missing {})",
            skipped.name,
            skipped.missing.join(", ")
        );
    }
    for (name, outcome) in &report.legacy {
        println!("  registry: {name}: {}", describe(outcome));
    }
}

fn print_snapshot(report: &SnapshotReport) {
    if report.decision.is_triggered() {
        println!(
            "  snapshot: {:?}: {}",
            report.decision.triggers,
            describe(&report.outcome)
        );
    } else {
        println!("  snapshot: fresh");
    }
}

async fn print_queued(config: &Config, ledger: &PendingActionLedger) {
    let pending = ledger.incomplete().await.len();
    if pending == 0 {
        return;
    }
    if config.dry_run {
        println!("{pending} owner action(s) would be queued (dry run, ledger not written)");
    } else {
        println!(
            "{pending} owner action(s) waiting in {}",
            config.files.ledger.display()
        );
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;

    fn global(dir: &Path) -> GlobalArgs {
        GlobalArgs {
            deployment_dir: dir.to_path_buf(),
            ..GlobalArgs::default()
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ledgerline.toml"),
            "network = \"sepolia\"\nconcurrency = 16\n",
        )
        .unwrap();

        let args = GlobalArgs {
            concurrency: Some(2),
            dry_run: true,
            account: Some("0xABC".to_string()),
            ..global(dir.path())
        };
        let config = load_settings(&args).unwrap();

        assert_eq!(config.network, "sepolia");
        assert_eq!(config.concurrency, 2);
        assert!(config.dry_run);
        assert_eq!(config.accounts.deployer, "0xABC");
        assert_eq!(config.files.record, dir.path().join("deployment-record.json"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let args = GlobalArgs {
            concurrency: Some(0),
            ..global(dir.path())
        };
        assert!(load_settings(&args).is_err());
    }

    #[test]
    fn test_missing_deployer_is_rejected() {
        let config = Config::default();
        let ledger = Arc::new(PendingActionLedger::in_memory());
        let err = build_pipeline(&config, &ledger).err().unwrap();
        assert!(err.to_string().contains("deployer"), "{err}");
    }

    #[test]
    fn test_dry_run_ledger_is_in_memory() {
        let config = Config {
            dry_run: true,
            ..Config::default()
        };
        let ledger = open_ledger(&config).unwrap();
        assert!(ledger.path().is_none());
    }

    #[tokio::test]
    async fn test_plan_and_pending_on_empty_deployment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("deployment.json"),
            r#"[
                {"name": "AddressResolver", "source": "AddressResolver"},
                {"name": "Issuer", "source": "Issuer", "args": [{"address_of": "AddressResolver"}]}
            ]"#,
        )
        .unwrap();
        let config = load_settings(&global(dir.path())).unwrap();

        cmd_plan(&config).unwrap();
        cmd_pending(&config, true).await.unwrap();

        assert!(!config.files.record.exists());
    }
}
