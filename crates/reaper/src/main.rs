//! reaper - Retire old machines from a CloudAPI account
//!
//! Wires together:
//! - Configuration loading (file + command line + environment)
//! - Logging
//! - The CloudAPI gateway
//! - The retirement engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reaper_cloud_api::Machine;
use reaper_cloud_triton::TritonGateway;
use reaper_config::{ConfigOverrides, ReaperConfig, load_config_with_overrides};
use reaper_core::{EngineSettings, RetirementEngine, RetirementReport};
use reaper_util::{
    MOCK_TIME_ENV_VAR, age_at, default_config_path, format_duration, is_mock_time_active, now_utc,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// reaper - Delete machines that have outlived their usefulness
#[derive(Parser, Debug)]
#[command(name = "reaper")]
#[command(about = "Delete old machines from a CloudAPI account", long_about = None)]
struct Args {
    /// Log mutating actions instead of performing them
    #[arg(short, long)]
    dry_run: bool,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,

    /// CloudAPI endpoint
    #[arg(short = 'u', long, env = "SDC_URL")]
    sdc_url: Option<String>,

    /// Account login
    #[arg(short, long, env = "SDC_ACCOUNT")]
    account: Option<String>,

    /// Key id registered with the account
    #[arg(short, long, env = "SDC_KEY_ID")]
    key_id: Option<String>,

    /// Path to the signing key
    #[arg(short = 'p', long, env = "SDC_KEY_PATH")]
    key_path: Option<PathBuf>,

    /// Configuration file path (default: ~/.config/reaper/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Seconds to wait after each direct deletion
    #[arg(long, value_name = "SECONDS")]
    pause: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Command {
    /// List every machine in the account
    ListMachines,

    /// Delete (or request deletion of) machines older than --old-age hours
    DeleteOldMachines {
        /// Age threshold in hours
        #[arg(long, default_value_t = 1)]
        old_age: u64,

        /// Who is asked to delete machines the API cannot (default: notify_address from config)
        #[arg(long)]
        contact_mail_address: Option<String>,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            sdc_url: self.sdc_url.clone(),
            account: self.account.clone(),
            key_id: self.key_id.clone(),
            key_path: self.key_path.clone(),
            pause: self.pause,
            dry_run: self.dry_run,
            verbose: self.verbose,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn run(command: Command, config: &ReaperConfig) -> Result<()> {
    let gateway = TritonGateway::new(config).context("Failed to set up CloudAPI gateway")?;
    let engine = RetirementEngine::new(Arc::new(gateway), EngineSettings::from(config));

    match command {
        Command::ListMachines => {
            let machines = engine
                .list_machines()
                .await
                .context("Failed to list machines")?;
            print_machines(&machines);
        }
        Command::DeleteOldMachines {
            old_age,
            contact_mail_address,
        } => {
            let notify_address = contact_mail_address
                .or_else(|| config.notify_address.clone())
                .unwrap_or_default();

            let report = engine
                .delete_old_machines(old_age, &notify_address)
                .await
                .with_context(|| format!("Failed to delete machines older than {}h", old_age))?;
            print_report(&report);
        }
    }

    Ok(())
}

fn print_machines(machines: &[Machine]) {
    let now = now_utc();
    for machine in machines {
        let age = machine
            .created_at()
            .map(|created| format_duration(age_at(created, now)))
            .unwrap_or_else(|_| "?".into());

        println!(
            "{}\t{}\t{}\t{}\t{}",
            machine.id,
            machine.name.as_deref().unwrap_or("-"),
            machine.state,
            machine.created,
            age
        );
    }
}

fn print_report(report: &RetirementReport) {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    println!(
        "{}deleted: {}, deferred: {}, protected: {}, retained: {}",
        prefix,
        report.deleted().len(),
        report.deferred().len(),
        report.protected().len(),
        report.retained().len()
    );
    if report.deletion_requested {
        println!("Manual deletion requested for: {:?}", report.deferred());
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = load_config_with_overrides(&args.config, args.overrides())
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    init_logging(config.verbose);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        sdc_url = %config.cloud.sdc_url,
        account = %config.cloud.account,
        dry_run = config.dry_run,
        "reaper starting"
    );

    if is_mock_time_active() {
        warn!(
            env_var = MOCK_TIME_ENV_VAR,
            now = %now_utc(),
            "Mock time active, machine ages are computed against it"
        );
    }

    match run(args.command, &config).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            error!(error = %format!("{:#}", e), "reaper failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
