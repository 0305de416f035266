use clap::{ArgGroup, Parser};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fleetd::config::{LockScope, SchedulerConfig};
use fleetd::daemon::Daemon;
use fleetd::error::{FleetError, Result};
use fleetd::lock::MemoryLockService;
use fleetd::logging::init_logging;
use fleetd::storage::{MemoryStorage, TENANT_TABLE};

#[derive(Parser, Debug)]
#[command(name = "fleetd")]
#[command(version)]
#[command(about = "Fleet-wide backend action scheduler")]
#[command(group(ArgGroup::new("mode").required(true).args(["action", "cron_action"])))]
struct Args {
    /// Action to run when triggered explicitly
    #[arg(long)]
    action: Option<String>,

    /// Action to run periodically for every tenant (accepts PING)
    #[arg(long)]
    cron_action: Option<String>,

    /// Run once against this site URI only, then exit
    #[arg(long, value_name = "SITE_URI")]
    filename: Option<String>,

    /// Parameter forwarded to every child, format "name=value"
    #[arg(long = "param", value_name = "NAME=VALUE")]
    params: Vec<String>,

    /// Serialize the action fleet-wide instead of per site
    #[arg(long)]
    global_lock: bool,

    /// Control bus address
    #[arg(long, default_value = "127.0.0.1:4040")]
    bus: String,

    /// Worker program started for each job
    #[arg(long, default_value = "fleetd-worker")]
    worker: PathBuf,

    /// Extra leading argument for the worker (repeatable)
    #[arg(long = "worker-arg", allow_hyphen_values = true)]
    worker_args: Vec<String>,

    /// Seconds between tenant sweeps
    #[arg(long, default_value = "300")]
    tick_interval: u64,

    /// Seed the in-process tenant table (repeatable)
    #[arg(long = "tenant", value_name = "SITE_URI")]
    tenants: Vec<String>,
}

fn parse_params(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|p| match p.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(FleetError::Config(format!(
                "invalid parameter {:?}, expected name=value",
                p
            ))),
        })
        .collect()
}

fn build_config(args: &Args) -> Result<SchedulerConfig> {
    let mut config = match (&args.action, &args.cron_action) {
        (_, Some(cron)) => SchedulerConfig::cron(cron.clone()),
        (Some(action), None) => SchedulerConfig::new(action.clone()),
        (None, None) => return Err(FleetError::Config("no action given".to_string())),
    };
    config.params = parse_params(&args.params)?;
    if let Some(site) = &args.filename {
        config = config.with_site(site.clone());
    }
    if args.global_lock {
        config = config.with_lock_scope(LockScope::Global);
    }
    config = config.with_child(args.worker.clone(), args.worker_args.clone());
    config.bus.addr = args.bus.clone();
    config.timing.tick_interval = Duration::from_secs(args.tick_interval);
    Ok(config)
}

async fn run(args: Args) -> Result<i32> {
    let log = init_logging();
    let config = build_config(&args)?;

    let storage = Arc::new(MemoryStorage::new());
    storage.create_table(TENANT_TABLE).await;
    for tenant in &args.tenants {
        storage.add_tenant(tenant).await;
    }
    let locks = Arc::new(MemoryLockService::new());

    let exit = Daemon::new(config, storage, locks)
        .with_log_handle(log)
        .run()
        .await?;
    Ok(exit.code())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let code = match run(args).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "fleetd failed");
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}
