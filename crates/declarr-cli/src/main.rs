use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use declarr_arr::{ArrAdapter, ArrClient};
use declarr_config::{load as load_config, load_desired, AppConfig, InstanceConfig};
use declarr_engine::{run_pass, PassOptions, PassReport};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Reconcile media-management service configuration against a declared
/// desired state.
#[derive(Debug, Parser)]
#[command(name = "declarr", version)]
struct Args {
    /// Path to the declarr configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the desired-state file.
    #[arg(long)]
    state: PathBuf,

    /// Only reconcile the named instance.
    #[arg(long)]
    instance: Option<String>,

    /// Compute and report changes without applying them.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The subscriber has to exist before the config loads, or the
    // config-load events vanish. The configured level is swapped in
    // afterwards unless RUST_LOG already pinned one.
    let filter_handle = init_tracing();
    let config = load_config(args.config.as_deref())?;
    if let Some(filter) = config_filter(
        std::env::var_os(EnvFilter::DEFAULT_ENV).is_some(),
        &config.telemetry.log_level,
    ) {
        filter_handle.reload(filter)?;
    }

    let desired = load_desired(&args.state)?;

    let instances = selected_instances(&config, args.instance.as_deref());
    if instances.is_empty() {
        anyhow::bail!(match args.instance {
            Some(name) => format!("no configured instance named {name}"),
            None => "no instances configured".to_string(),
        });
    }

    let cancel = CancellationToken::new();
    spawn_interrupt_watcher(cancel.clone());

    let options = PassOptions {
        ownership_label: config.reconcile.ownership_label.clone(),
        dry_run: args.dry_run,
    };
    let pass_timeout = Duration::from_secs(config.reconcile.pass_timeout_secs);

    let mut fatal = false;
    let mut degraded = false;

    for instance in instances {
        if cancel.is_cancelled() {
            warn!(target: "cli", instance = %instance.name, "interrupted; skipping");
            fatal = true;
            break;
        }

        match reconcile_instance(instance, &desired, &options, &cancel, pass_timeout).await {
            Ok(report) => {
                log_report(&report);
                degraded |= report.degraded();
            }
            Err(e) => {
                error!(target: "cli", instance = %instance.name, error = %format!("{e:#}"), "pass failed");
                fatal = true;
            }
        }
    }

    std::process::exit(exit_code(fatal, degraded));
}

async fn reconcile_instance(
    instance: &InstanceConfig,
    desired: &declarr_domain::DesiredState,
    options: &PassOptions,
    cancel: &CancellationToken,
    pass_timeout: Duration,
) -> Result<PassReport> {
    let client = ArrClient::builder()
        .base_url(&instance.base_url)
        .api_key(&instance.api_key)
        .insecure_tls(instance.insecure_tls)
        .build()?;
    let adapter = ArrAdapter::new(&instance.name, client);

    // Deadline for this pass only; a fired deadline lets the executor
    // finish the in-flight call and return its partial result.
    let pass_cancel = cancel.child_token();
    let deadline = {
        let token = pass_cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(pass_timeout).await;
            warn!(target: "cli", "pass deadline reached; cancelling");
            token.cancel();
        })
    };

    let outcome = run_pass(&adapter, desired, options, &pass_cancel).await;
    deadline.abort();
    outcome
}

fn selected_instances<'a>(config: &'a AppConfig, filter: Option<&str>) -> Vec<&'a InstanceConfig> {
    config
        .instances
        .iter()
        .filter(|instance| filter.map_or(true, |name| instance.name == name))
        .collect()
}

fn log_report(report: &PassReport) {
    info!(
        target: "cli",
        instance = %report.instance,
        service = %report.service,
        dry_run = report.dry_run,
        creates = report.creates,
        updates = report.updates,
        deletes = report.deletes,
        collisions = report.collisions,
        applied = report.result.applied,
        failed = report.result.failed,
        skipped = report.result.skipped,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "pass finished"
    );
    for apply_error in &report.result.errors {
        warn!(target: "cli", instance = %report.instance, "failed change: {apply_error}");
    }
}

/// 0 converged, 1 fatal, 2 degraded (partial failure, re-runnable).
fn exit_code(fatal: bool, degraded: bool) -> i32 {
    if fatal {
        1
    } else if degraded {
        2
    } else {
        0
    }
}

fn spawn_interrupt_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(target: "cli", "interrupt received; finishing current call");
            cancel.cancel();
        }
    });
}

fn init_tracing() -> reload::Handle<EnvFilter, Registry> {
    let fmt_layer = fmt::layer().with_target(true).with_level(true);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (env_filter, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    handle
}

/// RUST_LOG always wins; the configured level only fills in when the
/// environment says nothing.
fn config_filter(env_set: bool, config_level: &str) -> Option<EnvFilter> {
    if env_set {
        None
    } else {
        Some(EnvFilter::new(config_level))
    }
}
