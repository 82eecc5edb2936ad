//! # Dripfeed Host
//!
//! Single-binary host for the dispatch engine: load the deployment config,
//! open the tenant store, start the selected tenant jobs, run until ctrl-c,
//! then shut every job down gracefully.
//!
//! Usage:
//!   dripfeed                          # start all active tenants
//!   dripfeed --tenant acme            # start exactly this tenant
//!   dripfeed --all                    # start every stored tenant
//!   dripfeed --store ./tenants.json   # use a specific store file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dripfeed_core::{DripfeedConfig, FileStore};
use dripfeed_dispatch::{DispatchOptions, HttpDelivery, ReportPublisher, Supervisor, WebhookSink};

#[derive(Parser)]
#[command(
    name = "dripfeed",
    version,
    about = "💧 Dripfeed: multi-tenant recurring-message dispatcher"
)]
struct Cli {
    /// Deployment config file
    #[arg(long, default_value = "~/.dripfeed/config.toml")]
    config: String,

    /// Tenant store file (overrides the config)
    #[arg(long)]
    store: Option<String>,

    /// Start exactly these tenants (repeatable)
    #[arg(short, long)]
    tenant: Vec<String>,

    /// Start every stored tenant, active or not
    #[arg(long)]
    all: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "dripfeed=debug,dripfeed_core=debug,dripfeed_dispatch=debug"
    } else {
        "dripfeed=info,dripfeed_core=info,dripfeed_dispatch=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    // Deployment config: defaults apply when the file does not exist yet.
    let config_path = PathBuf::from(expand_path(&cli.config));
    let config = if config_path.exists() {
        DripfeedConfig::load_from(&config_path)?
    } else {
        DripfeedConfig::default()
    };

    let store_path = match &cli.store {
        Some(path) => PathBuf::from(expand_path(path)),
        None => config.store_path(),
    };
    let store = Arc::new(FileStore::new(&store_path));

    let delivery = Arc::new(HttpDelivery::new(&config.transport)?);
    let sink = Arc::new(WebhookSink::new(&config.transport)?);
    let publisher = ReportPublisher::new(sink, config.sinks.ops_url.clone());
    let supervisor = Supervisor::new(
        store.clone(),
        delivery,
        publisher,
        DispatchOptions::from_config(&config.dispatch),
    );

    println!("💧 Dripfeed v{}", env!("CARGO_PKG_VERSION"));
    println!("   📦 Store:    {}", store_path.display());
    println!("   🎯 Endpoint: {}", config.transport.endpoint_template);
    println!("   ⏱  Pacing:   {}s between targets", config.dispatch.pacing_secs);
    match &config.sinks.ops_url {
        Some(url) => println!("   📡 Ops sink: {url}"),
        None => println!("   📡 Ops sink: (none)"),
    }
    println!();

    // Which tenants to start: an explicit list wins, otherwise --all or the
    // active flag on each stored record.
    let stored = store.list()?;
    let selected: Vec<String> = if !cli.tenant.is_empty() {
        cli.tenant.clone()
    } else if cli.all {
        stored.iter().map(|t| t.tenant_id.clone()).collect()
    } else {
        stored
            .iter()
            .filter(|t| t.active)
            .map(|t| t.tenant_id.clone())
            .collect()
    };

    if selected.is_empty() {
        println!(
            "⚠️  Nothing to start ({} tenant(s) stored, none selected).",
            stored.len()
        );
        println!("   Mark tenants active in the store, or pass --tenant/--all.");
        anyhow::bail!("no tenants selected");
    }

    println!("🔄 Starting {} tenant job(s)...", selected.len());
    let mut started = 0usize;
    for tenant_id in &selected {
        match supervisor.start(tenant_id).await {
            Ok(_) => {
                println!("   ✅ {tenant_id}");
                started += 1;
            }
            Err(e) => println!("   ❌ {tenant_id}: {e}"),
        }
    }
    if started == 0 {
        anyhow::bail!("no tenant job could be started");
    }
    println!();
    tracing::info!("💧 dispatching for {started} tenant(s); ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    println!();
    tracing::info!("👋 shutting down");
    supervisor.shutdown_all().await;

    Ok(())
}
