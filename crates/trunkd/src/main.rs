//! trunkd entry point.
//!
//! Runs the trunk server on an in-process transport, optionally with an
//! agent on the same host that binds pushed sub-ports, until interrupted.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use trunk_rpc::{LocalTransport, Transport};
use trunk_types::SegmentationType;
use trunkd::audit::{init_logging, AuditCategory, AuditOutcome, AuditRecord};
use trunkd::constants::DEFAULT_CONFIG_PATH;
use trunkd::{
    audit_log, MemoryCorePlugin, MemoryTrunkStore, SubportBindingHandler, TrunkAgentSkeleton,
    TrunkServerClient, TrunkService, TrunkdConfig,
};

/// Trunk port synchronization daemon
#[derive(Parser, Debug)]
#[command(name = "trunkd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Host name to serve on, overrides `agent.host`
    #[arg(long)]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error), overrides `logging.level`
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Run an agent on this host, overrides `agent.enabled`
    #[arg(long)]
    agent: bool,
}

fn load_config(args: &Args) -> anyhow::Result<TrunkdConfig> {
    let mut config = TrunkdConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(host) = &args.host {
        config.agent.host = host.clone();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.agent {
        config.agent.enabled = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_store(config: &TrunkdConfig) -> anyhow::Result<MemoryTrunkStore> {
    let store = MemoryTrunkStore::new();
    for segmentation_type in config.segmentation_types()? {
        if segmentation_type.as_str() == SegmentationType::VLAN {
            store.add_segmentation_type(segmentation_type, |id| id.is_valid_vlan());
        } else {
            store.add_segmentation_type(segmentation_type, |_| true);
        }
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(&config.logging.level, config.logging.json);

    tracing::info!(
        host = %config.agent.host,
        config = %args.config.display(),
        "Starting trunkd"
    );
    audit_log!(AuditRecord::new(AuditCategory::ConfigurationChange, "trunkd", "load_config")
        .with_outcome(AuditOutcome::Success)
        .with_object_id(args.config.display().to_string())
        .with_object_type("file")
        .with_details(serde_json::json!({
            "host": config.agent.host,
            "agent": config.agent.enabled,
            "rpc_version": config.rpc.version,
            "segmentation_types": config.segmentation.types,
        })));

    let transport: Arc<dyn Transport> = Arc::new(LocalTransport::new());
    let store = Arc::new(build_store(&config)?);
    let core_plugin = Arc::new(MemoryCorePlugin::new());

    let service = TrunkService::start(
        config.agent.host.clone(),
        store,
        core_plugin,
        Arc::clone(&transport),
    )
    .await
    .context("starting trunk service")?;

    let agent = if config.agent.enabled {
        let client = TrunkServerClient::new(Arc::clone(&transport), config.agent.host.clone())
            .with_version(config.rpc.version.clone());
        tracing::info!(rpc_target = %client.target(), "Trunk agent client ready");

        let agent = TrunkAgentSkeleton::start(
            config.agent.host.clone(),
            transport.as_ref(),
            Arc::new(SubportBindingHandler::new(Arc::new(client))),
        )
        .await
        .context("starting trunk agent")?;
        Some(agent)
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    if let Some(agent) = agent {
        agent.stop();
    }
    service.stop();
    Ok(())
}
