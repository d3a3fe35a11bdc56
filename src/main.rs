use crate::logging::app_config;
use clap::Parser;
use cli::Cli;
use minio_plugin::agent::{meta_requested, Agent};
use minio_plugin::MinioPlugin;

mod cli;
mod logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // initialize the logger
    log4rs::init_config(app_config(cli.logfile.as_deref(), cli.loglevel)?)?;

    let config = cli.plugin_config();
    log::info!("Reading metrics from endpoint: {}", config.metrics_endpoint());

    let plugin = MinioPlugin::new(config)?;
    let agent = Agent::new(plugin, cli.tempfile.clone());
    let mut out = std::io::stdout().lock();

    if meta_requested() {
        agent.print_meta(&mut out)?;
        return Ok(());
    }

    log::debug!("Counter cache: {}", agent.tempfile().display());
    if let Err(e) = agent.print_values(&mut out).await {
        log::error!("Metrics cycle failed: {e}");
        return Err(e.into());
    }
    Ok(())
}
