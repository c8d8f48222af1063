use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use ras_datasource::{Datasource, JsonLinesSender, SubscribeStatus};
use ras_telemetry::{Collector, TelemetryConfig};
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Streams RAS cluster telemetry as JSON lines
#[derive(Parser, Debug)]
#[command(name = "ras-telemetry", version, about)]
struct Args {
    /// Path to configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream path to print (memory, connections, avg_threads, ...); repeatable
    #[arg(short, long = "stream", value_name = "PATH", default_value = "memory")]
    streams: Vec<String>,

    /// Datasource identifier used in channel names
    #[arg(long, default_value = "ras-telemetry")]
    uid: String,

    /// Dump default configuration and exit
    #[arg(long)]
    dump_default_config: bool,
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = ctrl_c => { tracing::info!("Received CTRL+C"); }
        _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.dump_default_config {
        print!("{}", TelemetryConfig::default().to_toml_string()?);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => TelemetryConfig::load(path)?,
        None => TelemetryConfig::default(),
    };
    let _log_guard = ras_logging::init_logging(&config.log)?;

    tracing::info!(endpoint = %config.ras.endpoint, streams = ?args.streams, "Starting RAS telemetry");

    let source = ras_client::open_source(&config.ras)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector = Collector::get_instance(
        shutdown_rx.clone(),
        source,
        &config.ras.credentials(),
        config.collector.clone(),
    )
    .await?;

    let datasource = Arc::new(Datasource::new(collector.clone(), args.uid));
    let sender = Arc::new(JsonLinesSender::new(std::io::stdout()));
    let mut runners = JoinSet::new();

    for path in args.streams {
        if datasource.subscribe_stream(&path) != SubscribeStatus::Ok {
            tracing::warn!(path = %path, "Skipping unknown stream");
            continue;
        }
        let datasource = datasource.clone();
        let sender = sender.clone();
        let shutdown = shutdown_rx.clone();
        runners.spawn(async move {
            let result = datasource.run_stream(&path, shutdown, sender.as_ref()).await;
            (path, result)
        });
    }
    if runners.is_empty() {
        shutdown_tx.send_replace(true);
        collector.wait_stopped().await;
        anyhow::bail!("no known stream requested");
    }

    let health = datasource.check_health();
    tracing::info!(status = ?health.status, message = %health.message, "RAS telemetry ready");

    wait_for_shutdown_signal().await?;
    tracing::info!("RAS telemetry shutting down");
    shutdown_tx.send_replace(true);

    while let Some(joined) = runners.join_next().await {
        match joined {
            Ok((path, Err(e))) => tracing::error!(path = %path, error = %e, "Stream failed"),
            Ok((_, Ok(()))) => {}
            Err(e) => tracing::error!(error = %e, "Stream task aborted"),
        }
    }
    datasource.dispose();
    collector.wait_stopped().await;
    tracing::info!(info = %collector.info(), "RAS telemetry stopped");

    Ok(())
}
