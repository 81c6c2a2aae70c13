use anyhow::Result;
use clap::{Parser, Subcommand};
use report_sync::core::pipeline::SyncPipeline;
use report_sync::utils::logger;
use report_sync::{adapters, web, AppConfig};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "report-sync")]
#[command(about = "Fetches a daily dataset, renders a report and fans both out to object storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(long, global = true, help = "Emit JSON logs for aggregation")]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the newest dated source file and upload it to every backend
    Ingest,
    /// Render the latest raw artifact into a report and upload it
    Process,
    /// Pull the canonical report into the local serving cache
    Publish,
    /// Serve the published report over HTTP
    Serve,
    /// Run ingest and process on a fixed interval
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose, cli.json_logs);

    // configuration problems terminate the process before any network I/O
    let config = AppConfig::from_env().inspect_err(|err| {
        tracing::error!(error = %err, "invalid configuration");
    })?;
    let targets = adapters::build_targets(&config)?;

    let interval = Duration::from_secs(config.sync_interval_hours * 60 * 60);
    let port = config.port;
    let pipeline = Arc::new(SyncPipeline::new(config, targets)?);

    match cli.command {
        Command::Ingest => {
            pipeline.ingest().await?;
        }
        Command::Process => pipeline.process().await?,
        Command::Publish => {
            pipeline.publish().await?;
        }
        Command::Serve => web::serve(pipeline, port, interval).await?,
        Command::Run => run_scheduled(pipeline, interval).await,
    }
    Ok(())
}

/// Interval trigger for the ingest+process cycle. Invocations never
/// overlap: a slow cycle simply delays the next tick.
async fn run_scheduled(pipeline: Arc<SyncPipeline>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(err) = pipeline.ingest().await {
            tracing::error!(error = %err, "ingest failed");
            continue;
        }
        if let Err(err) = pipeline.process().await {
            tracing::error!(error = %err, "process failed");
        }
    }
}
