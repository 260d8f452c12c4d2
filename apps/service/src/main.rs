use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use upwatch_service::clock::SystemClock;
use upwatch_service::config::{Config, NotifierKind};
use upwatch_service::monitoring::{HttpTransport, Scheduler};
use upwatch_service::notify::{LogNotifier, Notifier, TwilioNotifier, WebhookNotifier};
use upwatch_service::storage::{FileCheckStore, FileLogSink};

#[derive(Debug, Parser)]
#[command(version, about = "Polls stored endpoint checks and alerts on state changes")]
struct Cli {
    /// Config file; defaults to $XDG_CONFIG_HOME/upwatch/config.toml
    #[arg(short, long, env = "UPWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Run one sweep and one log rotation, then exit
    #[arg(long)]
    once: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    let notifier: Arc<dyn Notifier> = match config.notifier.kind {
        NotifierKind::Log => Arc::new(LogNotifier),
        NotifierKind::Twilio => {
            let twilio = config.notifier.twilio.as_ref().context("missing [notifier.twilio] settings")?;
            Arc::new(TwilioNotifier::new(twilio.into()))
        }
        NotifierKind::Webhook => {
            let webhook = config.notifier.webhook.as_ref().context("missing [notifier.webhook] settings")?;
            Arc::new(WebhookNotifier::new(webhook.url.clone()))
        }
    };
    Ok(notifier)
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init_tracing();
    let cli = Cli::parse();

    let config = Config::from_config(cli.config.as_ref()).context("failed to load configuration")?;
    if cli.print_config {
        print!("{config}");
        return Ok(());
    }

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(FileCheckStore::new(&config.storage.data_dir)),
        Arc::new(FileLogSink::new(&config.storage.logs_dir)),
        build_notifier(&config)?,
        Arc::new(HttpTransport::new().context("failed to build HTTP client")?),
        Arc::new(SystemClock),
        config.scheduler_config(),
    ));

    if cli.once {
        let sweep = scheduler.sweep().await;
        let rotation = scheduler.rotate_logs().await;
        info!(
            "Single run finished: {} evaluated, {} rejected, {} logs rotated",
            sweep.evaluated,
            sweep.rejected,
            rotation.rotated.len()
        );
        return Ok(());
    }

    info!(
        "Background workers are running (sweep every {}s, rotation every {}s, notifier: {})",
        config.scheduler.sweep_interval_seconds, config.scheduler.rotation_interval_seconds, config.notifier.kind
    );
    let handles = scheduler.start();

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("Shutting down");
    handles.abort();

    Ok(())
}
