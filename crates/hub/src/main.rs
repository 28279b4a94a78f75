mod directory;
mod service;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use autorc_config::LogFormat;
use autorc_protocol::EventMultiServiceServer;
use autorc_sessions::SessionRegistry;
use autorc_telegram::UserDirectory;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tonic::transport::Server;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::directory::SqlUserDirectory;

/// Channel depth for the process-wide bot notification channel.
const NOTIFICATION_CHANNEL_CAPACITY: usize = 128;
/// Grace period the server waits for in-flight streams to drain after
/// shutdown is requested, before hard-exiting (§5).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "autorc-hub", about = "Telegram-to-gateway bridge hub")]
struct Cli {
    /// Path to hub.yaml (defaults to ./hub.yaml, then the user config dir).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

fn init_telemetry(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match autorc_config::load_hub_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load hub config: {err}");
            std::process::exit(1);
        },
    };

    init_telemetry(config.logger.format, &config.logger.level);
    info!(version = env!("CARGO_PKG_VERSION"), "autorc-hub starting");

    if let Err(err) = run(config).await {
        error!(%err, "hub exited with error");
        std::process::exit(1);
    }
}

async fn run(config: autorc_config::HubConfig) -> anyhow::Result<()> {
    let tls_config = autorc_tls::load_server_tls(&config.ca_cert, &config.server_cert, &config.server_pkey)?;

    let directory: Arc<dyn UserDirectory> = Arc::new(SqlUserDirectory::connect(&config.database_uri).await?);
    let sessions = Arc::new(SessionRegistry::new());

    let (notify_tx, notify_rx) = mpsc::channel(NOTIFICATION_CHANNEL_CAPACITY);
    let bot_cancel =
        autorc_telegram::bot::start(&config.bot_token, Arc::clone(&sessions), Arc::clone(&directory), notify_rx)
            .await?;

    let stream_service = service::StreamService::new(sessions, directory, notify_tx);
    let server = Server::builder()
        .tls_config(tls_config)?
        .add_service(EventMultiServiceServer::new(stream_service));

    let addr = format!("0.0.0.0:{}", config.port).parse()?;
    info!(%addr, "listening for gateway connections");

    let shutdown = wait_for_shutdown_signal()?;
    let serve_result = server.serve_with_shutdown(addr, shutdown).await;

    bot_cancel.cancel();
    serve_result?;
    info!("hub shut down cleanly");
    Ok(())
}

/// Resolves once any of `SIGHUP`, `SIGINT`, `SIGTERM`, or `SIGQUIT` is
/// received (§6 "Process exit codes").
fn wait_for_shutdown_signal() -> anyhow::Result<impl Future<Output = ()>> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(async move {
        tokio::select! {
            _ = hangup.recv() => info!("received SIGHUP, shutting down"),
            _ = interrupt.recv() => info!("received SIGINT, shutting down"),
            _ = terminate.recv() => info!("received SIGTERM, shutting down"),
            _ = quit.recv() => info!("received SIGQUIT, shutting down"),
        }

        tokio::spawn(async {
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            warn!("graceful shutdown exceeded {SHUTDOWN_GRACE:?}, forcing exit");
            std::process::exit(1);
        });
    })
}
