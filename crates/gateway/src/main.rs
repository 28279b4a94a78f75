mod stream_client;

use std::sync::Arc;
use std::time::Duration;

use autorc_config::LogFormat;
use autorc_plc::{ConnPool, Dispatcher, PlcUri, Poller, TcpModbusConn};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::stream_client::StreamClient;

/// Soft cap on concurrently open field-bus connections. Not a recognized
/// config key (§6); fixed here since a single gateway process serves one
/// small, fixed device list.
const DEFAULT_MAX_OPEN_CONNS: usize = 4;
const NOTIFY_CHANNEL_CAPACITY: usize = 32;
const ACTION_CHANNEL_CAPACITY: usize = 32;

#[derive(Parser)]
#[command(name = "autorc-gateway", about = "Field-bus edge client for the hub")]
struct Cli {
    /// Path to gateway.yaml (defaults to ./gateway.yaml, then the user config dir).
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

    let config = match autorc_config::load_gateway_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load gateway config: {err}");
            std::process::exit(1);
        },
    };

    init_telemetry(config.logger.format, &config.logger.level);
    info!(version = env!("CARGO_PKG_VERSION"), "autorc-gateway starting");

    if let Err(err) = run(config).await {
        error!(%err, "gateway exited with error");
        std::process::exit(1);
    }
}

async fn run(config: autorc_config::GatewayConfig) -> anyhow::Result<()> {
    let identity = autorc_tls::extract_identity_from_pem(&std::fs::read(&config.client_cert)?)?;
    let tls_config = autorc_tls::load_client_tls(&config.ca_cert, &config.client_cert)?;

    let plc_uri = PlcUri::parse(&config.plc_uri)?;
    let request_timeout = plc_uri.request_timeout;
    let connector: autorc_plc::pool::Connector = {
        let plc_uri = plc_uri.clone();
        Arc::new(move || {
            let plc_uri = plc_uri.clone();
            Box::pin(async move {
                TcpModbusConn::connect(&plc_uri)
                    .await
                    .map(|conn| Box::new(conn) as Box<dyn autorc_plc::ModbusConn>)
            })
        })
    };
    let pool = ConnPool::connect(connector, DEFAULT_MAX_OPEN_CONNS, request_timeout).await?;

    let dispatcher = Dispatcher::new(Arc::clone(&pool), &config.devices)?;

    let (notify_tx, notify_rx) = mpsc::channel(NOTIFY_CHANNEL_CAPACITY);
    let poller = Poller::new(Arc::clone(&pool), &config.notifications, notify_tx)?;

    let (action_tx, action_rx) = mpsc::channel(ACTION_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let poller_cancel = cancel.clone();
    let poller_handle = tokio::spawn(poller.run(poller_cancel));

    let dispatcher_cancel = cancel.clone();
    let dispatcher_handle = tokio::spawn(dispatcher.run(dispatcher_cancel, action_rx));

    let stream_client = StreamClient::new(config.server_addr.clone(), tls_config, identity);
    let client_cancel = cancel.clone();
    let client_handle = tokio::spawn(stream_client.run(client_cancel, notify_rx, action_tx));

    wait_for_shutdown_signal().await?;
    info!("shutting down");
    cancel.cancel();
    pool.close().await;

    let _ = tokio::time::timeout(Duration::from_secs(5), poller_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), client_handle).await;
    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = hangup.recv() => info!("received SIGHUP"),
        _ = interrupt.recv() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
        _ = quit.recv() => info!("received SIGQUIT"),
    }
    Ok(())
}
