use std::fs::OpenOptions;
use std::path::Path;

use cache_channel::config::ChannelConfig;
use cache_channel::metrics;
use cache_channel::transport::registry::start_registry_server;
use cache_channel::transport::registry::CacheChannelRegistry;
use cache_channel::transport::socket::SocketRelay;
use cache_channel::Error;
use cache_channel::Result;
use tokio::net::TcpListener;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

const LOG_FILE: &str = "cache-channel.log";

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = ChannelConfig::new()?.validate()?;

    // Initializing Logs
    let _guard = init_observability(settings.server.log_dir.as_deref())?;

    // Initializing Shutdown Signal
    let (graceful_tx, graceful_rx) = watch::channel(());
    let cancel = CancellationToken::new();
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if settings.server.metrics_port > 0 {
        tasks.push(tokio::spawn(metrics::start_server(
            settings.server.metrics_port,
            graceful_rx.clone(),
        )));
    }

    if settings.server.registry_enabled {
        let listener = TcpListener::bind(settings.server.registry_addr()?).await?;
        let registry = CacheChannelRegistry::new(
            settings.server.registry_instance_suffix(),
            settings.server.listener_buffer,
        );
        let shutdown = graceful_rx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = start_registry_server(listener, registry, shutdown).await {
                error!("cache channel service stops: {:?}", e);
            }
        }));
    }

    if settings.server.relay_enabled {
        let relay = SocketRelay::bind(
            &settings.server.relay_submission_uri,
            &settings.server.relay_subscription_uri,
        )
        .await?;
        let token = cancel.child_token();
        tasks.push(tokio::spawn(async move {
            relay.run(token).await;
        }));
    }

    if tasks.is_empty() {
        warn!("Nothing to serve: registry server, socket relay and metrics endpoint are all disabled.");
        return Ok(());
    }

    info!("Application started. Waiting for CTRL+C signal...");
    if let Err(e) = graceful_shutdown(graceful_tx, cancel).await {
        error!("Failed to shutdown: {:?}", e);
    }

    for result in futures::future::join_all(tasks).await {
        if let Err(e) = result {
            error!("task stops abnormally: {:?}", e);
        }
    }

    info!("Exiting program.");
    Ok(())
}

async fn graceful_shutdown(
    graceful_tx: watch::Sender<()>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT detected.");
        },
        _ = sigterm.recv() => {
            info!("SIGTERM detected.");
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C detected.");
        },
    }

    info!("Shutdown server..");
    cancel.cancel();
    graceful_tx.send(()).map_err(|e| {
        error!("Failed to send shutdown signal: {}", e);
        Error::Fatal(format!("Failed to send shutdown signal: {}", e))
    })?;

    info!("Shutdown completed");
    Ok(())
}

/// Logs to `<log_dir>/cache-channel.log` when a directory is configured,
/// to stdout otherwise
fn init_observability(log_dir: Option<&str>) -> Result<WorkerGuard> {
    let (non_blocking, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(dir).join(LOG_FILE))?;
            tracing_appender::non_blocking(log_file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let base_subscriber = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(base_subscriber).init();

    Ok(guard)
}
