//! Lightlog server binary
//!
//! Serves the write/read HTTP API, flushes buffered samples to daily shard
//! files on an interval, and runs the configured hook commands.

use lightlog::api;
use lightlog::config::{
    Config, DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_HOOK_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_STORE,
};
use lightlog::ingester::Ingester;
use lightlog::telemetry::{LogFormat, Telemetry};
use lightlog::Error;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Lightlog time-series log store
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Where is the datastore
    #[arg(long, env = "LIGHTLOG_STORE", default_value = DEFAULT_STORE)]
    store: PathBuf,

    /// Command to execute before starting execution (to prepare input)
    #[arg(long, env = "LIGHTLOG_BEFORE_START_CMD", default_value = "")]
    before_start_cmd: String,

    /// Command to execute after writing data (to dump output)
    #[arg(long, env = "LIGHTLOG_AFTER_DUMP_CMD", default_value = "")]
    after_dump_cmd: String,

    /// Listen on this host
    #[arg(long, env = "LIGHTLOG_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Listen on this port
    #[arg(long, env = "LIGHTLOG_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Dump data every N seconds
    #[arg(long = "dump-every", env = "LIGHTLOG_DUMP_EVERY", default_value_t = DEFAULT_FLUSH_INTERVAL_SECS)]
    dump_every: u64,

    /// Kill hook commands after N seconds
    #[arg(long, env = "LIGHTLOG_CMD_TIMEOUT", default_value_t = DEFAULT_HOOK_TIMEOUT_SECS)]
    cmd_timeout: u64,

    /// Log level
    #[arg(long, env = "LIGHTLOG_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format: json or text
    #[arg(long, env = "LIGHTLOG_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            store_root: args.store,
            before_start_cmd: Some(args.before_start_cmd),
            after_flush_cmd: Some(args.after_dump_cmd),
            host: args.host,
            port: args.port,
            flush_interval: Duration::from_secs(args.dump_every),
            hook_timeout: Duration::from_secs(args.cmd_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let log_level = args.log_level.clone();
    let log_format = args.log_format;

    let config = Config::from(args);
    let ingester_config = config.ingester_config();
    let _telemetry = Telemetry::init(
        "lightlog",
        &ingester_config.store_root,
        &log_level,
        log_format,
    )?;
    config.validate()?;

    info!(
        store = %ingester_config.store_root.display(),
        flush_interval_secs = ingester_config.flush_interval.as_secs(),
        hook_timeout_secs = ingester_config.hook_timeout.as_secs(),
        "Starting Lightlog"
    );
    let ingester = Arc::new(Ingester::new(ingester_config));
    let shutdown = ingester.shutdown_token();

    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(addr = %listener.local_addr()?, "Listening");

    let scheduler = {
        let ingester = ingester.clone();
        tokio::spawn(async move { ingester.run_scheduler().await })
    };

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let router = api::build_http_router(ingester);
    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
        .map_err(|e| Error::Internal(format!("HTTP server error: {e}")))?;

    // The scheduler performs the final flush once the token fires.
    scheduler
        .await
        .map_err(|e| Error::Internal(format!("scheduler task failed: {e}")))?;
    info!("Lightlog shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn wait_for_shutdown(shutdown: CancellationToken) {
    shutdown.cancelled().await;
}
