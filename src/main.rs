//! vmnotify entry point
//!
//! `server` runs the blocking consumer loop until interrupted; `client`
//! publishes a payload file at one or more levels. Startup configuration
//! errors abort the process before any topic binding occurs.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vmnotify::{
    app,
    cli::{Cli, Command},
    config::Config,
    internal_metrics::LoggingRecorder,
    payload::load_payload,
    transport::mqtt::MqttTransport,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("vmnotify starting up");
    info!("broker: {}:{}", config.broker.host, config.broker.port);
    info!(
        "topic: {} (pool: {})",
        config.messaging.topic, config.messaging.pool
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut metrics_task = None;
    if config.log_metrics {
        let (recorder, handle) = LoggingRecorder::new(
            Duration::from_secs(config.metrics_interval_seconds),
            shutdown_rx.clone(),
        );
        if let Err(err) = metrics::set_global_recorder(recorder) {
            error!("failed to install logging recorder: {err}");
        } else {
            metrics_task = Some(handle);
        }
    }

    let exit_code = match &cli.command {
        Command::Server => run_server(&config, shutdown_tx, shutdown_rx).await,
        Command::Client(args) => {
            let code = run_client(&config, args).await;
            // Stop the metrics task, if one is running.
            let _ = shutdown_tx.send(true);
            code
        }
    };

    if let Some(handle) = metrics_task {
        let _ = handle.await;
    }

    std::process::exit(exit_code);
}

async fn run_server(
    config: &Config,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
) -> i32 {
    let transport = match MqttTransport::connect(&config.broker, "server").await {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            error!("failed to set up transport: {err}");
            return 1;
        }
    };

    let listener_config = config.clone();
    let listener_transport = transport.clone();
    let mut listener_task = tokio::spawn(async move {
        app::run_server(&listener_config, listener_transport, shutdown_rx).await
    });

    let joined = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                error!("failed to listen for interrupt signal: {err}");
                return 1;
            }
            info!("interrupt received, shutting down gracefully");
            // The listener finishes its in-flight dispatch before exiting.
            let _ = shutdown_tx.send(true);
            listener_task.await
        }
        // The listener ended on its own: startup failure or closed stream.
        joined = &mut listener_task => joined,
    };

    let result = match joined {
        Ok(result) => result,
        Err(err) => {
            error!("listener task panicked: {err}");
            return 1;
        }
    };

    if let Err(err) = transport.close().await {
        error!("error while closing transport: {err}");
    }

    match result {
        Ok(()) => {
            info!("clean stop");
            0
        }
        Err(err) => {
            error!("listener failed: {err}");
            1
        }
    }
}

async fn run_client(config: &Config, args: &vmnotify::cli::ClientArgs) -> i32 {
    // Load and validate the payload file before touching the broker.
    let payload = match load_payload(&args.payload_file) {
        Ok(payload) => payload,
        Err(err) => {
            error!("{err}");
            return 1;
        }
    };

    let transport = match MqttTransport::connect(&config.broker, "client").await {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            error!("failed to set up transport: {err}");
            return 1;
        }
    };

    let result = app::run_client(config, transport.clone(), args, payload).await;

    // Closing waits for the broker to confirm the outstanding publishes, so
    // an unconfirmed publish still fails the run.
    let closed = transport.close().await;

    match result.and(closed) {
        Ok(()) => 0,
        Err(err) => {
            error!("publish failed: {err}");
            1
        }
    }
}
