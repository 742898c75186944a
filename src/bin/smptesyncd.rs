//! Launcher for the timecode server: flag parsing, logging setup, and
//! signal-driven shutdown. Exit codes: 0 clean shutdown, 1 bind failure,
//! 2 configuration error.

use clap::Parser;
use smptesync::{ServerConfig, TimecodeServer};

#[derive(Debug, Parser)]
#[command(name = "smptesyncd", about = "SMPTE timecode synchronization server")]
struct Args {
    /// Server host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Disable periodic status reporting
    #[arg(long)]
    no_status: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.port == 0 {
        eprintln!("error: --port must be in 1..=65535");
        std::process::exit(2);
    }

    let config = ServerConfig::default()
        .host(args.host)
        .port(args.port)
        .status_reporting(!args.no_status);

    let server = match TimecodeServer::bind(config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(%err, "failed to start");
            std::process::exit(1);
        }
    };

    let handle = server.handle();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("received shutdown signal");
        handle.shutdown().await;
    });

    if let Err(err) = server.serve().await {
        tracing::error!(%err, "server error");
        std::process::exit(1);
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(%err, "failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
