//! gemini-sse-relay binary.
//!
//! `serve` (the default) runs the HTTP gateway; `ask` streams one generation
//! to stdout through the same upstream adapter.

use std::sync::Arc;

use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gemini_sse_relay::config::{Cli, Command, Config, UpstreamArgs};
use gemini_sse_relay::relay::Relay;
use gemini_sse_relay::server::api::{build_router, AppState};
use gemini_sse_relay::upstream::{GeminiClient, GenerationBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Seed the environment before clap reads it.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        "gemini_sse_relay=debug,tower_http=debug"
    } else {
        "gemini_sse_relay=info,tower_http=info"
    };

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match dotenv {
        Ok(path) => info!(path = %path.display(), "Loaded environment file"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load .env file: {e}"),
    }

    match cli.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli).await,
        Command::Ask { prompt } => ask(&cli.upstream, &prompt).await,
    }
}

async fn serve(cli: &Cli) -> anyhow::Result<()> {
    info!("gemini-sse-relay v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_args(&cli.upstream, &cli.serve)?);

    info!(
        model = %config.upstream.model,
        max_output_tokens = config.upstream.max_output_tokens,
        base_url = %config.upstream.base_url,
        log_chunks = config.relay.log_chunks,
        "Configuration loaded"
    );

    if !config.server.static_dir.is_dir() {
        warn!(
            "Static directory {} not found, only API routes will respond",
            config.server.static_dir.display()
        );
    }

    let backend = Arc::new(GeminiClient::new(config.upstream.clone()));

    let state = Arc::new(AppState {
        relay: Relay::new(backend, config.relay),
        static_dir: config.server.static_dir.clone(),
    });

    let app = build_router(state);

    let addr = config.server.listen_addr()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn ask(upstream: &UpstreamArgs, prompt: &str) -> anyhow::Result<()> {
    let client = GeminiClient::new(upstream.client_configuration()?);
    let cancel = CancellationToken::new();

    let mut chunks = client.start_stream(&cancel, prompt).await?;
    let mut stdout = tokio::io::stdout();

    while let Some(chunk) = chunks.next().await {
        for text in chunk?.parts {
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => warn!("Failed to install Ctrl+C handler: {e}"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
