use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tessera::api::{create_router, AppState};
use tessera::config::Config;
use tessera::ocr::OcrAdapter;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Self-hostable OCR service")]
struct Args {
    /// Address to bind, overrides TESSERA_HOST
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overrides TESSERA_PORT
    #[arg(long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tessera=info,tower_http=debug".into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Initializing OCR engine: {}...", config.ocr.engine);
    let adapter = OcrAdapter::new(&config.ocr)?;
    if !adapter.is_available() {
        tracing::warn!(
            engine = adapter.engine_name(),
            "OCR engine unavailable - recognition requests will fail"
        );
    }

    tracing::info!(
        max_concurrent = config.limits.max_concurrent,
        queue_depth = config.limits.queue_depth,
        languages = %config.ocr.languages.join("+"),
        "Pipeline limits"
    );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, adapter)?;
    let app = create_router(state);

    let cancel_token = CancellationToken::new();

    tracing::info!("Tessera starting on http://{}", addr);
    tracing::info!("  Health check: http://{}/api/v1/health", addr);
    tracing::info!("  API docs:     http://{}/api/v1/docs", addr);
    tracing::info!("  OpenAPI spec: http://{}/api/v1/openapi.json", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel_token.cancelled() => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
    cancel_token.cancel();
}
