//! # Voice Turn Backend - Server Entry Point
//!
//! Starts the actix-web server that hosts voice sessions over WebSocket.
//!
//! ## Startup sequence:
//! 1. Load `.env`, then initialize tracing
//! 2. Load and validate configuration (`config.toml` + environment)
//! 3. Build the OpenAI-compatible provider client shared by all sessions
//! 4. Serve HTTP + WebSocket routes until SIGINT/SIGTERM
//!
//! ## Routes:
//! - `GET /ws`: voice session (WebSocket upgrade)
//! - `GET /health`, `GET /api/v1/health`: liveness and summary
//! - `GET /api/v1/metrics`: pipeline counters
//! - `GET|PUT /api/v1/config`: view or adjust runtime settings

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_turn_backend::config::AppConfig;
use voice_turn_backend::providers::{openai::OpenAiClient, Providers};
use voice_turn_backend::state::AppState;
use voice_turn_backend::{handlers, health, websocket};

#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-turn-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        base_url = %config.providers.base_url,
        chat_model = %config.providers.chat_model,
        parallelism = config.pipeline.synthesis_parallelism,
        "Configuration loaded: {}:{}",
        config.server.host,
        config.server.port
    );
    if !config.has_api_key() {
        warn!("No provider API key configured; set OPENAI_API_KEY or APP_PROVIDERS__API_KEY");
    }

    let client = OpenAiClient::new(config.providers.clone()).context("building provider client")?;
    let app_state = AppState::new(config.clone(), Providers::openai(client));
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            .route("/health", web::get().to(health::health_check))
            .route("/ws", web::get().to(websocket::voice_websocket))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize tracing. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_turn_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C only on non-Unix platforms).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                    _ = sigint.recv() => info!("Received SIGINT"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers ({}), falling back to Ctrl+C", e);
            }
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
