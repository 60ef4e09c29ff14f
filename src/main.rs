//! # Radio Skill - Main Application Entry Point
//!
//! HTTP endpoint for a voice-assistant radio skill. The platform posts one JSON event
//! per utterance or player notification; the endpoint answers with speech and audio
//! player directives.
//!
//! ## Application Architecture:
//! - **config**: configuration layering (TOML file + environment variables)
//! - **services**: stream catalog, prompt tables, preference store, device geolocation
//! - **skill**: event classification, routing, audio session state machine, responses
//! - **state**: shared router, configuration and metrics
//! - **health**: health and metrics endpoints
//! - **middleware**: request logging and metrics collection
//! - **handlers**: HTTP request handlers for API endpoints
//! - **error**: HTTP error type and JSON error responses

mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod services;
mod skill;
mod state;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::{AppConfig, StorageBackend};
use services::catalog::StreamCatalog;
use services::geolocation::HttpGeolocator;
use services::locale::LocaleTextProvider;
use services::preferences::{FilePreferenceStore, MemoryPreferenceStore, PreferenceStore};
use skill::{EventRouter, PlaybackMachine, PlaybackSettings};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set by the signal task; polled by `wait_for_shutdown`.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup sequence:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Loads skill content** (catalog, prompt tables) and builds the router
/// 4. **Configures the HTTP server** with middleware and routes
/// 5. **Handles graceful shutdown** on SIGTERM/SIGINT
///
/// Content problems (missing default stream, incomplete prompt table) stop startup here
/// rather than surfacing on the first request.
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    info!("Starting radio-skill v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let router = build_router(&config)?;
    let app_state = AppState::new(config.clone(), router);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware executes in reverse order for responses
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api/v1")
                    .route("/events", web::post().to(handlers::handle_event))
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config)),
            )
            .route("/health", web::get().to(health::health_check))
            .default_service(web::to(handlers::not_found))
    })
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Compose the router from the configured collaborators.
fn build_router(config: &AppConfig) -> Result<EventRouter> {
    let catalog = StreamCatalog::load(&config.skill.catalog_path).with_context(|| {
        format!(
            "failed to load stream catalog {}",
            config.skill.catalog_path.display()
        )
    })?;
    info!(
        entries = catalog.len(),
        path = %config.skill.catalog_path.display(),
        "Stream catalog loaded"
    );

    let locales = LocaleTextProvider::load_dir(
        &config.skill.languages_dir,
        &config.skill.fallback_locale,
        config.skill.template_selection,
    )
    .with_context(|| {
        format!(
            "failed to load prompt tables from {}",
            config.skill.languages_dir.display()
        )
    })?;

    let preferences: Arc<dyn PreferenceStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryPreferenceStore::new()),
        StorageBackend::File => {
            let path = config
                .storage
                .path
                .clone()
                .context("storage.path is required for the file backend")?;
            Arc::new(FilePreferenceStore::new(path))
        }
    };
    info!(backend = preferences.backend(), "Preference store ready");

    let geolocator = HttpGeolocator::new(config.geolocation.timeout())?;

    let machine = PlaybackMachine::new(
        Arc::new(catalog),
        preferences,
        Arc::new(geolocator),
        PlaybackSettings {
            store_timeout: config.storage.timeout(),
            geolocation_timeout: config.geolocation.timeout(),
            location_permission: config.skill.location_permission.clone(),
        },
    );

    Ok(EventRouter::new(machine, Arc::new(locales)))
}

/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "debug", "radio_skill=trace")
/// - If not set, defaults to "radio_skill=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "radio_skill=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag on the first one.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers: {}", e);
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Polls the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
