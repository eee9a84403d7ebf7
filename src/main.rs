//! ORCA site node - serves the public site and the team admin panel.
//!
//! The application is organized into the following modules:
//!
//! - `config`: Environment configuration
//! - `remote`: Document store, object storage and identity clients
//! - `sync`: Content sync for settings and projects
//! - `reconcile`: Inline edits with the local pending-edit outbox
//! - `upload`: Project asset upload pipeline
//! - `auth` / `roles`: Sessions and admin authorization
//! - `templates`: HTML/CSS/JS rendering
//! - `handlers`: HTTP route handlers

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::process::ExitCode;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use orca_site::config::{missing_firebase_keys, SiteConfig};
use orca_site::{handlers, AppState};

/// Directory served under `/assets` (team photos, sample models).
const PUBLIC_ASSETS_DIR: &str = "public/assets";

/// Verify the Firebase keys the site needs are present.
fn check_env() -> ExitCode {
    dotenvy::dotenv().ok();
    let missing = missing_firebase_keys(|key| std::env::var(key).ok());
    if missing.is_empty() {
        println!("All required environment variables are set.");
        ExitCode::SUCCESS
    } else {
        eprintln!("Missing required environment variables:");
        for key in missing {
            eprintln!("  {} (or VITE_{})", key, key);
        }
        ExitCode::FAILURE
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    if std::env::args().nth(1).as_deref() == Some("--check-env") {
        return check_env();
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("orca_site=info,tower_http=info")),
        )
        .init();

    let config = match SiteConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    let bind = config.bind.clone();
    // Room for one file per asset class at the size limit, plus form text.
    let body_limit = (config.max_upload_bytes as usize)
        .saturating_mul(4)
        .saturating_add(1024 * 1024);

    let state = match AppState::from_config(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %e, "failed to initialise site state");
            return ExitCode::FAILURE;
        }
    };

    if state.auth_enabled() {
        info!("team sign-in enabled");
    } else {
        warn!("team sign-in disabled (set ORCA_SESSION_SECRET to enable the admin panel)");
    }

    let admin_uploads = Router::new()
        .route("/admin/projects", post(handlers::create_project))
        .route("/admin/settings", post(handlers::save_settings))
        .layer(DefaultBodyLimit::max(body_limit));

    let app = Router::new()
        // Public routes
        .route("/", get(handlers::index))
        .route("/api/content", get(handlers::content_api))
        // Inline editing
        .route("/api/settings/{field}", post(handlers::edit_field))
        .route("/api/edit-mode", post(handlers::set_edit_mode))
        .route("/api/pending/{field}/discard", post(handlers::discard_pending_field))
        .route("/api/pending/discard", post(handlers::discard_all_pending))
        // Admin routes
        .route("/admin", get(handlers::admin_page))
        .route("/admin/login", post(handlers::login_submit))
        .route("/admin/logout", get(handlers::logout))
        .route("/admin/resync", post(handlers::resync))
        .route("/api/admin/progress", get(handlers::upload_progress))
        .merge(admin_uploads)
        .nest_service("/assets", ServeDir::new(PUBLIC_ASSETS_DIR))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, %bind, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!("ORCA site running at http://{}", bind);

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
