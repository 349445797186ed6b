//! HTTP surface: login, the dashboard page, admin screens and JSON endpoints.

mod handlers;
pub mod render;

use crate::auth::{CredentialStore, SESSION_COOKIE, SessionStore, User};
use crate::snapshot::SnapshotStore;
use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<SessionStore>,
}

/// Builds the full router.
pub fn router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", get(handlers::dashboard))
        .route("/admin/reload", post(handlers::reload_page))
        .route("/admin/users", get(handlers::users_page).post(handlers::add_user))
        .route("/admin/users/:username/delete", post(handlers::delete_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_page_login));

    let api = Router::new()
        .route("/api/metrics", get(handlers::api_metrics))
        .route("/api/stations", get(handlers::api_stations))
        .route("/api/stats", get(handlers::api_stats))
        .route("/api/ranking", get(handlers::api_ranking))
        .route("/api/alerts", get(handlers::api_alerts))
        .route("/api/evasion-summary", get(handlers::api_evasion_summary))
        .route("/api/realtime", get(handlers::api_realtime))
        .route("/api/routes", get(handlers::api_routes))
        .route("/api/reload", post(handlers::api_reload))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_login))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    Router::new()
        .route("/login", get(handlers::login_form).post(handlers::login))
        .route("/logout", get(handlers::logout))
        .merge(pages)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl+C.
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!(purged, "Expired sessions removed");
            }
        }
    });

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(url = %format!("http://{}", addr), "Dashboard server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

/// Reads the session token out of the `Cookie` header.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn session_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    session_token(headers).and_then(|token| state.sessions.get(&token))
}

async fn require_page_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match session_user(&state, req.headers()) {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => Redirect::to("/login").into_response(),
    }
}

async fn require_api_login(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    match session_user(&state, req.headers()) {
        Some(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "login required" })),
        )
            .into_response(),
    }
}
