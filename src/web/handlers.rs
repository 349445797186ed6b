use super::{AppState, render, session_token};
use crate::auth::{Role, SESSION_COOKIE, User};
use crate::loader::StationRecord;
use crate::metrics::ScoringPolicy;
use crate::metrics::rank::evasion_summary;
use crate::metrics::severity::{ROUTE_RISK_BANDS, Severity, severity};
use crate::metrics::summary::stations_by_volume;
use crate::metrics::timeline::tail;
use crate::metrics::types::{AlertDetail, HourlyAlert, HourlyRecord, NetworkSummary, StationMetrics};
use crate::snapshot::ReloadFailure;
use axum::{
    Extension, Form, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

const TOP_N: usize = 10;
const REALTIME_RECORDS: usize = 100;
const REALTIME_ALERTS: usize = 20;
const ROUTE_FEED_LEN: usize = 20;
const ROUTE_FINE_SHARE: f64 = 0.1;
const ROUTE_PEAK_HOURS: &str = "7-9 AM, 5-7 PM";

#[derive(Deserialize)]
pub(super) struct LoginForm {
    username: String,
    password: String,
}

#[derive(Deserialize)]
pub(super) struct NewUserForm {
    username: String,
    password: String,
    role: String,
    name: String,
}

pub(super) async fn login_form() -> Html<String> {
    Html(render::login_page(None))
}

pub(super) async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.credentials.authenticate(&form.username, &form.password).await {
        Ok(Some(user)) => {
            info!(username = %user.username, role = %user.role, "User logged in");
            let token = state.sessions.create(user);
            let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
            ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
        }
        Ok(None) => {
            warn!(username = %form.username, "Failed login attempt");
            (
                StatusCode::UNAUTHORIZED,
                Html(render::login_page(Some("Invalid username or password"))),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Credential store unavailable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(render::login_page(Some("Login is temporarily unavailable"))),
            )
                .into_response()
        }
    }
}

pub(super) async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(&token);
    }
    let expired = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0");
    ([(header::SET_COOKIE, expired)], Redirect::to("/login")).into_response()
}

pub(super) async fn dashboard(State(state): State<AppState>, Extension(user): Extension<User>) -> Html<String> {
    let snapshot = state.store.snapshot();
    let failure = state.store.last_failure();
    Html(render::dashboard_page(&user, &snapshot, failure.as_ref(), TOP_N))
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({ "error": "admin role required" })),
    )
        .into_response()
}

fn forbidden_page() -> Response {
    (StatusCode::FORBIDDEN, Html("<h1>Admin access required</h1>".to_string())).into_response()
}

/// Runs a reload on the blocking pool so the async workers stay free.
async fn reload(state: &AppState) -> Result<u64, String> {
    let store = state.store.clone();
    match tokio::task::spawn_blocking(move || store.trigger_reload()).await {
        Ok(Ok(generation)) => Ok(generation),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => {
            error!(error = %e, "Reload task panicked");
            Err("reload task failed".to_string())
        }
    }
}

pub(super) async fn reload_page(State(state): State<AppState>, Extension(user): Extension<User>) -> Response {
    if !user.is_admin() {
        return forbidden_page();
    }
    info!(username = %user.username, "Manual reload requested");
    match reload(&state).await {
        Ok(generation) => info!(generation, "Manual reload published"),
        Err(message) => warn!(error = %message, "Manual reload failed, dashboard marked stale"),
    }
    Redirect::to("/").into_response()
}

pub(super) async fn users_page(State(state): State<AppState>, Extension(user): Extension<User>) -> Response {
    if !user.is_admin() {
        return forbidden_page();
    }
    render_users(&state, &user, StatusCode::OK, None).await
}

async fn render_users(state: &AppState, user: &User, status: StatusCode, error: Option<&str>) -> Response {
    match state.credentials.list_users().await {
        Ok(users) => (status, Html(render::users_page(user, &users, error))).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list users");
            (StatusCode::INTERNAL_SERVER_ERROR, Html("<h1>User store unavailable</h1>".to_string()))
                .into_response()
        }
    }
}

pub(super) async fn add_user(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Form(form): Form<NewUserForm>,
) -> Response {
    if !user.is_admin() {
        return forbidden_page();
    }

    let role: Role = match form.role.parse() {
        Ok(role) => role,
        Err(e) => {
            return render_users(&state, &user, StatusCode::BAD_REQUEST, Some(&e.to_string())).await;
        }
    };

    match state
        .credentials
        .add_user(&form.username, &form.password, role, &form.name)
        .await
    {
        Ok(()) => Redirect::to("/admin/users").into_response(),
        Err(e @ crate::auth::AuthError::UserExists(_)) => {
            render_users(&state, &user, StatusCode::CONFLICT, Some(&e.to_string())).await
        }
        Err(e @ crate::auth::AuthError::InvalidInput(_)) => {
            render_users(&state, &user, StatusCode::BAD_REQUEST, Some(&e.to_string())).await
        }
        Err(e) => {
            error!(error = %e, "Failed to add user");
            render_users(&state, &user, StatusCode::INTERNAL_SERVER_ERROR, Some("Could not save user")).await
        }
    }
}

pub(super) async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(username): Path<String>,
) -> Response {
    if !user.is_admin() {
        return forbidden_page();
    }
    if username == user.username {
        return render_users(&state, &user, StatusCode::BAD_REQUEST, Some("Cannot delete your own account")).await;
    }

    match state.credentials.remove_user(&username).await {
        Ok(true) => {
            state.sessions.revoke_user(&username);
            Redirect::to("/admin/users").into_response()
        }
        Ok(false) => render_users(&state, &user, StatusCode::NOT_FOUND, Some("User not found")).await,
        Err(e) => {
            error!(error = %e, "Failed to remove user");
            render_users(&state, &user, StatusCode::INTERNAL_SERVER_ERROR, Some("Could not save user")).await
        }
    }
}

// ---------------------------------------------------------------------------
// JSON API
// ---------------------------------------------------------------------------

pub(super) async fn api_metrics(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(&snapshot.metrics).into_response()
}

#[derive(Serialize)]
struct StationView<'a> {
    #[serde(flatten)]
    record: &'a StationRecord,
    daily_average: f64,
    metrics: Option<&'a StationMetrics>,
}

pub(super) async fn api_stations(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    let stations: Vec<StationView> = stations_by_volume(&snapshot.stations)
        .into_iter()
        .map(|record| StationView {
            record,
            daily_average: record.daily_average(),
            metrics: snapshot.metrics.get(&record.name),
        })
        .collect();
    Json(stations).into_response()
}

#[derive(Serialize)]
struct StatsResponse<'a> {
    #[serde(flatten)]
    summary: &'a NetworkSummary,
    active_alerts: usize,
    generation: u64,
    generated_at: DateTime<Utc>,
    stale: Option<ReloadFailure>,
    policy: &'a ScoringPolicy,
}

pub(super) async fn api_stats(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(StatsResponse {
        summary: &snapshot.summary,
        active_alerts: snapshot.alerts.len(),
        generation: snapshot.generation,
        generated_at: snapshot.generated_at,
        stale: state.store.last_failure(),
        policy: state.store.policy(),
    })
    .into_response()
}

pub(super) async fn api_ranking(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(&snapshot.ranking).into_response()
}

#[derive(Serialize)]
struct AlertsResponse<'a> {
    generation: u64,
    alerts: &'a [String],
    details: &'a [AlertDetail],
}

pub(super) async fn api_alerts(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(AlertsResponse {
        generation: snapshot.generation,
        alerts: &snapshot.alerts,
        details: &snapshot.alert_details,
    })
    .into_response()
}

#[derive(Serialize)]
struct EvasionSummaryRow<'a> {
    station: &'a str,
    total_expected: f64,
    total_actual: u64,
    total_evasion: f64,
    avg_evasion_rate: f64,
    record_count: usize,
}

pub(super) async fn api_evasion_summary(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    let rows: Vec<EvasionSummaryRow> = evasion_summary(&snapshot.metrics)
        .into_iter()
        .map(|m| EvasionSummaryRow {
            station: &m.station,
            total_expected: m.expected,
            total_actual: m.observed,
            total_evasion: m.evasion,
            avg_evasion_rate: m.evasion_rate,
            record_count: m.events_matched,
        })
        .collect();
    Json(rows).into_response()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum TransportMode {
    Train,
    Bus,
    Tram,
}

impl TransportMode {
    /// Best guess from the station name; the data carries no mode column.
    fn guess(station: &str) -> Self {
        const TRAIN: &[&str] = &["central", "flinders", "southern cross", "parliament"];
        const BUS: &[&str] = &["bus", "interchange"];

        let name = station.to_lowercase();
        if TRAIN.iter().any(|k| name.contains(k)) {
            TransportMode::Train
        } else if BUS.iter().any(|k| name.contains(k)) {
            TransportMode::Bus
        } else {
            TransportMode::Tram
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteEntry<'a> {
    id: String,
    name: &'a str,
    #[serde(rename = "type")]
    mode: TransportMode,
    non_compliance_rate: f64,
    avg_daily_passengers: f64,
    expected_fines: u64,
    peak_hours: &'static str,
    risk_level: Severity,
}

#[derive(Serialize)]
struct RoutesResponse<'a> {
    data: Vec<RouteEntry<'a>>,
}

fn route_entries(metrics: &BTreeMap<String, StationMetrics>) -> Vec<RouteEntry<'_>> {
    evasion_summary(metrics)
        .into_iter()
        .take(ROUTE_FEED_LEN)
        .enumerate()
        .map(|(i, m)| RouteEntry {
            id: format!("route_{}", i + 1),
            name: &m.station,
            mode: TransportMode::guess(&m.station),
            non_compliance_rate: (m.evasion_rate * 1000.0).round() / 10.0,
            avg_daily_passengers: m.expected,
            expected_fines: (m.evasion * ROUTE_FINE_SHARE).floor() as u64,
            peak_hours: ROUTE_PEAK_HOURS,
            risk_level: severity(m.evasion_rate, ROUTE_RISK_BANDS),
        })
        .collect()
}

pub(super) async fn api_routes(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(RoutesResponse {
        data: route_entries(&snapshot.metrics),
    })
    .into_response()
}

#[derive(Serialize)]
struct RealtimeResponse<'a> {
    realtime_data: &'a [HourlyRecord],
    evasion_alerts: &'a [HourlyAlert],
    timestamp: String,
}

pub(super) async fn api_realtime(State(state): State<AppState>) -> Response {
    let snapshot = state.store.snapshot();
    Json(RealtimeResponse {
        realtime_data: tail(&snapshot.timeline.records, REALTIME_RECORDS),
        evasion_alerts: tail(&snapshot.timeline.alerts, REALTIME_ALERTS),
        timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
    .into_response()
}

pub(super) async fn api_reload(State(state): State<AppState>, Extension(user): Extension<User>) -> Response {
    if !user.is_admin() {
        return forbidden();
    }

    info!(username = %user.username, "Manual reload requested");
    match reload(&state).await {
        Ok(generation) => Json(serde_json::json!({ "ok": true, "generation": generation })).into_response(),
        Err(message) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "ok": false,
                "error": message,
                "generation": state.store.snapshot().generation,
            })),
        )
            .into_response(),
    }
}
