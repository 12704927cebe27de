use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cartera_core::config::{AnalysisConfig, Settings};
use cartera_core::domain::recommendation::{AllocationItem, RunSnapshot};
use cartera_core::storage::recommendations;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let data_dir = settings
        .data_dir
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| AnalysisConfig::default().data_dir);
    if !data_dir.is_dir() {
        tracing::warn!(data_dir = %data_dir.display(), "data dir missing; endpoints will 404 until the worker runs");
    }

    let app = router(AppState {
        data_dir: Arc::new(data_dir),
    });

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/recommendations/latest", get(get_latest_snapshot))
        .route("/recommendations/:as_of_date", get(get_snapshot_by_date))
        .route(
            "/recommendations/:as_of_date/:ticker",
            get(get_item_by_date_and_ticker),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    data_dir: Arc<PathBuf>,
}

async fn get_latest_snapshot(
    State(state): State<AppState>,
) -> Result<Json<RunSnapshot>, StatusCode> {
    let snapshot = load(state, None).await?.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(snapshot))
}

async fn get_snapshot_by_date(
    State(state): State<AppState>,
    Path(as_of_date): Path<String>,
) -> Result<Json<RunSnapshot>, StatusCode> {
    let as_of_date = parse_date(&as_of_date)?;
    let snapshot = load(state, Some(as_of_date))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(snapshot))
}

async fn get_item_by_date_and_ticker(
    State(state): State<AppState>,
    Path((as_of_date, ticker)): Path<(String, String)>,
) -> Result<Json<AllocationItem>, StatusCode> {
    let as_of_date = parse_date(&as_of_date)?;
    let snapshot = load(state, Some(as_of_date))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    let item = snapshot.item(&ticker).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(item))
}

fn parse_date(raw: &str) -> Result<NaiveDate, StatusCode> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)
}

async fn load(state: AppState, as_of_date: Option<NaiveDate>) -> Result<Option<RunSnapshot>, StatusCode> {
    let dir = Arc::clone(&state.data_dir);
    let joined = tokio::task::spawn_blocking(move || match as_of_date {
        Some(d) => recommendations::load_snapshot_by_date(&dir, d),
        None => recommendations::load_latest_snapshot(&dir),
    })
    .await;

    match joined {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(e)) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "snapshot lookup failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(e) => {
            let err = anyhow::Error::new(e);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, "snapshot lookup task failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
