use std::any::Any;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, Query, State},
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{Local, NaiveDate, Utc};
use dining_common::redis::RedisCache;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info};

use crate::cache::MenuCache;
use crate::config::Config;
use crate::error::{AppError, DescribedError};
use crate::eta::{default_halls, DistanceMatrixClient};
use crate::images::UnsplashImages;
use crate::menu::{normalize_date, MenuService, MenuStore};
use crate::model::{Coordinate, DiningHall, EtaResult, Meal, RankedHall};
use crate::query::{available_meals, current_meal, parse_query};
use crate::ranking::{build_backends, RankingService};

const DEFAULT_MEAL: &str = "Dinner";

/// Everything handlers share. Built once at startup.
pub struct AppState {
    pub menu: MenuService,
    pub etas: DistanceMatrixClient,
    pub ranking: RankingService,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn from_config(
        config: &Config,
        store: Arc<dyn MenuStore>,
        redis: RedisCache,
    ) -> Result<Self, AppError> {
        let menu = MenuService::new(store);
        let etas = DistanceMatrixClient::new(
            &config.distance_matrix_url,
            config.maps_api_key.clone(),
            default_halls(),
        )?;
        info!(halls = etas.halls().len(), "distance matrix configured");
        if config.maps_api_key.is_none() {
            info!("GOOGLE_MAPS_KEY not set, /api/etas will report missing_api_key");
        }

        let cache = Arc::new(MenuCache::new(config.menu_cache_ttl, redis));
        let backends = build_backends(config.gemini.clone(), config.openai.clone())?;
        let ranking = RankingService::new(menu.clone(), cache, backends, Arc::new(UnsplashImages));
        info!(backends = ?ranking.backend_names(), "ranking chain configured");

        Ok(Self {
            menu,
            etas,
            ranking,
        })
    }
}

pub fn router(state: SharedState, max_body_bytes: usize) -> Router {
    with_layers(routes(), max_body_bytes).with_state(state)
}

fn routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/menu", get(menu_handler))
        .route("/api/dining-halls", get(dining_halls_handler))
        .route("/api/dates", get(dates_handler))
        .route("/api/etas", post(etas_handler).options(preflight_handler))
        .route("/api/rank", post(rank_handler))
        .route("/api/meals", get(meals_handler))
        .fallback(not_found_handler)
}

/// CORS headers sit outermost so they land on panic and fallback responses too.
fn with_layers(routes: Router<SharedState>, max_body_bytes: usize) -> Router<SharedState> {
    routes
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, POST, OPTIONS"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type"),
        ))
}

fn handle_panic(_panic: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error" })),
    )
        .into_response()
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" })))
}

async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now().to_rfc3339() }))
}

#[derive(Debug, Deserialize)]
struct MenuParams {
    date: Option<String>,
    meal: Option<String>,
}

async fn menu_handler(
    State(state): State<SharedState>,
    Query(params): Query<MenuParams>,
) -> Result<Json<Vec<DiningHall>>, DescribedError> {
    let describe = |e: AppError| e.described("Failed to fetch dining hall menu");
    let date = params
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| describe(AppError::InvalidRequest("Date parameter is required".to_string())))?;
    let meal = params
        .meal
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MEAL.to_string());

    let halls = state.menu.get_menu(&date, &meal).await.map_err(describe)?;
    Ok(Json(halls))
}

async fn dining_halls_handler(
    State(state): State<SharedState>,
) -> Result<Json<Vec<String>>, DescribedError> {
    let names = state
        .menu
        .list_dining_halls()
        .await
        .map_err(|e| e.described("Failed to fetch dining halls"))?;
    Ok(Json(names))
}

async fn dates_handler(State(state): State<SharedState>) -> Result<Json<Vec<String>>, DescribedError> {
    let dates = state
        .menu
        .list_available_dates()
        .await
        .map_err(|e| e.described("Failed to fetch available dates"))?;
    Ok(Json(dates))
}

/// Buffered body, with the size cap reported as 413 and anything else as malformed input.
fn read_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, AppError> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::InvalidJson
        }
    })
}

/// A blank body reads as `{}`.
fn parse_json_body(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|_| AppError::InvalidJson)
}

fn parse_origin(body: &Value) -> Result<Coordinate, AppError> {
    let origin = body.get("origin").ok_or(AppError::InvalidOrigin)?;
    let lat = origin.get("lat").and_then(Value::as_f64);
    let lon = origin.get("lon").and_then(Value::as_f64);
    let origin = match (lat, lon) {
        (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
        _ => return Err(AppError::InvalidOrigin),
    };
    if !origin.is_valid() {
        return Err(AppError::InvalidOrigin);
    }
    Ok(origin)
}

async fn etas_handler(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Vec<EtaResult>>, AppError> {
    let body = read_body(body)?;
    let origin = parse_origin(&parse_json_body(&body)?)?;
    let etas = state.etas.compute_etas(origin).await?;
    Ok(Json(etas))
}

#[derive(Debug, Default, Deserialize)]
struct RankRequest {
    query: Option<String>,
    meal: Option<String>,
    date: Option<String>,
}

async fn rank_handler(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<Vec<RankedHall>>, AppError> {
    let body = read_body(body)?;
    let request: RankRequest =
        serde_json::from_value(parse_json_body(&body)?).map_err(|_| AppError::InvalidJson)?;

    let now = Local::now().naive_local();
    let parsed = parse_query(
        request.query.as_deref().unwrap_or_default(),
        current_meal(now),
        None,
        now.date(),
    );
    let meal = request
        .meal
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| parsed.meal.to_string());
    let date = request
        .date
        .filter(|d| !d.trim().is_empty())
        .or(parsed.date)
        .unwrap_or_else(|| now.date().format("%Y-%m-%d").to_string());

    let ranked = state
        .ranking
        .rank_halls(request.query.as_deref(), &meal, &date)
        .await?;
    Ok(Json(ranked))
}

#[derive(Debug, Deserialize)]
struct MealsParams {
    date: Option<String>,
}

#[derive(Debug, Serialize)]
struct MealsResponse {
    date: String,
    current: Meal,
    available: Vec<Meal>,
}

async fn meals_handler(Query(params): Query<MealsParams>) -> Result<Json<MealsResponse>, AppError> {
    let now = Local::now().naive_local();
    let date = match params.date.filter(|d| !d.trim().is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(&normalize_date(&raw)?, "%Y-%m-%d")
            .map_err(|e| AppError::InvalidRequest(e.to_string()))?,
        None => now.date(),
    };
    Ok(Json(MealsResponse {
        date: date.format("%Y-%m-%d").to_string(),
        current: current_meal(now),
        available: available_meals(date),
    }))
}
