use analytics::{AccuracyRow, ActionDistribution, PerformanceOverview, ReportBuilder};
use axum::{
    extract::{Path, Query, State},
    http::Method,
    routing::get,
    Json, Router,
};
use confidence_engine::CalibrationMetrics;
use prediction_store::{
    AuditReport, EvaluatedPrediction, OutcomeRepository, Prediction, PredictionRepository, StoreError,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{ApiResponse, AppError, AppState};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct PredictionQuery {
    pub limit: Option<i64>,
    pub symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub window: Option<i64>,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn checked_limit(limit: Option<i64>) -> Result<i64, AppError> {
    match limit.unwrap_or(DEFAULT_LIMIT) {
        n if (1..=MAX_LIMIT).contains(&n) => Ok(n),
        n => Err(AppError::bad_request(format!("limit must be between 1 and {}, got {}", MAX_LIMIT, n))),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/predictions", get(list_predictions))
        .route("/api/predictions/:id", get(get_prediction))
        .route("/api/outcomes", get(list_outcomes))
        .route("/api/reports/overview", get(overview))
        .route("/api/reports/actions", get(actions))
        .route("/api/reports/symbols", get(symbols))
        .route("/api/reports/calibration", get(calibration))
        .route("/api/audit", get(audit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_methods([Method::GET]))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let predictions = PredictionRepository::new(state.db.clone()).count().await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "status": "ok",
        "predictions": predictions,
    }))))
}

async fn list_predictions(
    State(state): State<AppState>,
    Query(query): Query<PredictionQuery>,
) -> ApiResult<Vec<Prediction>> {
    let limit = checked_limit(query.limit)?;
    let repo = PredictionRepository::new(state.db.clone());
    let predictions = match query.symbol.as_deref() {
        Some(symbol) => repo.list_for_symbol(symbol, limit).await?,
        None => repo.list_recent(limit).await?,
    };
    Ok(Json(ApiResponse::success(predictions)))
}

async fn get_prediction(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Prediction> {
    let prediction = PredictionRepository::new(state.db.clone())
        .get(&id)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("prediction {}", id)))?;
    Ok(Json(ApiResponse::success(prediction)))
}

async fn list_outcomes(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<EvaluatedPrediction>> {
    let limit = checked_limit(query.limit)?;
    let rows = OutcomeRepository::new(state.db.clone())
        .list_with_predictions(limit)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn overview(State(state): State<AppState>) -> ApiResult<PerformanceOverview> {
    let overview = ReportBuilder::new(state.db.clone()).performance_overview().await?;
    Ok(Json(ApiResponse::success(overview)))
}

async fn actions(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> ApiResult<ActionDistribution> {
    let window = checked_limit(Some(query.window.unwrap_or(state.hold_window)))?;
    let distribution = ReportBuilder::new(state.db.clone())
        .hold_window(window)
        .action_distribution()
        .await?;
    Ok(Json(ApiResponse::success(distribution)))
}

async fn symbols(State(state): State<AppState>) -> ApiResult<Vec<AccuracyRow>> {
    let rows = ReportBuilder::new(state.db.clone()).accuracy_by_symbol().await?;
    Ok(Json(ApiResponse::success(rows)))
}

async fn calibration(State(state): State<AppState>) -> ApiResult<CalibrationMetrics> {
    let metrics = ReportBuilder::new(state.db.clone()).confidence_buckets().await?;
    Ok(Json(ApiResponse::success(metrics)))
}

async fn audit(State(state): State<AppState>) -> ApiResult<AuditReport> {
    let report = prediction_store::audit(&state.db).await?;
    Ok(Json(ApiResponse::success(report)))
}
