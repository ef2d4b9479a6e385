//! Read-only JSON dashboard over the trading database.

mod routes;

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use prediction_store::{StoreError, TradingDb};
use serde::Serialize;
use std::net::SocketAddr;

pub use routes::router;

#[derive(Clone)]
pub struct AppState {
    pub db: TradingDb,
    /// Recent predictions considered by the HOLD diagnosis
    pub hold_window: i64,
}

impl AppState {
    pub fn new(db: TradingDb) -> Self {
        Self { db, hold_window: 100 }
    }
}

/// Envelope for every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!(message.into()))
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        let error = err.into();
        let status = match error.downcast_ref::<StoreError>() {
            Some(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(StoreError::Validation(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, error }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.status, self.error);
        }
        (self.status, Json(ApiResponse::<()>::error(self.error.to_string()))).into_response()
    }
}

pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard to {}", addr))?;
    tracing::info!("Dashboard listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("Dashboard server stopped")?;
    Ok(())
}
