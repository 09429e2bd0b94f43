use crate::config::ConfigError;
use crate::stores::RestSetupError;
use crate::telemetry::TelemetryError;
use crate::workflows::admission::{AdmissionError, PostbackSetupError};
use crate::workflows::autopilot::{AutoPilotError, SyncError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Postback(PostbackSetupError),
    Stores(RestSetupError),
    Admission(AdmissionError),
    AutoPilot(AutoPilotError),
    Sync(SyncError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Postback(err) => write!(f, "postback setup error: {}", err),
            AppError::Stores(err) => write!(f, "store setup error: {}", err),
            AppError::Admission(err) => write!(f, "admission error: {}", err),
            AppError::AutoPilot(err) => write!(f, "auto-pilot error: {}", err),
            AppError::Sync(err) => write!(f, "counter sync error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Postback(err) => Some(err),
            AppError::Stores(err) => Some(err),
            AppError::Admission(err) => Some(err),
            AppError::AutoPilot(err) => Some(err),
            AppError::Sync(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Admission(AdmissionError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Admission(_) | AppError::Sync(_) => StatusCode::BAD_GATEWAY,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Postback(_)
            | AppError::Stores(_)
            | AppError::AutoPilot(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "ok": false, "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<PostbackSetupError> for AppError {
    fn from(value: PostbackSetupError) -> Self {
        Self::Postback(value)
    }
}

impl From<RestSetupError> for AppError {
    fn from(value: RestSetupError) -> Self {
        Self::Stores(value)
    }
}

impl From<AdmissionError> for AppError {
    fn from(value: AdmissionError) -> Self {
        Self::Admission(value)
    }
}

impl From<AutoPilotError> for AppError {
    fn from(value: AutoPilotError) -> Self {
        Self::AutoPilot(value)
    }
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}
