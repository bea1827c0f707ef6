use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use bigdecimal::ParseBigDecimalError as BIG_DECIMAL_ERROR;
use serde_json::Error as JSON_ERROR;
use sqlx::error::Error as SQL_ERROR;
use std::{env::VarError, io::Error as IO_ERROR, num::ParseIntError};
use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::error::Elapsed;
use tracing::subscriber::SetGlobalDefaultError as TRACING_GLOBAL_DEFAULT_ERROR;
use uuid::Error as UUID_ERROR;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] IO_ERROR),

    #[error("{0}")]
    INT(#[from] ParseIntError),

    #[error("{0}")]
    SQL(#[from] SQL_ERROR),

    #[error("{0}")]
    VAR(#[from] VarError),

    #[error("{0}")]
    TokioJoinError(#[from] JoinError),

    #[error("{0}")]
    TokioElapsedError(#[from] Elapsed),

    #[error("{0}")]
    BigDecimalError(#[from] BIG_DECIMAL_ERROR),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("{0}")]
    JsonError(#[from] JSON_ERROR),

    #[error("Server end with error: {0}")]
    ServerError(String),

    #[error("Tracing error: {0}")]
    SetGlobalDefaultError(#[from] TRACING_GLOBAL_DEFAULT_ERROR),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid reward id: {0}")]
    InvalidRewardId(#[from] UUID_ERROR),

    #[error("Reward not found: {0}")]
    RewardNotFound(String),

    #[error("Reward already reversed: {0}")]
    RewardAlreadyReversed(String),

    #[error("Holding {user_id}/{symbol} cannot cover reversal of {quantity}")]
    InsufficientHolding {
        user_id: String,
        symbol: String,
        quantity: String,
    },

    #[error("Price unavailable for {symbol}: {reason}")]
    UpstreamPrice { symbol: String, reason: String },
}

impl Error {
    /// Errors raised because the reward is not in a reversible state.
    /// Retrying them without changing the request never succeeds.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::RewardNotFound(_)
                | Error::RewardAlreadyReversed(_)
                | Error::InsufficientHolding { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::BigDecimalError(_)
                | Error::InvalidRewardId(_)
        )
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            return StatusCode::BAD_REQUEST;
        }

        if self.is_invalid_state() {
            return match self {
                Error::RewardNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::CONFLICT,
            };
        }

        match self {
            Error::JsonError(_) => StatusCode::BAD_REQUEST,
            Error::UpstreamPrice { .. } => StatusCode::BAD_GATEWAY,
            Error::TokioElapsedError(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => String::from("internal"),
            _ => self.to_string(),
        };
        let body = serde_json::json!({
            "error": status.canonical_reason().unwrap_or("Unknown"),
            "message": message,
            "status": status.as_u16(),
        });
        HttpResponse::build(status).json(body)
    }
}
