//! Service liveness and build information.

use actix_web::{get, web, Responder};
use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// Health
// =============================================================================

#[get("/health")]
pub async fn health() -> Result<impl Responder, Error> {
    Ok(web::Json(HealthResponse { status: "ok" }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse<'a> {
    pub status: &'a str,
}

// =============================================================================
// Version
// =============================================================================

#[get("/version")]
pub async fn version() -> Result<impl Responder, Error> {
    const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

    Ok(web::Json(VersionResponse { version: VERSION }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionResponse<'a> {
    pub version: Option<&'a str>,
}
