use actix_web::HttpResponse;
use serde_json::json;

use crate::routes::DataEnvelope;

/// GET /health_check
///
/// Liveness only; does not touch the stores.
pub async fn health_check() -> HttpResponse {
    tracing::debug!("Health check endpoint called");
    HttpResponse::Ok().json(DataEnvelope::new(json!({ "status": "ok" })))
}
