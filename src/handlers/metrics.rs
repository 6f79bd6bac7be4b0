use axum::http::StatusCode;
use tracing::error;

pub async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    crate::metrics::render().map_err(|e| {
        error!(error = %e, "failed to encode metrics");
        (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics".to_string())
    })
}
