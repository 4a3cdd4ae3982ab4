//! Health check endpoint for liveness probes.

use axum::http::StatusCode;

/// Returns 200 OK with the text "OK" while the server accepts connections.
///
/// Running build jobs do not affect the answer.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_returns_200_ok() {
        let (status, body) = health_handler().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }
}
