//! Webhook endpoint handler.
//!
//! Authenticates push deliveries and answers immediately. Parsing,
//! validation and the build itself run afterwards on a blocking thread owned
//! by the server's task tracker, so GitHub never waits for a build.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::build::{BuildContext, BuildJob, BuildOutcome};
use crate::webhooks::{parse_push, verify};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for the HMAC-SHA1 signature.
const HEADER_SIGNATURE: &str = "x-hub-signature";

/// The only event type that triggers a build.
const PUSH_EVENT: &str = "push";

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature missing or wrong while a secret is configured.
    #[error("invalid signature")]
    InvalidSignature,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Headers:
///   - `X-Hub-Signature`: `sha1=<hex>` HMAC of the body (required when a
///     secret is configured)
///   - `X-GitHub-Event`: optional; anything other than `push` is ignored
/// - Body: JSON push payload
///
/// # Response
///
/// - 200 OK: Delivery accepted. The build outcome is mailed, not returned.
/// - 401 Unauthorized: Invalid signature (empty body)
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    let signature = header_str(&headers, HEADER_SIGNATURE);

    if !verify(app_state.config().webhook_secret(), &body, signature) {
        warn!(signed = signature.is_some(), "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    if let Some(event) = header_str(&headers, HEADER_EVENT).filter(|e| *e != PUSH_EVENT) {
        debug!(event_type = %event, "Ignoring non-push event");
        return Ok(StatusCode::OK);
    }

    let ctx = app_state.build_context().clone();
    app_state
        .jobs()
        .spawn_blocking(move || dispatch(ctx, &body));

    Ok(StatusCode::OK)
}

/// Parses the delivery and runs its build. Runs on a blocking thread.
fn dispatch(ctx: BuildContext, body: &[u8]) {
    let request = match parse_push(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Dropping push delivery");
            return;
        }
    };

    info!(request = %request, pusher = %request.pusher, "Push accepted");
    let report = BuildJob::new(ctx, request).run();

    if let BuildOutcome::Failed {
        stage, category, ..
    } = &report.outcome
    {
        debug!(%stage, category, "Build job finished with failure");
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn invalid_signature_is_401_with_empty_body() {
        let response = WebhookError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn header_str_ignores_non_ascii_values() {
        let mut headers = HeaderMap::new();
        headers.insert(HEADER_EVENT, HeaderValue::from_static("push"));
        headers.insert(HEADER_SIGNATURE, HeaderValue::from_bytes(b"sha1=\xff").unwrap());

        assert_eq!(header_str(&headers, HEADER_EVENT), Some("push"));
        assert_eq!(header_str(&headers, HEADER_SIGNATURE), None);
        assert_eq!(header_str(&headers, "x-missing"), None);
    }
}
