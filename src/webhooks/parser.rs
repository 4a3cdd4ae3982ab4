//! GitHub push payload parser.
//!
//! Only the handful of fields a build needs are extracted; everything else in
//! the payload is ignored. The signature has already been checked by the time
//! this runs.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{BuildRequest, DEFAULT_URGENCY, RequestError};

/// Error type for push payload parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The push was not to a branch.
    #[error(transparent)]
    Request(#[from] RequestError),
}

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    git_ref: String,
    pusher: RawPusher,
    repository: RawRepository,
}

#[derive(Debug, Deserialize)]
struct RawPusher {
    name: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    name: String,
    owner: RawOwner,
    git_url: String,
}

/// Push payloads carry the owner's `name` (not `login`).
#[derive(Debug, Deserialize)]
struct RawOwner {
    name: String,
}

/// Parses a push event payload into a build request.
///
/// The request is not yet checked against the configuration; see
/// [`BuildRequest::validate`].
///
/// # Examples
///
/// ```
/// use gh2lp::webhooks::parse_push;
///
/// let payload = br#"{
///     "ref": "refs/heads/master",
///     "pusher": { "name": "alice", "email": "alice@example.org" },
///     "repository": {
///         "name": "yavdr-base",
///         "owner": { "name": "yavdr" },
///         "git_url": "git://github.com/yavdr/yavdr-base.git"
///     }
/// }"#;
///
/// let request = parse_push(payload).unwrap();
/// assert_eq!(request.branch, "master");
/// ```
pub fn parse_push(payload: &[u8]) -> Result<BuildRequest, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;
    let branch = BuildRequest::branch_from_ref(&raw.git_ref)?;

    Ok(BuildRequest {
        pusher: raw.pusher.name,
        pusher_email: raw.pusher.email,
        owner: raw.repository.owner.name,
        name: raw.repository.name,
        git_url: raw.repository.git_url,
        branch: branch.to_string(),
        urgency: DEFAULT_URGENCY.to_string(),
    })
}
