//! Core domain types for the build server.

pub mod ids;
pub mod request;

pub use ids::{CommitId, Secret};
pub use request::{BuildRequest, DEFAULT_URGENCY, HEAD_REF_PREFIX, RequestError};
