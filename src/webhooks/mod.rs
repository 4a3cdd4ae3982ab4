//! Webhook handling for GitHub push events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA1)
//! - Parsing of push payloads into build requests

pub mod parser;
pub mod signature;

pub use parser::{ParseError, parse_push};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify, verify_signature,
};
