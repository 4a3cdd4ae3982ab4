//! Newtype wrappers for build identifiers and secrets.
//!
//! These keep commit ids and credentials from being mixed up with the many
//! other strings that flow through a build, and keep secrets out of `Debug`
//! output.

use std::fmt;

/// A git commit id as reported by `git rev-parse HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommitId(pub String);

impl CommitId {
    /// Creates a commit id from raw `rev-parse` output, trimming whitespace.
    ///
    /// Note: This does not validate the format.
    pub fn new(s: impl AsRef<str>) -> Self {
        CommitId(s.as_ref().trim().to_string())
    }

    /// Returns the commit id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short (7-character) version of the commit id for display.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId::new(s)
    }
}

/// A credential (webhook secret, SMTP password) that must never be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(s: impl Into<String>) -> Self {
        Secret(s.into())
    }

    /// Returns the secret value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<String> for Secret {
    fn from(s: String) -> Self {
        Secret(s)
    }
}

impl From<&str> for Secret {
    fn from(s: &str) -> Self {
        Secret(s.to_string())
    }
}
