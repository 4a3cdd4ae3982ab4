//! Build requests: who pushed what, and whether we are allowed to build it.

use std::fmt;

use thiserror::Error;

use crate::config::Config;

/// Prefix of a branch ref in a push event.
pub const HEAD_REF_PREFIX: &str = "refs/heads/";

/// Changelog urgency used when none is given.
pub const DEFAULT_URGENCY: &str = "medium";

/// Reasons a request is refused before any workspace or process exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The pushed ref is a tag or some other non-branch ref.
    #[error("unknown branch: {0} is not a refs/heads/ ref")]
    NotABranch(String),

    /// The repository belongs to an owner we do not build for.
    #[error("wrong owner: {owner} (expected {expected})")]
    WrongOwner { owner: String, expected: String },

    /// The clone URL does not live under the allowed base URL.
    #[error("wrong repository: {url} is not below {expected}")]
    WrongRepository { url: String, expected: String },

    /// The repository name cannot be used as a file name or package name.
    #[error("invalid repository name: {0:?}")]
    InvalidName(String),

    /// The branch name is empty or could be mistaken for a command-line flag.
    #[error("invalid branch name: {0:?}")]
    InvalidBranch(String),
}

/// An immutable request to build one branch of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub pusher: String,
    pub pusher_email: Option<String>,
    pub owner: String,
    pub name: String,
    pub git_url: String,
    /// Branch name with `refs/heads/` already stripped.
    pub branch: String,
    pub urgency: String,
}

impl BuildRequest {
    /// Strips the branch prefix from a pushed ref.
    ///
    /// Tags (`refs/tags/...`) and any other refs are rejected.
    pub fn branch_from_ref(git_ref: &str) -> Result<&str, RequestError> {
        git_ref
            .strip_prefix(HEAD_REF_PREFIX)
            .ok_or_else(|| RequestError::NotABranch(git_ref.to_string()))
    }

    /// Checks the request against the configured owner and URL prefix, and
    /// that the name and branch are safe to hand to external tools.
    pub fn validate(&self, config: &Config) -> Result<(), RequestError> {
        if self.owner != config.allowed_owner {
            return Err(RequestError::WrongOwner {
                owner: self.owner.clone(),
                expected: config.allowed_owner.clone(),
            });
        }

        if !self.git_url.starts_with(&config.allowed_url_prefix) {
            return Err(RequestError::WrongRepository {
                url: self.git_url.clone(),
                expected: config.allowed_url_prefix.clone(),
            });
        }

        validate_name(&self.name)?;

        if self.branch.is_empty() || self.branch.starts_with('-') {
            return Err(RequestError::InvalidBranch(self.branch.clone()));
        }

        Ok(())
    }

    /// Returns the pusher's address if one was supplied.
    pub fn recipient(&self) -> Option<&str> {
        self.pusher_email.as_deref().filter(|e| !e.trim().is_empty())
    }
}

/// The repository name becomes a directory name and a command argument.
fn validate_name(name: &str) -> Result<(), RequestError> {
    let unsafe_name = name.is_empty()
        || name.starts_with('.')
        || name.starts_with('-')
        || name.contains(['/', '\\', '\0'])
        || name.chars().any(char::is_whitespace);

    if unsafe_name {
        return Err(RequestError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl fmt::Display for BuildRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}
