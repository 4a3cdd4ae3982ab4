//! gh2lp - builds Debian source packages from GitHub pushes and uploads them
//! to Launchpad PPAs.
//!
//! This library provides the build-dispatch engine: webhook authentication,
//! branch and repository classification, the per-build job and pipeline, and
//! transcript notification.

pub mod build;
pub mod classify;
pub mod config;
pub mod notify;
pub mod server;
pub mod types;
pub mod webhooks;

#[cfg(test)]
mod test_utils;
