//! Branch and repository classification.
//!
//! Turns a [`BuildRequest`] into a [`BuildPlan`]: which stage and release the
//! branch targets, which section the repository belongs to, and every file
//! and upload name derived from them. Everything here is pure; the timestamp
//! is supplied by the caller.
//!
//! All three lookups pick the **longest** matching rule, so a specific rule
//! such as `vdr-addon-` wins over a shorter one such as `vdr-`. When two
//! distinct rules of equal length both match, the one configured first wins.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::config::{Config, Rule};
use crate::types::BuildRequest;

/// `strftime` format of the version timestamp (second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Errors from classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// No section rule matches the repository name. There is no fallback:
    /// a package we cannot route must not be built.
    #[error("unknown section for repository {0}")]
    UnknownSection(String),
}

/// Everything the pipeline needs to know about one build, fixed up front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPlan {
    pub package: String,
    pub stage: String,
    pub release: String,
    pub section: String,
    pub urgency: String,

    /// Build time formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,

    /// `<timestamp><stage>`, the upstream version.
    pub package_version: String,

    /// Version suffix template with the release substituted.
    pub version_suffix: String,

    /// `<package>_<package_version>`, also the clone directory.
    pub source_dir: String,

    /// `<source_dir>.orig.tar.gz`
    pub orig_tarball: String,

    /// `<source_dir><version_suffix>_source.changes`
    pub changes_file: String,

    /// PPA name under the upload owner (`main` or `<stage>-<section>`).
    pub upload_repository: String,

    /// Full `dput` target, `ppa:<owner>/<upload_repository>`.
    pub upload_target: String,
}

impl BuildPlan {
    /// The Debian version written to the changelog.
    pub fn full_version(&self) -> String {
        format!("{}{}", self.package_version, self.version_suffix)
    }
}

/// Finds the rule with the longest pattern accepted by `matches`.
///
/// Ties keep the earliest rule.
fn longest_match<'a>(rules: &'a [Rule], matches: impl Fn(&str) -> bool) -> Option<&'a Rule> {
    rules
        .iter()
        .filter(|rule| matches(&rule.pattern))
        .fold(None, |best: Option<&Rule>, rule| match best {
            Some(b) if b.pattern.len() >= rule.pattern.len() => Some(b),
            _ => Some(rule),
        })
}

/// Stage for `branch`: longest matching prefix, else the default stage.
pub fn resolve_stage<'a>(branch: &str, config: &'a Config) -> &'a str {
    longest_match(&config.stages, |p| branch.starts_with(p))
        .map_or(config.default_stage.as_str(), |r| r.value.as_str())
}

/// Release for `branch`: longest matching suffix, else the default release.
pub fn resolve_release<'a>(branch: &str, config: &'a Config) -> &'a str {
    longest_match(&config.releases, |s| branch.ends_with(s))
        .map_or(config.default_release.as_str(), |r| r.value.as_str())
}

/// Section for `repository`: longest matching prefix. There is no default.
pub fn resolve_section<'a>(repository: &str, config: &'a Config) -> Result<&'a str, ClassifyError> {
    longest_match(&config.sections, |p| repository.starts_with(p))
        .map(|r| r.value.as_str())
        .ok_or_else(|| ClassifyError::UnknownSection(repository.to_string()))
}

/// PPA name for a stage/section pair.
///
/// The primary section goes to the flat primary PPA, except for builds on
/// the default (unstable) stage, which stay in `<stage>-<section>`.
pub fn upload_repository(stage: &str, section: &str, config: &Config) -> String {
    if section == config.primary_section && stage != config.default_stage {
        config.primary_section.clone()
    } else {
        format!("{stage}-{section}")
    }
}

/// Classifies a request into a complete build plan.
pub fn classify(
    request: &BuildRequest,
    config: &Config,
    now: NaiveDateTime,
) -> Result<BuildPlan, ClassifyError> {
    let section = resolve_section(&request.name, config)?;
    let stage = resolve_stage(&request.branch, config);
    let release = resolve_release(&request.branch, config);

    let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
    let version_suffix = config.version_suffix_for(release);
    let package_version = format!("{timestamp}{stage}");
    let source_dir = format!("{}_{}", request.name, package_version);
    let upload_repository = upload_repository(stage, section, config);

    Ok(BuildPlan {
        package: request.name.clone(),
        stage: stage.to_string(),
        release: release.to_string(),
        section: section.to_string(),
        urgency: request.urgency.clone(),
        orig_tarball: format!("{source_dir}.orig.tar.gz"),
        changes_file: format!("{source_dir}{version_suffix}_source.changes"),
        upload_target: format!("ppa:{}/{}", config.upload_owner, upload_repository),
        timestamp,
        package_version,
        version_suffix,
        source_dir,
        upload_repository,
    })
}
