//! Process-wide build server configuration.
//!
//! A [`Config`] is assembled once at startup from zero or more layered TOML
//! files, command-line overrides and the environment, and is then shared
//! read-only (behind an `Arc`) by the HTTP server and every build job.
//!
//! # File format
//!
//! ```toml
//! [Server]
//! port = 8180
//! dryrun = false
//! smtp_server = "mail.example.org:587"
//! smtp_sender = "buildbot@example.org"
//! smtp_tls = true
//!
//! [Launchpad]
//! owner = "yavdr"
//!
//! [Github]
//! owner = "yavdr"
//! baseurl = "git://github.com/yavdr/"
//!
//! [Build]
//! fullname = "yaVDR Release-Team"
//! email = "release@yavdr.org"
//! version_suffix = "-0yavdr0~{release}"
//!
//! [Stages]
//! master = "unstable"
//! "stable-" = "stable"
//! ```

pub mod file;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::Secret;

pub use file::{ConfigFile, load_layers};

/// Placeholder substituted into [`Config::version_suffix`].
pub const RELEASE_PLACEHOLDER: &str = "{release}";

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid TOML.
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The merged layers do not match the expected schema.
    #[error("invalid configuration: {0}")]
    Schema(#[source] toml::de::Error),

    /// A mapping rule has a non-string value.
    #[error("rule `{key}` in [{section}] must map to a string")]
    InvalidRule { section: &'static str, key: String },
}

/// A single `pattern → value` mapping rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub pattern: String,
    pub value: String,
}

impl Rule {
    pub fn new(pattern: impl Into<String>, value: impl Into<String>) -> Self {
        Rule {
            pattern: pattern.into(),
            value: value.into(),
        }
    }
}

/// Builds an ordered rule list from `(pattern, value)` pairs.
pub fn rules<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Vec<Rule> {
    pairs.into_iter().map(|(p, v)| Rule::new(p, v)).collect()
}

/// Identity written into generated changelog entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagerIdentity {
    /// Exported as `DEBFULLNAME`.
    pub name: String,
    /// Exported as `DEBEMAIL`.
    pub email: String,
}

/// SMTP settings. Only present when both a server and a sender are configured.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// `host` or `host:port`.
    pub server: String,
    pub sender: String,
    pub starttls: bool,
    pub user: Option<String>,
    pub password: Option<Secret>,
}

/// Values given on the command line, which win over every file layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub dry_run: Option<bool>,
}

/// Immutable build server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,

    /// Run the full pipeline but skip the upload and keep the workspace.
    pub dry_run: bool,

    /// Shared secret for `X-Hub-Signature`. `None` disables authentication.
    pub webhook_secret: Option<Secret>,

    /// Outbound mail; `None` means transcripts are only logged.
    pub mail: Option<MailConfig>,

    /// Launchpad user or team owning the target PPAs.
    pub upload_owner: String,

    /// Repository owner whose pushes are accepted.
    pub allowed_owner: String,

    /// Clone URLs must start with this prefix.
    pub allowed_url_prefix: String,

    pub packager: PackagerIdentity,

    /// Key id passed to `debuild -k`. Omitted from the command when `None`.
    pub signing_key: Option<String>,

    /// Debian revision template; `{release}` is replaced by the resolved release.
    pub version_suffix: String,

    pub default_stage: String,
    pub default_release: String,

    /// Section whose non-default-stage builds go to the flat primary PPA.
    pub primary_section: String,

    /// Branch prefix → stage, in configured order.
    pub stages: Vec<Rule>,

    /// Branch suffix → release, in configured order.
    pub releases: Vec<Rule>,

    /// Repository name prefix → section, in configured order.
    pub sections: Vec<Rule>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8180,
            dry_run: false,
            webhook_secret: None,
            mail: None,
            upload_owner: "yavdr".to_string(),
            allowed_owner: "yavdr".to_string(),
            allowed_url_prefix: "git://github.com/yavdr/".to_string(),
            packager: PackagerIdentity {
                name: "yaVDR Release-Team".to_string(),
                email: "release@yavdr.org".to_string(),
            },
            signing_key: None,
            version_suffix: "-0yavdr0~{release}".to_string(),
            default_stage: "unstable".to_string(),
            default_release: "trusty".to_string(),
            primary_section: "main".to_string(),
            stages: rules([
                ("master", "unstable"),
                ("testing-", "testing"),
                ("stable-", "stable"),
            ]),
            releases: rules([("-0.5", "precise"), ("-0.6", "trusty")]),
            sections: rules([("vdr-", "vdr"), ("vdr-addon-", "main"), ("yavdr-", "yavdr")]),
        }
    }
}

impl Config {
    /// Loads the configuration from layered files, then applies command-line
    /// overrides and the webhook secret.
    ///
    /// Files are applied in order; a key in a later file replaces the same key
    /// in an earlier one. Keys absent from every file keep their defaults.
    pub fn load(
        paths: &[impl AsRef<Path>],
        overrides: &Overrides,
        webhook_secret: Option<Secret>,
    ) -> Result<Self, ConfigError> {
        let file = load_layers(paths)?;
        let mut config = file.into_config()?;

        if let Some(port) = overrides.port {
            config.port = port;
        }
        if let Some(dry_run) = overrides.dry_run {
            config.dry_run = dry_run;
        }
        config.webhook_secret = webhook_secret.filter(|s| !s.expose().is_empty());

        Ok(config)
    }

    /// Returns the webhook secret bytes, if authentication is enabled.
    pub fn webhook_secret(&self) -> Option<&[u8]> {
        self.webhook_secret.as_ref().map(Secret::as_bytes)
    }

    /// Substitutes `release` into the version suffix template.
    pub fn version_suffix_for(&self, release: &str) -> String {
        self.version_suffix.replace(RELEASE_PLACEHOLDER, release)
    }
}
