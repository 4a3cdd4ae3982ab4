//! Layered TOML configuration files.
//!
//! Each file is parsed into a table and merged over the previous layers, key
//! by key, before the result is checked against [`ConfigFile`]. Mapping tables
//! (`Stages`, `Releases`, `Sections`) keep the order in which their keys first
//! appear.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use super::{Config, ConfigError, MailConfig, PackagerIdentity, Rule};
use crate::types::Secret;

/// `[Server]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub dryrun: Option<bool>,
    pub smtp_server: Option<String>,
    pub smtp_sender: Option<String>,
    pub smtp_tls: Option<bool>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

/// `[Launchpad]` and `[Github]` tables.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OwnerSection {
    pub owner: Option<String>,
    pub baseurl: Option<String>,
}

/// `[Build]` table.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub gpgkey: Option<String>,
    pub version_suffix: Option<String>,
    pub default_release: Option<String>,
    pub default_stage: Option<String>,
    pub default_section: Option<String>,
}

/// The merged contents of every configuration layer.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(rename = "Server")]
    pub server: ServerSection,
    #[serde(rename = "Launchpad")]
    pub launchpad: OwnerSection,
    #[serde(rename = "Github")]
    pub github: OwnerSection,
    #[serde(rename = "Build")]
    pub build: BuildSection,
    #[serde(rename = "Stages")]
    pub stages: Option<toml::Table>,
    #[serde(rename = "Releases")]
    pub releases: Option<toml::Table>,
    #[serde(rename = "Sections")]
    pub sections: Option<toml::Table>,
}

/// Reads and merges the given files in order.
pub fn load_layers(paths: &[impl AsRef<Path>]) -> Result<ConfigFile, ConfigError> {
    let mut merged = toml::Table::new();

    for path in paths {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let layer: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config layer");
        merge_tables(&mut merged, layer);
    }

    toml::Value::Table(merged)
        .try_into()
        .map_err(ConfigError::Schema)
}

/// Merges `layer` into `base`; nested tables merge, everything else is replaced.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Converts a mapping table into ordered rules. `None` keeps the defaults.
fn table_rules(
    section: &'static str,
    table: Option<toml::Table>,
    default: Vec<Rule>,
) -> Result<Vec<Rule>, ConfigError> {
    let Some(table) = table else {
        return Ok(default);
    };

    table
        .into_iter()
        .map(|(key, value)| match value {
            toml::Value::String(value) => Ok(Rule::new(key, value)),
            _ => Err(ConfigError::InvalidRule { section, key }),
        })
        .collect()
}

impl ConfigFile {
    /// Applies the file values over [`Config::default`].
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let defaults = Config::default();

        let server = self.server;
        // Mail needs both a relay and a sender; without a sender it stays off.
        let mail = match (server.smtp_server, server.smtp_sender) {
            (Some(server_addr), Some(sender)) => Some(MailConfig {
                server: server_addr,
                sender,
                starttls: server.smtp_tls.unwrap_or(false),
                user: server.smtp_user,
                password: server.smtp_password.map(Secret::new),
            }),
            _ => None,
        };

        let build = self.build;
        Ok(Config {
            port: server.port.unwrap_or(defaults.port),
            dry_run: server.dryrun.unwrap_or(defaults.dry_run),
            webhook_secret: None,
            mail,
            upload_owner: self.launchpad.owner.unwrap_or(defaults.upload_owner),
            allowed_owner: self.github.owner.unwrap_or(defaults.allowed_owner),
            allowed_url_prefix: self.github.baseurl.unwrap_or(defaults.allowed_url_prefix),
            packager: PackagerIdentity {
                name: build.fullname.unwrap_or(defaults.packager.name),
                email: build.email.unwrap_or(defaults.packager.email),
            },
            signing_key: build.gpgkey.filter(|k| !k.is_empty()),
            version_suffix: build.version_suffix.unwrap_or(defaults.version_suffix),
            default_stage: build.default_stage.unwrap_or(defaults.default_stage),
            default_release: build.default_release.unwrap_or(defaults.default_release),
            primary_section: build.default_section.unwrap_or(defaults.primary_section),
            stages: table_rules("Stages", self.stages, defaults.stages)?,
            releases: table_rules("Releases", self.releases, defaults.releases)?,
            sections: table_rules("Sections", self.sections, defaults.sections)?,
        })
    }
}
