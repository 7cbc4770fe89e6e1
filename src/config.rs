//! Application configuration, read from a YAML file and overridable through
//! `EMAIL_SUMMARY__*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub icinga: IcingaConfig,
    pub smtp: SmtpConfig,
    pub mail: MailConfig,
    #[serde(default)]
    pub colors: ColorConfig,
    /// Custom minijinja template for the digest body.
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IcingaConfig {
    /// Base url of the Icinga 2 API, e.g. `https://icinga.example.com:5665`.
    pub url: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl IcingaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    #[default]
    None,
    Starttls,
    Tls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: TlsMode,
}

impl SmtpConfig {
    /// Login is only attempted when both halves are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

fn default_smtp_port() -> u16 {
    25
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    /// When false, digests are rendered but never handed to the transport.
    #[serde(default = "default_send")]
    pub send: bool,
}

fn default_subject() -> String {
    "Icinga Summary".to_string()
}

fn default_send() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ColorConfig {
    #[serde(default)]
    pub host: HostColors,
    #[serde(default)]
    pub service: ServiceColors,
}

/// CSS colors for host states.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostColors {
    pub up: String,
    pub down: String,
}

impl Default for HostColors {
    fn default() -> Self {
        Self {
            up: "#44bb77".to_string(),
            down: "#ff5566".to_string(),
        }
    }
}

impl HostColors {
    /// Indexed by host state ordinal.
    pub fn by_state(&self) -> [&str; 4] {
        [&self.up, &self.up, &self.down, &self.down]
    }
}

/// CSS colors for service states.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceColors {
    pub ok: String,
    pub warning: String,
    pub critical: String,
    pub unknown: String,
}

impl Default for ServiceColors {
    fn default() -> Self {
        Self {
            ok: "#44bb77".to_string(),
            warning: "#ffaa44".to_string(),
            critical: "#ff5566".to_string(),
            unknown: "#aa44ff".to_string(),
        }
    }
}

impl ServiceColors {
    /// Indexed by service state ordinal.
    pub fn by_state(&self) -> [&str; 4] {
        [&self.ok, &self.warning, &self.critical, &self.unknown]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Truncated at the start of every run.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Reads `path`, then applies `EMAIL_SUMMARY__SECTION__KEY` overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(Environment::with_prefix("EMAIL_SUMMARY").separator("__"))
            .build()?
            .try_deserialize()
    }

    #[cfg(test)]
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()
    }
}
