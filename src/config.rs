//! Service configuration.
//!
//! Settings come from a JSON file whose sections are each optional; any key
//! missing from the file keeps its default, so a partial file deep-merges
//! over [`Settings::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::harvest::http::HttpSettings;
use crate::harvest::pagination::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE};
use crate::model::Credential;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub runtime: RuntimeSettings,
    pub registry: RegistrySettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Local runtime listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Full argv of the listing command
    pub command: Vec<String>,

    pub timeout_secs: u64,

    pub ignore_file_path: PathBuf,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            command: vec!["sudo".into(), "crictl".into(), "images".into()],
            timeout_secs: 30,
            ignore_file_path: PathBuf::from("images_to_ignore.txt"),
        }
    }
}

impl RuntimeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Registry connection.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Registry URL, e.g. `https://harbor.example.com`; empty disables the source
    pub url: String,
    pub user: String,
    pub password: String,
    pub page_size: u32,
    pub max_pages: u32,
    pub verify_ssl: bool,
    pub request_timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            user: String::new(),
            password: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            verify_ssl: true,
            request_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for RegistrySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrySettings")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("page_size", &self.page_size)
            .field("max_pages", &self.max_pages)
            .field("verify_ssl", &self.verify_ssl)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl RegistrySettings {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Basic credentials, absent when no user is set.
    pub fn credential(&self) -> Option<Credential> {
        if self.user.is_empty() {
            None
        } else {
            Some(Credential::new(&self.user, &self.password))
        }
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            credential: self.credential(),
            verify_tls: self.verify_ssl,
            timeout: Duration::from_secs(self.request_timeout_secs),
            ..HttpSettings::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub pretty_json: bool,

    /// Source harvests allowed to run at once across all requests
    pub max_concurrent_harvests: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5000,
            pretty_json: true,
            max_concurrent_harvests: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,

    /// Append log lines to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            file: None,
        }
    }
}

impl Settings {
    /// Parses settings from JSON text.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Reads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is not valid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads settings from `path`, falling back to defaults when the file is
    /// missing or invalid.
    ///
    /// Returns the problem alongside so it can be logged once logging is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        match Self::from_file(path) {
            Ok(settings) => (settings, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Logs the outcome of [`Settings::load_or_default`].
    pub fn log_load_outcome(path: &Path, problem: Option<&ConfigError>) {
        match problem {
            None => info!(path = %path.display(), "Configuration loaded"),
            Some(ConfigError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(path = %path.display(), "Config file not found, using defaults")
            }
            Some(e) => error!(error = %e, "Using default configuration"),
        }
    }
}
