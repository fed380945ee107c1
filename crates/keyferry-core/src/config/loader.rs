//! Configuration file loading and parsing

use crate::error::{Error, Result};
use crate::types::HandoffSettings;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use tracing::debug;

/// Configuration file names to search for
pub const CONFIG_FILE_NAMES: &[&str] = &["keyferry.yaml", "keyferry.yml"];

/// Loaded keyferry configuration
#[derive(Debug, Clone, Default)]
pub struct KeyferryConfig {
    /// Merged settings
    pub settings: HandoffSettings,

    /// Path to the configuration file, if one was found
    pub config_path: Option<Utf8PathBuf>,
}

impl KeyferryConfig {
    /// Load configuration from the given path, or search for one
    ///
    /// An explicit path must exist. Without one, the current directory and
    /// its parents are searched; when nothing is found the built-in
    /// defaults are used.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let found = match path {
            Some(p) => {
                let content = fs::read_to_string(p).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::config_not_found(p.as_str())
                    } else {
                        Error::Io(e)
                    }
                })?;
                Some((p.to_owned(), content))
            }
            None => Self::find_config()?,
        };

        match found {
            Some((config_path, content)) => {
                debug!("Loading configuration from {}", config_path);
                let working_dir = config_path
                    .parent()
                    .map(|p| p.to_owned())
                    .unwrap_or_else(|| Utf8PathBuf::from("."));
                let mut settings = Self::parse(&content)?;
                resolve_relative(&mut settings.secret_file, &working_dir);
                resolve_relative(&mut settings.target.key_file, &working_dir);
                Ok(Self {
                    settings,
                    config_path: Some(config_path),
                })
            }
            None => {
                debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse settings from YAML text
    pub fn parse(content: &str) -> Result<HandoffSettings> {
        if content.trim().is_empty() {
            return Ok(HandoffSettings::default());
        }
        Ok(serde_yaml_ng::from_str(content)?)
    }

    /// Apply command-line overrides on top of file values
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        let s = &mut self.settings;
        override_string(&mut s.project_id, &overrides.project_id);
        override_string(&mut s.location_id, &overrides.location_id);
        override_string(&mut s.key_ring_id, &overrides.key_ring_id);
        override_string(&mut s.crypto_key_id, &overrides.crypto_key_id);
        override_string(&mut s.bucket, &overrides.bucket);
        override_string(&mut s.object, &overrides.object);
        override_string(
            &mut s.target.service_account,
            &overrides.target_service_account,
        );
        if let Some(path) = &overrides.secret_file {
            s.secret_file = path.clone();
        }
        if let Some(path) = &overrides.target_key_file {
            s.target.key_file = path.clone();
        }
        if let Some(endpoint) = &overrides.kms_endpoint {
            s.endpoints.kms = endpoint.clone();
        }
        if let Some(endpoint) = &overrides.storage_endpoint {
            s.endpoints.storage = endpoint.clone();
        }
        if let Some(attempts) = overrides.propagation_attempts {
            s.propagation.max_attempts = attempts;
        }
        if overrides.dedupe_binding {
            s.grant.dedupe = true;
        }
        if overrides.compensate_on_failure {
            s.compensate_on_failure = true;
        }
    }

    /// Serialize the current settings as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(&self.settings)?)
    }

    /// Find configuration file in current directory or parent directories
    fn find_config() -> Result<Option<(Utf8PathBuf, String)>> {
        let cwd = std::env::current_dir().map_err(Error::Io)?;
        let cwd = Utf8PathBuf::try_from(cwd)
            .map_err(|_| Error::invalid_config("Current directory path is not valid UTF-8"))?;
        Self::find_config_from(&cwd)
    }

    fn find_config_from(start: &Utf8Path) -> Result<Option<(Utf8PathBuf, String)>> {
        let mut current = start;

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let content = fs::read_to_string(&path)?;
                    return Ok(Some((path, content)));
                }
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }
    }
}

/// Values supplied on the command line or through `KEYFERRY_*` variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub project_id: Option<String>,
    pub location_id: Option<String>,
    pub key_ring_id: Option<String>,
    pub crypto_key_id: Option<String>,
    pub bucket: Option<String>,
    pub object: Option<String>,
    pub secret_file: Option<Utf8PathBuf>,
    pub target_service_account: Option<String>,
    pub target_key_file: Option<Utf8PathBuf>,
    pub kms_endpoint: Option<String>,
    pub storage_endpoint: Option<String>,
    pub propagation_attempts: Option<u32>,
    pub dedupe_binding: bool,
    pub compensate_on_failure: bool,
}

fn override_string(target: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

fn resolve_relative(path: &mut Utf8PathBuf, base: &Utf8Path) {
    if path.is_relative() && !path.as_str().is_empty() {
        *path = base.join(&*path);
    }
}
