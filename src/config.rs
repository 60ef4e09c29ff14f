//! # Configuration Management
//!
//! This module loads the endpoint's configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix, `__` between section and key)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: derive `Serialize`/`Deserialize` so the `config` crate can merge layers
//! - **enums in config**: `StorageBackend` and `TemplateSelection` deserialize from
//!   lowercase strings, so a typo fails at startup instead of at the first request
//! - **Result<T, E>**: every loading step can fail and is propagated with `?`
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_STORAGE__BACKEND, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use crate::services::locale::TemplateSelection;
use crate::skill::response::DEFAULT_LOCATION_PERMISSION;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// ## Sections:
/// - `server`: where the HTTP listener binds
/// - `skill`: prompt tables, stream catalog, permission scope
/// - `storage`: preference store backend
/// - `geolocation`: device address lookup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub skill: SkillConfig,
    pub storage: StorageConfig,
    pub geolocation: GeolocationConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where the skill finds its content.
///
/// ## Fields:
/// - `languages_dir`: directory of `<locale>.json` prompt tables
/// - `fallback_locale`: table used when a request's locale has none
/// - `catalog_path`: stream catalog JSON, must contain a `default` entry
/// - `template_selection`: `random` in production, `first` for reproducible output
/// - `location_permission`: scope requested on the consent card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfig {
    pub languages_dir: PathBuf,
    pub fallback_locale: String,
    pub catalog_path: PathBuf,
    pub template_selection: TemplateSelection,
    pub location_permission: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Lost on restart. Fine for development and tests.
    Memory,
    /// Single JSON document at `storage.path`.
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
    pub timeout_ms: u64,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    pub timeout_ms: u64,
}

impl GeolocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            skill: SkillConfig {
                languages_dir: PathBuf::from("languages"),
                fallback_locale: "en".to_string(),
                catalog_path: PathBuf::from("data/stream_db.json"),
                template_selection: TemplateSelection::Random,
                location_permission: DEFAULT_LOCATION_PERMISSION.to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                path: None,
                timeout_ms: 2000,
            },
            geolocation: GeolocationConfig {
                // The platform gives the whole request roughly eight seconds.
                timeout_ms: 3000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_STORAGE__BACKEND=file`: Persist preferences to disk
    /// - `APP_STORAGE__PATH=/var/lib/radio/preferences.json`
    /// - `APP_SKILL__TEMPLATE_SELECTION=first`
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    pub fn load() -> Result<Self> {
        Self::load_from("config")
    }

    /// Same as [`AppConfig::load`] with an explicit config file stem.
    pub fn load_from(file_stem: &str) -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name(file_stem).required(false))
            // Double underscore keeps `template_selection` and `timeout_ms` intact.
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Both timeouts are positive
    /// - Content paths and the fallback locale are not empty
    /// - A `file` storage backend has a path
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.timeout_ms == 0 {
            return Err(anyhow::anyhow!("Storage timeout must be greater than 0"));
        }

        if self.geolocation.timeout_ms == 0 {
            return Err(anyhow::anyhow!("Geolocation timeout must be greater than 0"));
        }

        if self.skill.languages_dir.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Languages directory cannot be empty"));
        }

        if self.skill.catalog_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Catalog path cannot be empty"));
        }

        if self.skill.fallback_locale.trim().is_empty() {
            return Err(anyhow::anyhow!("Fallback locale cannot be empty"));
        }

        if self.skill.location_permission.trim().is_empty() {
            return Err(anyhow::anyhow!("Location permission cannot be empty"));
        }

        if self.storage.backend == StorageBackend::File
            && self
                .storage
                .path
                .as_ref()
                .map_or(true, |path| path.as_os_str().is_empty())
        {
            return Err(anyhow::anyhow!("File storage backend requires storage.path"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.skill.location_permission, "read::device:all:address");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.geolocation.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.skill.fallback_locale = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_backend_requires_path() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::File;
        assert!(config.validate().is_err());

        config.storage.path = Some(PathBuf::from("/tmp/preferences.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let mut file = tempfile::Builder::new().prefix("radio-skill-").suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[storage]
backend = "file"
path = "prefs.json"

[skill]
template_selection = "first"
"#
        )
        .unwrap();
        let stem = file.path().with_extension("");

        let config = AppConfig::load_from(stem.to_str().unwrap()).unwrap();

        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.storage.path, Some(PathBuf::from("prefs.json")));
        assert_eq!(config.skill.template_selection, TemplateSelection::First);
        assert_eq!(config.storage.timeout_ms, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_use_single_underscore_prefix() {
        env::set_var("APP_SERVER__PORT", "3111");
        env::set_var("APP_GEOLOCATION__TIMEOUT_MS", "4500");
        let loaded = AppConfig::load_from("radio-skill-no-such-file");
        env::remove_var("APP_SERVER__PORT");
        env::remove_var("APP_GEOLOCATION__TIMEOUT_MS");

        let config = loaded.unwrap();
        assert_eq!(config.server.port, 3111);
        assert_eq!(config.geolocation.timeout_ms, 4500);
    }

    #[test]
    fn test_timeouts_as_durations() {
        let config = AppConfig::default();
        assert_eq!(config.storage.timeout(), Duration::from_millis(2000));
        assert_eq!(config.geolocation.timeout(), Duration::from_millis(3000));
    }
}
