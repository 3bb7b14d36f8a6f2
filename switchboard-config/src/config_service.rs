// ConfigService - layered loading in a fixed order

use crate::{ConfigManager, FileFormat, Result, Validate};
use serde::de::DeserializeOwned;

/// Read-only view over a fully loaded [`ConfigManager`].
#[derive(Clone, Default)]
pub struct ConfigService {
    manager: ConfigManager,
}

impl ConfigService {
    /// Create from an existing manager
    pub fn from_manager(manager: ConfigManager) -> Self {
        Self { manager }
    }

    /// Builder for creating configured service
    pub fn builder() -> ConfigServiceBuilder {
        ConfigServiceBuilder::new()
    }

    /// Get configuration value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.manager.get(key)
    }

    /// Get configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.manager.get_or(key, default)
    }

    /// Check if key exists
    pub fn has(&self, key: &str) -> bool {
        self.manager.has(key)
    }

    /// Deserialize and validate the whole configuration
    pub fn settings<T: DeserializeOwned + Validate>(&self) -> Result<T> {
        self.manager.load_validated()
    }

    /// Get underlying manager
    pub fn manager(&self) -> &ConfigManager {
        &self.manager
    }
}

enum Source {
    File(String, Option<FileFormat>),
    Dotenv(Option<String>),
    Env,
    Vars(Vec<(String, String)>),
}

/// Builder for ConfigService
///
/// Sources are applied in the order they were added; later sources win.
#[derive(Default)]
pub struct ConfigServiceBuilder {
    prefix: Option<String>,
    sources: Vec<Source>,
}

impl ConfigServiceBuilder {
    /// Create a builder with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set environment variable prefix
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Load the process environment
    pub fn load_env(mut self) -> Self {
        self.sources.push(Source::Env);
        self
    }

    /// Load a .env file into the process environment, then the environment.
    /// A missing default `.env` is ignored.
    pub fn load_dotenv(mut self, path: Option<String>) -> Self {
        self.sources.push(Source::Dotenv(path));
        self
    }

    /// Load explicit variables as if they came from the environment
    pub fn vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.sources.push(Source::Vars(vars));
        self
    }

    /// Add configuration file to load
    pub fn add_file<S: Into<String>>(mut self, path: S, format: FileFormat) -> Self {
        self.sources.push(Source::File(path.into(), Some(format)));
        self
    }

    /// Add a configuration file whose format follows its extension
    pub fn add_file_auto<S: Into<String>>(mut self, path: S) -> Self {
        self.sources.push(Source::File(path.into(), None));
        self
    }

    /// Build the configuration service
    pub fn build(self) -> Result<ConfigService> {
        let manager = match self.prefix {
            Some(prefix) => ConfigManager::with_prefix(prefix),
            None => ConfigManager::new(),
        };

        for source in self.sources {
            match source {
                Source::File(path, Some(format)) => manager.load_file(&path, format)?,
                Source::File(path, None) => manager.load_file_auto(&path)?,
                Source::Dotenv(path) => manager.load_dotenv(path.as_deref())?,
                Source::Env => manager.load_env()?,
                Source::Vars(vars) => manager.load_env_from(vars),
            }
        }

        Ok(ConfigService::from_manager(manager))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_later_sources_win() {
        let service = ConfigService::builder()
            .with_prefix("SWITCHBOARD")
            .vars([("SWITCHBOARD_PORT", "1"), ("SWITCHBOARD_HOST", "a")])
            .vars([("SWITCHBOARD_PORT", "2")])
            .build()
            .unwrap();

        assert_eq!(service.get::<String>("port").unwrap(), "2");
        assert_eq!(service.get::<String>("host").unwrap(), "a");
        assert!(!service.has("missing"));
    }

    #[test]
    fn test_missing_file_fails_build() {
        let result = ConfigService::builder()
            .add_file("/nonexistent/switchboard.toml", FileFormat::Toml)
            .build();
        assert!(result.is_err());
    }
}
