// Environment variable loading

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::env;

/// Environment variable loader.
///
/// With a prefix, only `PREFIX_*` variables are kept and the key loses the
/// prefix: `SWITCHBOARD_RECONNECTION_DELAY` becomes `reconnection_delay`.
#[derive(Debug, Clone, Default)]
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self {
            prefix: prefix.map(|p| p.trim_end_matches('_').to_uppercase()),
        }
    }

    /// Load matching variables from the process environment
    pub fn load(&self) -> Result<HashMap<String, String>> {
        Ok(self.load_from(env::vars()))
    }

    /// Load matching variables from any `(name, value)` source
    pub fn load_from<I, K, V>(&self, vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        vars.into_iter()
            .filter_map(|(key, value)| self.key_for(key.as_ref()).map(|k| (k, value.into())))
            .collect()
    }

    /// Config key for an environment variable name, if it matches the prefix
    pub fn key_for(&self, name: &str) -> Option<String> {
        match self.prefix {
            Some(ref prefix) => {
                let rest = name.strip_prefix(prefix.as_str())?.strip_prefix('_')?;
                (!rest.is_empty()).then(|| rest.to_lowercase())
            }
            None => Some(name.to_lowercase()),
        }
    }

    /// Variable name for a config key
    pub fn var_name(&self, key: &str) -> String {
        match self.prefix {
            Some(ref prefix) => format!("{}_{}", prefix, key.to_uppercase()),
            None => key.to_uppercase(),
        }
    }

    /// Load a specific environment variable
    pub fn load_var(&self, key: &str) -> Result<String> {
        env::var(self.var_name(key)).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, key: &str, default: &str) -> String {
        self.load_var(key).unwrap_or_else(|_| default.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_loader_with_default() {
        let loader = EnvLoader::new(None);
        let value = loader.load_var_or("NONEXISTENT_VAR_12345", "default");

        assert_eq!(value, "default");
    }

    #[test]
    fn test_env_loader_missing_var() {
        let loader = EnvLoader::new(Some("SWITCHBOARD_TEST".to_string()));
        assert!(loader.load_var("MISSING_VAR_67890").is_err());
    }

    #[test]
    fn test_prefix_is_stripped_and_lowercased() {
        let loader = EnvLoader::new(Some("SWITCHBOARD".to_string()));
        let vars = loader.load_from([
            ("SWITCHBOARD_PORT", "1234"),
            ("SWITCHBOARD_RECONNECTION_DELAY", "3"),
            ("SWITCHBOARDX_PORT", "9"),
            ("SWITCHBOARD_", "empty"),
            ("PATH", "/usr/bin"),
        ]);

        assert_eq!(vars.len(), 2);
        assert_eq!(vars.get("port").map(String::as_str), Some("1234"));
        assert_eq!(vars.get("reconnection_delay").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_var_name_round_trips_key() {
        let loader = EnvLoader::new(Some("switchboard_".to_string()));
        assert_eq!(loader.var_name("server_url"), "SWITCHBOARD_SERVER_URL");
        assert_eq!(
            loader.key_for("SWITCHBOARD_SERVER_URL").as_deref(),
            Some("server_url")
        );
        assert_eq!(EnvLoader::default().key_for("HOME").as_deref(), Some("home"));
    }
}
