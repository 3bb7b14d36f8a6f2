// Configuration validation

use crate::{ConfigError, Result};
use std::fmt::Display;

/// Trait for validating configuration
pub trait Validate {
    /// Check every field, failing on the first bad one.
    fn validate(&self) -> Result<()>;
}

fn invalid(message: String) -> Result<()> {
    Err(ConfigError::ValidationError(message))
}

/// Configuration validator with rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate that a value is not empty
    pub fn not_empty(value: &str, field: &str) -> Result<()> {
        if value.trim().is_empty() {
            return invalid(format!("{} cannot be empty", field));
        }
        Ok(())
    }

    /// Validate that a number is within range
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, field: &str) -> Result<()> {
        if value < min || value > max {
            return invalid(format!(
                "{} must be between {} and {}, got {}",
                field, min, max, value
            ));
        }
        Ok(())
    }

    /// Validate that a value is in a list of allowed values
    pub fn one_of<T: PartialEq + Display>(value: &T, allowed: &[T], field: &str) -> Result<()> {
        if !allowed.contains(value) {
            let allowed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
            return invalid(format!(
                "{} must be one of [{}], got {}",
                field,
                allowed.join(", "),
                value
            ));
        }
        Ok(())
    }

    /// Validate URL format (HTTP or WebSocket)
    pub fn is_url(value: &str, field: &str) -> Result<()> {
        let has_scheme = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| value.starts_with(scheme));
        if !has_scheme || value.split_once("://").is_some_and(|(_, rest)| rest.is_empty()) {
            return invalid(format!("{} must be a valid URL", field));
        }
        Ok(())
    }

    /// Validate an absolute URL path
    pub fn is_path(value: &str, field: &str) -> Result<()> {
        if !value.starts_with('/') || value.contains(char::is_whitespace) {
            return invalid(format!("{} must be an absolute path", field));
        }
        Ok(())
    }

    /// Validate port number
    pub fn is_port(value: u16, field: &str) -> Result<()> {
        if value == 0 {
            return invalid(format!("{} must be a valid port number", field));
        }
        Ok(())
    }

    /// Validate a finite, non-negative number
    pub fn non_negative(value: f64, field: &str) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return invalid(format!("{} must be a non-negative number", field));
        }
        Ok(())
    }
}
