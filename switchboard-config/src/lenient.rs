//! Deserializers for values that may arrive as strings.
//!
//! Environment variables and `.env` files only carry text, while JSON and
//! TOML files carry typed values. Use these with `deserialize_with` so both
//! spellings load:
//!
//! ```rust
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Settings {
//!     #[serde(deserialize_with = "switchboard_config::lenient::parse")]
//!     port: u16,
//!     #[serde(deserialize_with = "switchboard_config::lenient::flag")]
//!     reconnection: bool,
//! }
//!
//! let from_env: Settings =
//!     serde_json::from_str(r#"{"port": "1234", "reconnection": "1"}"#).unwrap();
//! let from_file: Settings =
//!     serde_json::from_str(r#"{"port": 1234, "reconnection": true}"#).unwrap();
//! assert_eq!(from_env.port, from_file.port);
//! assert_eq!(from_env.reconnection, from_file.reconnection);
//! ```

use serde::de::{Deserialize, Deserializer, Error};
use std::fmt::Display;
use std::str::FromStr;

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Raw<T> {
    Native(T),
    Text(String),
}

/// A typed value, or a string parsed with [`FromStr`].
pub fn parse<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match Raw::<T>::deserialize(deserializer)? {
        Raw::Native(value) => Ok(value),
        Raw::Text(text) => text
            .trim()
            .parse()
            .map_err(|e| D::Error::custom(format!("invalid value `{}`: {}", text, e))),
    }
}

/// A boolean, or one of `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Raw::<bool>::deserialize(deserializer)? {
        Raw::Native(value) => Ok(value),
        Raw::Text(text) => match text.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            _ => Err(D::Error::custom(format!("invalid boolean `{}`", text))),
        },
    }
}
