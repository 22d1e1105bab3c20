//! YAML configuration loading for homehub
//!
//! Configuration lives in a directory holding `configuration.yaml` and an
//! optional `secrets.yaml`. The loader understands three custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable, with an optional default
//!
//! Component crates own their typed configuration structs; use
//! [`load_section`] to pull a list of them out of the loaded document.
//!
//! # Example
//!
//! ```ignore
//! use hub_config::{load_section, load_yaml};
//!
//! let config = load_yaml("/etc/homehub", "configuration.yaml")?;
//! let triggers: Vec<TriggerConfig> = load_section(&config, "triggers")?;
//! ```

mod error;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_section, load_yaml, load_yaml_string, YamlLoader};
pub use secrets::{Secrets, SECRETS_FILE};

// Re-export serde_yaml::Value for convenience
pub use serde_yaml::Value;

/// Name of the main configuration file
pub const CONFIG_FILE: &str = "configuration.yaml";
