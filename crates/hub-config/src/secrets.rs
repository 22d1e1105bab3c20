//! `secrets.yaml` values for the `!secret` tag

use serde_yaml::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// File holding secrets, next to `configuration.yaml`
pub const SECRETS_FILE: &str = "secrets.yaml";

/// Flat map of secret names to scalar values
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

impl Secrets {
    /// Read `secrets.yaml` from a config directory; an absent file means no secrets
    pub fn load(config_dir: &Path) -> ConfigResult<Self> {
        let path = config_dir.join(SECRETS_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No secrets file");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        let raw: HashMap<String, Value> = serde_yaml::from_str(&text)
            .map_err(|source| ConfigError::Yaml {
                path: path.clone(),
                source,
            })?;

        let values = raw
            .into_iter()
            .map(|(name, value)| scalar_text(&value).map(|text| (name, text)))
            .collect::<ConfigResult<HashMap<_, _>>>()?;

        debug!(path = %path.display(), count = values.len(), "Loaded secrets");
        Ok(Self { values })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { values }
    }

    pub fn get(&self, name: &str) -> ConfigResult<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ConfigError::MissingSecret(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Secrets must be scalars
fn scalar_text(value: &Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(ConfigError::TagArgument {
            tag: "!secret",
            expected: "a scalar value",
            found: format!("{:?}", other),
        }),
    }
}
