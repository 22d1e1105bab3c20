//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("secret '{0}' is not defined")]
    MissingSecret(String),

    #[error("environment variable '{0}' is not set and has no default")]
    MissingEnvVar(String),

    /// A custom tag was given an argument of the wrong shape
    #[error("{tag} expects {expected}, got {found}")]
    TagArgument {
        tag: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("include cycle: {}", format_chain(.chain))]
    IncludeCycle { chain: Vec<PathBuf> },

    #[error("section '{section}' is invalid: {source}")]
    Section {
        section: String,
        #[source]
        source: serde_yaml::Error,
    },
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
