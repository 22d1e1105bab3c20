//! YAML loading with `!include`, `!secret` and `!env_var` expansion

use serde::de::DeserializeOwned;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;

/// Custom tags understood by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Include,
    Secret,
    EnvVar,
}

impl Tag {
    fn parse(tag: &str) -> Option<Self> {
        match tag.trim_start_matches('!') {
            "include" => Some(Tag::Include),
            "secret" => Some(Tag::Secret),
            "env_var" => Some(Tag::EnvVar),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Tag::Include => "!include",
            Tag::Secret => "!secret",
            Tag::EnvVar => "!env_var",
        }
    }
}

/// Loads YAML documents rooted at a config directory
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files being loaded, outermost first
    chain: Vec<PathBuf>,
}

impl YamlLoader {
    /// Loader for a directory, reading its `secrets.yaml` if present
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            chain: Vec::new(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load a file, relative paths resolving against the config directory
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.config_dir.join(path.as_ref());
        if self.chain.contains(&path) {
            let mut chain = self.chain.clone();
            chain.push(path);
            return Err(ConfigError::IncludeCycle { chain });
        }

        debug!(path = %path.display(), depth = self.chain.len(), "Loading YAML");
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        self.chain.push(path.clone());
        let loaded = self.load_string(&text, &path);
        self.chain.pop();
        loaded
    }

    /// Parse and expand a document; `source` anchors relative includes
    pub fn load_string(&mut self, text: &str, source: &Path) -> ConfigResult<Value> {
        let value = serde_yaml::from_str(text).map_err(|e| ConfigError::Yaml {
            path: source.to_path_buf(),
            source: e,
        })?;
        self.expand(value, source)
    }

    fn expand(&mut self, value: Value, source: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.expand_tag(*tagged, source),
            Value::Mapping(mapping) => mapping
                .into_iter()
                .map(|(k, v)| -> ConfigResult<(Value, Value)> {
                    Ok((self.expand(k, source)?, self.expand(v, source)?))
                })
                .collect::<ConfigResult<Mapping>>()
                .map(Value::Mapping),
            Value::Sequence(items) => items
                .into_iter()
                .map(|item| self.expand(item, source))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            scalar => Ok(scalar),
        }
    }

    fn expand_tag(&mut self, tagged: TaggedValue, source: &Path) -> ConfigResult<Value> {
        let TaggedValue { tag, value } = tagged;
        let Some(known) = Tag::parse(&tag.to_string()) else {
            trace!(%tag, "Keeping unknown tag");
            let value = self.expand(value, source)?;
            return Ok(Value::Tagged(Box::new(TaggedValue { tag, value })));
        };

        let arg = string_argument(known, &value)?;
        match known {
            Tag::Include => {
                let target = source.parent().unwrap_or(&self.config_dir).join(arg);
                self.load_file(target)
            }
            Tag::Secret => self.secrets.get(arg).map(|s| Value::String(s.to_string())),
            Tag::EnvVar => env_value(arg).map(Value::String),
        }
    }
}

fn string_argument(tag: Tag, value: &Value) -> ConfigResult<&str> {
    value.as_str().ok_or_else(|| ConfigError::TagArgument {
        tag: tag.name(),
        expected: "a string",
        found: format!("{:?}", value),
    })
}

/// `VAR` or `VAR default`
fn env_value(arg: &str) -> ConfigResult<String> {
    let (var, default) = match arg.trim().split_once(char::is_whitespace) {
        Some((var, default)) => (var, Some(default.trim())),
        None => (arg.trim(), None),
    };
    match std::env::var(var) {
        Ok(value) => Ok(value),
        Err(_) => default
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string())),
    }
}

/// Load `file` from `config_dir` with tag expansion
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir)?.load_file(file)
}

/// Expand an in-memory document as if it were `source_name` inside `config_dir`
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    let source = loader.config_dir().join(source_name);
    loader.load_string(content, &source)
}

/// Deserialize a list section of the configuration document
///
/// A missing or empty section yields an empty list; a single mapping is
/// treated as a one-element list.
pub fn load_section<T: DeserializeOwned>(config: &Value, section: &str) -> ConfigResult<Vec<T>> {
    let items = match config.get(section) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Sequence(items)) => items.clone(),
        Some(single) => vec![single.clone()],
    };

    items
        .into_iter()
        .map(serde_yaml::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| ConfigError::Section {
            section: section.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Display {
        key: String,
        #[serde(default)]
        message_limit: Option<u32>,
    }

    fn config_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, content).unwrap();
        }
        dir
    }

    fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
        value.get(key).and_then(Value::as_str)
    }

    #[test]
    fn test_sections_from_file() {
        let dir = config_dir(&[(
            "configuration.yaml",
            "char_display:\n  - key: lcd\n    message_limit: 5\n",
        )]);
        let config = load_yaml(dir.path(), "configuration.yaml").unwrap();

        let displays: Vec<Display> = load_section(&config, "char_display").unwrap();
        assert_eq!(
            displays,
            vec![Display {
                key: "lcd".to_string(),
                message_limit: Some(5),
            }]
        );
    }

    #[test]
    fn test_nested_include_is_relative_to_includer() {
        let dir = config_dir(&[
            ("configuration.yaml", "triggers: !include triggers/all.yaml\n"),
            ("triggers/all.yaml", "- !include high_temp.yaml\n"),
            ("triggers/high_temp.yaml", "key: high_temp\n"),
        ]);
        let config = load_yaml(dir.path(), "configuration.yaml").unwrap();

        let triggers = config.get("triggers").and_then(Value::as_sequence).unwrap();
        assert_eq!(text(&triggers[0], "key"), Some("high_temp"));
    }

    #[test]
    fn test_secret_substitution() {
        let dir = config_dir(&[
            ("secrets.yaml", "camera_dir: /srv/img\n"),
            ("configuration.yaml", "path: !secret camera_dir\nother: !secret nope\n"),
        ]);
        let result = load_yaml(dir.path(), "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::MissingSecret(name)) if name == "nope"));

        let mut loader = YamlLoader::new(dir.path()).unwrap();
        let value = loader
            .load_string("path: !secret camera_dir\n", Path::new("inline.yaml"))
            .unwrap();
        assert_eq!(text(&value, "path"), Some("/srv/img"));
    }

    #[test]
    fn test_env_var_with_default() {
        std::env::set_var("HOMEHUB_TEST_LOADER_TOPIC", "garden");
        std::env::remove_var("HOMEHUB_TEST_LOADER_UNSET");
        let secrets = Secrets::from_pairs([("unused", "x")]);
        let mut loader = YamlLoader::with_secrets("/nonexistent", secrets);

        let value = loader
            .load_string(
                "set: !env_var HOMEHUB_TEST_LOADER_TOPIC\nfallback: !env_var HOMEHUB_TEST_LOADER_UNSET lcd\n",
                Path::new("inline.yaml"),
            )
            .unwrap();
        assert_eq!(text(&value, "set"), Some("garden"));
        assert_eq!(text(&value, "fallback"), Some("lcd"));

        let missing = loader.load_string(
            "x: !env_var HOMEHUB_TEST_LOADER_UNSET\n",
            Path::new("inline.yaml"),
        );
        assert!(matches!(missing, Err(ConfigError::MissingEnvVar(_))));
        std::env::remove_var("HOMEHUB_TEST_LOADER_TOPIC");
    }

    #[test]
    fn test_tag_argument_must_be_string() {
        let mut loader = YamlLoader::with_secrets("/nonexistent", Secrets::default());
        let result = loader.load_string("x: !secret [a, b]\n", Path::new("inline.yaml"));
        assert!(matches!(
            result,
            Err(ConfigError::TagArgument { tag: "!secret", .. })
        ));
    }

    #[test]
    fn test_include_cycle_reports_chain() {
        let dir = config_dir(&[
            ("a.yaml", "b: !include b.yaml\n"),
            ("b.yaml", "a: !include a.yaml\n"),
        ]);
        let err = load_yaml(dir.path(), "a.yaml").unwrap_err();

        match err {
            ConfigError::IncludeCycle { chain } => assert_eq!(chain.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_tag_preserved() {
        let dir = config_dir(&[]);
        let value = load_yaml_string(dir.path(), "x: !custom 5\n", "configuration.yaml").unwrap();
        assert!(matches!(value.get("x"), Some(Value::Tagged(_))));
    }

    #[test]
    fn test_section_shapes() {
        let dir = config_dir(&[]);
        let config = load_yaml_string(
            dir.path(),
            "single:\n  key: one\n  message_limit: 3\nempty:\nbad:\n  - message_limit: 2\n",
            "configuration.yaml",
        )
        .unwrap();

        let single: Vec<Display> = load_section(&config, "single").unwrap();
        assert_eq!(single[0].message_limit, Some(3));
        assert!(load_section::<Display>(&config, "empty").unwrap().is_empty());
        assert!(load_section::<Display>(&config, "missing").unwrap().is_empty());
        assert!(matches!(
            load_section::<Display>(&config, "bad"),
            Err(ConfigError::Section { .. })
        ));
    }
}
