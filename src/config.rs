//! Configuration loading.
//!
//! Layers, later wins: the built-in table below, an optional TOML file, then
//! `MODELGATE__`-prefixed environment variables
//! (`MODELGATE__ROUTER__PRIMARY_PROVIDER=groq`). A file that declares
//! `[[models]]` replaces the built-in model table as a whole; provider
//! mappings merge key by key.

use crate::error::ConfigError;
use crate::llm::credentials::DEFAULT_PLACEHOLDERS;
use crate::llm::registry::{ModelDescriptor, ModelRegistry};
use crate::llm::state::STATE_FILE_NAME;
use crate::llm::usage::validate_multiplier;

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "MODELGATE";

/// Built-in registry and credential map used when no file overrides them.
pub const DEFAULT_CONFIG: &str = r#"
[router]
primary_provider = "openrouter"
blacklist_multiplier = 1.0

[providers]
anthropic = "ANTHROPIC_API_KEY"
openai = "OPENAI_API_KEY"
openrouter = "OPENROUTER_API_KEY"
mistral = "MISTRAL_API_KEY"
groq = "GROQ_API_KEY"
deepseek = "DEEPSEEK_API_KEY"

[[models]]
id = "openrouter/deepseek/deepseek-chat-v3"
provider = "openrouter"
task_categories = ["dialog", "code", "reasoning"]
rpm_limit = 20

[[models]]
id = "mistral/mistral-large-latest"
provider = "mistral"
task_categories = ["dialog", "summarize"]
rpm_limit = 30

[[models]]
id = "openrouter/meta-llama/llama-3.3-70b-instruct"
provider = "openrouter"
task_categories = ["dialog", "summarize"]
rpm_limit = 20

[[models]]
id = "mistral/codestral-latest"
provider = "mistral"
task_categories = ["code"]
rpm_limit = 30

[[models]]
id = "groq/llama-3.3-70b-versatile"
provider = "groq"
task_categories = ["dialog", "code"]
rpm_limit = 30

[[models]]
id = "anthropic/claude-sonnet-4"
provider = "anthropic"
task_categories = ["dialog", "code", "reasoning", "summarize"]
rpm_limit = 50

[[models]]
id = "openai/gpt-4.1-mini"
provider = "openai"
task_categories = ["dialog", "code", "summarize"]
rpm_limit = 0

[[models]]
id = "deepseek/deepseek-reasoner"
provider = "deepseek"
task_categories = ["reasoning"]
rpm_limit = 0
"#;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub router: RouterConfig,
    /// Provider name to the environment variable holding its API key.
    #[serde(default)]
    pub providers: HashMap<String, String>,
    /// Model table in priority order.
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Provider used when nothing has been persisted yet.
    pub primary_provider: String,
    /// Blacklist once the per-window count exceeds `rpm_limit * blacklist_multiplier`.
    #[serde(default = "default_multiplier")]
    pub blacklist_multiplier: f64,
    /// Where the last selection is stored. Defaults to the platform data dir.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Key values treated as unset. Defaults to [`DEFAULT_PLACEHOLDERS`].
    #[serde(default)]
    pub placeholder_keys: Option<Vec<String>>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Config {
    /// Load built-in defaults, the optional file, and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ));

        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(
                config::File::from(path.to_path_buf()).format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults overlaid with `toml`, without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Toml,
            ))
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// The built-in table alone.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_toml_str("")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.router.primary_provider.trim().is_empty() {
            return Err(ConfigError::EmptyPrimaryProvider);
        }
        validate_multiplier(self.router.blacklist_multiplier)?;
        for model in &self.models {
            if !self.providers.contains_key(&model.provider) {
                tracing::warn!(
                    model = %model.id,
                    provider = %model.provider,
                    "model provider has no credential mapping, it will never be available"
                );
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> Result<ModelRegistry, ConfigError> {
        ModelRegistry::new(self.models.clone())
    }

    pub fn placeholder_keys(&self) -> Vec<String> {
        match &self.router.placeholder_keys {
            Some(keys) => keys.clone(),
            None => DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Configured state path, or `<data dir>/modelgate/last_selection.json`.
    pub fn state_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.router.state_path {
            return Ok(path.clone());
        }
        dirs::data_dir()
            .map(|dir| dir.join("modelgate").join(STATE_FILE_NAME))
            .ok_or(ConfigError::NoStatePath)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::registry::TaskCategory;

    #[test]
    fn test_builtin_table_loads() {
        let config = Config::builtin().unwrap();
        assert_eq!(config.router.primary_provider, "openrouter");
        assert_eq!(config.router.blacklist_multiplier, 1.0);
        let registry = config.registry().unwrap();
        assert!(!registry.list_models(TaskCategory::Dialog).is_empty());
        assert_eq!(
            config.providers.get("openrouter").map(String::as_str),
            Some("OPENROUTER_API_KEY")
        );
    }

    #[test]
    fn test_file_models_replace_builtin_table() {
        let config = Config::from_toml_str(
            r#"
            [providers]
            local = "LOCAL_API_KEY"

            [[models]]
            id = "local/tiny"
            provider = "local"
            task_categories = ["dialog"]
            rpm_limit = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].id, "local/tiny");
        assert_eq!(config.models[0].rpm_limit, 2);
        // Provider tables merge with the built-in map.
        assert!(config.providers.contains_key("local"));
        assert!(config.providers.contains_key("openrouter"));
    }

    #[test]
    fn test_router_overrides() {
        let config = Config::from_toml_str(
            r#"
            [router]
            primary_provider = "mistral"
            blacklist_multiplier = 1.5
            state_path = "/tmp/modelgate-state.json"
            placeholder_keys = ["dummy"]
            "#,
        )
        .unwrap();
        assert_eq!(config.router.primary_provider, "mistral");
        assert_eq!(config.router.blacklist_multiplier, 1.5);
        assert_eq!(
            config.state_path().unwrap(),
            PathBuf::from("/tmp/modelgate-state.json")
        );
        assert_eq!(config.placeholder_keys(), vec!["dummy".to_string()]);
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let err = Config::from_toml_str("[router]\nblacklist_multiplier = 0.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMultiplier(_)));
    }

    #[test]
    fn test_unknown_category_rejected() {
        let result = Config::from_toml_str(
            r#"
            [[models]]
            id = "x"
            provider = "openrouter"
            task_categories = ["poetry"]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_categories_parse_case_insensitively() {
        let config = Config::from_toml_str(
            r#"
            [[models]]
            id = "openrouter/mixed"
            provider = "openrouter"
            task_categories = ["Dialog", "CODE", " summarize "]
            "#,
        )
        .unwrap();
        let registry = config.registry().unwrap();
        assert_eq!(registry.list_models(TaskCategory::Dialog).len(), 1);
        assert_eq!(registry.list_models(TaskCategory::Code).len(), 1);
        assert_eq!(registry.list_models(TaskCategory::Summarize).len(), 1);
        assert!(registry.list_models(TaskCategory::Reasoning).is_empty());
    }

    #[test]
    fn test_duplicate_model_ids_rejected_by_registry() {
        let config = Config::from_toml_str(
            r#"
            [[models]]
            id = "dup"
            provider = "openrouter"
            task_categories = ["dialog"]

            [[models]]
            id = "dup"
            provider = "mistral"
            task_categories = ["code"]
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.registry(),
            Err(ConfigError::DuplicateModel(id)) if id == "dup"
        ));
    }

    #[test]
    fn test_default_placeholders() {
        let config = Config::builtin().unwrap();
        assert!(config.placeholder_keys().contains(&"changeme".to_string()));
    }
}
