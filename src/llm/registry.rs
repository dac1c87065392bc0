//! Immutable catalogue of model descriptors.
//!
//! Declaration order is priority order: the first model listed for a task
//! category is the most preferred one. The registry is built once at startup
//! and never mutated afterwards.

use crate::error::ConfigError;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Kind of work a request asks a model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum TaskCategory {
    Dialog,
    Code,
    Reasoning,
    Summarize,
}

impl TaskCategory {
    pub fn all() -> &'static [TaskCategory] {
        &[
            TaskCategory::Dialog,
            TaskCategory::Code,
            TaskCategory::Reasoning,
            TaskCategory::Summarize,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::Dialog => "dialog",
            TaskCategory::Code => "code",
            TaskCategory::Reasoning => "reasoning",
            TaskCategory::Summarize => "summarize",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dialog" => Ok(Self::Dialog),
            "code" => Ok(Self::Code),
            "reasoning" => Ok(Self::Reasoning),
            "summarize" => Ok(Self::Summarize),
            _ => Err(ConfigError::UnknownCategory(s.to_string())),
        }
    }
}

impl TryFrom<String> for TaskCategory {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A model that requests can be routed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique id, usually `provider/model-name`.
    pub id: String,
    /// Provider key, matched against the credential map.
    pub provider: String,
    pub task_categories: BTreeSet<TaskCategory>,
    /// Requests per minute. Zero means unlimited.
    #[serde(default)]
    pub rpm_limit: u32,
}

impl ModelDescriptor {
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        task_categories: impl IntoIterator<Item = TaskCategory>,
        rpm_limit: u32,
    ) -> Self {
        Self {
            id: id.into(),
            provider: provider.into(),
            task_categories: task_categories.into_iter().collect(),
            rpm_limit,
        }
    }

    pub fn supports(&self, category: TaskCategory) -> bool {
        self.task_categories.contains(&category)
    }
}

/// Ordered, read-only set of models.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    models: Vec<ModelDescriptor>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    /// Build a registry, rejecting empty fields and duplicate ids.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(models.len());
        for (position, model) in models.iter().enumerate() {
            if model.id.trim().is_empty() {
                return Err(ConfigError::EmptyField { field: "id" });
            }
            if model.provider.trim().is_empty() {
                return Err(ConfigError::EmptyField { field: "provider" });
            }
            if index.insert(model.id.clone(), position).is_some() {
                return Err(ConfigError::DuplicateModel(model.id.clone()));
            }
        }
        Ok(Self { models, index })
    }

    /// Models supporting `category`, most preferred first.
    pub fn list_models(&self, category: TaskCategory) -> Vec<ModelDescriptor> {
        self.models
            .iter()
            .filter(|model| model.supports(category))
            .cloned()
            .collect()
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelDescriptor> {
        self.index.get(model_id).map(|&position| &self.models[position])
    }

    pub fn all(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Distinct providers in order of first appearance.
    pub fn providers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for model in &self.models {
            if !seen.contains(&model.provider.as_str()) {
                seen.push(model.provider.as_str());
            }
        }
        seen
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.models.iter().any(|model| model.provider == provider)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ModelRegistry {
        ModelRegistry::new(vec![
            ModelDescriptor::new("a/one", "a", [TaskCategory::Dialog], 10),
            ModelDescriptor::new("b/two", "b", [TaskCategory::Dialog, TaskCategory::Code], 0),
            ModelDescriptor::new("a/three", "a", [TaskCategory::Code], 5),
        ])
        .unwrap()
    }

    #[test]
    fn test_list_models_preserves_declaration_order() {
        let registry = sample();
        let ids: Vec<_> = registry
            .list_models(TaskCategory::Code)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["b/two", "a/three"]);
    }

    #[test]
    fn test_unserved_category_is_empty() {
        assert!(sample().list_models(TaskCategory::Summarize).is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = ModelRegistry::new(vec![
            ModelDescriptor::new("x", "a", [TaskCategory::Dialog], 1),
            ModelDescriptor::new("x", "b", [TaskCategory::Code], 1),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateModel(id) if id == "x"));
    }

    #[test]
    fn test_empty_provider_rejected() {
        let err = ModelRegistry::new(vec![ModelDescriptor::new(
            "x",
            " ",
            [TaskCategory::Dialog],
            1,
        )])
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyField { field: "provider" }));
    }

    #[test]
    fn test_providers_in_first_seen_order() {
        assert_eq!(sample().providers(), vec!["a", "b"]);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("Dialog".parse::<TaskCategory>().unwrap(), TaskCategory::Dialog);
        assert_eq!(" code ".parse::<TaskCategory>().unwrap(), TaskCategory::Code);
        assert!("poetry".parse::<TaskCategory>().is_err());
    }

    #[test]
    fn test_category_serde_uses_lowercase_and_accepts_any_case() {
        assert_eq!(
            serde_json::to_string(&TaskCategory::Reasoning).unwrap(),
            "\"reasoning\""
        );
        let parsed: TaskCategory = serde_json::from_str("\"Code\"").unwrap();
        assert_eq!(parsed, TaskCategory::Code);
        assert!(serde_json::from_str::<TaskCategory>("\"poetry\"").is_err());
    }
}
