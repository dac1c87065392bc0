//! LLM manager: the single entry point callers hold.
//!
//! The manager owns the model registry, credential resolver, usage tracker,
//! and state store, and answers which models may serve a request right now.
//! It does not issue provider calls. Callers pick a model from
//! `get_available_models()`, call the provider themselves, and report back
//! through `record_success()`.
//!
//! Construct one per process and share it by reference or `Arc`; tests build
//! as many independent managers as they like.

use crate::config::Config;
use crate::error::{LlmError, Result};
use crate::llm::clock::{Clock, SystemClock};
use crate::llm::credentials::CredentialResolver;
use crate::llm::registry::{ModelDescriptor, ModelRegistry, TaskCategory};
use crate::llm::state::{PersistedSelection, StateStore};
use crate::llm::usage::{UsageStats, UsageTracker, validate_multiplier};

use anyhow::Context as _;
use std::sync::Arc;
use std::time::Duration;

/// Admission control over the configured models and providers.
#[derive(Debug)]
pub struct LlmManager {
    registry: ModelRegistry,
    credentials: CredentialResolver,
    usage: UsageTracker,
    state: StateStore,
    /// Model restored from the persisted selection, if still registered.
    default_model: Option<String>,
}

impl LlmManager {
    /// Create a manager from configuration, using the wall clock and the process environment.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a manager from configuration with a custom clock.
    pub fn with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let registry = config.registry()?;
        let credentials =
            CredentialResolver::new(config.providers.clone(), config.placeholder_keys());
        let state = StateStore::new(config.state_path()?);

        Self::from_parts(
            registry,
            credentials,
            state,
            &config.router.primary_provider,
            config.router.blacklist_multiplier,
            clock,
        )
    }

    /// Assemble a manager from already-built components and resume the persisted selection.
    ///
    /// `state` is rebound to `clock` so persisted timestamps follow the same time source.
    pub fn from_parts(
        registry: ModelRegistry,
        credentials: CredentialResolver,
        state: StateStore,
        primary_provider: &str,
        blacklist_multiplier: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_multiplier(blacklist_multiplier)?;
        if primary_provider.is_empty() {
            return Err(LlmError::EmptyProvider.into());
        }

        let usage = UsageTracker::new(
            registry.all(),
            primary_provider,
            blacklist_multiplier,
            clock.clone(),
        );
        let state = state.with_clock(clock);

        let mut manager = Self {
            registry,
            credentials,
            usage,
            state,
            default_model: None,
        };
        manager.resume();
        Ok(manager)
    }

    fn resume(&mut self) {
        let Some(selection) = self.state.load_state() else {
            tracing::debug!(
                provider = %self.usage.get_current_provider(),
                "no persisted selection, starting with primary provider"
            );
            return;
        };

        if !self.registry.has_provider(&selection.provider) {
            tracing::warn!(
                provider = %selection.provider,
                "persisted provider is not registered, ignoring it"
            );
            return;
        }

        // Registered providers are never empty, so this cannot fail.
        if self.usage.set_current_provider(&selection.provider).is_ok() {
            self.default_model = self
                .registry
                .get(&selection.model_id)
                .map(|model| model.id.clone());
            tracing::info!(
                provider = %selection.provider,
                model = %selection.model_id,
                "resumed persisted selection"
            );
        }
    }

    /// Models that can serve `category` right now, most preferred first.
    ///
    /// Drops models whose provider has no usable credential and models that
    /// are blacklisted. An empty result means no backend is available at the
    /// moment, which callers should treat as retryable.
    pub fn get_available_models(&self, category: TaskCategory) -> Vec<ModelDescriptor> {
        let available: Vec<_> = self
            .registry
            .list_models(category)
            .into_iter()
            .filter(|model| self.credentials.has_credentials(&model.provider))
            .filter(|model| !self.usage.is_blacklisted(&model.id))
            .collect();

        if available.is_empty() {
            tracing::debug!(%category, "no models available");
        }
        available
    }

    /// Like [`get_available_models`](Self::get_available_models) for a category
    /// given by name. Unknown names yield an empty list.
    pub fn get_available_models_by_name(&self, category: &str) -> Vec<ModelDescriptor> {
        match category.parse::<TaskCategory>() {
            Ok(category) => self.get_available_models(category),
            Err(_) => {
                tracing::debug!(category, "unknown task category");
                Vec::new()
            }
        }
    }

    /// First available model on the current provider, else the first available model at all.
    pub fn pick_model(&self, category: TaskCategory) -> Option<ModelDescriptor> {
        let available = self.get_available_models(category);
        let current = self.usage.get_current_provider();
        let preferred = available
            .iter()
            .position(|model| model.provider == current)
            .unwrap_or(0);
        available.into_iter().nth(preferred)
    }

    /// First provider other than the current one that has credentials and a usable model.
    pub fn fallback_provider(&self) -> Option<String> {
        let current = self.usage.get_current_provider();
        self.registry
            .providers()
            .into_iter()
            .filter(|provider| *provider != current)
            .find(|provider| self.provider_usable(provider))
            .map(str::to_string)
    }

    /// Switch the current provider to [`fallback_provider`](Self::fallback_provider).
    ///
    /// Returns the new provider, or `None` (leaving the current one in place)
    /// when nothing else is usable.
    pub fn fail_over(&self) -> Option<String> {
        let next = self.fallback_provider();
        match &next {
            Some(provider) => {
                // Registry providers are non-empty.
                let _ = self.usage.set_current_provider(provider);
            }
            None => {
                tracing::warn!(
                    provider = %self.usage.get_current_provider(),
                    "no fallback provider available, keeping current"
                );
            }
        }
        next
    }

    /// How long until some credentialed model for `category` is usable.
    ///
    /// Zero if one is usable now, `None` if no model for the category has credentials.
    pub fn next_available_in(&self, category: TaskCategory) -> Option<Duration> {
        let now = self.usage.now();
        self.registry
            .list_models(category)
            .iter()
            .filter(|model| self.credentials.has_credentials(&model.provider))
            .map(|model| self.usage.get_stats(&model.id).seconds_until_available(now))
            .min()
            .map(Duration::from_secs)
    }

    /// Count a request against `model`. See [`UsageTracker::register_use`].
    pub fn register_use(&self, model: &ModelDescriptor, tokens: u64) -> UsageStats {
        self.usage.register_use(model, tokens)
    }

    pub fn is_blacklisted(&self, model_id: &str) -> bool {
        self.usage.is_blacklisted(model_id)
    }

    pub fn get_stats(&self, model_id: &str) -> UsageStats {
        self.usage.get_stats(model_id)
    }

    /// Get the API key for a provider, if one is configured and set.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.credentials.get_api_key(provider)
    }

    pub fn set_current_provider(&self, provider: &str) -> Result<()> {
        self.usage.set_current_provider(provider)?;
        Ok(())
    }

    pub fn get_current_provider(&self) -> String {
        self.usage.get_current_provider()
    }

    /// Persist `(provider, model_id)` as the last known good selection.
    pub fn update_state(&self, provider: &str, model_id: &str) -> Result<PersistedSelection> {
        Ok(self.state.update_state(provider, model_id)?)
    }

    pub fn load_state(&self) -> Option<PersistedSelection> {
        self.state.load_state()
    }

    /// Persist a caller-chosen pair after checking the model belongs to the provider.
    pub fn select(&self, provider: &str, model_id: &str) -> Result<PersistedSelection> {
        let model = self.registered(model_id)?;
        if model.provider != provider {
            return Err(LlmError::ProviderMismatch {
                model: model_id.to_string(),
                expected: model.provider.clone(),
                given: provider.to_string(),
            }
            .into());
        }

        self.usage.set_current_provider(provider)?;
        Ok(self.state.update_state(provider, model_id)?)
    }

    /// Record a successful request: count it, make its provider current, and persist the choice.
    ///
    /// Provider and limit come from the registered descriptor for `model.id`.
    pub fn record_success(&self, model: &ModelDescriptor, tokens: u64) -> Result<UsageStats> {
        let model = self.registered(&model.id)?;
        let stats = self.usage.register_use(model, tokens);
        self.usage.set_current_provider(&model.provider)?;
        self.state.update_state(&model.provider, &model.id)?;
        Ok(stats)
    }

    /// [`record_success`](Self::record_success) with the file write moved to the blocking pool.
    pub async fn record_success_async(
        &self,
        model: &ModelDescriptor,
        tokens: u64,
    ) -> Result<UsageStats> {
        let model = self.registered(&model.id)?;
        let stats = self.usage.register_use(model, tokens);
        self.usage.set_current_provider(&model.provider)?;

        let store = self.state.clone();
        let provider = model.provider.clone();
        let model_id = model.id.clone();
        tokio::task::spawn_blocking(move || store.update_state(&provider, &model_id))
            .await
            .with_context(|| "state writer task failed")??;
        Ok(stats)
    }

    /// Model restored from the persisted selection at startup.
    pub fn default_model(&self) -> Option<&ModelDescriptor> {
        self.default_model
            .as_deref()
            .and_then(|id| self.registry.get(id))
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> &CredentialResolver {
        &self.credentials
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state
    }

    fn registered(&self, model_id: &str) -> Result<&ModelDescriptor> {
        self.registry
            .get(model_id)
            .ok_or_else(|| LlmError::UnknownModel(model_id.to_string()).into())
    }

    fn provider_usable(&self, provider: &str) -> bool {
        self.credentials.has_credentials(provider)
            && self
                .registry
                .all()
                .iter()
                .any(|model| model.provider == provider && !self.usage.is_blacklisted(&model.id))
    }
}
