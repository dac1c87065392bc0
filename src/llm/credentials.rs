//! Provider credential lookup.
//!
//! Keys are read from the process environment on every call and never
//! cached, so rotating a key only requires updating the environment. Values
//! are never logged.

use std::collections::HashMap;
use std::sync::Arc;

/// Values that ship in example env files and must not count as real keys.
pub const DEFAULT_PLACEHOLDERS: &[&str] = &[
    "your_api_key_here",
    "your-api-key",
    "changeme",
    "placeholder",
    "xxx",
    "none",
];

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Maps provider names to the environment variable holding their key.
#[derive(Clone)]
pub struct CredentialResolver {
    env_vars: HashMap<String, String>,
    placeholders: Vec<String>,
    lookup: EnvLookup,
}

impl CredentialResolver {
    /// Resolver backed by the real process environment.
    pub fn new(env_vars: HashMap<String, String>, placeholders: Vec<String>) -> Self {
        Self::with_lookup(env_vars, placeholders, |name| std::env::var(name).ok())
    }

    /// Resolver backed by a custom lookup, for hosts that stage secrets elsewhere and for tests.
    pub fn with_lookup(
        env_vars: HashMap<String, String>,
        placeholders: Vec<String>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            env_vars,
            placeholders: placeholders
                .into_iter()
                .map(|value| value.trim().to_lowercase())
                .collect(),
            lookup: Arc::new(lookup),
        }
    }

    /// Get the API key for a provider, or `None` if it is unknown, unset, or a placeholder.
    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        let Some(variable) = self.env_vars.get(provider) else {
            tracing::trace!(provider, "no credential mapping for provider");
            return None;
        };

        let value = (self.lookup)(variable)?;
        if self.is_placeholder(&value) {
            tracing::debug!(provider, variable = %variable, "ignoring placeholder API key");
            return None;
        }
        Some(value)
    }

    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }

    /// Environment variable name configured for `provider`.
    pub fn env_var(&self, provider: &str) -> Option<&str> {
        self.env_vars.get(provider).map(String::as_str)
    }

    pub fn knows_provider(&self, provider: &str) -> bool {
        self.env_vars.contains_key(provider)
    }

    fn is_placeholder(&self, value: &str) -> bool {
        let normalized = value.trim().to_lowercase();
        normalized.is_empty() || self.placeholders.iter().any(|p| *p == normalized)
    }
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("env_vars", &self.env_vars)
            .field("placeholders", &self.placeholders)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(env: &[(&str, &str)]) -> CredentialResolver {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let vars = HashMap::from([
            ("openrouter".to_string(), "OPENROUTER_API_KEY".to_string()),
            ("mistral".to_string(), "MISTRAL_API_KEY".to_string()),
        ]);
        let placeholders = DEFAULT_PLACEHOLDERS.iter().map(|s| s.to_string()).collect();
        CredentialResolver::with_lookup(vars, placeholders, move |name| env.get(name).cloned())
    }

    #[test]
    fn test_returns_exact_value() {
        let creds = resolver(&[("OPENROUTER_API_KEY", "sk-or-123")]);
        assert_eq!(creds.get_api_key("openrouter").as_deref(), Some("sk-or-123"));
    }

    #[test]
    fn test_unset_variable_is_absent() {
        let creds = resolver(&[]);
        assert_eq!(creds.get_api_key("mistral"), None);
    }

    #[test]
    fn test_unknown_provider_is_absent() {
        let creds = resolver(&[("OPENROUTER_API_KEY", "sk-or-123")]);
        assert_eq!(creds.get_api_key("nonexistent"), None);
        assert!(!creds.knows_provider("nonexistent"));
    }

    #[test]
    fn test_placeholders_are_absent() {
        for value in ["", "   ", "changeme", "YOUR_API_KEY_HERE", " xxx "] {
            let creds = resolver(&[("MISTRAL_API_KEY", value)]);
            assert_eq!(creds.get_api_key("mistral"), None, "value {value:?}");
        }
    }

    #[test]
    fn test_debug_does_not_leak_values() {
        let creds = resolver(&[("OPENROUTER_API_KEY", "sk-secret")]);
        assert!(!format!("{creds:?}").contains("sk-secret"));
    }

    #[test]
    fn test_reads_process_environment() {
        let vars = HashMap::from([(
            "testprov".to_string(),
            "MODELGATE_TEST_CREDENTIALS_KEY".to_string(),
        )]);
        let creds = CredentialResolver::new(vars, Vec::new());
        assert_eq!(creds.get_api_key("testprov"), None);

        // SAFETY: variable name is unique to this test.
        unsafe { std::env::set_var("MODELGATE_TEST_CREDENTIALS_KEY", "live-key") };
        assert_eq!(creds.get_api_key("testprov").as_deref(), Some("live-key"));
        unsafe { std::env::remove_var("MODELGATE_TEST_CREDENTIALS_KEY") };
        assert_eq!(creds.get_api_key("testprov"), None);
    }
}
