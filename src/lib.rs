//! Admission control for LLM requests.
//!
//! Decides which model and provider may serve a request right now, based on
//! a static model registry, API keys present in the environment, and a soft
//! per-model rate-limit blacklist that clears itself when the minute window
//! rolls over. The last successful provider/model pair is kept on disk so a
//! restarted process resumes where it left off.
//!
//! ```no_run
//! use modelgate::{Config, LlmManager, TaskCategory};
//!
//! # fn main() -> modelgate::Result<()> {
//! let manager = LlmManager::new(&Config::load(None)?)?;
//! if let Some(model) = manager.pick_model(TaskCategory::Dialog) {
//!     let _key = manager.get_api_key(&model.provider);
//!     // ... call the provider with `_key` ...
//!     manager.record_success(&model, 512)?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod llm;

pub use config::Config;
pub use error::{ConfigError, Error, LlmError, Result, StateError};
pub use llm::{
    CredentialResolver, LlmManager, ModelDescriptor, ModelRegistry, PersistedSelection,
    StateStore, TaskCategory, UsageStats, UsageTracker,
};
