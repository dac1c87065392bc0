//! Model registry, credential lookup, usage tracking, and selection persistence.

pub mod clock;
pub mod credentials;
pub mod manager;
pub mod registry;
pub mod state;
pub mod usage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::CredentialResolver;
pub use manager::LlmManager;
pub use registry::{ModelDescriptor, ModelRegistry, TaskCategory};
pub use state::{PersistedSelection, StateStore};
pub use usage::{UsageStats, UsageTracker};
