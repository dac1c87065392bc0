//! Per-model request accounting and the soft blacklist.
//!
//! Each model gets a fixed 60 second window. A model whose request count in
//! the current window goes over its limit is blacklisted until that window
//! ends, and becomes usable again on its own once the clock passes that
//! point. Nothing runs in the background: expiry is evaluated on every read.
//!
//! Every record sits behind its own mutex. The set of records is fixed when
//! the tracker is built, so lookups never take a map-wide lock and traffic on
//! one model never waits on another.

use crate::error::{ConfigError, LlmError};
use crate::llm::clock::Clock;
use crate::llm::registry::ModelDescriptor;

use arc_swap::ArcSwap;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Length of a rate-limit window in seconds.
pub const WINDOW_SECS: i64 = 60;

fn window() -> TimeDelta {
    TimeDelta::seconds(WINDOW_SECS)
}

/// Mutable accounting for one model.
#[derive(Debug, Clone)]
pub struct UsageRecord {
    pub window_start: DateTime<Utc>,
    pub count_in_window: u64,
    /// Informational only, never used for admission.
    pub tokens_in_window: u64,
    pub blacklisted_until: Option<DateTime<Utc>>,
}

impl UsageRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count_in_window: 0,
            tokens_in_window: 0,
            blacklisted_until: None,
        }
    }

    fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= window()
    }

    fn is_blacklisted_at(&self, now: DateTime<Utc>) -> bool {
        self.blacklisted_until.is_some_and(|until| now < until)
    }
}

/// Read-only view of a model's usage as of a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub count_in_window: u64,
    pub tokens_in_window: u64,
    pub blacklisted_until: Option<DateTime<Utc>>,
}

impl UsageStats {
    /// Whole seconds until the model may be used again, rounded up. Zero if usable now.
    pub fn seconds_until_available(&self, now: DateTime<Utc>) -> u64 {
        match self.blacklisted_until {
            Some(until) if until > now => {
                let millis = (until - now).num_milliseconds().max(0) as u64;
                millis.div_ceil(1000)
            }
            _ => 0,
        }
    }
}

/// Reject multipliers that would lower the limit below `rpm_limit` or are NaN.
pub fn validate_multiplier(multiplier: f64) -> Result<(), ConfigError> {
    if multiplier.is_nan() || multiplier < 1.0 {
        return Err(ConfigError::InvalidMultiplier(multiplier));
    }
    Ok(())
}

/// A model's limit, fixed at construction, and its mutable record.
#[derive(Debug)]
struct TrackedModel {
    rpm_limit: u32,
    record: Mutex<UsageRecord>,
}

/// Rolling counters, blacklist state, and the current-provider pointer.
pub struct UsageTracker {
    records: HashMap<String, TrackedModel>,
    current_provider: ArcSwap<String>,
    blacklist_multiplier: f64,
    clock: Arc<dyn Clock>,
}

impl UsageTracker {
    /// Create a tracker with one record per model.
    ///
    /// Each model's `rpm_limit` is captured here; descriptors passed to
    /// `register_use` later only identify the model.
    pub fn new<'a>(
        models: impl IntoIterator<Item = &'a ModelDescriptor>,
        primary_provider: impl Into<String>,
        blacklist_multiplier: f64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        let records = models
            .into_iter()
            .map(|model| {
                let tracked = TrackedModel {
                    rpm_limit: model.rpm_limit,
                    record: Mutex::new(UsageRecord::new(now)),
                };
                (model.id.clone(), tracked)
            })
            .collect();

        Self {
            records,
            current_provider: ArcSwap::from_pointee(primary_provider.into()),
            blacklist_multiplier,
            clock,
        }
    }

    /// Count one request against `model` and blacklist it if it went over its limit.
    ///
    /// The limit applied is the one registered for `model.id`, whatever
    /// `model.rpm_limit` says. Returns the model's stats after the update.
    /// Models the tracker does not know are ignored and report zeroed stats.
    pub fn register_use(&self, model: &ModelDescriptor, tokens: u64) -> UsageStats {
        let Some(tracked) = self.records.get(&model.id) else {
            tracing::warn!(model = %model.id, "register_use for unregistered model ignored");
            return UsageStats::default();
        };
        let rpm_limit = tracked.rpm_limit;

        let now = self.clock.now();
        let mut record = tracked.record.lock();

        if record.window_elapsed(now) {
            record.window_start = now;
            record.count_in_window = 0;
            record.tokens_in_window = 0;
        }
        record.count_in_window += 1;
        record.tokens_in_window = record.tokens_in_window.saturating_add(tokens);

        let over_limit = self
            .threshold(rpm_limit)
            .is_some_and(|threshold| record.count_in_window > threshold);
        if over_limit {
            let until = record.window_start + window();
            let newly_blacklisted = !record.is_blacklisted_at(now);
            record.blacklisted_until = Some(until);
            if newly_blacklisted {
                tracing::warn!(
                    model = %model.id,
                    count = record.count_in_window,
                    rpm_limit,
                    until = %until,
                    "model over rate limit, blacklisted until window ends"
                );
            }
        }

        Self::snapshot(&record, now)
    }

    /// Whether the model is currently blacklisted. Unknown or unused models never are.
    pub fn is_blacklisted(&self, model_id: &str) -> bool {
        let now = self.clock.now();
        self.records
            .get(model_id)
            .is_some_and(|tracked| tracked.record.lock().is_blacklisted_at(now))
    }

    /// Snapshot of a model's counters. Unknown ids and stale windows read as zero.
    pub fn get_stats(&self, model_id: &str) -> UsageStats {
        let now = self.clock.now();
        match self.records.get(model_id) {
            Some(tracked) => Self::snapshot(&tracked.record.lock(), now),
            None => UsageStats::default(),
        }
    }

    /// Point the router at a different provider, stored exactly as given.
    /// Existence of credentials is the caller's problem.
    pub fn set_current_provider(&self, provider: &str) -> Result<(), LlmError> {
        if provider.is_empty() {
            return Err(LlmError::EmptyProvider);
        }

        let previous = self.current_provider.swap(Arc::new(provider.to_string()));
        if previous.as_str() != provider {
            tracing::info!(from = %previous, to = %provider, "current provider switched");
        }
        Ok(())
    }

    pub fn get_current_provider(&self) -> String {
        self.current_provider.load().as_ref().clone()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Highest per-window count allowed before blacklisting, or `None` when unlimited.
    fn threshold(&self, rpm_limit: u32) -> Option<u64> {
        if rpm_limit == 0 {
            return None;
        }
        Some((f64::from(rpm_limit) * self.blacklist_multiplier).floor() as u64)
    }

    fn snapshot(record: &UsageRecord, now: DateTime<Utc>) -> UsageStats {
        if record.window_elapsed(now) {
            return UsageStats::default();
        }
        UsageStats {
            count_in_window: record.count_in_window,
            tokens_in_window: record.tokens_in_window,
            blacklisted_until: record
                .blacklisted_until
                .filter(|&until| now < until),
        }
    }
}

impl std::fmt::Debug for UsageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageTracker")
            .field("models", &self.records.len())
            .field("current_provider", &self.get_current_provider())
            .field("blacklist_multiplier", &self.blacklist_multiplier)
            .finish_non_exhaustive()
    }
}
