//! Request id generation.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces request ids of the form `<prefix><counter>`.
///
/// The default prefix embeds the construction timestamp so ids differ
/// between runs of the same program.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl IdGenerator {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// Generator seeded with the current time: `id-<unix millis>-`.
    pub fn seeded() -> Self {
        Self::seeded_as("id")
    }

    /// Like [`seeded`](Self::seeded) with a custom label: `<label>-<unix millis>-`.
    pub fn seeded_as(label: &str) -> Self {
        Self::with_prefix(format!("{}-{}-", label, chrono::Utc::now().timestamp_millis()))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn next(&self) -> Value {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Value::String(format!("{}{}", self.prefix, n))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::seeded()
    }
}
