// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-invocation journals: an append-only log of `step-name -> result`
//! that makes `run` at-most-once and replay-safe (§4.8).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// One recorded step outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    /// Step name, unique within one invocation.
    pub step: String,
    /// JSON-encoded result of the step function.
    pub result: Value,
}

/// A per-invocation append-only journal.
///
/// Implementations must guarantee that [`Journal::record`] followed by
/// [`Journal::get`] for the same step name returns the recorded value
/// byte-for-byte, since replay correctness depends on it.
#[async_trait::async_trait]
pub trait Journal: Send + Sync {
    /// Look up a previously recorded step result by name.
    async fn get(&self, invocation_id: &str, step: &str) -> Option<Value>;

    /// Record a step result. Overwriting an existing step is a logic error
    /// in the caller (steps are checked with `get` first) but is not itself
    /// rejected, so implementations stay simple.
    async fn record(&self, invocation_id: &str, step: &str, result: Value);

    /// All recorded steps for an invocation, in insertion order.
    async fn history(&self, invocation_id: &str) -> Vec<StepRecord>;
}

/// In-process journal keyed by invocation id, suitable as the reference
/// implementation and for tests. Not durable across process restarts —
/// a production binding would persist this to the durable-execution
/// runtime's own storage (§6: "a durable-execution runtime providing the
/// primitives in §4.8").
#[derive(Clone, Default)]
pub struct InMemoryJournal {
    invocations: Arc<RwLock<HashMap<String, Vec<StepRecord>>>>,
}

impl InMemoryJournal {
    /// Construct an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Journal for InMemoryJournal {
    async fn get(&self, invocation_id: &str, step: &str) -> Option<Value> {
        self.invocations
            .read()
            .await
            .get(invocation_id)
            .and_then(|steps| steps.iter().find(|s| s.step == step))
            .map(|s| s.result.clone())
    }

    async fn record(&self, invocation_id: &str, step: &str, result: Value) {
        let mut invocations = self.invocations.write().await;
        invocations
            .entry(invocation_id.to_string())
            .or_default()
            .push(StepRecord {
                step: step.to_string(),
                result,
            });
    }

    async fn history(&self, invocation_id: &str) -> Vec<StepRecord> {
        self.invocations
            .read()
            .await
            .get(invocation_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Serialize `value` to the journal's wire form.
///
/// # Errors
/// Propagates any `serde_json` serialization failure.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}

/// Deserialize a previously-journaled value.
///
/// # Errors
/// Propagates any `serde_json` deserialization failure.
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}
