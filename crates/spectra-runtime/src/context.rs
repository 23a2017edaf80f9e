// SPDX-License-Identifier: MIT OR Apache-2.0
//! The workflow execution context: the concrete binding of §4.8's abstract
//! primitives (`run`, `sleep`/`after`, `callService`, `sendOneWay`,
//! `future`/`waitFirst`, `setState`/`getState`, `TerminalError`) against an
//! in-process [`Journal`] and [`MessageBus`].
//!
//! A workflow body is written as an `async fn(ctx: &WorkflowContext) -> ...`
//! and must be a deterministic function of its journal: the same inputs and
//! recorded step results produce the same call sequence on replay.
//! Non-deterministic work (clocks, RNG, adapter I/O) belongs inside `run`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use spectra_error::SpectraError;
use tokio::sync::RwLock;

use crate::bus::{Dispatch, MessageBus};
use crate::cancel::CancellationToken;
use crate::journal::{self, Journal};

/// The outcome of a step or adapter call within a workflow.
///
/// `Terminal` stops all retries immediately (§4.8 `TerminalError`);
/// `Retriable` lets the runtime retry the step from scratch on the next
/// invocation attempt, replaying every already-journaled step.
#[derive(Debug)]
pub enum WorkflowError {
    /// Stop retrying; the workflow invocation fails permanently.
    Terminal(SpectraError),
    /// A transient failure; safe to retry.
    Retriable(SpectraError),
}

impl WorkflowError {
    /// Wrap `err` as terminal.
    #[must_use]
    pub fn terminal(err: SpectraError) -> Self {
        Self::Terminal(err)
    }

    /// Wrap `err` as retriable.
    #[must_use]
    pub fn retriable(err: SpectraError) -> Self {
        Self::Retriable(err)
    }

    /// The underlying error, regardless of retriability.
    #[must_use]
    pub fn into_inner(self) -> SpectraError {
        match self {
            Self::Terminal(e) | Self::Retriable(e) => e,
        }
    }

    /// Whether the runtime should stop retrying.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal(e) => write!(f, "terminal: {e}"),
            Self::Retriable(e) => write!(f, "retriable: {e}"),
        }
    }
}

impl std::error::Error for WorkflowError {}

type KeyedState = std::collections::HashMap<String, std::collections::HashMap<String, Value>>;

/// In-process keyed state store backing `setState`/`getState` (§4.8).
///
/// State is partitioned by virtual-object key (e.g. a host IP or job id);
/// the runtime guarantees per-key invocations are serialized (§5), so this
/// store only needs to protect itself against concurrent *different* keys.
#[derive(Clone, Default)]
pub struct StateStore {
    state: Arc<RwLock<KeyedState>>,
}

impl StateStore {
    /// Construct an empty state store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn get(&self, object_key: &str, field: &str) -> Option<Value> {
        self.state
            .read()
            .await
            .get(object_key)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    async fn set(&self, object_key: &str, field: &str, value: Value) {
        self.state
            .write()
            .await
            .entry(object_key.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }
}

/// Execution context passed to a workflow body.
///
/// Cloning is cheap: it shares the journal, state store, and message bus
/// with the original.
#[derive(Clone)]
pub struct WorkflowContext {
    invocation_id: String,
    object_key: String,
    journal: Arc<dyn Journal>,
    state: StateStore,
    bus: Arc<MessageBus>,
    cancellation: CancellationToken,
}

impl WorkflowContext {
    /// Build a context for one workflow invocation.
    ///
    /// `invocation_id` scopes the journal (replay identity); `object_key`
    /// scopes `setState`/`getState` (virtual-object identity) and is
    /// typically the same value — a job id or host IP — unless the
    /// workflow explicitly operates on behalf of another keyed object.
    #[must_use]
    pub fn new(
        invocation_id: impl Into<String>,
        object_key: impl Into<String>,
        journal: Arc<dyn Journal>,
        state: StateStore,
        bus: Arc<MessageBus>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            object_key: object_key.into(),
            journal,
            state,
            bus,
            cancellation: CancellationToken::new(),
        }
    }

    /// Attach a [`CancellationToken`] this context's suspension points will
    /// observe (§5: "Cancellation surfaces as an error at the next
    /// suspension point in a workflow").
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// The invocation id this context replays against.
    #[must_use]
    pub fn invocation_id(&self) -> &str {
        &self.invocation_id
    }

    fn cancellation_error() -> WorkflowError {
        WorkflowError::terminal(SpectraError::new(
            spectra_error::ErrorCode::WorkflowTerminal,
            "workflow invocation was cancelled",
        ))
    }

    /// Execute `f` at most once per invocation (§4.8 `run`). On replay, the
    /// journaled result is returned without calling `f` again.
    ///
    /// Checks this context's cancellation token first — `run` is a
    /// suspension point, so a cancelled invocation fails here rather than
    /// starting another step (§5).
    ///
    /// # Errors
    /// Propagates whatever [`WorkflowError`] `f` produces, or a terminal
    /// error if the journaled result fails to decode (a corrupt journal is
    /// never retriable), or if the invocation has been cancelled.
    pub async fn run<F, Fut, T>(&self, step: &str, f: F) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
        T: Serialize + DeserializeOwned,
    {
        if self.cancellation.is_cancelled() {
            return Err(Self::cancellation_error());
        }

        if let Some(cached) = self.journal.get(&self.invocation_id, step).await {
            return journal::decode(cached).map_err(|e| {
                WorkflowError::terminal(
                    SpectraError::new(
                        spectra_error::ErrorCode::Internal,
                        format!("journal decode failed for step {step}"),
                    )
                    .with_source(e),
                )
            });
        }

        let result = f().await?;
        let encoded = journal::encode(&result).map_err(|e| {
            WorkflowError::terminal(
                SpectraError::new(
                    spectra_error::ErrorCode::Internal,
                    format!("journal encode failed for step {step}"),
                )
                .with_source(e),
            )
        })?;
        self.journal.record(&self.invocation_id, step, encoded).await;
        Ok(result)
    }

    /// Durable relative timer (§4.8 `sleep`). In this in-process binding the
    /// wait is a real `tokio::time::sleep`; a production runtime binding
    /// would instead persist the wake time and resume the invocation later.
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Durable absolute timer (§4.8 `after`), expressed as a duration from
    /// now for the same reason `sleep` is.
    pub async fn after(&self, duration: Duration) {
        self.sleep(duration).await;
    }

    /// Cross-service durable call with idempotent dedup (§4.8
    /// `callService`). `idempotency_key`, when given, lets the same logical
    /// call be issued from more than one step without double-executing;
    /// omit it to dedup purely on `(name, method)`.
    ///
    /// # Errors
    /// Propagates whatever [`WorkflowError`] `call` produces.
    pub async fn call_service<F, Fut, T>(
        &self,
        name: &str,
        method: &str,
        idempotency_key: Option<&str>,
        call: F,
    ) -> Result<T, WorkflowError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
        T: Serialize + DeserializeOwned,
    {
        let step = match idempotency_key {
            Some(key) => format!("call:{name}:{method}:{key}"),
            None => format!("call:{name}:{method}"),
        };
        self.run(&step, call).await
    }

    /// Fire-and-forget durable message (§4.8 `sendOneWay`). Never observes
    /// the target's response; `delay` schedules delivery in the future
    /// without blocking the caller.
    pub fn send_one_way(&self, target: &str, method: &str, payload: Value, delay: Option<Duration>) {
        let dispatch = Dispatch {
            target: target.to_string(),
            method: method.to_string(),
            payload,
        };
        match delay {
            None => self.bus.publish(dispatch),
            Some(d) => {
                let bus = Arc::clone(&self.bus);
                tokio::spawn(async move {
                    tokio::time::sleep(d).await;
                    bus.publish(dispatch);
                });
            }
        }
    }

    /// Race a set of runtime futures, returning the first to complete along
    /// with its index (§4.8 `waitFirst`). This is the only sanctioned form
    /// of concurrency inside a workflow body.
    pub async fn wait_first<T>(futures: Vec<BoxFuture<'_, T>>) -> (T, usize) {
        let (output, index, _remaining) = futures::future::select_all(futures).await;
        (output, index)
    }

    /// Read keyed state for this context's virtual object (§4.8
    /// `getState`).
    ///
    /// # Errors
    /// Returns an internal error if the stored value fails to decode as `T`.
    pub async fn get_state<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, SpectraError> {
        match self.state.get(&self.object_key, field).await {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| {
                    SpectraError::new(
                        spectra_error::ErrorCode::Internal,
                        format!("state decode failed for field {field}"),
                    )
                    .with_source(e)
                }),
            None => Ok(None),
        }
    }

    /// Write keyed state for this context's virtual object (§4.8
    /// `setState`).
    ///
    /// # Errors
    /// Returns an internal error if `value` fails to encode.
    pub async fn set_state<T: Serialize>(&self, field: &str, value: &T) -> Result<(), SpectraError> {
        let encoded = serde_json::to_value(value).map_err(|e| {
            SpectraError::new(
                spectra_error::ErrorCode::Internal,
                format!("state encode failed for field {field}"),
            )
            .with_source(e)
        })?;
        self.state.set(&self.object_key, field, encoded).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::InMemoryJournal;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ctx(invocation_id: &str) -> WorkflowContext {
        WorkflowContext::new(
            invocation_id,
            invocation_id,
            Arc::new(InMemoryJournal::new()),
            StateStore::new(),
            Arc::new(MessageBus::new()),
        )
    }

    #[tokio::test]
    async fn run_executes_once_and_replays_cached_result() {
        let context = ctx("inv-1");
        let calls = Arc::new(AtomicU32::new(0));

        let run_once = || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, WorkflowError>(7_i32)
            }
        };

        let first = context.run("step-a", run_once).await.unwrap();
        let second = context
            .run("step-a", || async { Ok::<_, WorkflowError>(999) })
            .await
            .unwrap();

        assert_eq!(first, 7);
        assert_eq!(second, 7, "replay must return the journaled value, not re-execute");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_propagates_terminal_errors_without_journaling() {
        let context = ctx("inv-2");
        let err = context
            .run("step-a", || async {
                Err::<i32, _>(WorkflowError::terminal(SpectraError::new(
                    spectra_error::ErrorCode::InvalidParameter,
                    "bad payload",
                )))
            })
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn set_state_and_get_state_roundtrip() {
        let context = ctx("host:1.2.3.4");
        context.set_state("asn", &13335_u32).await.unwrap();
        let value: Option<u32> = context.get_state("asn").await.unwrap();
        assert_eq!(value, Some(13335));
    }

    #[tokio::test]
    async fn get_state_missing_field_is_none() {
        let context = ctx("host:1.2.3.4");
        let value: Option<u32> = context.get_state("asn").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn send_one_way_reaches_subscriber() {
        let bus = Arc::new(MessageBus::new());
        let mut sub = bus.subscribe();
        let context = WorkflowContext::new(
            "inv-3",
            "inv-3",
            Arc::new(InMemoryJournal::new()),
            StateStore::new(),
            Arc::clone(&bus),
        );
        context.send_one_way("asn-enrichment", "enrich", serde_json::json!({"ips": []}), None);
        let dispatch = sub.recv_for("asn-enrichment").await.unwrap();
        assert_eq!(dispatch.method, "enrich");
    }

    #[tokio::test]
    async fn cancelled_token_fails_run_at_next_suspension_point() {
        let token = crate::cancel::CancellationToken::new();
        let context = ctx("inv-cancel").with_cancellation(token.clone());
        token.cancel();

        let err = context
            .run("step-a", || async { Ok::<_, WorkflowError>(1) })
            .await
            .unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn uncancelled_token_does_not_block_run() {
        let token = crate::cancel::CancellationToken::new();
        let context = ctx("inv-not-cancelled").with_cancellation(token);
        let value = context
            .run("step-a", || async { Ok::<_, WorkflowError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn wait_first_returns_fastest_future() {
        let fast = Box::pin(async { 1_u32 });
        let slow = Box::pin(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            2_u32
        });
        let (value, index) = WorkflowContext::wait_first(vec![fast, slow]).await;
        assert_eq!(value, 1);
        assert_eq!(index, 0);
    }
}
