// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-runtime
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Durable-execution runtime bindings (§4.8): the concrete primitives a
//! workflow body calls — `run`, `sleep`/`after`, `callService`,
//! `sendOneWay`, `future`/`waitFirst`, `setState`/`getState` — backed by an
//! in-process [`Journal`] and [`MessageBus`]. The durable-execution runtime
//! itself (the thing that actually persists journals across process
//! restarts and fences invocation epochs) is an external collaborator
//! (§6); this crate is the binding layer a workflow is written against.

/// Broadcast dispatch for `sendOneWay` fire-and-forget messages.
pub mod bus;
/// Cancellation tokens for in-flight invocations.
pub mod cancel;
/// Workflow execution context: `run`/`sleep`/`callService`/state/dispatch.
pub mod context;
/// Per-invocation journals backing `run`'s at-most-once semantics.
pub mod journal;

pub use bus::{Dispatch, MessageBus, MessageBusStats, MessageSubscription};
pub use cancel::{CancellableRun, CancellationReason, CancellationToken};
pub use context::{StateStore, WorkflowContext, WorkflowError};
pub use journal::{InMemoryJournal, Journal, StepRecord};
