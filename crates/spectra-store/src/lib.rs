// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-store
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The typed graph+vector store adapter (§4.4): entity/edge upserts keyed by
//! natural identity, `RelateOnce` edges, and the three read paths behind the
//! Query API — host traversal, typed graph search, and cosine vector search.

/// Deterministic record-id construction from entity identity.
pub mod ids;
/// In-memory reference implementation of [`store::GraphStore`].
pub mod memory;
/// Query-surface types: host views, graph-search filters, vector results.
pub mod query;
/// The `GraphStore` trait.
pub mod store;

pub use memory::InMemoryGraphStore;
pub use query::{
    GraphQueryType, HostResult, HostResultPage, HostView, Pagination, PortView, ServiceView,
    VulnResult,
};
pub use store::GraphStore;
