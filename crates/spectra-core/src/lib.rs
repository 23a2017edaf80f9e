// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-core
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The stable contract for Spectra-Red's graph domain.
//!
//! If you only take one dependency from this workspace, take this one: it
//! defines the entities, edges, job state machine, and CPE derivation rules
//! that every other crate builds on.

/// Edge types and the directed-edge record shape.
pub mod edges;
/// Entity types: host, port, service, banner, tls_cert, vuln, vuln_doc, and
/// the geo/ASN reference entities.
pub mod entities;
/// Job entity and its state machine.
pub mod job;

pub use edges::{Edge, EdgeType};
pub use entities::{
    is_valid_cve_id, service_fingerprint, Asn, Banner, City, CloudRegion, CommonPort, Country,
    Host, Port, Protocol, Region, Service, Severity, TlsCert, Transport, Vuln, VulnDoc,
};
pub use job::{Job, JobState};

/// Current data-model contract version embedded in wire messages.
pub const CONTRACT_VERSION: &str = "spectra-red/v1";
