// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-workflows
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The durable workflow bodies (§4.9-§4.13): ingest, ASN enrichment, GeoIP
//! enrichment, CPE enrichment, and the vulnerability-document indexer.
//! Each is a plain async function over a [`spectra_runtime::WorkflowContext`]
//! plus whatever stores/adapters it needs — the daemon binds these to
//! workflow names and dispatches invocations to them.

/// ASN enrichment workflow (C10).
pub mod asn;
/// CPE enrichment workflow (C12).
pub mod cpe;
/// GeoIP enrichment workflow (C11).
pub mod geoip;
/// Ingest workflow (C9).
pub mod ingest;
/// Vulnerability document indexer (C13).
pub mod vulndoc;

pub use asn::{AsnData, AsnInput, AsnOutput};
pub use cpe::{generate_cpe, CpeInput, CpeOutput, ServiceInfo};
pub use geoip::{GeoIpInput, GeoIpOutput};
pub use ingest::{IngestInput, IngestOutput, NewService, ScanData, ScanHost, ScanPort, ScanService};
