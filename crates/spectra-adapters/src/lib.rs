// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-adapters
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! External lookup adapters (§4.7): ASN, GeoIP, CVE, and embedding. Every
//! adapter shares one contract — `lookup(keys) -> {found, failed}` — backed
//! by a private [`cache::TtlCache`] and, where the adapter calls out over the
//! network, a [`spectra_ratelimit::RateLimiter`] token bucket.

mod cache;

pub mod asn;
pub mod cve;
pub mod embedding;
pub mod geoip;

pub use asn::AsnAdapter;
pub use cve::CveAdapter;
pub use embedding::EmbeddingAdapter;
pub use geoip::{GeoInfo, GeoIpAdapter};

use std::collections::HashMap;
use std::hash::Hash;

/// Result of a batch lookup: successfully resolved keys and the subset that
/// failed (invalid input, not-found, or upstream error), matching §4.7's
/// "on invalid IP, include in failed set; do not fail the batch."
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult<K, V> {
    /// Keys that resolved, with their values.
    pub found: HashMap<K, V>,
    /// Keys that could not be resolved.
    pub failed: Vec<K>,
}

impl<K, V> LookupResult<K, V>
where
    K: Eq + Hash,
{
    /// An empty result.
    #[must_use]
    pub fn new() -> Self {
        Self {
            found: HashMap::new(),
            failed: Vec::new(),
        }
    }
}

impl<K, V> Default for LookupResult<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
