// SPDX-License-Identifier: MIT OR Apache-2.0
//! Directed, typed edges between graph entities (§3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fixed set of edge types the graph supports.
///
/// Every edge is created via `RelateOnce` (see `spectra-store`) and is
/// never duplicated between the same two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// host → port.
    Has,
    /// port → service.
    Runs,
    /// service → banner | tls_cert.
    EvidencedBy,
    /// service → vuln. Carries `confidence`, `source`.
    AffectedBy,
    /// host/city → city/region (geo hierarchy).
    InCity,
    /// city/region → region/country (geo hierarchy).
    InRegion,
    /// region/country → country (geo hierarchy).
    InCountry,
    /// host → asn.
    InAsn,
    /// host → cloud_region.
    InCloudRegion,
    /// port → common_port.
    IsCommon,
    /// service → any. Carries `scan_id`, `contributor_id`, `ts`, `trust`.
    ObservedAt,
}

impl EdgeType {
    /// Stable wire name, e.g. `"AFFECTED_BY"`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Has => "HAS",
            Self::Runs => "RUNS",
            Self::EvidencedBy => "EVIDENCED_BY",
            Self::AffectedBy => "AFFECTED_BY",
            Self::InCity => "IN_CITY",
            Self::InRegion => "IN_REGION",
            Self::InCountry => "IN_COUNTRY",
            Self::InAsn => "IN_ASN",
            Self::InCloudRegion => "IN_CLOUD_REGION",
            Self::IsCommon => "IS_COMMON",
            Self::ObservedAt => "OBSERVED_AT",
        }
    }
}

/// A directed edge record, including its type-specific attribute bag.
///
/// `from`/`to` are store-assigned record ids (opaque strings); callers
/// build these from entity identity via the store adapter, not here.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Edge {
    /// Source record id.
    pub from: String,
    /// Edge type.
    pub edge_type: EdgeType,
    /// Destination record id.
    pub to: String,
    /// Type-specific attributes (e.g. `confidence`/`source` on `AFFECTED_BY`).
    pub attrs: BTreeMap<String, serde_json::Value>,
    /// When this edge was first created. `RelateOnce` never updates this
    /// once set.
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// Build a bare edge with no attributes, stamped `now`.
    #[must_use]
    pub fn new(from: impl Into<String>, edge_type: EdgeType, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            edge_type,
            to: to.into(),
            attrs: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach an attribute, returning `self` for chaining.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.attrs.insert(key.into(), v);
        }
        self
    }
}
