//! Query-surface types for the host traversal, typed graph search, and
//! vector search operations (§4.4, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spectra_core::{Asn, City, Host, Port, Service, Vuln};

/// A service, cumulatively including the vulnerabilities that affect it
/// once depth >= 3 (§4.6.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceView {
    /// The service entity.
    pub service: Service,
    /// Vulnerabilities affecting this service; present from depth 3.
    pub vulns: Option<Vec<Vuln>>,
}

/// A port, cumulatively including the services running on it once depth >= 2
/// (§4.6.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortView {
    /// The port entity.
    pub port: Port,
    /// Services observed on this port; present from depth 2.
    pub services: Option<Vec<ServiceView>>,
}

/// The full result of `QueryHost` (§4.6.1), with nested detail gated by the
/// requested depth. `None` fields are simply omitted from the wire
/// representation rather than serialized as `null` arrays, matching
/// §8: "depth = 0 returns no nested arrays".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostView {
    /// The host entity itself — always present, even at depth 0.
    pub host: Host,
    /// Ports observed on this host; present from depth 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<PortView>>,
    /// Full city detail (beyond the host's scalar `city` field); present
    /// from depth 4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_detail: Option<City>,
    /// Full ASN detail (beyond the host's scalar `asn` field); present from
    /// depth 4.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn_detail: Option<Asn>,
}

/// One typed graph-search filter (§4.6.2). Each variant's required field(s)
/// are validated by the caller before the query reaches the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "query_type", rename_all = "snake_case")]
pub enum GraphQueryType {
    /// Hosts announced by a given ASN.
    ByAsn {
        /// Autonomous System Number.
        asn: u32,
    },
    /// Hosts matching any of the given city/region/country.
    ByLocation {
        /// City name filter.
        city: Option<String>,
        /// Region name filter.
        region: Option<String>,
        /// Country code filter.
        country: Option<String>,
    },
    /// Hosts running a service affected by a given CVE.
    ByVuln {
        /// CVE identifier.
        cve: String,
    },
    /// Hosts running a service matching a product or service name.
    ByService {
        /// Product name filter.
        product: Option<String>,
        /// Service name filter.
        service: Option<String>,
    },
}

/// One row of a `GraphQuery` result (§4.6.2): a matching host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostResult {
    /// The matching host entity.
    pub host: Host,
}

/// Pagination metadata shared by job listings and graph queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    /// Requested page size.
    pub limit: u32,
    /// Requested offset.
    pub offset: u32,
    /// Total rows matching the filter, ignoring `limit`/`offset`.
    pub total: u64,
    /// Whether further pages remain.
    pub has_more: bool,
    /// Offset to request for the next page, if `has_more`.
    pub next_offset: Option<u32>,
}

/// A page of [`HostResult`]s plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostResultPage {
    /// The matching hosts in this page.
    pub results: Vec<HostResult>,
    /// Pagination metadata.
    pub pagination: Pagination,
}

/// One row of a `VectorSearch` result (§4.6.3): a vulnerability document
/// ranked by cosine similarity to the query embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VulnResult {
    /// CVE identifier.
    pub cve_id: String,
    /// Short title.
    pub title: String,
    /// Extended summary.
    pub summary: String,
    /// CVSS base score.
    pub cvss: f32,
    /// Associated CPE identifiers.
    pub cpe: Vec<String>,
    /// Publication date, if known.
    pub published_date: Option<DateTime<Utc>>,
    /// Cosine similarity to the query embedding, in `[0, 1]`.
    pub score: f64,
}
