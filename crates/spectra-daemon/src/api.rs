// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP request/response envelopes for the ingest and query surfaces (§6).
//!
//! These types are the wire shapes; [`crate::lib`] holds the handlers that
//! produce and consume them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spectra_core::Job;
use spectra_store::query::{HostResult, HostView, VulnResult};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ingest (§4.5)
// ---------------------------------------------------------------------------

/// `POST /v1/mesh/ingest` success response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestAccepted {
    /// Freshly minted job id.
    pub job_id: Uuid,
    /// Always `"accepted"`.
    pub status: String,
    /// Time the job was created.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Jobs (§4.3, §4.5)
// ---------------------------------------------------------------------------

/// Query parameters accepted by `GET /v1/jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobListQuery {
    /// Restrict to a scanner's jobs.
    pub scanner_key: Option<String>,
    /// Restrict to jobs in this state.
    pub state: Option<String>,
    /// Page size, default 50, max 500.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
    /// `created_at` (default) or `updated_at`.
    pub order_by: Option<String>,
    /// Sort descending when `true` (default).
    pub order_desc: Option<bool>,
}

/// One job row as rendered to API callers — identical shape to the domain
/// [`Job`], reused directly rather than duplicated field-for-field.
pub type JobDto = Job;

/// `GET /v1/jobs` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobListResponse {
    /// Matching jobs for this page.
    pub jobs: Vec<JobDto>,
    /// Total jobs matching the filter.
    pub total: u64,
    /// Whether further pages remain.
    pub has_more: bool,
    /// Offset to request next, if `has_more`.
    pub next_offset: Option<u32>,
}

// ---------------------------------------------------------------------------
// Host query (§4.6.1)
// ---------------------------------------------------------------------------

/// Query parameters for `GET /v1/query/host/{ip}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostQueryParams {
    /// Traversal depth, `0..=5`, default 2.
    pub depth: Option<u8>,
}

/// `GET /v1/query/host/{ip}` success response — the traversal view itself.
pub type HostQueryResponse = HostView;

// ---------------------------------------------------------------------------
// Graph query (§4.6.2)
// ---------------------------------------------------------------------------

/// `POST /v1/query/graph` request body. Declared loosely (rather than as
/// the tagged [`spectra_store::query::GraphQueryType`] directly) because
/// the per-type required-field validation in §4.6.2 must run before the
/// typed enum can be constructed, and must report which field is missing.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQueryRequest {
    /// One of `by_asn`, `by_location`, `by_vuln`, `by_service`.
    pub query_type: String,
    /// Required by `by_asn`.
    #[serde(default)]
    pub asn: Option<u32>,
    /// Optional filter for `by_location`.
    #[serde(default)]
    pub city: Option<String>,
    /// Optional filter for `by_location`.
    #[serde(default)]
    pub region: Option<String>,
    /// Optional filter for `by_location`; also usable standalone as a country code.
    #[serde(default)]
    pub country: Option<String>,
    /// Required by `by_vuln`.
    #[serde(default)]
    pub cve: Option<String>,
    /// One of two alternatives required by `by_service`.
    #[serde(default)]
    pub product: Option<String>,
    /// One of two alternatives required by `by_service`.
    #[serde(default)]
    pub service: Option<String>,
    /// Page size, default 100, max 1000.
    #[serde(default)]
    pub limit: Option<u32>,
    /// Rows to skip.
    #[serde(default)]
    pub offset: Option<u32>,
}

/// `POST /v1/query/graph` response pagination block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQueryPagination {
    /// Requested page size.
    pub limit: u32,
    /// Requested offset.
    pub offset: u32,
    /// Total rows matching the filter.
    pub total: u64,
    /// Whether further pages remain.
    pub has_more: bool,
    /// Offset to request next, if `has_more`.
    pub next_offset: Option<u32>,
}

/// `POST /v1/query/graph` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQueryResponse {
    /// Matching hosts.
    pub results: Vec<HostResult>,
    /// Pagination metadata.
    pub pagination: GraphQueryPagination,
    /// Wall-clock query duration in milliseconds.
    pub query_time_ms: u64,
}

// ---------------------------------------------------------------------------
// Similarity query (§4.6.3)
// ---------------------------------------------------------------------------

/// `POST /v1/query/similar` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SimilarityQueryRequest {
    /// Free-text query, at most 500 characters.
    pub query: String,
    /// Number of results to return, `1..=50`, default 10.
    #[serde(default)]
    pub k: Option<u32>,
}

/// One scored vulnerability-document hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityHit {
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
    /// Cosine similarity to the query embedding, `[0, 1]`.
    pub score: f64,
}

impl From<VulnResult> for SimilarityHit {
    fn from(r: VulnResult) -> Self {
        Self {
            cve_id: r.cve_id,
            title: r.title,
            summary: r.summary,
            cvss: r.cvss,
            cpe: r.cpe,
            published_date: r.published_date,
            score: r.score,
        }
    }
}

/// `POST /v1/query/similar` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityQueryResponse {
    /// Echo of the request's free-text query.
    pub query: String,
    /// Matching vulnerability documents, sorted by descending score.
    pub results: Vec<SimilarityHit>,
    /// `results.len()`.
    pub count: usize,
    /// When this response was produced.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    /// Always `true`.
    pub ok: bool,
}
