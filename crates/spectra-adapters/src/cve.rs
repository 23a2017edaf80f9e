//! CVE adapter: `cpe-string -> CVE[]` (§4.7, §4.12).
//!
//! Honors the upstream service's own rate-limit policy: 5 requests per 30s
//! unauthenticated, 50 per 30s with an API key (NVD's published tiers).
//! Responses are cached per-CPE since a CPE's vulnerability set changes
//! rarely relative to a scan cadence.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use spectra_ratelimit::RateLimiter;

use crate::cache::TtlCache;
use crate::LookupResult;

const PUBLIC_RATE_PER_WINDOW: u32 = 5;
const KEYED_RATE_PER_WINDOW: u32 = 50;
const RATE_WINDOW: Duration = Duration::from_secs(30);
const DEFAULT_TTL: Duration = Duration::from_secs(6 * 60 * 60);

/// One CVE as reported against a CPE, carrying enough detail to populate
/// both the [`spectra_core::Vuln`] node (via severity-from-cvss derivation)
/// and the extended [`spectra_core::VulnDoc`] (summary, for embedding).
#[derive(Debug, Clone, PartialEq)]
pub struct CveRecord {
    /// CVE identifier, e.g. `"CVE-2021-23017"`.
    pub cve_id: String,
    /// CVSS base score.
    pub cvss: f32,
    /// Short title.
    pub title: String,
    /// Extended summary/description.
    pub summary: String,
    /// Known Exploited Vulnerability flag, if the upstream service reports it.
    pub kev_flag: bool,
    /// Publication date, if known.
    pub published_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CveApiEntry {
    cve_id: String,
    cvss: f32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    kev_flag: bool,
    published_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CveApiResponse {
    #[serde(default)]
    vulnerabilities: Vec<CveApiEntry>,
}

/// Resolves CPE strings to the vulnerabilities reported against them.
pub struct CveAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: TtlCache<String, Vec<CveRecord>>,
    limiter: RateLimiter,
}

impl CveAdapter {
    /// Build an adapter against `base_url` (expected to serve
    /// `GET {base_url}?cpeName={cpe}`), honoring NVD's public rate tier
    /// unless `api_key` is supplied.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let rate = if api_key.is_some() {
            KEYED_RATE_PER_WINDOW
        } else {
            PUBLIC_RATE_PER_WINDOW
        };
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            cache: TtlCache::new(Some(DEFAULT_TTL)),
            limiter: RateLimiter::new(rate, RATE_WINDOW),
        }
    }

    /// Resolve a batch of CPEs. Upstream failures for an individual CPE
    /// land it in `failed`; the batch never fails wholesale.
    pub async fn lookup(&self, cpes: &[String]) -> LookupResult<String, Vec<CveRecord>> {
        let mut result = LookupResult::new();
        for cpe in cpes {
            match self.lookup_one(cpe).await {
                Some(records) => {
                    result.found.insert(cpe.clone(), records);
                }
                None => result.failed.push(cpe.clone()),
            }
        }
        result
    }

    async fn lookup_one(&self, cpe: &str) -> Option<Vec<CveRecord>> {
        if cpe.is_empty() {
            return None;
        }
        if let Some(cached) = self.cache.get(&cpe.to_string()).await {
            return Some(cached);
        }
        if !self.limiter.allow("cve-adapter").await {
            tracing::debug!(target: "spectra.adapters.cve", cpe, "rate limited");
            return None;
        }

        let mut req = self.client.get(&self.base_url).query(&[("cpeName", cpe)]);
        if let Some(key) = &self.api_key {
            req = req.header("apiKey", key);
        }
        let resp = req.send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: CveApiResponse = resp.json().await.ok()?;
        let records: Vec<CveRecord> = body
            .vulnerabilities
            .into_iter()
            .map(|e| CveRecord {
                cve_id: e.cve_id,
                cvss: e.cvss,
                title: e.title,
                summary: e.summary,
                kev_flag: e.kev_flag,
                published_date: e.published_date,
            })
            .collect();

        self.cache.insert(cpe.to_string(), records.clone()).await;
        Some(records)
    }
}
