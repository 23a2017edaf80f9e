//! ASN adapter: `ip -> {asn, org, country}` (§4.7).

use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use spectra_core::Asn;
use spectra_ratelimit::RateLimiter;

use crate::cache::TtlCache;
use crate::LookupResult;

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_RATE_PER_MIN: u32 = 100;

#[derive(Debug, Deserialize)]
struct AsnResponse {
    asn: u32,
    org: String,
    country: String,
}

/// Resolves IP addresses to their announcing Autonomous System over HTTP,
/// with a 24h TTL cache and a 100/min token-bucket rate limit, both per
/// §4.7's default figures.
pub struct AsnAdapter {
    client: reqwest::Client,
    base_url: String,
    cache: TtlCache<String, Asn>,
    limiter: RateLimiter,
}

impl AsnAdapter {
    /// Build an adapter that queries `base_url` (expected to serve
    /// `GET {base_url}/{ip}` returning `{asn, org, country}` JSON).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_rate_limit(base_url, DEFAULT_RATE_PER_MIN)
    }

    /// Build an adapter with a non-default rate limit, e.g. for a paid tier.
    #[must_use]
    pub fn with_rate_limit(base_url: impl Into<String>, rate_per_min: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: TtlCache::new(Some(DEFAULT_TTL)),
            limiter: RateLimiter::new(rate_per_min, Duration::from_secs(60)),
        }
    }

    /// Resolve a batch of IP addresses. Invalid addresses and upstream
    /// failures land in `failed`; the batch as a whole never fails.
    pub async fn lookup(&self, ips: &[String]) -> LookupResult<String, Asn> {
        let mut result = LookupResult::new();
        for ip in ips {
            match self.lookup_one(ip).await {
                Some(asn) => {
                    result.found.insert(ip.clone(), asn);
                }
                None => result.failed.push(ip.clone()),
            }
        }
        result
    }

    async fn lookup_one(&self, ip: &str) -> Option<Asn> {
        if IpAddr::from_str(ip).is_err() {
            tracing::debug!(target: "spectra.adapters.asn", ip, "invalid ip");
            return None;
        }
        if let Some(cached) = self.cache.get(&ip.to_string()).await {
            return Some(cached);
        }
        if !self.limiter.allow("asn-adapter").await {
            tracing::debug!(target: "spectra.adapters.asn", ip, "rate limited");
            return None;
        }

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), ip);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: AsnResponse = resp.json().await.ok()?;
        let asn = Asn {
            number: body.asn,
            org: body.org,
            country: body.country,
        };
        self.cache.insert(ip.to_string(), asn.clone()).await;
        Some(asn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_ip_lands_in_failed_not_error() {
        let adapter = AsnAdapter::new("http://127.0.0.1:1");
        let result = adapter.lookup(&["not-an-ip".to_string()]).await;
        assert!(result.found.is_empty());
        assert_eq!(result.failed, vec!["not-an-ip".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_host_is_failed_not_panic() {
        let adapter = AsnAdapter::new("http://127.0.0.1:1");
        let result = adapter.lookup(&["8.8.8.8".to_string()]).await;
        assert!(result.found.is_empty());
        assert_eq!(result.failed, vec!["8.8.8.8".to_string()]);
    }

    #[tokio::test]
    async fn mixed_batch_partitions_valid_and_invalid() {
        let adapter = AsnAdapter::new("http://127.0.0.1:1");
        let result = adapter
            .lookup(&["garbage".to_string(), "1.2.3.4".to_string()])
            .await;
        assert_eq!(result.failed.len(), 2);
    }

    #[test]
    fn default_rate_matches_spec() {
        let adapter = AsnAdapter::new("http://localhost");
        assert_eq!(adapter.limiter.capacity(), DEFAULT_RATE_PER_MIN);
    }
}
