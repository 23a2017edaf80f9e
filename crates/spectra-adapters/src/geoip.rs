//! GeoIP adapter: `ip -> {city, region, country, country_cc, lat, lon}` (§4.7).
//!
//! Local MMDB is the primary lookup path (file-local, so cache entries never
//! expire); an optional HTTP fallback covers addresses the local database
//! misses. Private-range IPs resolve to `None`, matching §4.7's "Private-range
//! IPs return `NotFound` (not an error)".

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use maxminddb::geoip2;
use serde::Deserialize;

use crate::cache::TtlCache;
use crate::LookupResult;

/// Resolved geographic attributes for a host, matching the fields §4.11
/// stamps onto `host.city`/`host.region`/`host.country` and the geo
/// reference entities it upserts.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    /// City name, if the database resolved one.
    pub city: Option<String>,
    /// Region/subdivision name, if resolved.
    pub region: Option<String>,
    /// Full country name, if resolved.
    pub country: Option<String>,
    /// ISO 3166-1 alpha-2 country code.
    pub country_cc: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
struct HttpGeoResponse {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    country_cc: String,
    lat: f64,
    lon: f64,
}

/// Resolves IP addresses to geographic location, preferring a local MMDB
/// file and falling back to an HTTP geolocation service when configured.
pub struct GeoIpAdapter {
    reader: Option<maxminddb::Reader<Vec<u8>>>,
    http_fallback_url: Option<String>,
    client: reqwest::Client,
    cache: TtlCache<String, GeoInfo>,
}

impl GeoIpAdapter {
    /// Open the MMDB file at `mmdb_path`. If it cannot be opened (missing,
    /// corrupt), the adapter still constructs successfully but every lookup
    /// falls straight through to the HTTP fallback, if any.
    #[must_use]
    pub fn open(mmdb_path: &str, http_fallback_url: Option<String>) -> Self {
        let reader = maxminddb::Reader::open_readfile(mmdb_path)
            .map_err(|err| {
                tracing::warn!(target: "spectra.adapters.geoip", path = mmdb_path, error = %err, "failed to open mmdb, falling back to http-only");
            })
            .ok();
        Self {
            reader,
            http_fallback_url,
            client: reqwest::Client::new(),
            cache: TtlCache::new(None),
        }
    }

    /// Build an adapter with no local MMDB, relying entirely on the HTTP
    /// fallback (or failing every lookup if none is configured).
    #[must_use]
    pub fn http_only(http_fallback_url: impl Into<String>) -> Self {
        Self {
            reader: None,
            http_fallback_url: Some(http_fallback_url.into()),
            client: reqwest::Client::new(),
            cache: TtlCache::new(None),
        }
    }

    /// Resolve a batch of IP addresses. Private/unlocated/invalid addresses
    /// land in `failed`, per §4.11 step 4 ("skipped without failure").
    pub async fn lookup(&self, ips: &[String]) -> LookupResult<String, GeoInfo> {
        let mut result = LookupResult::new();
        for ip in ips {
            match self.lookup_one(ip).await {
                Some(info) => {
                    result.found.insert(ip.clone(), info);
                }
                None => result.failed.push(ip.clone()),
            }
        }
        result
    }

    async fn lookup_one(&self, ip: &str) -> Option<GeoInfo> {
        let addr = IpAddr::from_str(ip).ok()?;
        if is_private_or_local(addr) {
            tracing::debug!(target: "spectra.adapters.geoip", ip, "private range, skipping");
            return None;
        }
        if let Some(cached) = self.cache.get(&ip.to_string()).await {
            return Some(cached);
        }

        if let Some(info) = self.lookup_mmdb(addr) {
            self.cache.insert(ip.to_string(), info.clone()).await;
            return Some(info);
        }

        let info = self.lookup_http(ip).await?;
        self.cache.insert(ip.to_string(), info.clone()).await;
        Some(info)
    }

    fn lookup_mmdb(&self, addr: IpAddr) -> Option<GeoInfo> {
        let reader = self.reader.as_ref()?;
        let city: geoip2::City = reader.lookup(addr).ok().flatten()?;

        let country_cc = city.country.as_ref()?.iso_code?.to_string();
        let country = city
            .country
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let region = city
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|sub| sub.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let city_name = city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let (lat, lon) = city
            .location
            .as_ref()
            .map(|loc| (loc.latitude.unwrap_or(0.0), loc.longitude.unwrap_or(0.0)))
            .unwrap_or((0.0, 0.0));

        Some(GeoInfo {
            city: city_name,
            region,
            country,
            country_cc,
            lat,
            lon,
        })
    }

    async fn lookup_http(&self, ip: &str) -> Option<GeoInfo> {
        let base = self.http_fallback_url.as_ref()?;
        let url = format!("{}/{}", base.trim_end_matches('/'), ip);
        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body: HttpGeoResponse = resp.json().await.ok()?;
        Some(GeoInfo {
            city: body.city,
            region: body.region,
            country: body.country,
            country_cc: body.country_cc,
            lat: body.lat,
            lon: body.lon,
        })
    }
}

/// Shared handle, cheap to clone and pass into workflow contexts.
pub type SharedGeoIpAdapter = Arc<GeoIpAdapter>;

fn is_private_or_local(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_v4_ranges_detected() {
        assert!(is_private_or_local(IpAddr::from_str("10.0.0.1").unwrap()));
        assert!(is_private_or_local(IpAddr::from_str("172.16.0.1").unwrap()));
        assert!(is_private_or_local(IpAddr::from_str("192.168.1.1").unwrap()));
        assert!(is_private_or_local(IpAddr::from_str("127.0.0.1").unwrap()));
        assert!(!is_private_or_local(IpAddr::from_str("8.8.8.8").unwrap()));
    }

    #[test]
    fn private_v6_ranges_detected() {
        assert!(is_private_or_local(IpAddr::from_str("::1").unwrap()));
        assert!(is_private_or_local(
            IpAddr::from_str("fc00::1").unwrap()
        ));
        assert!(!is_private_or_local(
            IpAddr::from_str("2001:4860:4860::8888").unwrap()
        ));
    }

    #[tokio::test]
    async fn private_ip_is_skipped_not_failed_as_error() {
        let adapter = GeoIpAdapter::http_only("http://127.0.0.1:1");
        let result = adapter.lookup(&["10.0.0.5".to_string()]).await;
        assert!(result.found.is_empty());
        assert_eq!(result.failed, vec!["10.0.0.5".to_string()]);
    }

    #[tokio::test]
    async fn invalid_ip_lands_in_failed() {
        let adapter = GeoIpAdapter::http_only("http://127.0.0.1:1");
        let result = adapter.lookup(&["not-an-ip".to_string()]).await;
        assert_eq!(result.failed, vec!["not-an-ip".to_string()]);
    }

    #[tokio::test]
    async fn unreachable_http_fallback_fails_gracefully() {
        let adapter = GeoIpAdapter::http_only("http://127.0.0.1:1");
        let result = adapter.lookup(&["8.8.8.8".to_string()]).await;
        assert!(result.found.is_empty());
        assert_eq!(result.failed, vec!["8.8.8.8".to_string()]);
    }

    #[tokio::test]
    async fn missing_mmdb_file_falls_through_without_panic() {
        let adapter = GeoIpAdapter::open("/nonexistent/path.mmdb", None);
        let result = adapter.lookup(&["8.8.8.8".to_string()]).await;
        assert!(result.found.is_empty());
        assert_eq!(result.failed, vec!["8.8.8.8".to_string()]);
    }
}
