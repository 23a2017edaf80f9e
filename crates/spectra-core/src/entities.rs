// SPDX-License-Identifier: MIT OR Apache-2.0
//! Entity types that make up the graph (§3 of the design document).
//!
//! None of these types own persistence — they are the shapes the
//! `spectra-store` adapter reads and writes. Temporal fields (`first_seen`,
//! `last_seen`) are stamped by the store, not constructed here, since only
//! the store knows "now" at commit time.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The primary observable: an IP address and its accumulated attributes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Host {
    /// IP address, dotted-quad or IPv6 — the host's unique identity.
    pub ip: String,
    /// Autonomous System Number, once enriched by C10.
    pub asn: Option<u32>,
    /// City name, once enriched by C11.
    pub city: Option<String>,
    /// Region/state name, once enriched by C11.
    pub region: Option<String>,
    /// ISO country code, once enriched by C11.
    pub country: Option<String>,
    /// Cloud provider region tag, if detected.
    pub cloud_region: Option<String>,
    /// When this host was first observed.
    pub first_seen: DateTime<Utc>,
    /// When this host was last observed (bumped on every re-observation).
    pub last_seen: DateTime<Utc>,
    /// When a scanner last submitted data that touched this host.
    pub last_scanned_at: DateTime<Utc>,
}

/// Transport-layer protocol a [`Port`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

/// Whether a [`Port`] is observed in the clear or behind TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Unencrypted.
    Plain,
    /// TLS-wrapped.
    Tls,
}

/// A single open port on a [`Host`].
///
/// Identity is `(host, number, protocol)` — §3 requires at most one such
/// tuple to exist at a time; `transport` and temporal fields may change
/// across re-observations of the same identity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Port {
    /// Owning host's IP.
    pub host: String,
    /// Port number, 1..=65535.
    pub number: u16,
    /// L4 protocol.
    pub protocol: Protocol,
    /// Plain or TLS.
    pub transport: Transport,
    /// When this port was first observed open.
    pub first_seen: DateTime<Utc>,
    /// When this port was last observed open.
    pub last_seen: DateTime<Utc>,
}

/// A software service fingerprinted on a port.
///
/// Identity is the SHA-256 `fingerprint` of the canonical
/// `{name, product, version, cpe}` tuple — see [`service_fingerprint`].
/// Two submissions with the same identifying fields collapse to the same
/// node (§3 invariant).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Service {
    /// SHA-256 fingerprint, hex-encoded.
    pub fingerprint: String,
    /// Service banner-derived name, if any (e.g. `"nginx"`).
    pub name: Option<String>,
    /// Product name, if known.
    pub product: Option<String>,
    /// Version string, if known.
    pub version: Option<String>,
    /// CPE identifiers already associated with this service (may be empty
    /// until the CPE enrichment workflow runs).
    pub cpe: Vec<String>,
    /// Confidence in this fingerprint, `0.0..=1.0`.
    pub confidence: f32,
    /// When this service was first observed.
    pub first_seen: DateTime<Utc>,
    /// When this service was last observed.
    pub last_seen: DateTime<Utc>,
}

/// Compute the deterministic SHA-256 fingerprint of a service's identifying
/// fields.
///
/// The canonical form is `name|product|version|cpe0,cpe1,...` with `None`
/// fields rendered as the empty string and `cpe` sorted for order-independence,
/// so that repeated submissions of logically identical services hash
/// identically (§3, §8 round-trip law).
#[must_use]
pub fn service_fingerprint(
    name: Option<&str>,
    product: Option<&str>,
    version: Option<&str>,
    cpe: &[String],
) -> String {
    let mut sorted_cpe = cpe.to_vec();
    sorted_cpe.sort();
    let canonical = format!(
        "{}|{}|{}|{}",
        name.unwrap_or(""),
        product.unwrap_or(""),
        version.unwrap_or(""),
        sorted_cpe.join(",")
    );
    let digest = Sha256::digest(canonical.as_bytes());
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// A banner's content hash, used for dedup.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Banner {
    /// SHA-256 of the raw banner bytes, hex-encoded — the node's identity.
    pub hash: String,
    /// Raw banner text, truncated by callers as needed before storage.
    pub text: String,
}

/// A TLS certificate observed on a service.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TlsCert {
    /// SHA-256 of the DER-encoded certificate, hex-encoded — the node's identity.
    pub sha256: String,
    /// Subject common name, if parsed.
    pub subject_cn: Option<String>,
    /// Issuer common name, if parsed.
    pub issuer_cn: Option<String>,
    /// Certificate expiry, if parsed.
    pub not_after: Option<DateTime<Utc>>,
}

/// Severity bucket derived from a CVSS score (§4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// CVSS < 4.0.
    Low,
    /// 4.0 <= CVSS < 7.0.
    Medium,
    /// 7.0 <= CVSS < 9.0.
    High,
    /// CVSS >= 9.0.
    Critical,
}

impl Severity {
    /// Map a CVSS base score to its severity bucket per the fixed thresholds
    /// in §4.12: `>=9.0 CRITICAL`, `>=7.0 HIGH`, `>=4.0 MEDIUM`, else `LOW`.
    #[must_use]
    pub fn from_cvss(cvss: f32) -> Self {
        if cvss >= 9.0 {
            Self::Critical
        } else if cvss >= 7.0 {
            Self::High
        } else if cvss >= 4.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// A vulnerability record keyed by CVE id.
///
/// §3 invariant: a node exists only when `cve_id` matches `CVE-\d{4}-\d{4,}`
/// — see [`is_valid_cve_id`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Vuln {
    /// CVE identifier, e.g. `"CVE-2021-23017"` — the node's identity.
    pub cve_id: String,
    /// CVSS base score.
    pub cvss: f32,
    /// Severity bucket, derived from `cvss` via [`Severity::from_cvss`].
    pub severity: Severity,
    /// Known Exploited Vulnerability flag (CISA KEV catalog).
    pub kev_flag: bool,
    /// Confidence that this CVE genuinely applies, `0.0..=1.0`.
    pub confidence: f32,
}

/// Validate a CVE id against the `CVE-\d{4}-\d{4,}` shape required by §3.
#[must_use]
pub fn is_valid_cve_id(cve_id: &str) -> bool {
    let Some(rest) = cve_id.strip_prefix("CVE-") else {
        return false;
    };
    let Some((year, seq)) = rest.split_once('-') else {
        return false;
    };
    year.len() == 4
        && year.bytes().all(|b| b.is_ascii_digit())
        && seq.len() >= 4
        && seq.bytes().all(|b| b.is_ascii_digit())
}

/// An extended vulnerability document carrying a summary and embedding for
/// similarity search (§4.13). Stored separately from [`Vuln`] since not
/// every CVE has been embedded yet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct VulnDoc {
    /// CVE identifier — shares identity with the corresponding [`Vuln`].
    pub cve_id: String,
    /// Human-readable title.
    pub title: String,
    /// Extended summary text used to derive the embedding.
    pub summary: String,
    /// 1536-dimensional embedding, cosine-indexed by the store.
    pub embedding: Vec<f64>,
    /// Identifier of the embedding model that produced `embedding`; used to
    /// detect staleness if the model changes (§4.13).
    pub model: String,
    /// CPE identifiers this document is associated with.
    pub cpe: Vec<String>,
    /// Publication date, if known.
    pub published_date: Option<DateTime<Utc>>,
}

/// City reference/taxonomy entity (geo hierarchy leaf).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct City {
    /// City name — identity is `(name, country_cc)`.
    pub name: String,
    /// ISO country code this city belongs to.
    pub country_cc: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// Region/state reference entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Region {
    /// Region name — identity is `(name, country_cc)`.
    pub name: String,
    /// ISO country code this region belongs to.
    pub country_cc: String,
    /// Region/subdivision code, if known (e.g. ISO 3166-2).
    pub code: Option<String>,
}

/// Country reference entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Country {
    /// ISO 3166-1 alpha-2 country code — the node's identity.
    pub cc: String,
    /// Country name.
    pub name: String,
}

/// Autonomous System reference entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Asn {
    /// Autonomous System Number — the node's identity.
    pub number: u32,
    /// Organization name registered for this ASN.
    pub org: String,
    /// ISO country code of the registrant.
    pub country: String,
}

/// Cloud provider region reference entity (e.g. `"aws:us-east-1"`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CloudRegion {
    /// Provider-qualified region tag — the node's identity.
    pub tag: String,
    /// Cloud provider name.
    pub provider: String,
}

/// Well-known port taxonomy entity (e.g. port 443 "https").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CommonPort {
    /// Port number — part of the node's identity.
    pub number: u16,
    /// Protocol — part of the node's identity.
    pub protocol: Protocol,
    /// Conventional service name for this port.
    pub name: String,
}
