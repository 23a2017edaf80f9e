// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-config
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Plain runtime configuration structs mirroring §6's configuration table.
//!
//! There is deliberately no file format or parser here — the Non-goals
//! exclude a bespoke config-file grammar, not configuration itself.
//! `spectra-daemon`'s binary entrypoint builds these structs from
//! `clap`-derived `Args` with `#[arg(long, env = "...")]`, so every key
//! below is also settable by environment variable.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connection settings for the graph+vector store (§6: "Store endpoint,
/// user, pass, namespace, database").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct StoreConfig {
    /// Store connection endpoint, e.g. `ws://localhost:8000`.
    pub endpoint: String,
    /// Store auth username.
    pub username: String,
    /// Store auth password.
    pub password: String,
    /// Store namespace.
    pub namespace: String,
    /// Store database within the namespace.
    pub database: String,
}

/// Durable-execution runtime dispatch settings (§6: "Durable-runtime endpoint").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Endpoint the daemon dispatches workflow invocations to.
    pub endpoint: String,
}

/// External-adapter tuning (§6: embedding key, ASN limit/TTL, GeoIP path, CVE key).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AdapterConfig {
    /// API key enabling the embedding adapter. Absent disables similarity queries.
    pub embedding_api_key: Option<String>,
    /// ASN adapter rate limit, requests per minute. Default 100 (§4.7).
    pub asn_rate_limit_per_min: u32,
    /// ASN adapter cache TTL in seconds. Default 24h (§4.7).
    pub asn_cache_ttl_secs: u64,
    /// Path to the local MMDB file for GeoIP lookups.
    pub geoip_mmdb_path: String,
    /// Optional API key granting a higher CVE adapter rate allowance.
    pub cve_api_key: Option<String>,
    /// Minimum cosine-similarity score applied post-retrieval in `/v1/query/similar`
    /// (§9 resolution: not accepted from the request body).
    pub similarity_min_score: f32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            embedding_api_key: None,
            asn_rate_limit_per_min: 100,
            asn_cache_ttl_secs: 24 * 60 * 60,
            geoip_mmdb_path: "GeoLite2-City.mmdb".to_string(),
            cve_api_key: None,
            similarity_min_score: 0.0,
        }
    }
}

/// HTTP server bind settings (§6: "Ingress port").
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the ingest/query API binds to, e.g. `0.0.0.0:8088`.
    pub bind: String,
}

/// The complete set of configuration the daemon needs to start serving.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SpectraConfig {
    /// Graph+vector store connection.
    pub store: StoreConfig,
    /// Durable-runtime dispatch target.
    pub runtime: RuntimeConfig,
    /// External-adapter tuning.
    pub adapters: AdapterConfig,
    /// HTTP server bind settings.
    pub server: ServerConfig,
}
