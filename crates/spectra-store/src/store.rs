//! The `GraphStore` trait (§4.4): entity upserts, `RelateOnce` edges, and the
//! three read operations (`QueryHost`, `GraphQuery`, `VectorSearch`).

use async_trait::async_trait;
use spectra_core::{
    Asn, Banner, City, CloudRegion, CommonPort, Country, Edge, Host, Region, Service, TlsCert,
    Vuln, VulnDoc,
};
use spectra_error::SpectraError;

use crate::query::{GraphQueryType, HostResultPage, HostView, VulnResult};

/// The typed graph+vector store adapter.
///
/// Every `upsert_*` method is idempotent on the entity's natural identity
/// (§3): re-submitting the same identity updates `last_seen` (and any
/// mutable fields) rather than creating a duplicate node. `relate_once`
/// gives the same guarantee for edges.
///
/// Implementations own their own internal mutability; all methods take
/// `&self` so the store can be shared behind an `Arc` across workflow
/// invocations.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upsert a host by IP, stamping `first_seen`/`last_seen`/`last_scanned_at`.
    async fn upsert_host(&self, host: Host) -> Result<Host, SpectraError>;

    /// Upsert a port by `(host, number, protocol)`.
    async fn upsert_port(
        &self,
        port: spectra_core::Port,
    ) -> Result<spectra_core::Port, SpectraError>;

    /// Upsert a service by fingerprint.
    async fn upsert_service(&self, service: Service) -> Result<Service, SpectraError>;

    /// Upsert a banner by content hash.
    async fn upsert_banner(&self, banner: Banner) -> Result<Banner, SpectraError>;

    /// Upsert a TLS certificate by SHA-256.
    async fn upsert_tls_cert(&self, cert: TlsCert) -> Result<TlsCert, SpectraError>;

    /// Upsert a vulnerability by CVE id. Rejects ids that fail
    /// [`spectra_core::is_valid_cve_id`].
    async fn upsert_vuln(&self, vuln: Vuln) -> Result<Vuln, SpectraError>;

    /// Upsert an extended vulnerability document by CVE id.
    async fn upsert_vuln_doc(&self, doc: VulnDoc) -> Result<VulnDoc, SpectraError>;

    /// Fetch the current `vuln_doc` for a CVE id, if one has been indexed.
    /// Used to decide whether a summary embedding must be (re)generated
    /// (§4.13: regenerate only on explicit refresh or a model change).
    async fn get_vuln_doc(&self, cve_id: &str) -> Result<Option<VulnDoc>, SpectraError>;

    /// Upsert an ASN reference entity.
    async fn upsert_asn(&self, asn: Asn) -> Result<Asn, SpectraError>;

    /// Upsert a country reference entity.
    async fn upsert_country(&self, country: Country) -> Result<Country, SpectraError>;

    /// Upsert a region reference entity.
    async fn upsert_region(&self, region: Region) -> Result<Region, SpectraError>;

    /// Upsert a city reference entity.
    async fn upsert_city(&self, city: City) -> Result<City, SpectraError>;

    /// Upsert a cloud-region reference entity.
    async fn upsert_cloud_region(&self, region: CloudRegion) -> Result<CloudRegion, SpectraError>;

    /// Upsert a common-port taxonomy entity.
    async fn upsert_common_port(&self, port: CommonPort) -> Result<CommonPort, SpectraError>;

    /// Create `edge` between two already-upserted record ids if it does not
    /// already exist; otherwise a no-op. Never duplicates an edge between
    /// the same `(from, edge_type, to)` triple (§3).
    async fn relate_once(&self, edge: Edge) -> Result<(), SpectraError>;

    /// Traverse outward from `host_ip` up to `depth` hops (§4.6.1), where
    /// `depth` is clamped to `0..=5` by the caller before reaching the
    /// store. Returns `None` if the host is unknown.
    async fn query_host(&self, host_ip: &str, depth: u8) -> Result<Option<HostView>, SpectraError>;

    /// Run one typed graph-search filter (§4.6.2) and return a page of
    /// matching hosts.
    async fn graph_query(
        &self,
        query: &GraphQueryType,
        limit: u32,
        offset: u32,
    ) -> Result<HostResultPage, SpectraError>;

    /// Rank every indexed vulnerability document by cosine similarity to
    /// `embedding`, returning the top `limit` results with score
    /// `>= min_score` (§4.6.3). Ties break on ascending CVE id.
    async fn vector_search(
        &self,
        embedding: &[f64],
        limit: u32,
        min_score: f32,
    ) -> Result<Vec<VulnResult>, SpectraError>;
}
