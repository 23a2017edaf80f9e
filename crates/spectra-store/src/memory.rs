//! In-memory reference implementation of [`GraphStore`].
//!
//! The internals of the underlying graph+vector database are explicitly out
//! of scope (§1): this implementation exists to give the rest of the crate
//! tree something real to run against, not to stand in for a production
//! backing store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use spectra_core::{
    Asn, Banner, City, CloudRegion, CommonPort, Country, Edge, EdgeType, Host, Region, Service,
    TlsCert, Vuln, VulnDoc,
};
use spectra_error::{ErrorCode, SpectraError};
use tokio::sync::RwLock;

use crate::ids;
use crate::query::{
    GraphQueryType, HostResult, HostResultPage, HostView, Pagination, PortView, ServiceView,
    VulnResult,
};
use crate::store::GraphStore;

#[derive(Default)]
struct Tables {
    hosts: HashMap<String, Host>,
    ports: HashMap<String, spectra_core::Port>,
    services: HashMap<String, Service>,
    banners: HashMap<String, Banner>,
    tls_certs: HashMap<String, TlsCert>,
    vulns: HashMap<String, Vuln>,
    vuln_docs: HashMap<String, VulnDoc>,
    asns: HashMap<String, Asn>,
    countries: HashMap<String, Country>,
    regions: HashMap<String, Region>,
    cities: HashMap<String, City>,
    cloud_regions: HashMap<String, CloudRegion>,
    common_ports: HashMap<String, CommonPort>,
    edges: HashMap<(String, EdgeType, String), Edge>,
}

/// An in-process, single-node implementation of [`GraphStore`] backed by
/// `RwLock`-guarded hash maps. Suitable as a reference implementation and
/// for tests; not durable across process restarts.
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryGraphStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_host(&self, mut host: Host) -> Result<Host, SpectraError> {
        let id = ids::host_id(&host.ip);
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        if let Some(existing) = tables.hosts.get(&id) {
            host.first_seen = existing.first_seen;
        } else {
            host.first_seen = now;
        }
        host.last_seen = now;
        host.last_scanned_at = now;
        tables.hosts.insert(id, host.clone());
        Ok(host)
    }

    async fn upsert_port(
        &self,
        mut port: spectra_core::Port,
    ) -> Result<spectra_core::Port, SpectraError> {
        let id = ids::port_id(&port.host, port.number, port.protocol);
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        if let Some(existing) = tables.ports.get(&id) {
            port.first_seen = existing.first_seen;
        } else {
            port.first_seen = now;
        }
        port.last_seen = now;
        tables.ports.insert(id, port.clone());
        Ok(port)
    }

    async fn upsert_service(&self, mut service: Service) -> Result<Service, SpectraError> {
        let id = ids::service_id(&service.fingerprint);
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        if let Some(existing) = tables.services.get(&id) {
            service.first_seen = existing.first_seen;
        } else {
            service.first_seen = now;
        }
        service.last_seen = now;
        tables.services.insert(id, service.clone());
        Ok(service)
    }

    async fn upsert_banner(&self, banner: Banner) -> Result<Banner, SpectraError> {
        let id = ids::banner_id(&banner.hash);
        self.tables.write().await.banners.insert(id, banner.clone());
        Ok(banner)
    }

    async fn upsert_tls_cert(&self, cert: TlsCert) -> Result<TlsCert, SpectraError> {
        let id = ids::tls_cert_id(&cert.sha256);
        self.tables.write().await.tls_certs.insert(id, cert.clone());
        Ok(cert)
    }

    async fn upsert_vuln(&self, vuln: Vuln) -> Result<Vuln, SpectraError> {
        if !spectra_core::is_valid_cve_id(&vuln.cve_id) {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("not a valid CVE id: {}", vuln.cve_id),
            ));
        }
        let id = ids::vuln_id(&vuln.cve_id);
        self.tables.write().await.vulns.insert(id, vuln.clone());
        Ok(vuln)
    }

    async fn upsert_vuln_doc(&self, doc: VulnDoc) -> Result<VulnDoc, SpectraError> {
        if !spectra_core::is_valid_cve_id(&doc.cve_id) {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("not a valid CVE id: {}", doc.cve_id),
            ));
        }
        let id = ids::vuln_doc_id(&doc.cve_id);
        self.tables.write().await.vuln_docs.insert(id, doc.clone());
        Ok(doc)
    }

    async fn get_vuln_doc(&self, cve_id: &str) -> Result<Option<VulnDoc>, SpectraError> {
        let id = ids::vuln_doc_id(cve_id);
        Ok(self.tables.read().await.vuln_docs.get(&id).cloned())
    }

    async fn upsert_asn(&self, asn: Asn) -> Result<Asn, SpectraError> {
        let id = ids::asn_id(asn.number);
        self.tables.write().await.asns.insert(id, asn.clone());
        Ok(asn)
    }

    async fn upsert_country(&self, country: Country) -> Result<Country, SpectraError> {
        let id = ids::country_id(&country.cc);
        self.tables.write().await.countries.insert(id, country.clone());
        Ok(country)
    }

    async fn upsert_region(&self, region: Region) -> Result<Region, SpectraError> {
        let id = ids::region_id(&region.name, &region.country_cc);
        self.tables.write().await.regions.insert(id, region.clone());
        Ok(region)
    }

    async fn upsert_city(&self, city: City) -> Result<City, SpectraError> {
        let id = ids::city_id(&city.name, &city.country_cc);
        self.tables.write().await.cities.insert(id, city.clone());
        Ok(city)
    }

    async fn upsert_cloud_region(&self, region: CloudRegion) -> Result<CloudRegion, SpectraError> {
        let id = ids::cloud_region_id(&region.tag);
        self.tables.write().await.cloud_regions.insert(id, region.clone());
        Ok(region)
    }

    async fn upsert_common_port(&self, port: CommonPort) -> Result<CommonPort, SpectraError> {
        let id = ids::common_port_id(port.number, port.protocol);
        self.tables.write().await.common_ports.insert(id, port.clone());
        Ok(port)
    }

    async fn relate_once(&self, edge: Edge) -> Result<(), SpectraError> {
        let mut tables = self.tables.write().await;
        let key = (edge.from.clone(), edge.edge_type, edge.to.clone());
        tables.edges.entry(key).or_insert(edge);
        Ok(())
    }

    async fn query_host(&self, host_ip: &str, depth: u8) -> Result<Option<HostView>, SpectraError> {
        let tables = self.tables.read().await;
        let host_record_id = ids::host_id(host_ip);
        let Some(host) = tables.hosts.get(&host_record_id) else {
            return Ok(None);
        };

        let mut view = HostView {
            host: host.clone(),
            ports: None,
            city_detail: None,
            asn_detail: None,
        };

        if depth >= 1 {
            let mut ports = Vec::new();
            for edge in tables.edges.values() {
                if edge.edge_type == EdgeType::Has && edge.from == host_record_id {
                    if let Some(port) = tables.ports.get(&edge.to) {
                        let services = if depth >= 2 {
                            Some(collect_services(&tables, &edge.to, depth))
                        } else {
                            None
                        };
                        ports.push(PortView {
                            port: port.clone(),
                            services,
                        });
                    }
                }
            }
            view.ports = Some(ports);
        }

        if depth >= 4 {
            if let Some(city_name) = &host.city {
                let cc = host.country.clone().unwrap_or_default();
                view.city_detail = tables.cities.get(&ids::city_id(city_name, &cc)).cloned();
            }
            if let Some(asn) = host.asn {
                view.asn_detail = tables.asns.get(&ids::asn_id(asn)).cloned();
            }
        }

        Ok(Some(view))
    }

    async fn graph_query(
        &self,
        query: &GraphQueryType,
        limit: u32,
        offset: u32,
    ) -> Result<HostResultPage, SpectraError> {
        let tables = self.tables.read().await;
        let mut matches: Vec<Host> = match query {
            GraphQueryType::ByAsn { asn } => tables
                .hosts
                .values()
                .filter(|h| h.asn == Some(*asn))
                .cloned()
                .collect(),
            GraphQueryType::ByLocation {
                city,
                region,
                country,
            } => tables
                .hosts
                .values()
                .filter(|h| {
                    city.as_ref().is_some_and(|c| h.city.as_deref() == Some(c.as_str()))
                        || region
                            .as_ref()
                            .is_some_and(|r| h.region.as_deref() == Some(r.as_str()))
                        || country
                            .as_ref()
                            .is_some_and(|c| h.country.as_deref() == Some(c.as_str()))
                })
                .cloned()
                .collect(),
            GraphQueryType::ByVuln { cve } => {
                let vuln_record = ids::vuln_id(cve);
                let service_ids: Vec<&String> = tables
                    .edges
                    .values()
                    .filter(|e| e.edge_type == EdgeType::AffectedBy && e.to == vuln_record)
                    .map(|e| &e.from)
                    .collect();
                hosts_running_services(&tables, &service_ids)
            }
            GraphQueryType::ByService { product, service } => {
                let service_ids: Vec<String> = tables
                    .services
                    .iter()
                    .filter(|(_, s)| {
                        product
                            .as_ref()
                            .is_some_and(|p| s.product.as_deref() == Some(p.as_str()))
                            || service
                                .as_ref()
                                .is_some_and(|n| s.name.as_deref() == Some(n.as_str()))
                    })
                    .map(|(id, _)| id.clone())
                    .collect();
                let refs: Vec<&String> = service_ids.iter().collect();
                hosts_running_services(&tables, &refs)
            }
        };

        matches.sort_by(|a, b| a.ip.cmp(&b.ip));
        matches.dedup_by(|a, b| a.ip == b.ip);

        let total = matches.len() as u64;
        let start = offset.min(matches.len() as u32) as usize;
        let end = (start + limit as usize).min(matches.len());
        let page = &matches[start..end];
        let has_more = (end as u64) < total;

        Ok(HostResultPage {
            results: page.iter().map(|h| HostResult { host: h.clone() }).collect(),
            pagination: Pagination {
                limit,
                offset,
                total,
                has_more,
                next_offset: has_more.then_some(offset + limit),
            },
        })
    }

    async fn vector_search(
        &self,
        embedding: &[f64],
        limit: u32,
        min_score: f32,
    ) -> Result<Vec<VulnResult>, SpectraError> {
        let tables = self.tables.read().await;
        let mut scored: Vec<(f64, &VulnDoc)> = tables
            .vuln_docs
            .values()
            .map(|doc| (cosine_similarity(embedding, &doc.embedding), doc))
            .filter(|(score, _)| *score >= f64::from(min_score))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cve_id.cmp(&b.1.cve_id))
        });
        scored.truncate(limit as usize);

        Ok(scored
            .into_iter()
            .map(|(score, doc)| {
                let cvss = tables
                    .vulns
                    .get(&ids::vuln_id(&doc.cve_id))
                    .map_or(0.0, |v| v.cvss);
                VulnResult {
                    cve_id: doc.cve_id.clone(),
                    title: doc.title.clone(),
                    summary: doc.summary.clone(),
                    cvss,
                    cpe: doc.cpe.clone(),
                    published_date: doc.published_date,
                    score,
                }
            })
            .collect())
    }
}

fn collect_services(tables: &Tables, port_record_id: &str, depth: u8) -> Vec<ServiceView> {
    let mut out = Vec::new();
    for edge in tables.edges.values() {
        if edge.edge_type == EdgeType::Runs && edge.from == port_record_id {
            if let Some(service) = tables.services.get(&edge.to) {
                let vulns = if depth >= 3 {
                    Some(collect_vulns(tables, &edge.to))
                } else {
                    None
                };
                out.push(ServiceView {
                    service: service.clone(),
                    vulns,
                });
            }
        }
    }
    out
}

fn collect_vulns(tables: &Tables, service_record_id: &str) -> Vec<Vuln> {
    tables
        .edges
        .values()
        .filter(|e| e.edge_type == EdgeType::AffectedBy && e.from == service_record_id)
        .filter_map(|e| tables.vulns.get(&e.to).cloned())
        .collect()
}

fn hosts_running_services(tables: &Tables, service_record_ids: &[&String]) -> Vec<Host> {
    if service_record_ids.is_empty() {
        return Vec::new();
    }
    let port_ids: Vec<&String> = tables
        .edges
        .values()
        .filter(|e| e.edge_type == EdgeType::Runs && service_record_ids.contains(&&e.to))
        .map(|e| &e.from)
        .collect();
    tables
        .edges
        .values()
        .filter(|e| e.edge_type == EdgeType::Has && port_ids.contains(&&e.to))
        .filter_map(|e| tables.hosts.get(&e.from).cloned())
        .collect()
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
