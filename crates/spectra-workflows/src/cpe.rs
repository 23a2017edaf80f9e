// SPDX-License-Identifier: MIT OR Apache-2.0
//! CPE enrichment workflow (§4.12): derives CPE strings for newly-observed
//! services, queries the CVE adapter, and upserts the resulting
//! vulnerabilities.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spectra_adapters::{CveAdapter, EmbeddingAdapter};
use spectra_core::{Edge, EdgeType, Severity, Vuln};
use spectra_runtime::{WorkflowContext, WorkflowError};
use spectra_store::GraphStore;

use crate::vulndoc;

/// One service awaiting CPE derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Record id of the service node.
    pub id: String,
    /// Banner-derived name.
    pub name: Option<String>,
    /// Product name, if known.
    pub product: Option<String>,
    /// Version string, if known.
    pub version: Option<String>,
    /// Raw banner text, parsed when `product`/`version` are absent.
    pub banner: Option<String>,
}

/// Input to the CPE enrichment workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpeInput {
    /// Services to derive CPEs and vulnerabilities for.
    pub services: Vec<ServiceInfo>,
    /// Caller-supplied batch identifier, echoed back in the result.
    pub batch_id: Option<String>,
}

/// Result of one CPE enrichment invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpeOutput {
    /// Echoed batch id.
    pub batch_id: Option<String>,
    /// Number of services considered.
    pub services_processed: u64,
    /// Number of CPE strings successfully generated.
    pub cpes_generated: u64,
    /// Number of distinct vulnerabilities found across all services.
    pub vulns_found: u64,
    /// Number of `AFFECTED_BY` edges created.
    pub relationships_created: u64,
}

/// A `(vendor, product, version)` entry the banner pattern table matched.
struct BannerMatch {
    vendor: &'static str,
    product: &'static str,
    version: String,
}

/// Deterministic CPE derivation for one service (§4.12 step 1).
///
/// Prefers structured `product`/`version`; falls back to parsing `banner`
/// against a data-driven table of well-known server strings. Returns
/// `None` if neither yields a match — not an error, since many services
/// simply carry no identifiable product.
#[must_use]
pub fn generate_cpe(service: &ServiceInfo) -> Option<String> {
    if let (Some(product), Some(version)) = (&service.product, &service.version) {
        let vendor = product.to_lowercase();
        let product = product.to_lowercase();
        return Some(format!(
            "cpe:2.3:a:{vendor}:{product}:{version}:*:*:*:*:*:*:*"
        ));
    }

    let banner = service.banner.as_deref()?;
    let matched = match_banner(banner)?;
    Some(format!(
        "cpe:2.3:a:{}:{}:{}:*:*:*:*:*:*:*",
        matched.vendor, matched.product, matched.version
    ))
}

/// Banner pattern table (§4.12 step 1): `(prefix, vendor, product)`. The
/// version is whatever follows the prefix up to the next whitespace.
/// Extend this table as new banner formats are observed.
const BANNER_PATTERNS: &[(&str, &str, &str)] = &[
    ("nginx/", "f5", "nginx"),
    ("Apache/", "apache", "http_server"),
    ("OpenSSH_", "openbsd", "openssh"),
    ("PostgreSQL ", "postgresql", "postgresql"),
    ("Redis server v=", "redislabs", "redis"),
    ("MySQL/", "mysql", "mysql"),
];

fn match_banner(banner: &str) -> Option<BannerMatch> {
    for (prefix, vendor, product) in BANNER_PATTERNS {
        if let Some(rest) = banner.strip_prefix(prefix) {
            let version = rest.split_whitespace().next().unwrap_or("").trim();
            if version.is_empty() {
                continue;
            }
            return Some(BannerMatch {
                vendor,
                product,
                version: version.to_string(),
            });
        }
    }
    None
}

/// Run the CPE enrichment workflow to completion for one invocation.
///
/// # Errors
/// Returns a [`WorkflowError`] if the graph store fails; a CVE-adapter
/// failure for one CPE is absorbed (no vulnerabilities reported for it),
/// matching §4.7's "transient errors surface as retriable; semantic errors
/// are terminal at the caller's discretion" applied per-item rather than
/// failing the whole batch.
pub async fn run(
    ctx: &WorkflowContext,
    input: CpeInput,
    cve_adapter: Arc<CveAdapter>,
    embedder: Option<Arc<EmbeddingAdapter>>,
    store: Arc<dyn GraphStore>,
) -> Result<CpeOutput, WorkflowError> {
    let services_processed = input.services.len() as u64;
    let mut cpes_generated = 0u64;
    let mut vulns_found = 0u64;
    let mut relationships_created = 0u64;

    // Step 1: derive CPEs for every service. Pure and deterministic, so no
    // `run` wrapper is needed.
    let mut with_cpe: Vec<(ServiceInfo, String)> = Vec::new();
    for service in input.services {
        if let Some(cpe) = generate_cpe(&service) {
            cpes_generated += 1;
            with_cpe.push((service, cpe));
        }
    }

    if with_cpe.is_empty() {
        return Ok(CpeOutput {
            batch_id: input.batch_id,
            services_processed,
            cpes_generated: 0,
            vulns_found: 0,
            relationships_created: 0,
        });
    }

    // Step 2: batch-query the CVE adapter, honoring its rate limit via
    // `run` (so a retried invocation does not re-issue the call).
    let cpes: Vec<String> = with_cpe.iter().map(|(_, cpe)| cpe.clone()).collect();
    let lookup = ctx
        .run("cve-lookup", || {
            let cve_adapter = Arc::clone(&cve_adapter);
            let cpes = cpes.clone();
            async move { Ok::<_, WorkflowError>(cve_adapter.lookup(&cpes).await) }
        })
        .await?;

    // Step 3: upsert vulnerabilities and relate them to the originating
    // service.
    for (service, cpe) in &with_cpe {
        let Some(records) = lookup.found.get(cpe) else {
            continue;
        };
        for record in records {
            let severity = Severity::from_cvss(record.cvss);
            let vuln = Vuln {
                cve_id: record.cve_id.clone(),
                cvss: record.cvss,
                severity,
                kev_flag: record.kev_flag,
                confidence: 1.0,
            };
            store.upsert_vuln(vuln).await.map_err(WorkflowError::retriable)?;
            vulns_found += 1;

            if !record.summary.is_empty() {
                vulndoc::index(ctx, &store, embedder.as_ref(), record).await?;
            }

            let vuln_id = spectra_store::ids::vuln_id(&record.cve_id);
            store
                .relate_once(
                    Edge::new(service.id.clone(), EdgeType::AffectedBy, vuln_id)
                        .with_attr("confidence", 1.0)
                        .with_attr("source", "cpe-match"),
                )
                .await
                .map_err(WorkflowError::retriable)?;
            relationships_created += 1;
        }
    }

    tracing::info!(
        target: "spectra.workflow",
        workflow = "cpe-enrichment",
        batch_id = ?input.batch_id,
        cpes_generated,
        vulns_found,
        "cpe enrichment completed"
    );

    Ok(CpeOutput {
        batch_id: input.batch_id,
        services_processed,
        cpes_generated,
        vulns_found,
        relationships_created,
    })
}
