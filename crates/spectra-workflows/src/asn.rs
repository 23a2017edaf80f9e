// SPDX-License-Identifier: MIT OR Apache-2.0
//! ASN enrichment workflow (§4.10): resolves a batch of IPs to their
//! announcing Autonomous System and stamps the result onto each host.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spectra_adapters::AsnAdapter;
use spectra_core::{Asn, Edge, EdgeType, Host};
use spectra_error::{ErrorCode, SpectraError};
use spectra_runtime::{WorkflowContext, WorkflowError};
use spectra_store::GraphStore;

/// Input to the ASN enrichment workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsnInput {
    /// IP addresses to resolve, at most 100 per invocation (§4.10).
    pub ips: Vec<String>,
    /// Re-resolve even if `host.asn` is already set.
    #[serde(default)]
    pub force_refresh: bool,
    /// Originating ingest job, if any, for correlation.
    pub job_id: Option<String>,
}

/// One resolved ASN assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AsnData {
    /// The host IP this ASN applies to.
    pub ip: String,
    /// Autonomous System Number.
    pub asn: u32,
    /// Registrant organization.
    pub org: String,
    /// Registrant country code.
    pub country: String,
}

/// Result of one ASN enrichment invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AsnOutput {
    /// Total IPs requested.
    pub total_ips: u64,
    /// IPs successfully enriched this invocation.
    pub enriched_ips: u64,
    /// IPs that already carried an ASN and were skipped (not `force_refresh`).
    pub cached_ips: u64,
    /// Count of IPs that could not be resolved.
    pub failed_ips: u64,
    /// The IPs that could not be resolved.
    pub failed_ips_list: Vec<String>,
    /// The resolved assignments.
    pub asn_data: Vec<AsnData>,
}

const MAX_IPS: usize = 100;

fn too_many_ips(count: usize) -> WorkflowError {
    WorkflowError::terminal(
        SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("asn enrichment accepts at most {MAX_IPS} ips, got {count}"),
        )
        .with_context("count", count),
    )
}

/// Run the ASN enrichment workflow to completion for one invocation.
///
/// # Errors
/// Returns a terminal [`WorkflowError`] if more than [`MAX_IPS`] addresses
/// are requested, or a retriable one if the graph store fails.
pub async fn run(
    ctx: &WorkflowContext,
    input: AsnInput,
    adapter: Arc<AsnAdapter>,
    store: Arc<dyn GraphStore>,
) -> Result<AsnOutput, WorkflowError> {
    if input.ips.len() > MAX_IPS {
        return Err(too_many_ips(input.ips.len()));
    }
    let total_ips = input.ips.len() as u64;

    // Step 1: filter out IPs that already carry an ASN, unless forced.
    let to_resolve = {
        let store = Arc::clone(&store);
        let ips = input.ips.clone();
        let force_refresh = input.force_refresh;
        ctx.run("filter", || async move {
            let mut pending = Vec::new();
            for ip in ips {
                let already_known = !force_refresh
                    && store
                        .query_host(&ip, 0)
                        .await
                        .map_err(WorkflowError::retriable)?
                        .is_some_and(|h| h.host.asn.is_some());
                if !already_known {
                    pending.push(ip);
                }
            }
            Ok::<_, WorkflowError>(pending)
        })
        .await?
    };
    let cached_ips = total_ips - to_resolve.len() as u64;

    // Step 2: one batched adapter call. Cache hits inside the adapter
    // bypass the remote call transparently.
    let lookup = {
        let adapter = Arc::clone(&adapter);
        let ips = to_resolve.clone();
        ctx.run("lookup", || async move { Ok::<_, WorkflowError>(adapter.lookup(&ips).await) })
            .await?
    };

    // Step 3: persist each resolution.
    let asn_data = {
        let store = Arc::clone(&store);
        let found = lookup.found.clone();
        ctx.run("persist", || async move {
            let mut persisted = Vec::new();
            for (ip, asn) in found {
                persist_one(&store, &ip, &asn).await?;
                persisted.push(AsnData {
                    ip,
                    asn: asn.number,
                    org: asn.org,
                    country: asn.country,
                });
            }
            persisted.sort_by(|a, b| a.ip.cmp(&b.ip));
            Ok::<_, WorkflowError>(persisted)
        })
        .await?
    };

    tracing::info!(
        target: "spectra.workflow",
        workflow = "asn-enrichment",
        job_id = ?input.job_id,
        enriched = asn_data.len(),
        failed = lookup.failed.len(),
        "asn enrichment completed"
    );

    Ok(AsnOutput {
        total_ips,
        enriched_ips: asn_data.len() as u64,
        cached_ips,
        failed_ips: lookup.failed.len() as u64,
        failed_ips_list: lookup.failed,
        asn_data,
    })
}

async fn persist_one(store: &Arc<dyn GraphStore>, ip: &str, asn: &Asn) -> Result<(), WorkflowError> {
    let host = Host {
        ip: ip.to_string(),
        asn: Some(asn.number),
        city: None,
        region: None,
        country: Some(asn.country.clone()),
        cloud_region: None,
        first_seen: chrono::Utc::now(),
        last_seen: chrono::Utc::now(),
        last_scanned_at: chrono::Utc::now(),
    };
    store.upsert_host(host).await.map_err(WorkflowError::retriable)?;
    store
        .upsert_asn(asn.clone())
        .await
        .map_err(WorkflowError::retriable)?;
    let host_id = spectra_store::ids::host_id(ip);
    let asn_id = spectra_store::ids::asn_id(asn.number);
    store
        .relate_once(Edge::new(host_id, EdgeType::InAsn, asn_id))
        .await
        .map_err(WorkflowError::retriable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectra_runtime::{InMemoryJournal, MessageBus, StateStore};
    use spectra_store::InMemoryGraphStore;

    fn ctx() -> WorkflowContext {
        WorkflowContext::new(
            "asn-1",
            "asn-1",
            Arc::new(InMemoryJournal::new()),
            StateStore::new(),
            Arc::new(MessageBus::new()),
        )
    }

    #[tokio::test]
    async fn too_many_ips_is_terminal() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let adapter = Arc::new(AsnAdapter::new("http://127.0.0.1:1"));
        let input = AsnInput {
            ips: (0..101).map(|i| format!("10.0.0.{}", i % 255)).collect(),
            force_refresh: false,
            job_id: None,
        };
        let err = run(&ctx(), input, adapter, store).await.unwrap_err();
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn unreachable_adapter_reports_all_ips_failed_not_error() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let adapter = Arc::new(AsnAdapter::new("http://127.0.0.1:1"));
        let input = AsnInput {
            ips: vec!["8.8.8.8".to_string()],
            force_refresh: false,
            job_id: None,
        };
        let output = run(&ctx(), input, adapter, store).await.unwrap();
        assert_eq!(output.total_ips, 1);
        assert_eq!(output.enriched_ips, 0);
        assert_eq!(output.failed_ips, 1);
        assert_eq!(output.failed_ips_list, vec!["8.8.8.8".to_string()]);
    }

    #[tokio::test]
    async fn invalid_ip_lands_in_failed_not_workflow_error() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let adapter = Arc::new(AsnAdapter::new("http://127.0.0.1:1"));
        let input = AsnInput {
            ips: vec!["not-an-ip".to_string()],
            force_refresh: false,
            job_id: None,
        };
        let output = run(&ctx(), input, adapter, store).await.unwrap();
        assert_eq!(output.failed_ips_list, vec!["not-an-ip".to_string()]);
    }
}
