// SPDX-License-Identifier: MIT OR Apache-2.0
//! Ingest workflow (§4.9): turns one signed scan submission into graph
//! upserts and fans enrichment out to the ASN, GeoIP, and CPE workflows.

use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use spectra_core::{Edge, EdgeType, Host, Port, Protocol, Service, Transport};
use spectra_error::{ErrorCode, SpectraError};
use spectra_jobstore::JobStore;
use spectra_runtime::{WorkflowContext, WorkflowError};
use spectra_store::GraphStore;
use uuid::Uuid;

/// One host submitted in a scan, with its observed open ports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHost {
    /// Host IP address.
    pub ip: String,
    /// Ports observed on this host.
    pub ports: Vec<ScanPort>,
}

/// One port observation within a [`ScanHost`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPort {
    /// Port number.
    pub number: u16,
    /// `"tcp"` or `"udp"`.
    pub protocol: String,
    /// Observed state, e.g. `"open"`. Only `"open"` ports are upserted.
    pub state: String,
    /// Fingerprinted service, if the scanner identified one (§9 resolution:
    /// this is the point at which service identity enters the graph).
    pub service: Option<ScanService>,
}

/// A service fingerprint attached to a [`ScanPort`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanService {
    /// Banner-derived service name, e.g. `"nginx"`.
    pub name: Option<String>,
    /// Product name, if known.
    pub product: Option<String>,
    /// Version string, if known.
    pub version: Option<String>,
    /// CPE identifiers already known for this service.
    #[serde(default)]
    pub cpe: Vec<String>,
    /// Raw banner text, if captured.
    pub banner: Option<String>,
}

/// The scan payload carried by one ingest invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanData {
    /// Hosts observed in this scan.
    pub hosts: Vec<ScanHost>,
}

/// Input to the ingest workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestInput {
    /// Job id created by the ingest API before dispatch.
    pub job_id: Uuid,
    /// Scanner identity that submitted the envelope.
    pub scanner_key: String,
    /// The scan payload.
    pub scan_data: ScanData,
}

/// Result of a completed ingest invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestOutput {
    /// The job this invocation processed.
    pub job_id: Uuid,
    /// Distinct hosts upserted.
    pub host_count: u64,
    /// Open ports upserted.
    pub port_count: u64,
}

/// A service newly surfaced by this ingest, forwarded to CPE enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    /// Record id of the upserted service.
    pub id: String,
    /// Banner-derived name.
    pub name: Option<String>,
    /// Product name.
    pub product: Option<String>,
    /// Version string.
    pub version: Option<String>,
    /// Raw banner, if captured.
    pub banner: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IngestCounts {
    host_count: u64,
    port_count: u64,
    ips: Vec<String>,
    new_services: Vec<NewService>,
}

fn validation_error(message: impl Into<String>) -> WorkflowError {
    WorkflowError::terminal(SpectraError::new(ErrorCode::InvalidParameter, message))
}

/// Structural validation of a scan payload (§4.9 step 2). Semantic
/// failures here are terminal — the runtime must not retry a payload that
/// can never parse.
fn validate(scan_data: &ScanData) -> Result<(), WorkflowError> {
    if scan_data.hosts.is_empty() {
        return Err(validation_error("scan_data.hosts must not be empty"));
    }
    for host in &scan_data.hosts {
        if IpAddr::from_str(&host.ip).is_err() {
            return Err(validation_error(format!("invalid host ip: {}", host.ip)));
        }
        for port in &host.ports {
            if port.number == 0 {
                return Err(validation_error(format!(
                    "invalid port number on host {}: {}",
                    host.ip, port.number
                )));
            }
            if !matches!(port.protocol.as_str(), "tcp" | "udp") {
                return Err(validation_error(format!(
                    "unknown protocol on host {}:{}: {}",
                    host.ip, port.number, port.protocol
                )));
            }
        }
    }
    Ok(())
}

fn parse_protocol(raw: &str) -> Protocol {
    match raw {
        "udp" => Protocol::Udp,
        _ => Protocol::Tcp,
    }
}

/// Run the ingest workflow to completion for one invocation.
///
/// # Errors
/// Returns a [`WorkflowError`] if validation fails (terminal, with the job
/// marked failed) or if a job-store/graph-store call fails.
pub async fn run(
    ctx: &WorkflowContext,
    input: IngestInput,
    jobs: Arc<dyn JobStore>,
    store: Arc<dyn GraphStore>,
) -> Result<IngestOutput, WorkflowError> {
    let job_id = input.job_id;

    // Step 1: pending -> processing.
    {
        let jobs = Arc::clone(&jobs);
        ctx.run("transition-processing", || async move {
            jobs.transition(job_id, spectra_core::JobState::Processing)
                .await
                .map_err(WorkflowError::retriable)
        })
        .await?;
    }

    // Step 2: parse/validate. A semantic failure here fails the job and
    // stops retrying.
    if let Err(err) = validate(&input.scan_data) {
        let message = err.into_inner().to_string();
        jobs.set_error(job_id, &message)
            .await
            .map_err(WorkflowError::retriable)?;
        return Err(validation_error(message));
    }

    // Step 3: upsert hosts/ports/services and accumulate counts.
    let counts = {
        let store = Arc::clone(&store);
        let scan_data = input.scan_data.clone();
        ctx.run("ingest-hosts", || async move { ingest_hosts(&store, scan_data).await })
            .await?
    };

    jobs.set_counts(job_id, counts.host_count, counts.port_count)
        .await
        .map_err(WorkflowError::retriable)?;

    // Step 4: fan enrichment out via one-way dispatch, breaking the cycle
    // that a request/response call between keyed workflows would create
    // (§9: "enrichment dispatches from the ingest workflow use one-way
    // messages to break cycles").
    ctx.send_one_way(
        "asn-enrichment",
        "enrich",
        serde_json::json!({ "ips": counts.ips, "job_id": job_id }),
        None,
    );
    ctx.send_one_way(
        "geoip-enrichment",
        "enrich",
        serde_json::json!({ "ips": counts.ips }),
        None,
    );
    if !counts.new_services.is_empty() {
        ctx.send_one_way(
            "cpe-enrichment",
            "enrich",
            serde_json::json!({ "services": counts.new_services, "batch_id": job_id }),
            None,
        );
    }

    // Step 5: processing -> completed.
    let job = ctx
        .run("transition-completed", || {
            let jobs = Arc::clone(&jobs);
            async move {
                jobs.transition(job_id, spectra_core::JobState::Completed)
                    .await
                    .map_err(WorkflowError::retriable)
            }
        })
        .await?;

    tracing::info!(
        target: "spectra.workflow",
        workflow = "ingest",
        job_id = %job_id,
        host_count = counts.host_count,
        port_count = counts.port_count,
        "ingest completed"
    );

    Ok(IngestOutput {
        job_id: job.id,
        host_count: counts.host_count,
        port_count: counts.port_count,
    })
}

async fn ingest_hosts(
    store: &Arc<dyn GraphStore>,
    scan_data: ScanData,
) -> Result<IngestCounts, WorkflowError> {
    let mut host_count = 0u64;
    let mut port_count = 0u64;
    let mut ips = Vec::new();
    let mut new_services = Vec::new();
    let now = Utc::now();

    for scan_host in scan_data.hosts {
        let host = Host {
            ip: scan_host.ip.clone(),
            asn: None,
            city: None,
            region: None,
            country: None,
            cloud_region: None,
            first_seen: now,
            last_seen: now,
            last_scanned_at: now,
        };
        let upserted_host = store
            .upsert_host(host)
            .await
            .map_err(WorkflowError::retriable)?;
        host_count += 1;
        ips.push(upserted_host.ip.clone());
        let host_id = spectra_store::ids::host_id(&upserted_host.ip);

        for scan_port in scan_host.ports {
            if scan_port.state != "open" {
                continue;
            }
            let protocol = parse_protocol(&scan_port.protocol);
            let port = Port {
                host: upserted_host.ip.clone(),
                number: scan_port.number,
                protocol,
                transport: Transport::Plain,
                first_seen: now,
                last_seen: now,
            };
            store.upsert_port(port).await.map_err(WorkflowError::retriable)?;
            port_count += 1;
            let port_id = spectra_store::ids::port_id(&upserted_host.ip, scan_port.number, protocol);
            store
                .relate_once(Edge::new(host_id.clone(), EdgeType::Has, port_id.clone()))
                .await
                .map_err(WorkflowError::retriable)?;

            if let Some(svc) = scan_port.service {
                let fingerprint = spectra_core::service_fingerprint(
                    svc.name.as_deref(),
                    svc.product.as_deref(),
                    svc.version.as_deref(),
                    &svc.cpe,
                );
                let service = Service {
                    fingerprint: fingerprint.clone(),
                    name: svc.name.clone(),
                    product: svc.product.clone(),
                    version: svc.version.clone(),
                    cpe: svc.cpe.clone(),
                    confidence: 1.0,
                    first_seen: now,
                    last_seen: now,
                };
                store
                    .upsert_service(service)
                    .await
                    .map_err(WorkflowError::retriable)?;
                let service_id = spectra_store::ids::service_id(&fingerprint);
                store
                    .relate_once(Edge::new(port_id, EdgeType::Runs, service_id.clone()))
                    .await
                    .map_err(WorkflowError::retriable)?;
                new_services.push(NewService {
                    id: service_id,
                    name: svc.name,
                    product: svc.product,
                    version: svc.version,
                    banner: svc.banner,
                });
            }
        }
    }

    ips.sort();
    ips.dedup();

    Ok(IngestCounts {
        host_count,
        port_count,
        ips,
        new_services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectra_jobstore::InMemoryJobStore;
    use spectra_runtime::{InMemoryJournal, MessageBus, StateStore};
    use spectra_store::InMemoryGraphStore;

    fn ctx(invocation_id: &str) -> WorkflowContext {
        WorkflowContext::new(
            invocation_id,
            invocation_id,
            Arc::new(InMemoryJournal::new()),
            StateStore::new(),
            Arc::new(MessageBus::new()),
        )
    }

    fn sample_input(job_id: Uuid) -> IngestInput {
        IngestInput {
            job_id,
            scanner_key: "scanner-a".to_string(),
            scan_data: ScanData {
                hosts: vec![ScanHost {
                    ip: "8.8.8.8".to_string(),
                    ports: vec![
                        ScanPort {
                            number: 443,
                            protocol: "tcp".to_string(),
                            state: "open".to_string(),
                            service: Some(ScanService {
                                name: Some("nginx".to_string()),
                                product: Some("nginx".to_string()),
                                version: Some("1.18.0".to_string()),
                                cpe: vec![],
                                banner: Some("nginx/1.18.0".to_string()),
                            }),
                        },
                        ScanPort {
                            number: 8080,
                            protocol: "tcp".to_string(),
                            state: "closed".to_string(),
                            service: None,
                        },
                    ],
                }],
            },
        }
    }

    #[tokio::test]
    async fn ingest_upserts_and_completes_job() {
        let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let job = jobs.create("scanner-a").await.unwrap();
        let input = sample_input(job.id);
        let context = ctx(&job.id.to_string());

        let output = run(&context, input, Arc::clone(&jobs), Arc::clone(&store))
            .await
            .unwrap();

        assert_eq!(output.host_count, 1);
        assert_eq!(output.port_count, 1, "only the open port is counted");

        let final_job = jobs.get(job.id).await.unwrap();
        assert_eq!(final_job.state, spectra_core::JobState::Completed);
        assert_eq!(final_job.host_count, 1);

        let view = store.query_host("8.8.8.8", 2).await.unwrap().unwrap();
        let ports = view.ports.expect("depth 2 includes ports");
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].port.number, 443);
    }

    #[tokio::test]
    async fn invalid_host_ip_fails_job_with_terminal_error() {
        let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let job = jobs.create("scanner-a").await.unwrap();
        let mut input = sample_input(job.id);
        input.scan_data.hosts[0].ip = "not-an-ip".to_string();
        let context = ctx(&job.id.to_string());

        let err = run(&context, input, Arc::clone(&jobs), store).await.unwrap_err();
        assert!(err.is_terminal());

        let final_job = jobs.get(job.id).await.unwrap();
        assert_eq!(final_job.state, spectra_core::JobState::Failed);
    }

    #[tokio::test]
    async fn new_service_is_dispatched_to_cpe_enrichment() {
        let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let job = jobs.create("scanner-a").await.unwrap();
        let input = sample_input(job.id);
        let bus = Arc::new(MessageBus::new());
        let mut sub = bus.subscribe();
        let context = WorkflowContext::new(
            job.id.to_string(),
            job.id.to_string(),
            Arc::new(InMemoryJournal::new()),
            StateStore::new(),
            Arc::clone(&bus),
        );

        run(&context, input, jobs, store).await.unwrap();

        let dispatch = sub.recv_for("cpe-enrichment").await.unwrap();
        let payload = dispatch.payload.as_object().unwrap();
        assert_eq!(payload["services"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rerunning_ingest_with_same_invocation_id_does_not_double_count() {
        let jobs: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let job = jobs.create("scanner-a").await.unwrap();
        let input = sample_input(job.id);
        let journal = Arc::new(InMemoryJournal::new());
        let context = WorkflowContext::new(
            job.id.to_string(),
            job.id.to_string(),
            Arc::clone(&journal) as Arc<dyn spectra_runtime::Journal>,
            StateStore::new(),
            Arc::new(MessageBus::new()),
        );

        run(&context, input.clone(), Arc::clone(&jobs), Arc::clone(&store))
            .await
            .unwrap();
        // Replaying the same invocation id must not error even though the
        // job is already `Completed` (a second literal `transition` call
        // would fail `InvalidTransition`).
        let second = run(&context, input, jobs, store).await.unwrap();
        assert_eq!(second.host_count, 1);
    }
}
