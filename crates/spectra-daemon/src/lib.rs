// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! HTTP control plane for Spectra-Red (§4.5, §4.6): signed ingest, job
//! status, and the hybrid graph/vector query surface.
//!
//! `build_app` wires handlers over an [`AppState`] holding the job store,
//! graph+vector store, rate limiters, external adapters, and the
//! in-process durable-runtime bindings the ingest/enrichment workflows run
//! against. `spawn_enrichment_listeners` starts the background tasks that
//! turn the ingest workflow's one-way dispatches (§9) into actual ASN/
//! GeoIP/CPE workflow invocations — the closest this in-process binding
//! comes to the durable-runtime's own dispatcher (§6).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use spectra_adapters::{AsnAdapter, CveAdapter, EmbeddingAdapter, GeoIpAdapter};
use spectra_envelope::Envelope;
use spectra_error::{ErrorCode, SpectraError};
use spectra_jobstore::JobStore;
use spectra_ratelimit::RateLimiter;
use spectra_runtime::{InMemoryJournal, Journal, MessageBus, StateStore, WorkflowContext};
use spectra_store::GraphStore;
use tracing::{error, warn};
use uuid::Uuid;

pub mod api;
pub mod middleware;
pub mod validation;

use api::{
    GraphQueryPagination, GraphQueryRequest, GraphQueryResponse, HealthResponse,
    HostQueryParams, IngestAccepted, JobListQuery, JobListResponse, SimilarityHit,
    SimilarityQueryRequest, SimilarityQueryResponse,
};

/// Maximum ingest request body size (§4.5 step 1).
pub const MAX_INGEST_BODY_BYTES: usize = 10 * 1024 * 1024;
/// Similarity-query adapter timeout (§5).
pub const SIMILARITY_ADAPTER_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a handler needs to serve the ingest/query API.
#[derive(Clone)]
pub struct AppState {
    /// Job control-plane store (§4.3).
    pub jobs: Arc<dyn JobStore>,
    /// Graph+vector store adapter (§4.4).
    pub store: Arc<dyn GraphStore>,
    /// Ingest admission limiter, 60/min (§4.2).
    pub ingest_limiter: RateLimiter,
    /// Query admission limiter, 30/min (§4.2).
    pub query_limiter: RateLimiter,
    /// ASN lookup adapter (§4.7).
    pub asn_adapter: Arc<AsnAdapter>,
    /// GeoIP lookup adapter (§4.7).
    pub geoip_adapter: Arc<GeoIpAdapter>,
    /// CVE lookup adapter (§4.7).
    pub cve_adapter: Arc<CveAdapter>,
    /// Embedding adapter; absent disables `/v1/query/similar` (§6).
    pub embedding_adapter: Option<Arc<EmbeddingAdapter>>,
    /// Minimum cosine-similarity score applied by `VectorSearch` (§9 open question).
    pub similarity_min_score: f32,
    /// Shared journal backing every workflow invocation's `run` steps (§4.8).
    pub journal: Arc<dyn Journal>,
    /// Shared keyed state store backing `setState`/`getState` (§4.8).
    pub state: StateStore,
    /// Dispatch bus carrying one-way enrichment messages (§9).
    pub bus: Arc<MessageBus>,
}

impl AppState {
    /// Build a fresh `WorkflowContext` for one invocation, keyed by `key`
    /// for both journal replay and virtual-object state partitioning.
    fn workflow_context(&self, key: impl Into<String> + Clone) -> WorkflowContext {
        WorkflowContext::new(
            key.clone(),
            key,
            Arc::clone(&self.journal),
            self.state.clone(),
            Arc::clone(&self.bus),
        )
    }
}

/// Build the router. `build_app` itself does not bind a socket — that is
/// `main`'s job — so tests can exercise it with `tower::ServiceExt::oneshot`.
#[must_use]
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/mesh/ingest", post(ingest))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/jobs/{job_id}", get(get_job))
        .route("/v1/query/host/{ip}", get(query_host))
        .route("/v1/query/graph", post(query_graph))
        .route("/v1/query/similar", post(query_similar))
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(middleware::permissive_cors())
        .with_state(state)
}

/// Subscribe to the dispatch bus and run each enrichment workflow as its
/// one-way message arrives (§9: "enrichment dispatches from the ingest
/// workflow use one-way messages to break cycles"). Returns immediately;
/// the listeners run until the process exits.
pub fn spawn_enrichment_listeners(state: AppState) {
    spawn_asn_listener(state.clone());
    spawn_geoip_listener(state.clone());
    spawn_cpe_listener(state);
}

fn spawn_asn_listener(state: AppState) {
    tokio::spawn(async move {
        let mut sub = state.bus.subscribe();
        while let Some(dispatch) = sub.recv_for("asn-enrichment").await {
            let Ok(input) = serde_json::from_value::<spectra_workflows::AsnInput>(dispatch.payload)
            else {
                warn!(target: "spectra.daemon", "malformed asn-enrichment dispatch");
                continue;
            };
            let ctx = state.workflow_context(format!("asn:{}", Uuid::new_v4()));
            let adapter = Arc::clone(&state.asn_adapter);
            let store = Arc::clone(&state.store);
            if let Err(err) = spectra_workflows::asn::run(&ctx, input, adapter, store).await {
                error!(target: "spectra.daemon", error = %err, "asn enrichment failed");
            }
        }
    });
}

fn spawn_geoip_listener(state: AppState) {
    tokio::spawn(async move {
        let mut sub = state.bus.subscribe();
        while let Some(dispatch) = sub.recv_for("geoip-enrichment").await {
            let Ok(input) =
                serde_json::from_value::<spectra_workflows::GeoIpInput>(dispatch.payload)
            else {
                warn!(target: "spectra.daemon", "malformed geoip-enrichment dispatch");
                continue;
            };
            let ctx = state.workflow_context(format!("geoip:{}", Uuid::new_v4()));
            let adapter = Arc::clone(&state.geoip_adapter);
            let store = Arc::clone(&state.store);
            if let Err(err) = spectra_workflows::geoip::run(&ctx, input, adapter, store).await {
                error!(target: "spectra.daemon", error = %err, "geoip enrichment failed");
            }
        }
    });
}

fn spawn_cpe_listener(state: AppState) {
    tokio::spawn(async move {
        let mut sub = state.bus.subscribe();
        while let Some(dispatch) = sub.recv_for("cpe-enrichment").await {
            let Ok(input) = serde_json::from_value::<spectra_workflows::CpeInput>(dispatch.payload)
            else {
                warn!(target: "spectra.daemon", "malformed cpe-enrichment dispatch");
                continue;
            };
            let ctx = state.workflow_context(format!("cpe:{}", Uuid::new_v4()));
            let cve_adapter = Arc::clone(&state.cve_adapter);
            let embedder = state.embedding_adapter.clone();
            let store = Arc::clone(&state.store);
            if let Err(err) =
                spectra_workflows::cpe::run(&ctx, input, cve_adapter, embedder, store).await
            {
                error!(target: "spectra.daemon", error = %err, "cpe enrichment failed");
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Error response plumbing (§7)
// ---------------------------------------------------------------------------

/// Translate a domain error into its HTTP response, collapsing
/// non-discriminating codes (envelope reasons) via `public_code` (§4.5 step 3).
fn error_response(err: &SpectraError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let dto = err.to_dto();
    (status, Json(dto)).into_response()
}

fn bad_request(code: ErrorCode, message: impl Into<String>) -> Response {
    error_response(&SpectraError::new(code, message))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}

fn principal_key(headers: &HeaderMap, addr: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| addr.map(|a| a.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Apply a rate limiter to the caller's [`principal_key`], returning `Some`
/// 429 response (with `X-RateLimit-*` headers, §4.5 step 4) if exhausted.
async fn rate_limit_or_reject(
    limiter: &RateLimiter,
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Option<Response> {
    let key = principal_key(headers, connect_info.map(|c| c.0));
    if limiter.allow(&key).await {
        return None;
    }
    let mut response = error_response(&SpectraError::new(
        ErrorCode::RateLimited,
        "rate limit exceeded",
    ));
    let response_headers = response.headers_mut();
    response_headers.insert(
        "x-ratelimit-limit",
        HeaderValue::from_str(&limiter.capacity().to_string()).unwrap(),
    );
    response_headers.insert("x-ratelimit-window", HeaderValue::from_static("1m"));
    Some(response)
}

async fn ingest(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    if body.len() > MAX_INGEST_BODY_BYTES {
        return bad_request(ErrorCode::InvalidJson, "request body exceeds 10 MiB");
    }

    let envelope: Envelope = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(_) => return bad_request(ErrorCode::InvalidJson, "invalid envelope JSON"),
    };

    let now = Utc::now().timestamp();
    if let Err(err) = spectra_envelope::verify(&envelope, now) {
        return error_response(&err);
    }

    if let Some(resp) = rate_limit_or_reject(&state.ingest_limiter, &headers, connect_info).await {
        return resp;
    }

    let job = match state.jobs.create(&envelope.public_key).await {
        Ok(job) => job,
        Err(err) => return error_response(&err),
    };

    let job_id = job.id;
    let scanner_key = envelope.public_key.clone();
    let scan_data = envelope.data.clone();
    let jobs = Arc::clone(&state.jobs);
    let store = Arc::clone(&state.store);
    let ctx = state.workflow_context(job_id.to_string());

    tokio::spawn(async move {
        let parsed: Result<spectra_workflows::ScanData, _> = serde_json::from_slice(&scan_data);
        let scan_data = match parsed {
            Ok(s) => s,
            Err(e) => {
                if let Err(set_err) = jobs
                    .set_error(job_id, &format!("scan_data is not valid JSON: {e}"))
                    .await
                {
                    error!(target: "spectra.daemon", error = %set_err, "failed to mark job failed");
                }
                return;
            }
        };
        let input = spectra_workflows::IngestInput {
            job_id,
            scanner_key,
            scan_data,
        };
        if let Err(err) = spectra_workflows::ingest::run(&ctx, input, jobs, store).await {
            error!(target: "spectra.daemon", job_id = %job_id, error = %err, "ingest workflow failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(IngestAccepted {
            job_id,
            status: "accepted".to_string(),
            timestamp: job.created_at,
        }),
    )
        .into_response()
}

async fn list_jobs(State(state): State<AppState>, Query(query): Query<JobListQuery>) -> Response {
    let filter = match validation::validate_job_list_query(query) {
        Ok(f) => f,
        Err(err) => return error_response(&err),
    };
    match state.jobs.list(filter).await {
        Ok(page) => Json(JobListResponse {
            jobs: page.jobs,
            total: page.total,
            has_more: page.has_more,
            next_offset: page.next_offset,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn get_job(State(state): State<AppState>, Path(job_id): Path<Uuid>) -> Response {
    match state.jobs.get(job_id).await {
        Ok(job) => Json(job).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn query_host(
    State(state): State<AppState>,
    Path(ip): Path<String>,
    Query(params): Query<HostQueryParams>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    if let Some(resp) = rate_limit_or_reject(&state.query_limiter, &headers, connect_info).await {
        return resp;
    }
    let depth = match validation::validate_depth(params.depth) {
        Ok(d) => d,
        Err(err) => return error_response(&err),
    };
    match state.store.query_host(&ip, depth).await {
        Ok(Some(view)) => Json(view).into_response(),
        Ok(None) => bad_request(ErrorCode::HostNotFound, format!("no host record for {ip}")),
        Err(err) => error_response(&err),
    }
}

async fn query_graph(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<GraphQueryRequest>,
) -> Response {
    if let Some(resp) = rate_limit_or_reject(&state.query_limiter, &headers, connect_info).await {
        return resp;
    }
    let start = Instant::now();
    let (query_type, limit, offset) = match validation::validate_graph_query(req) {
        Ok(v) => v,
        Err(err) => return error_response(&err),
    };
    match state.store.graph_query(&query_type, limit, offset).await {
        Ok(page) => Json(GraphQueryResponse {
            results: page.results,
            pagination: GraphQueryPagination {
                limit: page.pagination.limit,
                offset: page.pagination.offset,
                total: page.pagination.total,
                has_more: page.pagination.has_more,
                next_offset: page.pagination.next_offset,
            },
            query_time_ms: start.elapsed().as_millis() as u64,
        })
        .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn query_similar(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<SimilarityQueryRequest>,
) -> Response {
    if let Some(resp) = rate_limit_or_reject(&state.query_limiter, &headers, connect_info).await {
        return resp;
    }
    let k = match validation::validate_similarity_query(&req.query, req.k) {
        Ok(k) => k,
        Err(err) => return error_response(&err),
    };

    let Some(embedder) = state.embedding_adapter.clone() else {
        return error_response(&SpectraError::new(
            ErrorCode::ServiceUnavailable,
            "embedding adapter is not configured",
        ));
    };

    let embedding = match tokio::time::timeout(
        SIMILARITY_ADAPTER_TIMEOUT,
        embedder.generate(&req.query),
    )
    .await
    {
        Ok(Ok(embedding)) => embedding,
        Ok(Err(err)) => {
            return error_response(&SpectraError::new(
                ErrorCode::ServiceUnavailable,
                "embedding adapter failed",
            )
            .with_source(err))
        }
        Err(_) => {
            return error_response(&SpectraError::new(
                ErrorCode::ServiceUnavailable,
                "embedding adapter timed out",
            ))
        }
    };

    match state
        .store
        .vector_search(&embedding, k, state.similarity_min_score)
        .await
    {
        Ok(results) => {
            let results: Vec<SimilarityHit> = results.into_iter().map(SimilarityHit::from).collect();
            Json(SimilarityQueryResponse {
                query: req.query,
                count: results.len(),
                results,
                timestamp: Utc::now(),
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// Build an `AppState` over in-process reference implementations, suitable
/// for tests and the default local-development binding.
#[must_use]
pub fn in_memory_state(config: &spectra_config::AdapterConfig) -> AppState {
    let embedding_adapter = config.embedding_api_key.as_ref().map(|key| {
        Arc::new(EmbeddingAdapter::new(
            "https://api.openai.com/v1",
            key.clone(),
            "text-embedding-3-small",
        ))
    });
    AppState {
        jobs: Arc::new(spectra_jobstore::InMemoryJobStore::new()),
        store: Arc::new(spectra_store::InMemoryGraphStore::new()),
        ingest_limiter: RateLimiter::ingest(),
        query_limiter: RateLimiter::query(),
        asn_adapter: Arc::new(AsnAdapter::with_rate_limit(
            "https://api.cymru.com",
            config.asn_rate_limit_per_min,
        )),
        geoip_adapter: Arc::new(GeoIpAdapter::http_only("https://geoip.example.invalid")),
        cve_adapter: Arc::new(CveAdapter::new(
            "https://services.nvd.nist.gov/rest/json/cves/2.0",
            config.cve_api_key.clone(),
        )),
        embedding_adapter,
        similarity_min_score: config.similarity_min_score,
        journal: Arc::new(InMemoryJournal::new()),
        state: StateStore::new(),
        bus: Arc::new(MessageBus::new()),
    }
}
