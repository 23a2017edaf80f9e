#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::Parser;
use spectra_adapters::{AsnAdapter, CveAdapter, EmbeddingAdapter, GeoIpAdapter};
use spectra_config::AdapterConfig;
use spectra_daemon::{build_app, spawn_enrichment_listeners, AppState};
use spectra_jobstore::InMemoryJobStore;
use spectra_ratelimit::{RateLimiter, DEFAULT_MAX_IDLE};
use spectra_runtime::{InMemoryJournal, MessageBus, StateStore};
use spectra_store::InMemoryGraphStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Spectra-Red ingest/query daemon: signed ingest, durable enrichment
/// dispatch, and the hybrid graph/vector query API (§6).
#[derive(Parser, Debug)]
#[command(name = "spectra-daemon", version, about = "Spectra-Red mesh daemon")]
struct Args {
    /// HTTP bind address (§6: "Ingress port").
    #[arg(long, env = "SPECTRA_BIND", default_value = "0.0.0.0:8088")]
    bind: String,

    /// Embedding adapter API key; absent disables `/v1/query/similar` (§6).
    #[arg(long, env = "SPECTRA_EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,

    /// ASN adapter rate limit, requests per minute (§4.7 default 100).
    #[arg(long, env = "SPECTRA_ASN_RATE_LIMIT_PER_MIN", default_value_t = 100)]
    asn_rate_limit_per_min: u32,

    /// ASN adapter cache TTL in seconds (§4.7 default 24h).
    #[arg(long, env = "SPECTRA_ASN_CACHE_TTL_SECS", default_value_t = 24 * 60 * 60)]
    asn_cache_ttl_secs: u64,

    /// Local MMDB path for GeoIP lookups (§6).
    #[arg(long, env = "SPECTRA_GEOIP_MMDB_PATH", default_value = "GeoLite2-City.mmdb")]
    geoip_mmdb_path: String,

    /// CVE adapter API key granting a higher rate allowance (§4.7).
    #[arg(long, env = "SPECTRA_CVE_API_KEY")]
    cve_api_key: Option<String>,

    /// Minimum cosine-similarity score applied post-retrieval (§9 open question).
    #[arg(long, env = "SPECTRA_SIMILARITY_MIN_SCORE", default_value_t = 0.0)]
    similarity_min_score: f32,

    /// Enable verbose request/workflow debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("spectra=debug,spectra_runtime=debug,spectra_daemon=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spectra=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let adapters = AdapterConfig {
        embedding_api_key: args.embedding_api_key,
        asn_rate_limit_per_min: args.asn_rate_limit_per_min,
        asn_cache_ttl_secs: args.asn_cache_ttl_secs,
        geoip_mmdb_path: args.geoip_mmdb_path.clone(),
        cve_api_key: args.cve_api_key,
        similarity_min_score: args.similarity_min_score,
    };

    let state = build_state(&adapters)?;

    Arc::new(state.ingest_limiter.clone())
        .spawn_sweeper(Duration::from_secs(5 * 60), DEFAULT_MAX_IDLE);
    Arc::new(state.query_limiter.clone())
        .spawn_sweeper(Duration::from_secs(5 * 60), DEFAULT_MAX_IDLE);

    spawn_enrichment_listeners(state.clone());

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    info!(bind = %args.bind, "spectra-daemon listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .context("serve")
}

/// Build an [`AppState`] over in-process reference adapters/stores, honoring
/// the adapter tuning in `adapters` (§6 configuration table). The graph+
/// vector store, job store, and durable-runtime journal/bus are the
/// in-memory reference implementations the core assumes an external
/// deployment would swap for the real store and runtime (§1, §6).
fn build_state(adapters: &AdapterConfig) -> Result<AppState> {
    let embedding_adapter = adapters.embedding_api_key.as_ref().map(|key| {
        Arc::new(EmbeddingAdapter::new(
            "https://api.openai.com/v1",
            key.clone(),
            "text-embedding-3-small",
        ))
    });

    let geoip_adapter = if std::path::Path::new(&adapters.geoip_mmdb_path).is_file() {
        GeoIpAdapter::open(&adapters.geoip_mmdb_path, None)
    } else {
        GeoIpAdapter::http_only("https://geoip.example.invalid")
    };

    Ok(AppState {
        jobs: Arc::new(InMemoryJobStore::new()),
        store: Arc::new(InMemoryGraphStore::new()),
        ingest_limiter: RateLimiter::ingest(),
        query_limiter: RateLimiter::query(),
        asn_adapter: Arc::new(AsnAdapter::with_rate_limit(
            "https://api.cymru.com",
            adapters.asn_rate_limit_per_min,
        )),
        geoip_adapter: Arc::new(geoip_adapter),
        cve_adapter: Arc::new(CveAdapter::new(
            "https://services.nvd.nist.gov/rest/json/cves/2.0",
            adapters.cve_api_key.clone(),
        )),
        embedding_adapter,
        similarity_min_score: adapters.similarity_min_score,
        journal: Arc::new(InMemoryJournal::new()),
        state: StateStore::new(),
        bus: Arc::new(MessageBus::new()),
    })
}
