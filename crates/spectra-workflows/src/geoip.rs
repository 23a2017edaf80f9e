// SPDX-License-Identifier: MIT OR Apache-2.0
//! GeoIP enrichment workflow (§4.11): resolves a batch of IPs to city/
//! region/country and stamps the host plus the geo reference hierarchy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use spectra_adapters::GeoIpAdapter;
use spectra_core::{City, Country, Edge, EdgeType, Host, Region};
use spectra_error::{ErrorCode, SpectraError};
use spectra_runtime::{WorkflowContext, WorkflowError};
use spectra_store::GraphStore;

/// Input to the GeoIP enrichment workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIpInput {
    /// IP addresses to resolve, at most 100 per invocation (§4.11).
    pub ips: Vec<String>,
}

/// Result of one GeoIP enrichment invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoIpOutput {
    /// IPs successfully enriched.
    pub enriched: u64,
    /// IPs skipped (private range, unlocated, or adapter failure).
    pub failed: u64,
    /// One message per skipped/failed IP.
    pub errors: Vec<String>,
}

const MAX_IPS: usize = 100;

fn too_many_ips(count: usize) -> WorkflowError {
    WorkflowError::terminal(
        SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("geoip enrichment accepts at most {MAX_IPS} ips, got {count}"),
        )
        .with_context("count", count),
    )
}

/// Run the GeoIP enrichment workflow to completion for one invocation.
///
/// # Errors
/// Returns a terminal [`WorkflowError`] if more than [`MAX_IPS`] addresses
/// are requested, or a retriable one if the graph store fails.
pub async fn run(
    ctx: &WorkflowContext,
    input: GeoIpInput,
    adapter: Arc<GeoIpAdapter>,
    store: Arc<dyn GraphStore>,
) -> Result<GeoIpOutput, WorkflowError> {
    if input.ips.len() > MAX_IPS {
        return Err(too_many_ips(input.ips.len()));
    }

    // Step 1: batch lookup. Private/unlocated/invalid IPs land in `failed`
    // without being a workflow error (§4.11 step 4).
    let lookup = {
        let adapter = Arc::clone(&adapter);
        let ips = input.ips.clone();
        ctx.run("lookup", || async move { Ok::<_, WorkflowError>(adapter.lookup(&ips).await) })
            .await?
    };

    // Steps 2-3: upsert the geo reference hierarchy and relate each host.
    let enriched = {
        let store = Arc::clone(&store);
        let found = lookup.found.clone();
        ctx.run("persist", || async move {
            let mut count = 0u64;
            for (ip, info) in found {
                persist_one(&store, &ip, &info).await?;
                count += 1;
            }
            Ok::<_, WorkflowError>(count)
        })
        .await?
    };

    let errors: Vec<String> = lookup
        .failed
        .iter()
        .map(|ip| format!("{ip}: private, unlocated, or unresolvable"))
        .collect();

    tracing::info!(
        target: "spectra.workflow",
        workflow = "geoip-enrichment",
        enriched,
        failed = errors.len(),
        "geoip enrichment completed"
    );

    Ok(GeoIpOutput {
        enriched,
        failed: errors.len() as u64,
        errors,
    })
}

async fn persist_one(
    store: &Arc<dyn GraphStore>,
    ip: &str,
    info: &spectra_adapters::GeoInfo,
) -> Result<(), WorkflowError> {
    let country_name = info.country.clone().unwrap_or_else(|| info.country_cc.clone());
    store
        .upsert_country(Country {
            cc: info.country_cc.clone(),
            name: country_name,
        })
        .await
        .map_err(WorkflowError::retriable)?;

    let country_id = spectra_store::ids::country_id(&info.country_cc);
    let mut region_id = None;
    if let Some(region_name) = &info.region {
        store
            .upsert_region(Region {
                name: region_name.clone(),
                country_cc: info.country_cc.clone(),
                code: None,
            })
            .await
            .map_err(WorkflowError::retriable)?;
        let rid = spectra_store::ids::region_id(region_name, &info.country_cc);
        store
            .relate_once(Edge::new(rid.clone(), EdgeType::InCountry, country_id.clone()))
            .await
            .map_err(WorkflowError::retriable)?;
        region_id = Some(rid);
    }

    let mut city_id = None;
    if let Some(city_name) = &info.city {
        store
            .upsert_city(City {
                name: city_name.clone(),
                country_cc: info.country_cc.clone(),
                lat: info.lat,
                lon: info.lon,
            })
            .await
            .map_err(WorkflowError::retriable)?;
        let cid = spectra_store::ids::city_id(city_name, &info.country_cc);
        let parent = region_id.clone().unwrap_or_else(|| country_id.clone());
        let parent_edge = if region_id.is_some() {
            EdgeType::InRegion
        } else {
            EdgeType::InCountry
        };
        store
            .relate_once(Edge::new(cid.clone(), parent_edge, parent))
            .await
            .map_err(WorkflowError::retriable)?;
        city_id = Some(cid);
    }

    let host = Host {
        ip: ip.to_string(),
        asn: None,
        city: info.city.clone(),
        region: info.region.clone(),
        country: Some(info.country_cc.clone()),
        cloud_region: None,
        first_seen: chrono::Utc::now(),
        last_seen: chrono::Utc::now(),
        last_scanned_at: chrono::Utc::now(),
    };
    store.upsert_host(host).await.map_err(WorkflowError::retriable)?;

    let host_id = spectra_store::ids::host_id(ip);
    if let Some(cid) = city_id {
        store
            .relate_once(Edge::new(host_id, EdgeType::InCity, cid))
            .await
            .map_err(WorkflowError::retriable)?;
    } else if let Some(rid) = region_id {
        store
            .relate_once(Edge::new(host_id, EdgeType::InRegion, rid))
            .await
            .map_err(WorkflowError::retriable)?;
    } else {
        store
            .relate_once(Edge::new(host_id, EdgeType::InCountry, country_id))
            .await
            .map_err(WorkflowError::retriable)?;
    }

    Ok(())
}
