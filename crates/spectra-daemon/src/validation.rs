// SPDX-License-Identifier: MIT OR Apache-2.0
//! Query-surface request validation (§4.6, §8 boundary behaviors).
//!
//! Each function turns a loosely-typed request DTO into the strict value
//! the downstream store/job-store call expects, or a [`SpectraError`]
//! carrying [`ErrorCode::InvalidParameter`] / [`ErrorCode::MissingField`]
//! naming exactly what was wrong.

use spectra_error::{ErrorCode, SpectraError};
use spectra_jobstore::{ListFilter, OrderBy, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use spectra_store::GraphQueryType;

use crate::api::{GraphQueryRequest, JobListQuery};

/// Maximum `depth` accepted by the host-query endpoint (§4.6.1).
pub const MAX_HOST_DEPTH: u8 = 5;
/// Default `depth` when the caller omits the query parameter (§4.6.1).
pub const DEFAULT_HOST_DEPTH: u8 = 2;

/// Maximum `limit` accepted by the graph-query endpoint (§4.6.2).
pub const MAX_GRAPH_LIMIT: u32 = 1000;
/// Default `limit` for the graph-query endpoint (§4.6.2).
pub const DEFAULT_GRAPH_LIMIT: u32 = 100;

/// Maximum `k` accepted by the similarity-query endpoint (§4.6.3).
pub const MAX_SIMILARITY_K: u32 = 50;
/// Default `k` for the similarity-query endpoint (§4.6.3).
pub const DEFAULT_SIMILARITY_K: u32 = 10;
/// Maximum length of the free-text similarity query (§4.6.3).
pub const MAX_SIMILARITY_QUERY_LEN: usize = 500;

/// Validate and clamp a host-query `depth` parameter.
///
/// # Errors
/// [`ErrorCode::InvalidParameter`] if `depth > 5`.
pub fn validate_depth(depth: Option<u8>) -> Result<u8, SpectraError> {
    let depth = depth.unwrap_or(DEFAULT_HOST_DEPTH);
    if depth > MAX_HOST_DEPTH {
        return Err(SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("depth must be <= {MAX_HOST_DEPTH}, got {depth}"),
        )
        .with_context("depth", depth));
    }
    Ok(depth)
}

/// Build a [`ListFilter`] from `GET /v1/jobs` query parameters.
///
/// # Errors
/// [`ErrorCode::InvalidParameter`] if `limit` exceeds 500 or `state`/
/// `order_by` do not name a recognized value.
pub fn validate_job_list_query(query: JobListQuery) -> Result<ListFilter, SpectraError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit > MAX_LIST_LIMIT {
        return Err(SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("limit must be <= {MAX_LIST_LIMIT}, got {limit}"),
        )
        .with_context("limit", limit));
    }

    let state = query
        .state
        .as_deref()
        .map(|s| match s {
            "pending" => Ok(spectra_core::JobState::Pending),
            "processing" => Ok(spectra_core::JobState::Processing),
            "completed" => Ok(spectra_core::JobState::Completed),
            "failed" => Ok(spectra_core::JobState::Failed),
            other => Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("unknown job state: {other}"),
            )),
        })
        .transpose()?;

    let order_by = match query.order_by.as_deref() {
        None | Some("created_at") => OrderBy::CreatedAt,
        Some("updated_at") => OrderBy::UpdatedAt,
        Some(other) => {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("unknown order_by: {other}"),
            ))
        }
    };

    Ok(ListFilter {
        scanner: query.scanner_key,
        state,
        limit,
        offset: query.offset.unwrap_or(0),
        order_by,
        desc: query.order_desc.unwrap_or(true),
    })
}

/// Validate `POST /v1/query/graph`'s per-type required fields (§4.6.2) and
/// build the typed filter, plus the clamped `(limit, offset)` pair.
///
/// # Errors
/// [`ErrorCode::MissingField`] if the query type's required field(s) are
/// absent; [`ErrorCode::InvalidParameter`] for an unknown `query_type` or
/// an out-of-range `limit`.
pub fn validate_graph_query(
    req: GraphQueryRequest,
) -> Result<(GraphQueryType, u32, u32), SpectraError> {
    let limit = req.limit.unwrap_or(DEFAULT_GRAPH_LIMIT);
    if limit > MAX_GRAPH_LIMIT {
        return Err(SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("limit must be <= {MAX_GRAPH_LIMIT}, got {limit}"),
        )
        .with_context("limit", limit));
    }
    let offset = req.offset.unwrap_or(0);

    let query_type = match req.query_type.as_str() {
        "by_asn" => {
            let asn = req.asn.ok_or_else(|| {
                SpectraError::new(ErrorCode::MissingField, "by_asn requires 'asn'")
            })?;
            GraphQueryType::ByAsn { asn }
        }
        "by_location" => {
            if req.city.is_none() && req.region.is_none() && req.country.is_none() {
                return Err(SpectraError::new(
                    ErrorCode::MissingField,
                    "by_location requires at least one of city, region, country",
                ));
            }
            GraphQueryType::ByLocation {
                city: req.city,
                region: req.region,
                country: req.country,
            }
        }
        "by_vuln" => {
            let cve = req.cve.ok_or_else(|| {
                SpectraError::new(ErrorCode::MissingField, "by_vuln requires 'cve'")
            })?;
            GraphQueryType::ByVuln { cve }
        }
        "by_service" => {
            if req.product.is_none() && req.service.is_none() {
                return Err(SpectraError::new(
                    ErrorCode::MissingField,
                    "by_service requires 'product' or 'service'",
                ));
            }
            GraphQueryType::ByService {
                product: req.product,
                service: req.service,
            }
        }
        other => {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("unknown query_type: {other}"),
            ))
        }
    };

    Ok((query_type, limit, offset))
}

/// Validate `POST /v1/query/similar`'s `query`/`k` fields (§4.6.3, §8).
///
/// # Errors
/// [`ErrorCode::InvalidParameter`] if `query` is empty, exceeds 500
/// characters, or `k` is outside `1..=50`.
pub fn validate_similarity_query(query: &str, k: Option<u32>) -> Result<u32, SpectraError> {
    if query.is_empty() {
        return Err(SpectraError::new(
            ErrorCode::InvalidParameter,
            "query must not be empty",
        ));
    }
    if query.chars().count() > MAX_SIMILARITY_QUERY_LEN {
        return Err(SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("query must be <= {MAX_SIMILARITY_QUERY_LEN} characters"),
        ));
    }
    let k = k.unwrap_or(DEFAULT_SIMILARITY_K);
    if k < 1 || k > MAX_SIMILARITY_K {
        return Err(SpectraError::new(
            ErrorCode::InvalidParameter,
            format!("k must be in 1..={MAX_SIMILARITY_K}, got {k}"),
        )
        .with_context("k", k));
    }
    Ok(k)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_and_five_accepted() {
        assert_eq!(validate_depth(Some(0)).unwrap(), 0);
        assert_eq!(validate_depth(Some(5)).unwrap(), 5);
    }

    #[test]
    fn depth_six_rejected() {
        let err = validate_depth(Some(6)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn depth_default_is_two() {
        assert_eq!(validate_depth(None).unwrap(), 2);
    }

    #[test]
    fn job_list_limit_500_accepted_501_rejected() {
        let mut q = JobListQuery::default();
        q.limit = Some(500);
        assert!(validate_job_list_query(q).is_ok());

        let mut q = JobListQuery::default();
        q.limit = Some(501);
        let err = validate_job_list_query(q).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn job_list_unknown_state_rejected() {
        let mut q = JobListQuery::default();
        q.state = Some("bogus".to_string());
        let err = validate_job_list_query(q).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn by_asn_requires_asn() {
        let req = GraphQueryRequest {
            query_type: "by_asn".to_string(),
            asn: None,
            city: None,
            region: None,
            country: None,
            cve: None,
            product: None,
            service: None,
            limit: None,
            offset: None,
        };
        let err = validate_graph_query(req).unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingField);
    }

    #[test]
    fn by_location_requires_one_of_three() {
        let req = GraphQueryRequest {
            query_type: "by_location".to_string(),
            asn: None,
            city: None,
            region: None,
            country: None,
            cve: None,
            product: None,
            service: None,
            limit: None,
            offset: None,
        };
        assert!(validate_graph_query(req).is_err());

        let req = GraphQueryRequest {
            query_type: "by_location".to_string(),
            city: Some("Mountain View".to_string()),
            asn: None,
            region: None,
            country: None,
            cve: None,
            product: None,
            service: None,
            limit: None,
            offset: None,
        };
        assert!(validate_graph_query(req).is_ok());
    }

    #[test]
    fn by_service_requires_product_or_service() {
        let req = GraphQueryRequest {
            query_type: "by_service".to_string(),
            product: Some("nginx".to_string()),
            asn: None,
            city: None,
            region: None,
            country: None,
            cve: None,
            service: None,
            limit: None,
            offset: None,
        };
        assert!(validate_graph_query(req).is_ok());
    }

    #[test]
    fn graph_limit_1000_accepted_1001_rejected() {
        let base = GraphQueryRequest {
            query_type: "by_vuln".to_string(),
            cve: Some("CVE-2021-1234".to_string()),
            asn: None,
            city: None,
            region: None,
            country: None,
            product: None,
            service: None,
            limit: Some(1000),
            offset: None,
        };
        assert!(validate_graph_query(base).is_ok());

        let mut over = GraphQueryRequest {
            query_type: "by_vuln".to_string(),
            cve: Some("CVE-2021-1234".to_string()),
            asn: None,
            city: None,
            region: None,
            country: None,
            product: None,
            service: None,
            limit: Some(1001),
            offset: None,
        };
        over.limit = Some(1001);
        let err = validate_graph_query(over).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn similarity_k_one_accepted_fifty_one_rejected() {
        assert_eq!(validate_similarity_query("nginx rce", Some(1)).unwrap(), 1);
        let err = validate_similarity_query("nginx rce", Some(51)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn similarity_query_over_500_chars_rejected() {
        let long = "a".repeat(501);
        let err = validate_similarity_query(&long, Some(5)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn similarity_empty_query_rejected() {
        let err = validate_similarity_query("", Some(5)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }
}
