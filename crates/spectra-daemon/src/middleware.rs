// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cross-cutting HTTP middleware for the Spectra-Red daemon.
//!
//! Request-id stamping and structured access logging are the ambient
//! concerns §1 calls out as "beyond the contract they expose" — present in
//! every request regardless of which handler serves it, but otherwise
//! untouched by the domain logic in `lib.rs`.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId middleware
// ---------------------------------------------------------------------------

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Axum middleware that generates a [`RequestId`] for each request and sets
/// the `X-Request-Id` response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    resp.headers_mut().insert(
        "x-request-id",
        HeaderValue::from_str(&id.0.to_string()).expect("uuid is valid header value"),
    );
    resp
}

// ---------------------------------------------------------------------------
// RequestLogger
// ---------------------------------------------------------------------------

/// Axum middleware that logs method, path, status code, and duration for
/// each request using [`tracing`] structured fields.
pub async fn request_logger(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let resp = next.run(req).await;

    let duration = start.elapsed();
    let status = resp.status().as_u16();

    info!(
        target: "spectra.daemon",
        http.method = %method,
        http.path = %path,
        http.status = status,
        http.duration_ms = duration.as_millis() as u64,
        "request completed"
    );

    resp
}

// ---------------------------------------------------------------------------
// CORS
// ---------------------------------------------------------------------------

/// Permissive CORS suitable for a scanner/query API with no browser session
/// state: every scanner authenticates the envelope itself, so there is no
/// cookie to protect against cross-site use.
#[must_use]
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::permissive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn ok_handler() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn request_id_header_is_set() {
        let app = Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn distinct_requests_get_distinct_ids() {
        let app = Router::new()
            .route("/", get(ok_handler))
            .layer(axum::middleware::from_fn(request_id_middleware));

        let first = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let second = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_ne!(
            first.headers().get("x-request-id"),
            second.headers().get("x-request-id")
        );
    }
}
