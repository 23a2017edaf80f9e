//! Embedding adapter: `text -> float64[1536]` (§4.7, §4.13).
//!
//! The vendor API this wraps speaks `float32`; every value is widened to
//! `f64` on the way out so the rest of the system (in particular
//! `spectra_core::VulnDoc::embedding` and the cosine-similarity index) never
//! has to think about the vendor's native precision.

use std::time::Duration;

use serde::Deserialize;
use spectra_error::{ErrorCode, SpectraError};

/// Fixed embedding dimensionality (§3, §4.7).
pub const EMBEDDING_DIM: usize = 1536;
/// Maximum input length, in characters (§4.6.3, §4.7).
pub const MAX_TEXT_LEN: usize = 500;
/// Adapter call timeout (§4.7, §5).
pub const TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbeddingApiResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Generates fixed-dimension embeddings for vulnerability-document text,
/// over an OpenAI-style HTTP embedding endpoint.
pub struct EmbeddingAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmbeddingAdapter {
    /// Build an adapter against `base_url` using `api_key` for bearer auth.
    /// `model` is stamped onto every [`spectra_core::VulnDoc`] produced from
    /// this adapter's output, so staleness can be detected on model change
    /// (§4.13).
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// The model identifier stamped onto generated embeddings.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn validate(text: &str) -> Result<(), SpectraError> {
        if text.is_empty() {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                "embedding input must not be empty",
            ));
        }
        if text.chars().count() > MAX_TEXT_LEN {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("embedding input exceeds {MAX_TEXT_LEN} characters"),
            )
            .with_context("len", text.chars().count()));
        }
        Ok(())
    }

    /// Generate a single 1536-dim embedding for `text`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidParameter`] for input that fails §4.7's
    /// validation, or [`ErrorCode::ServiceUnavailable`] for any transport,
    /// timeout, or malformed-response failure — the caller (typically the
    /// `/v1/query/similar` handler) maps that straight to HTTP 503.
    pub async fn generate(&self, text: &str) -> Result<Vec<f64>, SpectraError> {
        Self::validate(text)?;

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": text }))
            .send()
            .await
            .map_err(|e| {
                SpectraError::new(ErrorCode::ServiceUnavailable, "embedding adapter request failed")
                    .with_source(e)
            })?;

        if !resp.status().is_success() {
            return Err(SpectraError::new(
                ErrorCode::ServiceUnavailable,
                format!("embedding adapter returned status {}", resp.status()),
            ));
        }

        let body: EmbeddingApiResponse = resp.json().await.map_err(|e| {
            SpectraError::new(ErrorCode::ServiceUnavailable, "embedding adapter response decode failed")
                .with_source(e)
        })?;

        Ok(widen(body.embedding))
    }

    /// Generate embeddings for a batch of texts with a single remote call
    /// (§4.7: "Batch form shares one remote call"). Each input is validated
    /// independently before the call is made.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidParameter`] if any input fails
    /// validation, or [`ErrorCode::ServiceUnavailable`] on transport failure.
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, SpectraError> {
        for text in texts {
            Self::validate(text)?;
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|e| {
                SpectraError::new(ErrorCode::ServiceUnavailable, "embedding adapter request failed")
                    .with_source(e)
            })?;

        if !resp.status().is_success() {
            return Err(SpectraError::new(
                ErrorCode::ServiceUnavailable,
                format!("embedding adapter returned status {}", resp.status()),
            ));
        }

        let body: BatchEmbeddingApiResponse = resp.json().await.map_err(|e| {
            SpectraError::new(ErrorCode::ServiceUnavailable, "embedding adapter response decode failed")
                .with_source(e)
        })?;

        Ok(body.embeddings.into_iter().map(widen).collect())
    }
}

fn widen(v: Vec<f32>) -> Vec<f64> {
    v.into_iter().map(f64::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_text_rejected() {
        let adapter = EmbeddingAdapter::new("http://127.0.0.1:1", "key", "text-embedding-3-small");
        let err = adapter.generate("").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[tokio::test]
    async fn oversized_text_rejected() {
        let adapter = EmbeddingAdapter::new("http://127.0.0.1:1", "key", "text-embedding-3-small");
        let text = "a".repeat(MAX_TEXT_LEN + 1);
        let err = adapter.generate(&text).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[tokio::test]
    async fn max_length_text_accepted_past_validation() {
        let adapter = EmbeddingAdapter::new("http://127.0.0.1:1", "key", "text-embedding-3-small");
        let text = "a".repeat(MAX_TEXT_LEN);
        // Passes validation, fails at the (unreachable) transport step.
        let err = adapter.generate(&text).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);
    }

    #[tokio::test]
    async fn unreachable_host_surfaces_service_unavailable() {
        let adapter = EmbeddingAdapter::new("http://127.0.0.1:1", "key", "text-embedding-3-small");
        let err = adapter.generate("nginx rce").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);
    }

    #[test]
    fn widen_preserves_values_and_dimension() {
        let v: Vec<f32> = vec![0.1, -0.2, 0.3];
        let widened = widen(v);
        assert_eq!(widened.len(), 3);
        assert!((widened[0] - 0.1_f64).abs() < 1e-6);
    }

    #[test]
    fn model_accessor_returns_configured_model() {
        let adapter = EmbeddingAdapter::new("http://localhost", "key", "text-embedding-3-small");
        assert_eq!(adapter.model(), "text-embedding-3-small");
    }

    #[tokio::test]
    async fn empty_batch_returns_empty_without_call() {
        let adapter = EmbeddingAdapter::new("http://127.0.0.1:1", "key", "text-embedding-3-small");
        let out = adapter.generate_batch(&[]).await.unwrap();
        assert!(out.is_empty());
    }
}
