//! Unified error taxonomy with stable error codes for Spectra-Red.
//!
//! Every domain error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`SpectraError::new`] to construct errors fluently. Handlers translate
//! a `SpectraError` to an HTTP response via [`ErrorCode::http_status`] —
//! there is exactly one status per code, so no handler needs its own
//! `match` over error kinds.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed request body or parameters.
    Validation,
    /// Envelope / signature authentication failures.
    Auth,
    /// Admission control.
    RateLimit,
    /// Lookup of a host, job, or record that does not exist.
    NotFound,
    /// An external adapter or the store is temporarily unavailable.
    Unavailable,
    /// Job state machine violations — internal invariant breaks.
    Internal,
    /// Semantic errors raised from inside a workflow step.
    Workflow,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
            Self::Workflow => "workflow",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation (§7 InvalidJSON / MissingField / InvalidParameter) --
    /// Request body is not valid JSON, exceeds the size cap, or fails envelope parsing.
    InvalidJson,
    /// A required query/body field is missing.
    MissingField,
    /// A query/body field has an out-of-range or otherwise invalid value.
    InvalidParameter,

    // -- Auth (§7 InvalidSignature; C1 fine-grained reasons) --
    /// Envelope failed Ed25519 verification. This is the only code the
    /// ingest API ever returns for an auth failure — the finer reasons
    /// below are for internal logging only and must never reach the client.
    InvalidSignature,
    /// (internal) a required envelope field was empty.
    EnvelopeMissingField,
    /// (internal) `|now - timestamp| > 5 min`.
    EnvelopeBadTimestamp,
    /// (internal) `public_key` did not base64-decode to 32 bytes.
    EnvelopeBadKey,
    /// (internal) signature verification failed.
    EnvelopeBadSignature,

    // -- RateLimit --
    /// Token bucket for the principal is empty.
    RateLimited,

    // -- NotFound --
    /// No host record at the requested IP.
    HostNotFound,
    /// No job record with the requested id.
    JobNotFound,

    // -- Unavailable --
    /// An external adapter (embedding, ASN, GeoIP, CVE) failed or is unconfigured.
    ServiceUnavailable,

    // -- Internal --
    /// A job transition was attempted that the state machine does not permit.
    InvalidTransition,
    /// Catch-all for unexpected internal errors.
    Internal,

    // -- Workflow (terminal, non-retriable) --
    /// The scan payload failed semantic validation inside the ingest workflow.
    WorkflowTerminal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidJson | Self::MissingField | Self::InvalidParameter => {
                ErrorCategory::Validation
            }

            Self::InvalidSignature
            | Self::EnvelopeMissingField
            | Self::EnvelopeBadTimestamp
            | Self::EnvelopeBadKey
            | Self::EnvelopeBadSignature => ErrorCategory::Auth,

            Self::RateLimited => ErrorCategory::RateLimit,

            Self::HostNotFound | Self::JobNotFound => ErrorCategory::NotFound,

            Self::ServiceUnavailable => ErrorCategory::Unavailable,

            Self::InvalidTransition | Self::Internal => ErrorCategory::Internal,

            Self::WorkflowTerminal => ErrorCategory::Workflow,
        }
    }

    /// The HTTP status a [`SpectraError`] carrying this code should produce.
    ///
    /// This is the single place request handlers consult to translate a
    /// domain error into a response — see §7 of the design document.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidJson | Self::MissingField | Self::InvalidParameter => 400,
            Self::InvalidSignature
            | Self::EnvelopeMissingField
            | Self::EnvelopeBadTimestamp
            | Self::EnvelopeBadKey
            | Self::EnvelopeBadSignature => 401,
            Self::RateLimited => 429,
            Self::HostNotFound | Self::JobNotFound => 404,
            Self::ServiceUnavailable => 503,
            Self::InvalidTransition | Self::Internal | Self::WorkflowTerminal => 500,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"INVALID_SIGNATURE"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "INVALID_JSON",
            Self::MissingField => "MISSING_FIELD",
            Self::InvalidParameter => "INVALID_PARAMETER",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::EnvelopeMissingField => "ENVELOPE_MISSING_FIELD",
            Self::EnvelopeBadTimestamp => "ENVELOPE_BAD_TIMESTAMP",
            Self::EnvelopeBadKey => "ENVELOPE_BAD_KEY",
            Self::EnvelopeBadSignature => "ENVELOPE_BAD_SIGNATURE",
            Self::RateLimited => "RATE_LIMIT_EXCEEDED",
            Self::HostNotFound => "HOST_NOT_FOUND",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::Internal => "INTERNAL",
            Self::WorkflowTerminal => "WORKFLOW_TERMINAL",
        }
    }

    /// Whether this code, once surfaced to an HTTP client, must not reveal
    /// *which* underlying reason triggered it (§4.5 step 3: "non-discriminating").
    ///
    /// Only the four fine-grained envelope-verification codes collapse into
    /// [`ErrorCode::InvalidSignature`] at the API boundary.
    pub fn is_envelope_internal_reason(&self) -> bool {
        matches!(
            self,
            Self::EnvelopeMissingField
                | Self::EnvelopeBadTimestamp
                | Self::EnvelopeBadKey
                | Self::EnvelopeBadSignature
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SpectraError
// ---------------------------------------------------------------------------

/// Unified domain error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use spectra_error::{SpectraError, ErrorCode};
///
/// let err = SpectraError::new(ErrorCode::ServiceUnavailable, "embedding adapter unconfigured")
///     .with_context("adapter", "embedding");
/// ```
pub struct SpectraError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl SpectraError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Shorthand for `self.code.http_status()`.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// The code the client should actually see, collapsing the fine-grained
    /// envelope-verification reasons into [`ErrorCode::InvalidSignature`]
    /// per the non-discrimination rule in §4.5.
    pub fn public_code(&self) -> ErrorCode {
        if self.code.is_envelope_internal_reason() {
            ErrorCode::InvalidSignature
        } else {
            self.code
        }
    }
}

impl fmt::Debug for SpectraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("SpectraError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for SpectraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for SpectraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`SpectraError`] (without the opaque source),
/// matching the wire shape in §6: `{error, code?, details?, timestamp}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpectraErrorDto {
    /// Human-readable message, serialized as `error`.
    #[serde(rename = "error")]
    pub message: String,
    /// Public error code (already collapsed via [`SpectraError::public_code`]).
    pub code: ErrorCode,
    /// Structured context, serialized as `details` (omitted when empty).
    #[serde(rename = "details", skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
    /// RFC3339 timestamp of when the error was produced.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl SpectraError {
    /// Build the wire DTO for this error, stamped with the current time.
    pub fn to_dto(&self) -> SpectraErrorDto {
        SpectraErrorDto {
            message: self.message.clone(),
            code: self.public_code(),
            details: self.context.clone(),
            timestamp: chrono::Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    /// All error codes for exhaustive iteration in tests.
    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::InvalidJson,
        ErrorCode::MissingField,
        ErrorCode::InvalidParameter,
        ErrorCode::InvalidSignature,
        ErrorCode::EnvelopeMissingField,
        ErrorCode::EnvelopeBadTimestamp,
        ErrorCode::EnvelopeBadKey,
        ErrorCode::EnvelopeBadSignature,
        ErrorCode::RateLimited,
        ErrorCode::HostNotFound,
        ErrorCode::JobNotFound,
        ErrorCode::ServiceUnavailable,
        ErrorCode::InvalidTransition,
        ErrorCode::Internal,
        ErrorCode::WorkflowTerminal,
    ];

    #[test]
    fn basic_construction() {
        let err = SpectraError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = SpectraError::new(ErrorCode::HostNotFound, "no such host");
        assert_eq!(err.to_string(), "[HOST_NOT_FOUND] no such host");
    }

    #[test]
    fn display_with_context() {
        let err = SpectraError::new(ErrorCode::RateLimited, "bucket empty")
            .with_context("principal", "1.2.3.4");
        let s = err.to_string();
        assert!(s.starts_with("[RATE_LIMIT_EXCEEDED] bucket empty"));
        assert!(s.contains("principal"));
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err =
            SpectraError::new(ErrorCode::ServiceUnavailable, "adapter down").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("file missing"));
    }

    #[test]
    fn http_status_matches_spec_table() {
        assert_eq!(ErrorCode::InvalidJson.http_status(), 400);
        assert_eq!(ErrorCode::InvalidSignature.http_status(), 401);
        assert_eq!(ErrorCode::RateLimited.http_status(), 429);
        assert_eq!(ErrorCode::HostNotFound.http_status(), 404);
        assert_eq!(ErrorCode::JobNotFound.http_status(), 404);
        assert_eq!(ErrorCode::ServiceUnavailable.http_status(), 503);
        assert_eq!(ErrorCode::InvalidTransition.http_status(), 500);
    }

    #[test]
    fn envelope_reasons_collapse_to_invalid_signature() {
        let reasons = [
            ErrorCode::EnvelopeMissingField,
            ErrorCode::EnvelopeBadTimestamp,
            ErrorCode::EnvelopeBadKey,
            ErrorCode::EnvelopeBadSignature,
        ];
        for r in reasons {
            let err = SpectraError::new(r, "detail that must not leak");
            assert_eq!(err.public_code(), ErrorCode::InvalidSignature);
            assert_eq!(err.to_dto().code, ErrorCode::InvalidSignature);
        }
        // A non-envelope code is left untouched.
        let err = SpectraError::new(ErrorCode::HostNotFound, "missing");
        assert_eq!(err.public_code(), ErrorCode::HostNotFound);
    }

    #[test]
    fn builder_with_context_multiple_keys() {
        let err = SpectraError::new(ErrorCode::RateLimited, "limited")
            .with_context("limit", 60)
            .with_context("window", "1m");
        assert_eq!(err.context.len(), 2);
        assert_eq!(err.context["limit"], serde_json::json!(60));
        assert_eq!(err.context["window"], serde_json::json!("1m"));
    }

    #[test]
    fn dto_hides_internal_envelope_reason_but_keeps_context() {
        let err = SpectraError::new(ErrorCode::EnvelopeBadSignature, "bad sig")
            .with_context("scanner_key", "abc");
        let dto = err.to_dto();
        assert_eq!(dto.code, ErrorCode::InvalidSignature);
        let json = serde_json::to_string(&dto).unwrap();
        assert!(!json.contains("ENVELOPE_BAD_SIGNATURE"));
        assert!(json.contains("INVALID_SIGNATURE"));
    }

    #[test]
    fn std_error_source_chain() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = SpectraError::new(ErrorCode::Internal, "staging").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            let s = code.as_str();
            assert!(seen.insert(s), "duplicate as_str value: {s}");
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn all_codes_serialize_to_as_str() {
        for code in ALL_CODES {
            let json = serde_json::to_string(code).unwrap();
            let expected = format!(r#""{}""#, code.as_str());
            assert_eq!(json, expected, "mismatch for {code:?}");
        }
    }

    #[test]
    fn error_category_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
        assert_eq!(ErrorCategory::Internal.to_string(), "internal");
    }

    #[test]
    fn context_with_nested_json() {
        let err = SpectraError::new(ErrorCode::Internal, "nested")
            .with_context("details", serde_json::json!({"a": 1, "b": [2, 3]}));
        assert_eq!(
            err.context["details"],
            serde_json::json!({"a": 1, "b": [2, 3]})
        );
    }
}
