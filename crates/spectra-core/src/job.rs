// SPDX-License-Identifier: MIT OR Apache-2.0
//! The job entity and its state machine (§4.3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use spectra_error::{ErrorCode, SpectraError};
use uuid::Uuid;

/// A job's lifecycle state.
///
/// ```text
/// pending ──► processing ──► completed
///    │            │
///    └──► failed  └──► failed
/// ```
///
/// `Completed` and `Failed` are terminal (see [`JobState::is_terminal`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Created, not yet picked up by the ingest workflow.
    Pending,
    /// The ingest workflow is actively processing this job.
    Processing,
    /// The ingest workflow finished successfully. Terminal.
    Completed,
    /// The ingest workflow failed with a terminal error. Terminal.
    Failed,
}

impl JobState {
    /// Returns `true` if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// The set of states this state may transition to directly.
    #[must_use]
    pub fn valid_transitions(&self) -> &'static [JobState] {
        match self {
            Self::Pending => &[JobState::Processing, JobState::Failed],
            Self::Processing => &[JobState::Completed, JobState::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Whether transitioning from `self` to `next` is permitted.
    #[must_use]
    pub fn can_transition_to(&self, next: JobState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Control-plane entity representing one ingest (§3, §4.3).
///
/// The state-machine fields (`state`, `completed_at`) may only be mutated
/// through [`Job::transition`] and [`Job::set_error`] — callers must not
/// write them directly, per §4.3.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job id, a fresh UUIDv4 minted at ingest time.
    pub id: Uuid,
    /// Current lifecycle state.
    pub state: JobState,
    /// Public key of the submitting scanner (base64), used for `scanner_key`
    /// filtering in job listings.
    pub scanner_key: String,
    /// Error message, set iff the job reached `Failed`.
    pub error_message: Option<String>,
    /// Number of distinct hosts the ingest workflow upserted.
    pub host_count: u64,
    /// Number of distinct ports the ingest workflow upserted.
    pub port_count: u64,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last mutated.
    pub updated_at: DateTime<Utc>,
    /// When the job entered a terminal state. `None` until then.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new `pending` job for the given scanner key.
    #[must_use]
    pub fn new(id: Uuid, scanner_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Pending,
            scanner_key: scanner_key.into(),
            error_message: None,
            host_count: 0,
            port_count: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Attempt to transition to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidTransition`] if `next` is not reachable
    /// from the current state (§4.3: "Transition attempts that are not in
    /// this set fail with `InvalidTransition`").
    pub fn transition(&mut self, next: JobState) -> Result<(), SpectraError> {
        if !self.state.can_transition_to(next) {
            return Err(SpectraError::new(
                ErrorCode::InvalidTransition,
                format!("cannot transition job {} from {:?} to {:?}", self.id, self.state, next),
            )
            .with_context("job_id", self.id.to_string())
            .with_context("from", format!("{:?}", self.state))
            .with_context("to", format!("{next:?}")));
        }
        self.state = next;
        self.updated_at = Utc::now();
        if next.is_terminal() {
            self.completed_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Set an error message and transition to `Failed` (§4.3: `SetError`
    /// "implies transition to `failed`").
    ///
    /// # Errors
    ///
    /// Returns [`ErrorCode::InvalidTransition`] if the job is already in a
    /// terminal state.
    pub fn set_error(&mut self, message: impl Into<String>) -> Result<(), SpectraError> {
        self.error_message = Some(message.into());
        self.transition(JobState::Failed)
    }
}
