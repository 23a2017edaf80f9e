// SPDX-License-Identifier: MIT OR Apache-2.0
//! spectra-jobstore
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Job entity persistence and state-machine enforcement (§4.3).
//!
//! The job store is the only shared mutable control-plane state in
//! Spectra-Red (§5); every other mutation flows through idempotent graph
//! upserts. [`Job::transition`] is the sole mutation path — this crate never
//! writes a job's state fields directly, it only calls into that method.

use async_trait::async_trait;
use spectra_core::{Job, JobState};
use spectra_error::{ErrorCode, SpectraError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Field a job listing may be ordered by (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    /// Order by `created_at`.
    CreatedAt,
    /// Order by `updated_at`.
    UpdatedAt,
}

/// Maximum `limit` a caller may request from [`JobStore::list`] (§4.3).
pub const MAX_LIST_LIMIT: u32 = 500;
/// Default `limit` when unspecified (§4.5).
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Filter and pagination parameters for [`JobStore::list`].
#[derive(Debug, Clone)]
pub struct ListFilter {
    /// Restrict to jobs submitted under this scanner key.
    pub scanner: Option<String>,
    /// Restrict to jobs currently in this state.
    pub state: Option<JobState>,
    /// Maximum rows to return. Must be `<= MAX_LIST_LIMIT`.
    pub limit: u32,
    /// Rows to skip before collecting `limit`.
    pub offset: u32,
    /// Sort field.
    pub order_by: OrderBy,
    /// Descending when `true`.
    pub desc: bool,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            scanner: None,
            state: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
            order_by: OrderBy::CreatedAt,
            desc: true,
        }
    }
}

/// A page of jobs plus pagination metadata (§4.3: `{total, has_more, next_offset}`).
#[derive(Debug, Clone)]
pub struct JobPage {
    /// The jobs in this page, already ordered and sliced.
    pub jobs: Vec<Job>,
    /// Total number of jobs matching the filter, ignoring `limit`/`offset`.
    pub total: u64,
    /// Whether further pages remain.
    pub has_more: bool,
    /// Offset to request for the next page, if `has_more`.
    pub next_offset: Option<u32>,
}

/// Operations over the job control plane (§4.3).
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new `pending` job for `scanner_key`, returning its fresh id.
    async fn create(&self, scanner_key: &str) -> Result<Job, SpectraError>;

    /// Fetch a job by id.
    ///
    /// # Errors
    /// Returns [`ErrorCode::JobNotFound`] if no such job exists.
    async fn get(&self, id: Uuid) -> Result<Job, SpectraError>;

    /// List jobs matching `filter`.
    ///
    /// # Errors
    /// Returns [`ErrorCode::InvalidParameter`] if `filter.limit` exceeds
    /// [`MAX_LIST_LIMIT`].
    async fn list(&self, filter: ListFilter) -> Result<JobPage, SpectraError>;

    /// Transition a job to `next`.
    ///
    /// # Errors
    /// Returns [`ErrorCode::JobNotFound`] or [`ErrorCode::InvalidTransition`].
    async fn transition(&self, id: Uuid, next: JobState) -> Result<Job, SpectraError>;

    /// Set a job's error message and transition it to `Failed`.
    ///
    /// # Errors
    /// Returns [`ErrorCode::JobNotFound`] or [`ErrorCode::InvalidTransition`].
    async fn set_error(&self, id: Uuid, message: &str) -> Result<Job, SpectraError>;

    /// Update the host/port counts accumulated so far on a job (§4.9 step 3).
    ///
    /// # Errors
    /// Returns [`ErrorCode::JobNotFound`].
    async fn set_counts(&self, id: Uuid, host_count: u64, port_count: u64) -> Result<Job, SpectraError>;
}

/// In-process job store, suitable for tests and as the reference
/// implementation the daemon wires up over the graph+vector store's job
/// table (§6: "jobs use the same store as a dedicated table").
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl InMemoryJobStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, scanner_key: &str) -> Result<Job, SpectraError> {
        let job = Job::new(Uuid::new_v4(), scanner_key);
        self.jobs.write().await.insert(job.id, job.clone());
        tracing::debug!(target: "spectra.jobstore", job_id = %job.id, "created job");
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Job, SpectraError> {
        self.jobs.read().await.get(&id).cloned().ok_or_else(|| {
            SpectraError::new(ErrorCode::JobNotFound, format!("no job with id {id}"))
                .with_context("job_id", id.to_string())
        })
    }

    async fn list(&self, filter: ListFilter) -> Result<JobPage, SpectraError> {
        if filter.limit > MAX_LIST_LIMIT {
            return Err(SpectraError::new(
                ErrorCode::InvalidParameter,
                format!("limit must be <= {MAX_LIST_LIMIT}"),
            )
            .with_context("limit", filter.limit));
        }

        let jobs = self.jobs.read().await;
        let mut matched: Vec<Job> = jobs
            .values()
            .filter(|j| filter.scanner.as_deref().is_none_or(|s| j.scanner_key == s))
            .filter(|j| filter.state.is_none_or(|s| j.state == s))
            .cloned()
            .collect();

        match filter.order_by {
            OrderBy::CreatedAt => matched.sort_by_key(|j| j.created_at),
            OrderBy::UpdatedAt => matched.sort_by_key(|j| j.updated_at),
        }
        if filter.desc {
            matched.reverse();
        }

        let total = matched.len() as u64;
        let offset = filter.offset as usize;
        let page: Vec<Job> = matched.into_iter().skip(offset).take(filter.limit as usize).collect();
        let has_more = (offset + page.len()) < total as usize;
        let next_offset = has_more.then(|| filter.offset + page.len() as u32);

        Ok(JobPage {
            jobs: page,
            total,
            has_more,
            next_offset,
        })
    }

    async fn transition(&self, id: Uuid, next: JobState) -> Result<Job, SpectraError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| {
            SpectraError::new(ErrorCode::JobNotFound, format!("no job with id {id}"))
        })?;
        job.transition(next)?;
        tracing::debug!(target: "spectra.jobstore", job_id = %id, state = ?next, "transitioned job");
        Ok(job.clone())
    }

    async fn set_error(&self, id: Uuid, message: &str) -> Result<Job, SpectraError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| {
            SpectraError::new(ErrorCode::JobNotFound, format!("no job with id {id}"))
        })?;
        job.set_error(message)?;
        tracing::warn!(target: "spectra.jobstore", job_id = %id, error = message, "job failed");
        Ok(job.clone())
    }

    async fn set_counts(&self, id: Uuid, host_count: u64, port_count: u64) -> Result<Job, SpectraError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| {
            SpectraError::new(ErrorCode::JobNotFound, format!("no job with id {id}"))
        })?;
        job.host_count = host_count;
        job.port_count = port_count;
        job.updated_at = chrono::Utc::now();
        Ok(job.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_roundtrips() {
        let store = InMemoryJobStore::new();
        let job = store.create("scanner-a").await.unwrap();
        let fetched = store.get(job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.state, JobState::Pending);
    }

    #[tokio::test]
    async fn get_missing_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::JobNotFound);
    }

    #[tokio::test]
    async fn happy_path_transition_sequence() {
        let store = InMemoryJobStore::new();
        let job = store.create("scanner-a").await.unwrap();
        store.transition(job.id, JobState::Processing).await.unwrap();
        let completed = store.transition(job.id, JobState::Completed).await.unwrap();
        assert_eq!(completed.state, JobState::Completed);
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn invalid_transition_returns_error_not_panic() {
        let store = InMemoryJobStore::new();
        let job = store.create("scanner-a").await.unwrap();
        let err = store.transition(job.id, JobState::Completed).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        // The job itself is unchanged.
        assert_eq!(store.get(job.id).await.unwrap().state, JobState::Pending);
    }

    #[tokio::test]
    async fn set_error_transitions_to_failed() {
        let store = InMemoryJobStore::new();
        let job = store.create("scanner-a").await.unwrap();
        store.transition(job.id, JobState::Processing).await.unwrap();
        let failed = store.set_error(job.id, "bad payload").await.unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("bad payload"));
    }

    #[tokio::test]
    async fn list_respects_max_limit() {
        let store = InMemoryJobStore::new();
        let err = store
            .list(ListFilter {
                limit: MAX_LIST_LIMIT + 1,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);
    }

    #[tokio::test]
    async fn list_filters_by_scanner_and_state() {
        let store = InMemoryJobStore::new();
        let a = store.create("scanner-a").await.unwrap();
        let _b = store.create("scanner-b").await.unwrap();
        store.transition(a.id, JobState::Processing).await.unwrap();

        let page = store
            .list(ListFilter {
                scanner: Some("scanner-a".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].id, a.id);

        let page = store
            .list(ListFilter {
                state: Some(JobState::Processing),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].id, a.id);
    }

    #[tokio::test]
    async fn list_pagination_reports_has_more_and_next_offset() {
        let store = InMemoryJobStore::new();
        for i in 0..5 {
            store.create(&format!("scanner-{i}")).await.unwrap();
        }

        let page = store
            .list(ListFilter {
                limit: 2,
                offset: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.jobs.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);
        assert_eq!(page.next_offset, Some(2));

        let last_page = store
            .list(ListFilter {
                limit: 2,
                offset: 4,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(last_page.jobs.len(), 1);
        assert!(!last_page.has_more);
        assert_eq!(last_page.next_offset, None);
    }

    #[tokio::test]
    async fn list_default_order_is_created_at_descending() {
        let store = InMemoryJobStore::new();
        let first = store.create("scanner-a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        let second = store.create("scanner-a").await.unwrap();

        let page = store.list(ListFilter::default()).await.unwrap();
        assert_eq!(page.jobs[0].id, second.id);
        assert_eq!(page.jobs[1].id, first.id);
    }

    #[tokio::test]
    async fn set_counts_updates_without_changing_state() {
        let store = InMemoryJobStore::new();
        let job = store.create("scanner-a").await.unwrap();
        let updated = store.set_counts(job.id, 3, 7).await.unwrap();
        assert_eq!(updated.host_count, 3);
        assert_eq!(updated.port_count, 7);
        assert_eq!(updated.state, JobState::Pending);
    }
}
