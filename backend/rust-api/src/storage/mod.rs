use async_trait::async_trait;

use crate::models::{Answer, Questionnaire, Submission};

pub mod memory;
pub mod mongo;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Persistence backend for questionnaires, submissions and answers.
///
/// `save_step` persists one step submission as a unit: every answer is
/// written before the submission row, so a mid-write failure can never leave
/// the step pointer advanced past answers that were not stored. Answer
/// writes are upserts keyed on [`Answer::upsert_id`], which is what makes a
/// repeated step POST idempotent.
///
/// Implementations must be `Send + Sync + 'static` so they can live in the
/// axum application state behind an `Arc<dyn FormStore>`.
#[async_trait]
pub trait FormStore: Send + Sync + 'static {
    async fn create_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError>;

    async fn questionnaire(&self, id: &str) -> Result<Questionnaire, StoreError>;

    async fn create_submission(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Exact-match token lookup. A missing token is indistinguishable from
    /// one that never existed.
    async fn submission_by_token(&self, token: &str) -> Result<Submission, StoreError>;

    async fn update_submission(&self, submission: &Submission) -> Result<(), StoreError>;

    /// Persist a processed step: upsert all answers, then the submission row.
    async fn save_step(&self, submission: &Submission, answers: &[Answer])
        -> Result<(), StoreError>;

    async fn answers_for_submission(&self, submission_id: &str)
        -> Result<Vec<Answer>, StoreError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}
