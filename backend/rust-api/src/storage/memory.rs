use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{FormStore, StoreError};
use crate::models::{Answer, Questionnaire, Submission};

/// In-memory store for local development and the integration test suite.
/// A whole step is applied under one lock, matching the write ordering the
/// MongoDB backend guarantees.
#[derive(Default)]
pub struct MemoryFormStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    questionnaires: HashMap<String, Questionnaire>,
    submissions: HashMap<String, Submission>,
    answers: HashMap<String, Answer>,
}

impl MemoryFormStore {
    /// Test hook: the raw answer rows currently stored for a submission.
    pub fn answers_snapshot(&self, submission_id: &str) -> Vec<Answer> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut answers: Vec<Answer> = inner
            .answers
            .values()
            .filter(|answer| answer.submission_id == submission_id)
            .cloned()
            .collect();
        answers.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        answers
    }

    /// Test hook: current state of a submission row.
    pub fn submission_snapshot(&self, submission_id: &str) -> Option<Submission> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner.submissions.get(submission_id).cloned()
    }
}

#[async_trait]
impl FormStore for MemoryFormStore {
    async fn create_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .questionnaires
            .insert(questionnaire.id.clone(), questionnaire.clone());
        Ok(())
    }

    async fn questionnaire(&self, id: &str) -> Result<Questionnaire, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .questionnaires
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("questionnaire {}", id)))
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn submission_by_token(&self, token: &str) -> Result<Submission, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .submissions
            .values()
            .find(|submission| submission.token == token)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("submission token".to_string()))
    }

    async fn update_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        inner
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn save_step(
        &self,
        submission: &Submission,
        answers: &[Answer],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        for answer in answers {
            inner.answers.insert(answer.id.clone(), answer.clone());
        }
        inner
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(())
    }

    async fn answers_for_submission(
        &self,
        submission_id: &str,
    ) -> Result<Vec<Answer>, StoreError> {
        Ok(self.answers_snapshot(submission_id))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
