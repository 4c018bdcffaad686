use anyhow::Context;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::options::ReplaceOptions;
use mongodb::Database;

use super::{FormStore, StoreError};
use crate::models::{Answer, Questionnaire, Submission};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const QUESTIONNAIRES: &str = "questionnaires";
const SUBMISSIONS: &str = "submissions";
const ANSWERS: &str = "answers";

/// MongoDB-backed store. Answer uniqueness per (submission, question) comes
/// from the deterministic `_id` every upsert replaces on.
pub struct MongoFormStore {
    db: Database,
}

impl MongoFormStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn questionnaires(&self) -> mongodb::Collection<Questionnaire> {
        self.db.collection(QUESTIONNAIRES)
    }

    fn submissions(&self) -> mongodb::Collection<Submission> {
        self.db.collection(SUBMISSIONS)
    }

    fn answers(&self) -> mongodb::Collection<Answer> {
        self.db.collection(ANSWERS)
    }

    async fn replace_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let collection = self.submissions();
        retry_async_with_config(RetryConfig::aggressive(), || async {
            collection
                .replace_one(doc! { "_id": &submission.id }, submission)
                .with_options(ReplaceOptions::builder().upsert(true).build())
                .await
                .map(|_| ())
        })
        .await
        .context("Failed to write submission")?;
        Ok(())
    }
}

#[async_trait]
impl FormStore for MongoFormStore {
    async fn create_questionnaire(&self, questionnaire: &Questionnaire) -> Result<(), StoreError> {
        self.questionnaires()
            .insert_one(questionnaire)
            .await
            .context("Failed to insert questionnaire")?;
        Ok(())
    }

    async fn questionnaire(&self, id: &str) -> Result<Questionnaire, StoreError> {
        let collection = self.questionnaires();
        let found = retry_async_with_config(RetryConfig::default(), || async {
            collection.find_one(doc! { "_id": id }).await
        })
        .await
        .context("Failed to query questionnaire")?;

        found.ok_or_else(|| StoreError::NotFound(format!("questionnaire {}", id)))
    }

    async fn create_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.submissions()
            .insert_one(submission)
            .await
            .context("Failed to insert submission")?;
        Ok(())
    }

    async fn submission_by_token(&self, token: &str) -> Result<Submission, StoreError> {
        let collection = self.submissions();
        let found = retry_async_with_config(RetryConfig::default(), || async {
            collection.find_one(doc! { "token": token }).await
        })
        .await
        .context("Failed to query submission by token")?;

        found.ok_or_else(|| StoreError::NotFound("submission token".to_string()))
    }

    async fn update_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        self.replace_submission(submission).await
    }

    async fn save_step(
        &self,
        submission: &Submission,
        answers: &[Answer],
    ) -> Result<(), StoreError> {
        let collection = self.answers();
        for answer in answers {
            retry_async_with_config(RetryConfig::aggressive(), || async {
                collection
                    .replace_one(doc! { "_id": &answer.id }, answer)
                    .with_options(ReplaceOptions::builder().upsert(true).build())
                    .await
                    .map(|_| ())
            })
            .await
            .with_context(|| format!("Failed to upsert answer {}", answer.id))?;
        }

        self.replace_submission(submission).await
    }

    async fn answers_for_submission(
        &self,
        submission_id: &str,
    ) -> Result<Vec<Answer>, StoreError> {
        let mut cursor = self
            .answers()
            .find(doc! { "submission_id": submission_id })
            .await
            .context("Failed to query answers")?;

        let mut answers = Vec::new();
        while let Some(answer) = cursor.try_next().await.context("Answer cursor error")? {
            answers.push(answer);
        }
        Ok(answers)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}
