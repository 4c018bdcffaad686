use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The single typed value slot of an answer. The variant always matches the
/// owning question's kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    /// Selected option ids; a single-choice answer is a one-element array.
    Choices(Vec<i64>),
    Text(String),
    Number(i64),
    Date(NaiveDate),
    /// Stored filename returned by the upload endpoint.
    File(String),
}

impl AnswerValue {
    pub fn as_choice_ids(&self) -> Option<&[i64]> {
        match self {
            AnswerValue::Choices(ids) => Some(ids),
            _ => None,
        }
    }

    /// The raw shape a client refills its form inputs with.
    pub fn input_value(&self) -> serde_json::Value {
        match self {
            AnswerValue::Choices(ids) => serde_json::json!(ids),
            AnswerValue::Text(text) => serde_json::json!(text),
            AnswerValue::Number(number) => serde_json::json!(number),
            AnswerValue::Date(date) => serde_json::json!(date.format("%Y-%m-%d").to_string()),
            AnswerValue::File(filename) => serde_json::json!(filename),
        }
    }
}

/// At most one answer exists per (submission, question) pair; the record id
/// is the deterministic composite key the store upserts on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "_id")]
    pub id: String,
    pub submission_id: String,
    pub question_id: String,
    pub value: AnswerValue,
    #[serde(default)]
    pub points_earned: Option<i32>,
    pub recorded_at: DateTime<Utc>,
}

impl Answer {
    pub fn upsert_id(submission_id: &str, question_id: &str) -> String {
        format!("{}:{}", submission_id, question_id)
    }

    pub fn new(
        submission_id: &str,
        question_id: &str,
        value: AnswerValue,
        points_earned: Option<i32>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Self::upsert_id(submission_id, question_id),
            submission_id: submission_id.to_string(),
            question_id: question_id.to_string(),
            value,
            points_earned,
            recorded_at,
        }
    }
}
