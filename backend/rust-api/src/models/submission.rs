use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Started,
    InProgress,
    Completed,
    Abandoned,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Started => "started",
            SubmissionStatus::InProgress => "in_progress",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Abandoned)
    }
}

/// Request context captured when the respondent first opens the form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientContext {
    pub ip: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// One tokenized pass through a questionnaire. Mutated only by the workflow
/// engine; `current_step` always stays within [1, total_steps].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(rename = "_id")]
    pub id: String,
    pub token: String,
    pub questionnaire_id: String,
    pub status: SubmissionStatus,
    pub current_step: u32,
    #[serde(default)]
    pub respondent: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    #[serde(default)]
    pub client: Option<ClientContext>,
}

impl Submission {
    pub fn new(
        questionnaire_id: &str,
        token: String,
        respondent: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            token,
            questionnaire_id: questionnaire_id.to_string(),
            status: SubmissionStatus::Started,
            current_step: 1,
            respondent,
            created_at: Utc::now(),
            expires_at,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            client: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == SubmissionStatus::Completed
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }

    /// First-access transition: records the start timestamp and client
    /// context once. Subsequent calls are no-ops.
    pub fn mark_started(&mut self, now: DateTime<Utc>, client: ClientContext) -> bool {
        if self.started_at.is_some() || self.status.is_terminal() {
            return false;
        }
        self.started_at = Some(now);
        self.status = SubmissionStatus::InProgress;
        self.client = Some(client);
        true
    }

    /// Moves the step pointer forward, never backward.
    pub fn advance_to(&mut self, step: u32) {
        self.current_step = self.current_step.max(step);
        if !self.status.is_terminal() {
            self.status = SubmissionStatus::InProgress;
        }
    }

    /// Terminal transition. Duration is only derived when a start timestamp
    /// was recorded.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        if self.is_completed() {
            return;
        }
        self.status = SubmissionStatus::Completed;
        self.completed_at = Some(now);
        self.duration_seconds = self
            .started_at
            .map(|started_at| (now - started_at).num_seconds());
    }
}
