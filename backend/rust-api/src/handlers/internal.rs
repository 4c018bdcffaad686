use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::{
    extractors::AppJson,
    models::{
        Answer, ChoiceOption, FileRules, Question, QuestionKind, Questionnaire,
        QuestionnaireStep, Submission,
    },
    services::{
        scoring::{aggregate_score, ScoreSummary},
        AppState,
    },
    utils::token::generate_form_token,
};

#[derive(Debug)]
pub enum InternalApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl InternalApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        InternalApiError::BadRequest(message.into())
    }

    fn not_found(message: impl Into<String>) -> Self {
        InternalApiError::NotFound(message.into())
    }

    fn internal(message: impl Into<String>) -> Self {
        InternalApiError::Internal(message.into())
    }
}

impl IntoResponse for InternalApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            InternalApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            InternalApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            InternalApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(message)).into_response()
    }
}

impl From<crate::storage::StoreError> for InternalApiError {
    fn from(err: crate::storage::StoreError) -> Self {
        match err {
            crate::storage::StoreError::NotFound(what) => {
                InternalApiError::not_found(format!("Not found: {}", what))
            }
            crate::storage::StoreError::Database(err) => {
                tracing::error!("Internal API storage failure: {:#}", err);
                InternalApiError::internal("Storage failure")
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OptionPayload {
    pub id: i64,
    pub label: String,
    #[serde(default)]
    pub correct: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuestionPayload {
    #[serde(default)]
    pub id: Option<String>,
    pub label: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub points: Option<i32>,
    #[serde(default)]
    pub options: Vec<OptionPayload>,
    #[serde(default)]
    pub file_rules: Option<FileRules>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepPayload {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionnairePayload {
    #[validate(length(min = 1, max = 255, message = "Title must be 1-255 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub allow_step_jump: bool,
    #[validate(length(min = 1, message = "At least one step is required"))]
    pub steps: Vec<StepPayload>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CreateQuestionnaireResponse {
    pub id: String,
    pub total_steps: u32,
}

/// `POST /internal/questionnaires` — create a form definition. Beyond the
/// derive-level checks, each question must be coherent with its kind:
/// choice questions carry options, the others must not.
pub async fn create_questionnaire(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<CreateQuestionnairePayload>,
) -> Result<impl IntoResponse, InternalApiError> {
    payload
        .validate()
        .map_err(|err| InternalApiError::bad_request(err.to_string()))?;

    let now = Utc::now();
    let mut seen_question_ids = HashSet::new();
    let mut steps = Vec::with_capacity(payload.steps.len());

    for (step_index, step) in payload.steps.into_iter().enumerate() {
        if step.title.trim().is_empty() {
            return Err(InternalApiError::bad_request(format!(
                "Step {} has an empty title",
                step_index + 1
            )));
        }
        if step.questions.is_empty() {
            return Err(InternalApiError::bad_request(format!(
                "Step {} has no questions",
                step_index + 1
            )));
        }

        let mut questions = Vec::with_capacity(step.questions.len());
        for question in step.questions {
            questions.push(build_question(question, &mut seen_question_ids)?);
        }

        steps.push(QuestionnaireStep {
            title: step.title,
            description: step.description,
            questions,
        });
    }

    let questionnaire = Questionnaire {
        id: Uuid::new_v4().to_string(),
        title: payload.title,
        description: payload.description,
        active: payload.active,
        allow_step_jump: payload.allow_step_jump,
        steps,
        created_at: now,
        updated_at: now,
    };

    state.store.create_questionnaire(&questionnaire).await?;

    tracing::info!(
        questionnaire_id = %questionnaire.id,
        total_steps = questionnaire.total_steps(),
        "Questionnaire created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateQuestionnaireResponse {
            total_steps: questionnaire.total_steps(),
            id: questionnaire.id,
        }),
    ))
}

fn build_question(
    payload: QuestionPayload,
    seen_ids: &mut HashSet<String>,
) -> Result<Question, InternalApiError> {
    if payload.label.trim().is_empty() {
        return Err(InternalApiError::bad_request("Question label is empty"));
    }

    let id = payload
        .id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if !seen_ids.insert(id.clone()) {
        return Err(InternalApiError::bad_request(format!(
            "Duplicate question id: {}",
            id
        )));
    }

    if payload.kind.is_choice() {
        if payload.options.is_empty() {
            return Err(InternalApiError::bad_request(format!(
                "Question {} is a choice question but has no options",
                id
            )));
        }
        let mut option_ids = HashSet::new();
        for option in &payload.options {
            if !option_ids.insert(option.id) {
                return Err(InternalApiError::bad_request(format!(
                    "Question {} has duplicate option id {}",
                    id, option.id
                )));
            }
        }
    } else if !payload.options.is_empty() {
        return Err(InternalApiError::bad_request(format!(
            "Question {} is not a choice question but has options",
            id
        )));
    }

    if payload.file_rules.is_some() && payload.kind != QuestionKind::FileUpload {
        return Err(InternalApiError::bad_request(format!(
            "Question {} has file rules but is not a file question",
            id
        )));
    }

    Ok(Question {
        id,
        label: payload.label,
        kind: payload.kind,
        required: payload.required,
        points: payload.points,
        options: payload
            .options
            .into_iter()
            .map(|option| ChoiceOption {
                id: option.id,
                label: option.label,
                correct: option.correct,
            })
            .collect(),
        file_rules: payload.file_rules,
    })
}

/// `GET /internal/questionnaires/{id}` — full definition, correct flags
/// included (staff only).
pub async fn get_questionnaire(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Questionnaire>, InternalApiError> {
    let questionnaire = state.store.questionnaire(&id).await?;
    Ok(Json(questionnaire))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvitationPayload {
    /// Label for the invited respondent (name or email); recorded on the
    /// submission and echoed in the completion notification.
    #[serde(default)]
    #[validate(length(max = 255, message = "Respondent label too long"))]
    pub respondent: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 8760, message = "Validity must be 1-8760 hours"))]
    pub valid_for_hours: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateInvitationResponse {
    pub token: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// `POST /internal/questionnaires/{id}/invitations` — issue a tokenized
/// invitation: creates the submission and returns the public form link.
pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(payload): AppJson<CreateInvitationPayload>,
) -> Result<impl IntoResponse, InternalApiError> {
    payload
        .validate()
        .map_err(|err| InternalApiError::bad_request(err.to_string()))?;

    let questionnaire = state.store.questionnaire(&id).await?;
    if !questionnaire.active {
        return Err(InternalApiError::bad_request(
            "Cannot invite to an inactive questionnaire",
        ));
    }

    let token = generate_form_token();
    let expires_at = payload
        .valid_for_hours
        .map(|hours| Utc::now() + Duration::hours(hours));

    let submission = Submission::new(&questionnaire.id, token.clone(), payload.respondent, expires_at);
    state.store.create_submission(&submission).await?;

    let url = public_form_url(&state.config.public_base_url, &token)
        .map_err(|err| InternalApiError::internal(format!("Bad public base URL: {}", err)))?;

    tracing::info!(
        submission_id = %submission.id,
        questionnaire_id = %questionnaire.id,
        "Invitation issued"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateInvitationResponse {
            token,
            url,
            expires_at,
        }),
    ))
}

fn public_form_url(base: &str, token: &str) -> Result<String, url::ParseError> {
    let base = Url::parse(base)?;
    let url = base.join(&format!("/form/{}", token))?;
    Ok(url.to_string())
}

#[derive(Debug, Serialize)]
pub struct ReportEntry {
    pub step: u32,
    pub question_id: String,
    pub label: String,
    pub kind: QuestionKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_earned: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionReport {
    pub token: String,
    pub status: String,
    pub questionnaire_id: String,
    pub questionnaire_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub respondent: Option<String>,
    pub current_step: u32,
    pub total_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreSummary>,
    pub entries: Vec<ReportEntry>,
    /// Required questions the respondent left unanswered; the public flow
    /// does not block on these, so staff follow up from here.
    pub unanswered_required: Vec<String>,
}

/// `GET /internal/submissions/{token}/report` — per-question answers plus
/// the lazily computed aggregate score and timing. Staff can inspect any
/// submission state, including abandoned and expired ones.
pub async fn submission_report(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SubmissionReport>, InternalApiError> {
    let submission = state.store.submission_by_token(&token).await?;
    let questionnaire = state.store.questionnaire(&submission.questionnaire_id).await?;
    let answers = state.store.answers_for_submission(&submission.id).await?;

    let answer_of = |question_id: &str| -> Option<&Answer> {
        answers
            .iter()
            .find(|answer| answer.question_id == question_id)
    };

    let mut entries = Vec::new();
    let mut unanswered_required = Vec::new();
    for (step_index, step) in questionnaire.steps.iter().enumerate() {
        for question in &step.questions {
            let answer = answer_of(&question.id);
            if question.required && answer.is_none() {
                unanswered_required.push(question.id.clone());
            }
            entries.push(ReportEntry {
                step: (step_index + 1) as u32,
                question_id: question.id.clone(),
                label: question.label.clone(),
                kind: question.kind,
                required: question.required,
                answer: answer.map(|a| a.value.input_value()),
                points_earned: answer.and_then(|a| a.points_earned),
            });
        }
    }

    let score = aggregate_score(&questionnaire, &answers);
    let total_steps = questionnaire.total_steps();

    Ok(Json(SubmissionReport {
        token: submission.token,
        status: submission.status.as_str().to_string(),
        questionnaire_id: questionnaire.id,
        questionnaire_title: questionnaire.title,
        respondent: submission.respondent,
        current_step: submission.current_step,
        total_steps,
        started_at: submission.started_at,
        completed_at: submission.completed_at,
        duration_seconds: submission.duration_seconds,
        score,
        entries,
        unanswered_required,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_joins_base_and_token() {
        assert_eq!(
            public_form_url("http://localhost:8081", "abc").unwrap(),
            "http://localhost:8081/form/abc"
        );
        assert_eq!(
            public_form_url("https://forms.eprofos.example/app/", "abc").unwrap(),
            "https://forms.eprofos.example/form/abc"
        );
        assert!(public_form_url("not a url", "abc").is_err());
    }
}
