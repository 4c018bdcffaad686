use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;

use crate::{
    extractors::AppJson,
    middlewares::trace::client_context_from,
    models::StepForm,
    services::{
        notifier::CompletionNotifier,
        scoring::aggregate_score,
        uploads::{UploadOutcome, UploadService},
        workflow::{Destination, StepOutcome, WorkflowError, WorkflowService},
        AppState,
    },
};

/// Error surface of the public flow. Domain-expected conditions render as
/// friendly pages; only genuinely unexpected failures become a 500, and
/// never with raw error detail.
#[derive(Debug)]
pub enum FormApiError {
    NotFound,
    Inaccessible,
    Internal,
}

impl From<WorkflowError> for FormApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::NotFound => FormApiError::NotFound,
            WorkflowError::Inaccessible => FormApiError::Inaccessible,
            WorkflowError::Storage(err) => {
                tracing::error!("Workflow storage failure: {:#}", err);
                FormApiError::Internal
            }
        }
    }
}

impl IntoResponse for FormApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            FormApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "This link is not valid. Please check the address you received.",
            ),
            FormApiError::Inaccessible => (
                StatusCode::GONE,
                "This form is no longer available. Please contact your training advisor.",
            ),
            FormApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong on our side. Please try again later.",
            ),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

fn destination_url(token: &str, destination: &Destination) -> String {
    match destination {
        Destination::Step(step) => format!("/form/{}/step/{}", token, step),
        Destination::Completed => format!("/form/{}/completed", token),
    }
}

/// `GET /form/{token}`: resolve the token and send the respondent to their
/// current step, or to the terminal view when already completed.
pub async fn enter_form(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    request: Request,
) -> Result<Redirect, FormApiError> {
    let client = client_context_from(request.headers(), request.extensions());
    let service = WorkflowService::new(state.store.clone());

    let destination = service.enter(&token, client).await?;
    Ok(Redirect::to(&destination_url(&token, &destination)))
}

/// `GET /form/{token}/step/{n}`: render step `n` with its questions and any
/// previously saved answers, or redirect per the sequencing rules.
pub async fn get_step(
    State(state): State<Arc<AppState>>,
    Path((token, step)): Path<(String, u32)>,
    request: Request,
) -> Result<Response, FormApiError> {
    let client = client_context_from(request.headers(), request.extensions());
    let service = WorkflowService::new(state.store.clone());

    match service.step_page(&token, step, client).await? {
        StepOutcome::Page(page) => Ok(Json(page).into_response()),
        StepOutcome::Redirect(destination) => {
            Ok(Redirect::to(&destination_url(&token, &destination)).into_response())
        }
    }
}

/// `POST /form/{token}/step/{n}`: record the step's answers and move on.
/// A persistence failure deliberately answers 200 with an in-page retry
/// message so the respondent never lands on a broken page.
pub async fn post_step(
    State(state): State<Arc<AppState>>,
    Path((token, step)): Path<(String, u32)>,
    AppJson(form): AppJson<StepForm>,
) -> Response {
    let service = WorkflowService::new(state.store.clone());

    match service.submit_step(&token, step, form).await {
        Ok(result) => {
            // Notify only on the completing transition, not on the
            // idempotent re-POST of an already finished submission.
            if result.completed_now {
                notify_completion(&state, &token).await;
            }
            Redirect::to(&destination_url(&token, &result.destination)).into_response()
        }
        Err(WorkflowError::NotFound) => FormApiError::NotFound.into_response(),
        Err(WorkflowError::Inaccessible) => FormApiError::Inaccessible.into_response(),
        Err(WorkflowError::Storage(err)) => {
            tracing::error!(step, "Failed to persist step: {:#}", err);
            (
                StatusCode::OK,
                Json(json!({
                    "saved": false,
                    "message": "We could not save your answers. Please try again."
                })),
            )
                .into_response()
        }
    }
}

/// `GET /form/{token}/completed`: terminal view, or a redirect back into
/// the active flow for a respondent who is not actually done.
pub async fn get_completed(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, FormApiError> {
    let service = WorkflowService::new(state.store.clone());

    match service.completion_view(&token).await? {
        Ok(view) => Ok(Json(view).into_response()),
        Err(destination) => {
            Ok(Redirect::to(&destination_url(&token, &destination)).into_response())
        }
    }
}

/// `POST /form/upload` (multipart: `token`, `question_id`, `file`): the
/// upload gate. Always answers 200 with a structured body; a malformed
/// request is just another rejection.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> (StatusCode, Json<UploadOutcome>) {
    let mut token = None;
    let mut question_id = None;
    let mut file: Option<(Option<String>, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!("Malformed upload request: {}", err);
                return upload_rejection("Malformed upload request");
            }
        };

        let name = field.name().map(|name| name.to_string());
        match name.as_deref() {
            Some("token") => match field.text().await {
                Ok(value) => token = Some(value),
                Err(_) => return upload_rejection("Malformed upload request"),
            },
            Some("question_id") => match field.text().await {
                Ok(value) => question_id = Some(value),
                Err(_) => return upload_rejection("Malformed upload request"),
            },
            Some("file") => {
                let original_name = field.file_name().map(|name| name.to_string());
                match field.bytes().await {
                    Ok(bytes) => file = Some((original_name, bytes.to_vec())),
                    Err(err) => {
                        tracing::debug!("Upload body read failed: {}", err);
                        return upload_rejection("Malformed upload request");
                    }
                }
            }
            _ => {}
        }
    }

    let (Some(token), Some(question_id)) = (token, question_id) else {
        return upload_rejection("Missing token or question");
    };
    let Some((original_name, data)) = file else {
        return upload_rejection("No file provided");
    };

    let service = UploadService::new(state.store.clone(), state.config.upload_dir.clone());
    let outcome = service
        .accept_upload(&token, &question_id, original_name.as_deref(), &data)
        .await;

    (StatusCode::OK, Json(outcome))
}

fn upload_rejection(message: &str) -> (StatusCode, Json<UploadOutcome>) {
    crate::metrics::record_upload("rejected");
    (
        StatusCode::OK,
        Json(UploadOutcome {
            success: false,
            filename: None,
            original_name: None,
            message: Some(message.to_string()),
        }),
    )
}

/// Best-effort staff notification on completion. Report data is loaded
/// fresh; any failure here is logged and never shown to the respondent.
async fn notify_completion(state: &Arc<AppState>, token: &str) {
    let submission = match state.store.submission_by_token(token).await {
        Ok(submission) => submission,
        Err(err) => {
            tracing::warn!("Completion notification lookup failed: {}", err);
            return;
        }
    };
    let questionnaire = match state.store.questionnaire(&submission.questionnaire_id).await {
        Ok(questionnaire) => questionnaire,
        Err(err) => {
            tracing::warn!("Completion notification lookup failed: {}", err);
            return;
        }
    };
    let answers = match state.store.answers_for_submission(&submission.id).await {
        Ok(answers) => answers,
        Err(err) => {
            tracing::warn!("Completion notification lookup failed: {}", err);
            return;
        }
    };

    let score = aggregate_score(&questionnaire, &answers);
    let notifier = CompletionNotifier::new(state.config.smtp.clone());
    notifier
        .notify_completion(
            &questionnaire.title,
            submission.respondent.as_deref(),
            score.as_ref(),
            submission.duration_seconds,
        )
        .await;
}
