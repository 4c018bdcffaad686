use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::metrics::{record_answer, record_step_outcome, record_submission_event};
use crate::models::{
    Answer, AnswerValue, ClientContext, Question, QuestionKind, QuestionView, Questionnaire,
    StepForm, Submission,
};
use crate::services::scoring::score_answer;
use crate::storage::{FormStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Unknown token, out-of-range step or unknown question. Rendered as a
    /// generic invalid-link message; an absent token is indistinguishable
    /// from one that never existed.
    #[error("not found")]
    NotFound,

    /// The token resolves, but the submission expired, was abandoned, or its
    /// questionnaire was deactivated.
    #[error("no longer accessible")]
    Inaccessible,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => WorkflowError::NotFound,
            StoreError::Database(err) => WorkflowError::Storage(err),
        }
    }
}

/// Where the respondent should be sent next.
#[derive(Debug, PartialEq, Eq)]
pub enum Destination {
    Step(u32),
    Completed,
}

/// Outcome of resolving a step GET: either the page to render or a
/// redirect (completed flow, or a forward jump that was denied).
#[derive(Debug)]
pub enum StepOutcome {
    Page(StepPage),
    Redirect(Destination),
}

/// Outcome of a step POST. `completed_now` is true only when this POST
/// performed the completing transition; the idempotent re-POST of a
/// finished submission redirects without it, so completion side effects
/// (the staff notification) fire exactly once.
#[derive(Debug)]
pub struct StepSubmission {
    pub destination: Destination,
    pub completed_now: bool,
}

#[derive(Debug, Serialize)]
pub struct StepPage {
    pub step: u32,
    pub total_steps: u32,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub questions: Vec<QuestionView>,
    /// Previously recorded answers for this step, keyed by question id, in
    /// the shape the client refills its inputs with.
    pub saved_answers: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct CompletionView {
    pub questionnaire_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

/// The form completion workflow engine: token resolution, step sequencing,
/// answer coercion and persistence, scoring, and the completion state
/// machine. One canonical implementation; the HTTP layer only translates
/// its outcomes into responses.
pub struct WorkflowService {
    store: Arc<dyn FormStore>,
}

impl WorkflowService {
    pub fn new(store: Arc<dyn FormStore>) -> Self {
        Self { store }
    }

    /// Resolves a token to its live submission and questionnaire, applying
    /// the accessibility checks layered on top of the raw lookup.
    pub async fn resolve(
        &self,
        token: &str,
    ) -> Result<(Submission, Questionnaire), WorkflowError> {
        let submission = self.store.submission_by_token(token).await?;

        if submission.status == crate::models::SubmissionStatus::Abandoned
            || submission.is_expired_at(Utc::now())
        {
            tracing::info!(submission_id = %submission.id, "Submission no longer accessible");
            return Err(WorkflowError::Inaccessible);
        }

        let questionnaire = self.store.questionnaire(&submission.questionnaire_id).await?;
        if !questionnaire.active {
            tracing::info!(
                questionnaire_id = %questionnaire.id,
                "Questionnaire deactivated"
            );
            return Err(WorkflowError::Inaccessible);
        }

        Ok((submission, questionnaire))
    }

    /// Entry point for `GET /form/{token}`: first access flips the
    /// submission to in-progress and records the client context.
    pub async fn enter(
        &self,
        token: &str,
        client: ClientContext,
    ) -> Result<Destination, WorkflowError> {
        let (mut submission, _questionnaire) = self.resolve(token).await?;

        if submission.is_completed() {
            return Ok(Destination::Completed);
        }

        if submission.mark_started(Utc::now(), client) {
            self.store.update_submission(&submission).await?;
            record_submission_event("started");
            tracing::info!(submission_id = %submission.id, "Submission started");
        }

        Ok(Destination::Step(submission.current_step))
    }

    /// Serves step `requested` or decides where to send the respondent
    /// instead. Out-of-range steps are NotFound, distinct from the
    /// forward-jump redirect.
    pub async fn step_page(
        &self,
        token: &str,
        requested: u32,
        client: ClientContext,
    ) -> Result<StepOutcome, WorkflowError> {
        let (mut submission, questionnaire) = self.resolve(token).await?;

        if submission.is_completed() {
            return Ok(StepOutcome::Redirect(Destination::Completed));
        }

        if requested < 1 || requested > questionnaire.total_steps() {
            return Err(WorkflowError::NotFound);
        }

        if requested > submission.current_step && !questionnaire.allow_step_jump {
            tracing::debug!(
                submission_id = %submission.id,
                requested,
                current = submission.current_step,
                "Forward jump denied"
            );
            return Ok(StepOutcome::Redirect(Destination::Step(
                submission.current_step,
            )));
        }

        if submission.mark_started(Utc::now(), client) {
            self.store.update_submission(&submission).await?;
            record_submission_event("started");
            tracing::info!(submission_id = %submission.id, "Submission started");
        }

        let step = questionnaire
            .step(requested)
            .ok_or(WorkflowError::NotFound)?;

        let saved = self.store.answers_for_submission(&submission.id).await?;
        let mut saved_answers = HashMap::new();
        for answer in &saved {
            if step
                .questions
                .iter()
                .any(|question| question.id == answer.question_id)
            {
                saved_answers.insert(answer.question_id.clone(), answer.value.input_value());
            }
        }

        Ok(StepOutcome::Page(StepPage {
            step: requested,
            total_steps: questionnaire.total_steps(),
            title: step.title.clone(),
            description: step.description.clone(),
            questions: step.questions.iter().map(QuestionView::from_question).collect(),
            saved_answers,
        }))
    }

    /// Processes a step POST: coerces and upserts answers for the step's
    /// questions, advances the step pointer, and finalizes the submission
    /// when the posted step is the last one.
    pub async fn submit_step(
        &self,
        token: &str,
        step_number: u32,
        form: StepForm,
    ) -> Result<StepSubmission, WorkflowError> {
        let (mut submission, questionnaire) = self.resolve(token).await?;

        if submission.is_completed() {
            record_step_outcome("already_completed");
            return Ok(StepSubmission {
                destination: Destination::Completed,
                completed_now: false,
            });
        }

        let total_steps = questionnaire.total_steps();
        if step_number < 1 || step_number > total_steps {
            return Err(WorkflowError::NotFound);
        }

        let step = questionnaire
            .step(step_number)
            .ok_or(WorkflowError::NotFound)?;

        let now = Utc::now();
        let mut answers = Vec::new();
        for question in &step.questions {
            let raw = match form.answers.get(&question.id) {
                Some(value) => value,
                None => continue,
            };

            // Empty input is skipped silently, even for required questions.
            let Some(value) = coerce_answer_value(question, raw) else {
                continue;
            };

            let points = value
                .as_choice_ids()
                .and_then(|ids| score_answer(question, ids));

            record_answer(question.kind.as_str());
            answers.push(Answer::new(
                &submission.id,
                &question.id,
                value,
                points,
                now,
            ));
        }

        submission.advance_to(step_number);

        let completed_now = step_number == total_steps;
        let destination = if completed_now {
            submission.mark_completed(now);
            Destination::Completed
        } else {
            Destination::Step(step_number + 1)
        };

        self.store.save_step(&submission, &answers).await?;

        match destination {
            Destination::Completed => {
                record_submission_event("completed");
                record_step_outcome("completed");
                tracing::info!(
                    submission_id = %submission.id,
                    answers = answers.len(),
                    duration_seconds = submission.duration_seconds,
                    "Submission completed"
                );
            }
            Destination::Step(next) => {
                record_step_outcome("advanced");
                tracing::info!(
                    submission_id = %submission.id,
                    step = step_number,
                    next,
                    answers = answers.len(),
                    "Step recorded"
                );
            }
        }

        Ok(StepSubmission {
            destination,
            completed_now,
        })
    }

    /// Terminal view data, or the place to send a respondent who is not
    /// actually done yet.
    pub async fn completion_view(
        &self,
        token: &str,
    ) -> Result<Result<CompletionView, Destination>, WorkflowError> {
        let (submission, questionnaire) = self.resolve(token).await?;

        if !submission.is_completed() {
            return Ok(Err(Destination::Step(submission.current_step)));
        }

        Ok(Ok(CompletionView {
            questionnaire_title: questionnaire.title,
            completed_at: submission.completed_at,
            duration_seconds: submission.duration_seconds,
        }))
    }
}

/// Coerces a raw JSON input into the typed value slot for a question, per
/// the question's declared kind. `None` means "skip": empty input, or a
/// value this kind cannot absorb (unparsable date, non-numeric number).
pub fn coerce_answer_value(question: &Question, raw: &Value) -> Option<AnswerValue> {
    if is_empty_input(raw) {
        return None;
    }

    match question.kind {
        QuestionKind::SingleChoice => as_choice_id(raw).map(|id| AnswerValue::Choices(vec![id])),
        QuestionKind::MultipleChoice => {
            let ids: Vec<i64> = raw.as_array()?.iter().filter_map(as_choice_id).collect();
            if ids.is_empty() {
                None
            } else {
                Some(AnswerValue::Choices(ids))
            }
        }
        QuestionKind::Number => as_integer(raw).map(AnswerValue::Number),
        QuestionKind::Date => {
            let text = raw.as_str()?;
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(AnswerValue::Date)
        }
        QuestionKind::FileUpload => raw.as_str().map(|name| AnswerValue::File(name.to_string())),
        QuestionKind::Text => Some(AnswerValue::Text(as_raw_text(raw))),
    }
}

fn is_empty_input(raw: &Value) -> bool {
    match raw {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn as_choice_id(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_raw_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChoiceOption, FileRules, QuestionnaireStep, SubmissionStatus};
    use crate::storage::memory::MemoryFormStore;
    use chrono::Duration;

    fn question(id: &str, kind: QuestionKind) -> Question {
        Question {
            id: id.to_string(),
            label: format!("Question {}", id),
            kind,
            required: false,
            points: None,
            options: Vec::new(),
            file_rules: None,
        }
    }

    fn quiz_question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            label: format!("Question {}", id),
            kind: QuestionKind::MultipleChoice,
            required: false,
            points: Some(10),
            options: vec![
                ChoiceOption {
                    id: 2,
                    label: "B".to_string(),
                    correct: true,
                },
                ChoiceOption {
                    id: 5,
                    label: "E".to_string(),
                    correct: true,
                },
                ChoiceOption {
                    id: 7,
                    label: "G".to_string(),
                    correct: false,
                },
            ],
            file_rules: None,
        }
    }

    fn three_step_questionnaire(allow_step_jump: bool) -> Questionnaire {
        Questionnaire {
            id: "form-1".to_string(),
            title: "Needs analysis".to_string(),
            description: None,
            active: true,
            allow_step_jump,
            steps: vec![
                QuestionnaireStep {
                    title: "About you".to_string(),
                    description: None,
                    questions: vec![
                        question("q1", QuestionKind::Text),
                        quiz_question("q2"),
                    ],
                },
                QuestionnaireStep {
                    title: "Details".to_string(),
                    description: None,
                    questions: vec![
                        question("q3", QuestionKind::Number),
                        question("q4", QuestionKind::Date),
                    ],
                },
                QuestionnaireStep {
                    title: "Documents".to_string(),
                    description: None,
                    questions: vec![Question {
                        file_rules: Some(FileRules {
                            allowed_extensions: vec!["pdf".to_string()],
                            max_size_bytes: None,
                        }),
                        ..question("q5", QuestionKind::FileUpload)
                    }],
                },
            ],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn seed(allow_step_jump: bool) -> (Arc<MemoryFormStore>, WorkflowService, String) {
        let store = Arc::new(MemoryFormStore::default());
        store
            .create_questionnaire(&three_step_questionnaire(allow_step_jump))
            .await
            .unwrap();

        let submission = Submission::new("form-1", "tok-1".to_string(), None, None);
        store.create_submission(&submission).await.unwrap();

        let service = WorkflowService::new(store.clone());
        (store, service, "tok-1".to_string())
    }

    fn client() -> ClientContext {
        ClientContext {
            ip: "1.2.3.4".to_string(),
            user_agent: None,
            trace_id: None,
        }
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (_store, service, _token) = seed(true).await;
        let err = service.resolve("missing").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound));
    }

    #[tokio::test]
    async fn expired_submission_is_inaccessible() {
        let (store, service, _token) = seed(true).await;
        let mut submission = Submission::new("form-1", "tok-exp".to_string(), None, None);
        submission.expires_at = Some(Utc::now() - Duration::seconds(5));
        store.create_submission(&submission).await.unwrap();

        let err = service.resolve("tok-exp").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Inaccessible));
    }

    #[tokio::test]
    async fn inactive_questionnaire_is_inaccessible() {
        let (store, service, token) = seed(true).await;
        let mut questionnaire = three_step_questionnaire(true);
        questionnaire.active = false;
        store.create_questionnaire(&questionnaire).await.unwrap();

        let err = service.resolve(&token).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Inaccessible));
    }

    #[tokio::test]
    async fn enter_starts_submission_once() {
        let (store, service, token) = seed(true).await;

        let destination = service.enter(&token, client()).await.unwrap();
        assert_eq!(destination, Destination::Step(1));

        let stored = store.submission_by_token(&token).await.unwrap();
        assert_eq!(stored.status, SubmissionStatus::InProgress);
        let started_at = stored.started_at.unwrap();

        service.enter(&token, client()).await.unwrap();
        let again = store.submission_by_token(&token).await.unwrap();
        assert_eq!(again.started_at, Some(started_at));
    }

    #[tokio::test]
    async fn forward_jump_redirects_to_current_step() {
        let (_store, service, token) = seed(false).await;

        let outcome = service.step_page(&token, 3, client()).await.unwrap();
        match outcome {
            StepOutcome::Redirect(Destination::Step(step)) => assert_eq!(step, 1),
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn forward_jump_allowed_when_flag_set() {
        let (_store, service, token) = seed(true).await;

        let outcome = service.step_page(&token, 3, client()).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Page(page) if page.step == 3));
    }

    #[tokio::test]
    async fn step_bounds_are_not_found() {
        let (_store, service, token) = seed(false).await;

        let err = service.step_page(&token, 0, client()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound));

        let err = service.step_page(&token, 4, client()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound));
    }

    #[tokio::test]
    async fn submit_advances_and_scores() {
        let (store, service, token) = seed(false).await;
        service.enter(&token, client()).await.unwrap();

        let mut form = StepForm::default();
        form.answers
            .insert("q1".to_string(), serde_json::json!("hello"));
        form.answers
            .insert("q2".to_string(), serde_json::json!([5, 2]));

        let result = service.submit_step(&token, 1, form).await.unwrap();
        assert_eq!(result.destination, Destination::Step(2));
        assert!(!result.completed_now);

        let submission = store.submission_by_token(&token).await.unwrap();
        assert_eq!(submission.current_step, 1);

        let answers = store.answers_for_submission(&submission.id).await.unwrap();
        assert_eq!(answers.len(), 2);
        let quiz = answers
            .iter()
            .find(|answer| answer.question_id == "q2")
            .unwrap();
        assert_eq!(quiz.points_earned, Some(10));
    }

    #[tokio::test]
    async fn final_step_completes_submission() {
        let (store, service, token) = seed(true).await;
        service.enter(&token, client()).await.unwrap();

        let mut form = StepForm::default();
        form.answers
            .insert("q5".to_string(), serde_json::json!("abc123_report.pdf"));

        let result = service.submit_step(&token, 3, form).await.unwrap();
        assert_eq!(result.destination, Destination::Completed);
        assert!(result.completed_now);

        let submission = store.submission_by_token(&token).await.unwrap();
        assert!(submission.is_completed());
        assert!(submission.completed_at.is_some());
        assert!(submission.duration_seconds.is_some());

        // Every later entry point redirects to the completed view.
        let outcome = service.step_page(&token, 1, client()).await.unwrap();
        assert!(matches!(
            outcome,
            StepOutcome::Redirect(Destination::Completed)
        ));
        assert_eq!(
            service.enter(&token, client()).await.unwrap(),
            Destination::Completed
        );
    }

    #[tokio::test]
    async fn completed_submission_rejects_answer_writes() {
        let (store, service, token) = seed(true).await;
        service.enter(&token, client()).await.unwrap();

        let mut form = StepForm::default();
        form.answers
            .insert("q5".to_string(), serde_json::json!("done.pdf"));
        service.submit_step(&token, 3, form).await.unwrap();

        let submission = store.submission_by_token(&token).await.unwrap();
        let before = store.answers_for_submission(&submission.id).await.unwrap();

        let mut late = StepForm::default();
        late.answers
            .insert("q1".to_string(), serde_json::json!("too late"));
        let result = service.submit_step(&token, 1, late).await.unwrap();
        assert_eq!(result.destination, Destination::Completed);
        assert!(!result.completed_now);

        let after = store.answers_for_submission(&submission.id).await.unwrap();
        assert_eq!(before.len(), after.len());
    }

    #[tokio::test]
    async fn repeated_final_post_does_not_complete_again() {
        let (_store, service, token) = seed(true).await;
        service.enter(&token, client()).await.unwrap();

        let mut form = StepForm::default();
        form.answers
            .insert("q5".to_string(), serde_json::json!("done.pdf"));
        let first = service.submit_step(&token, 3, form).await.unwrap();
        assert!(first.completed_now);

        let mut again = StepForm::default();
        again
            .answers
            .insert("q5".to_string(), serde_json::json!("done.pdf"));
        let second = service.submit_step(&token, 3, again).await.unwrap();
        assert_eq!(second.destination, Destination::Completed);
        assert!(!second.completed_now);
    }

    #[tokio::test]
    async fn empty_required_input_is_skipped() {
        let (store, service, token) = seed(true).await;
        service.enter(&token, client()).await.unwrap();

        let mut form = StepForm::default();
        form.answers.insert("q1".to_string(), serde_json::json!(""));

        let result = service.submit_step(&token, 1, form).await.unwrap();
        assert_eq!(result.destination, Destination::Step(2));

        let submission = store.submission_by_token(&token).await.unwrap();
        let answers = store.answers_for_submission(&submission.id).await.unwrap();
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn foreign_question_ids_are_ignored() {
        let (store, service, token) = seed(true).await;
        service.enter(&token, client()).await.unwrap();

        let mut form = StepForm::default();
        // q3 belongs to step 2, not step 1.
        form.answers.insert("q3".to_string(), serde_json::json!(42));
        form.answers
            .insert("ghost".to_string(), serde_json::json!("x"));

        service.submit_step(&token, 1, form).await.unwrap();

        let submission = store.submission_by_token(&token).await.unwrap();
        let answers = store.answers_for_submission(&submission.id).await.unwrap();
        assert!(answers.is_empty());
    }

    #[tokio::test]
    async fn completion_view_redirects_unfinished_submission() {
        let (_store, service, token) = seed(true).await;
        service.enter(&token, client()).await.unwrap();

        let view = service.completion_view(&token).await.unwrap();
        assert!(matches!(view, Err(Destination::Step(1))));
    }

    #[test]
    fn coercion_single_choice_wraps_scalar() {
        let q = question("q", QuestionKind::SingleChoice);
        assert_eq!(
            coerce_answer_value(&q, &serde_json::json!(3)),
            Some(AnswerValue::Choices(vec![3]))
        );
        assert_eq!(
            coerce_answer_value(&q, &serde_json::json!("7")),
            Some(AnswerValue::Choices(vec![7]))
        );
        assert_eq!(coerce_answer_value(&q, &serde_json::json!("abc")), None);
    }

    #[test]
    fn coercion_multiple_choice_drops_non_numeric() {
        let q = question("q", QuestionKind::MultipleChoice);
        assert_eq!(
            coerce_answer_value(&q, &serde_json::json!([2, "5", "x"])),
            Some(AnswerValue::Choices(vec![2, 5]))
        );
        assert_eq!(coerce_answer_value(&q, &serde_json::json!([])), None);
        assert_eq!(coerce_answer_value(&q, &serde_json::json!(["x"])), None);
    }

    #[test]
    fn coercion_number_rejects_non_numeric() {
        let q = question("q", QuestionKind::Number);
        assert_eq!(
            coerce_answer_value(&q, &serde_json::json!("12")),
            Some(AnswerValue::Number(12))
        );
        assert_eq!(coerce_answer_value(&q, &serde_json::json!("")), None);
        assert_eq!(coerce_answer_value(&q, &serde_json::json!("twelve")), None);
    }

    #[test]
    fn coercion_bad_date_is_skipped() {
        let q = question("q", QuestionKind::Date);
        assert_eq!(
            coerce_answer_value(&q, &serde_json::json!("2024-03-15")),
            Some(AnswerValue::Date(
                NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
            ))
        );
        assert_eq!(coerce_answer_value(&q, &serde_json::json!("15/03/2024")), None);
        assert_eq!(coerce_answer_value(&q, &serde_json::json!("not a date")), None);
    }

    #[test]
    fn coercion_text_takes_raw_string() {
        let q = question("q", QuestionKind::Text);
        assert_eq!(
            coerce_answer_value(&q, &serde_json::json!("  free text ")),
            Some(AnswerValue::Text("  free text ".to_string()))
        );
        assert_eq!(coerce_answer_value(&q, &serde_json::json!(null)), None);
    }
}
