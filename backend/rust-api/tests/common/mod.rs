#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use eprofos_forms_api::{
    config::Config,
    create_router,
    middlewares::auth::{JwtClaims, JwtService},
    models::{
        ChoiceOption, FileRules, Question, QuestionKind, Questionnaire, QuestionnaireStep,
        Submission,
    },
    services::AppState,
    storage::{memory::MemoryFormStore, FormStore},
    utils::token::generate_form_token,
};

/// Questionnaire with free navigation between steps.
pub const FORM_FREE: &str = "form-free";
/// Questionnaire that denies forward jumps past the reached step.
pub const FORM_LOCKED: &str = "form-locked";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryFormStore>,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
}

pub async fn create_test_app() -> TestApp {
    let dir = std::env::temp_dir().join(format!("eprofos-test-{}", uuid::Uuid::new_v4()));
    create_test_app_with_upload_dir(&dir).await
}

pub async fn create_test_app_with_upload_dir(upload_dir: &Path) -> TestApp {
    // Initialize tracing for tests
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let mut config = Config::load().expect("Failed to load test configuration");
    config.upload_dir = upload_dir.to_string_lossy().to_string();
    let jwt_secret = config.jwt_secret.clone();

    let store = Arc::new(MemoryFormStore::default());
    seed_questionnaires(store.as_ref()).await;

    let app_state = Arc::new(
        AppState::new(config, store.clone())
            .await
            .expect("Failed to initialize test app state"),
    );

    TestApp {
        router: create_router(app_state),
        store,
        jwt_secret,
        upload_dir: upload_dir.to_path_buf(),
    }
}

/// Three steps covering every question kind: a text + quiz step, a
/// number + date step, and a file-upload step.
fn three_step_questionnaire(id: &str, allow_step_jump: bool) -> Questionnaire {
    Questionnaire {
        id: id.to_string(),
        title: "Training needs analysis".to_string(),
        description: Some("Tell us about your training needs".to_string()),
        active: true,
        allow_step_jump,
        steps: vec![
            QuestionnaireStep {
                title: "About you".to_string(),
                description: None,
                questions: vec![
                    Question {
                        id: "q_name".to_string(),
                        label: "Your full name".to_string(),
                        kind: QuestionKind::Text,
                        required: true,
                        points: None,
                        options: Vec::new(),
                        file_rules: None,
                    },
                    Question {
                        id: "q_quiz".to_string(),
                        label: "Which topics did the intro cover?".to_string(),
                        kind: QuestionKind::MultipleChoice,
                        required: false,
                        points: Some(10),
                        options: vec![
                            ChoiceOption {
                                id: 2,
                                label: "Safety basics".to_string(),
                                correct: true,
                            },
                            ChoiceOption {
                                id: 5,
                                label: "Equipment care".to_string(),
                                correct: true,
                            },
                            ChoiceOption {
                                id: 7,
                                label: "Advanced welding".to_string(),
                                correct: false,
                            },
                        ],
                        file_rules: None,
                    },
                    Question {
                        id: "q_pick".to_string(),
                        label: "Preferred session format".to_string(),
                        kind: QuestionKind::SingleChoice,
                        required: false,
                        points: Some(5),
                        options: vec![
                            ChoiceOption {
                                id: 1,
                                label: "On site".to_string(),
                                correct: true,
                            },
                            ChoiceOption {
                                id: 2,
                                label: "Remote".to_string(),
                                correct: false,
                            },
                        ],
                        file_rules: None,
                    },
                ],
            },
            QuestionnaireStep {
                title: "Details".to_string(),
                description: None,
                questions: vec![
                    Question {
                        id: "q_count".to_string(),
                        label: "How many trainees?".to_string(),
                        kind: QuestionKind::Number,
                        required: false,
                        points: None,
                        options: Vec::new(),
                        file_rules: None,
                    },
                    Question {
                        id: "q_start".to_string(),
                        label: "Preferred start date".to_string(),
                        kind: QuestionKind::Date,
                        required: false,
                        points: None,
                        options: Vec::new(),
                        file_rules: None,
                    },
                ],
            },
            QuestionnaireStep {
                title: "Documents".to_string(),
                description: None,
                questions: vec![Question {
                    id: "q_file".to_string(),
                    label: "Attach your training plan".to_string(),
                    kind: QuestionKind::FileUpload,
                    required: false,
                    points: None,
                    options: Vec::new(),
                    file_rules: Some(FileRules {
                        allowed_extensions: vec!["pdf".to_string(), "docx".to_string()],
                        max_size_bytes: Some(1024 * 1024),
                    }),
                }],
            },
        ],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn seed_questionnaires(store: &MemoryFormStore) {
    store
        .create_questionnaire(&three_step_questionnaire(FORM_FREE, true))
        .await
        .unwrap();
    store
        .create_questionnaire(&three_step_questionnaire(FORM_LOCKED, false))
        .await
        .unwrap();
}

/// Issues a submission against a seeded questionnaire, returning its token.
pub async fn issue_submission(store: &MemoryFormStore, questionnaire_id: &str) -> String {
    issue_submission_expiring(store, questionnaire_id, None).await
}

pub async fn issue_submission_expiring(
    store: &MemoryFormStore,
    questionnaire_id: &str,
    expires_at: Option<DateTime<Utc>>,
) -> String {
    let token = generate_form_token();
    let submission = Submission::new(questionnaire_id, token.clone(), None, expires_at);
    store.create_submission(&submission).await.unwrap();
    token
}

pub fn staff_token(jwt_secret: &str) -> String {
    token_with_role(jwt_secret, "staff")
}

pub fn token_with_role(jwt_secret: &str, role: &str) -> String {
    let service = JwtService::new(jwt_secret);
    service
        .generate_token(JwtClaims {
            sub: "staff-tester".to_string(),
            role: role.to_string(),
            exp: (Utc::now().timestamp() + 3600) as usize,
            iat: Utc::now().timestamp() as usize,
        })
        .unwrap()
}
