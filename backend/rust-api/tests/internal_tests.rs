use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::FORM_FREE;

fn authed_post(uri: &str, jwt: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {}", jwt))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed_get(uri: &str, jwt: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", jwt))
        .body(Body::empty())
        .unwrap()
}

fn questionnaire_payload() -> serde_json::Value {
    json!({
        "title": "Post-training evaluation",
        "allow_step_jump": false,
        "steps": [
            {
                "title": "Knowledge check",
                "questions": [
                    {
                        "id": "quiz",
                        "label": "What did the module cover?",
                        "kind": "multiple_choice",
                        "points": 10,
                        "options": [
                            { "id": 1, "label": "A", "correct": true },
                            { "id": 2, "label": "B", "correct": false }
                        ]
                    },
                    { "id": "comments", "label": "Comments", "kind": "text" }
                ]
            }
        ]
    })
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn internal_surface_requires_a_bearer_token() {
    let app = common::create_test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/internal/questionnaires")
                .header("content-type", "application/json")
                .body(Body::from(questionnaire_payload().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_staff_roles_are_forbidden() {
    let app = common::create_test_app().await;
    let jwt = common::token_with_role(&app.jwt_secret, "respondent");

    let response = app
        .router
        .clone()
        .oneshot(authed_post(
            "/internal/questionnaires",
            &jwt,
            questionnaire_payload(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn questionnaire_create_and_fetch_round_trip() {
    let app = common::create_test_app().await;
    let jwt = common::staff_token(&app.jwt_secret);

    let response = app
        .router
        .clone()
        .oneshot(authed_post(
            "/internal/questionnaires",
            &jwt,
            questionnaire_payload(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["total_steps"], 1);

    let response = app
        .router
        .clone()
        .oneshot(authed_get(
            &format!("/internal/questionnaires/{}", id),
            &jwt,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = json_body(response).await;
    assert_eq!(fetched["title"], "Post-training evaluation");
    assert_eq!(fetched["allow_step_jump"], false);
}

#[tokio::test]
async fn incoherent_questionnaires_are_rejected() {
    let app = common::create_test_app().await;
    let jwt = common::staff_token(&app.jwt_secret);

    let cases = [
        json!({ "title": "", "steps": [] }),
        // choice question without options
        json!({
            "title": "Broken",
            "steps": [{ "title": "S1", "questions": [
                { "label": "Pick", "kind": "single_choice" }
            ]}]
        }),
        // text question with options
        json!({
            "title": "Broken",
            "steps": [{ "title": "S1", "questions": [
                { "label": "Say", "kind": "text",
                  "options": [{ "id": 1, "label": "A" }] }
            ]}]
        }),
        // duplicate question ids
        json!({
            "title": "Broken",
            "steps": [{ "title": "S1", "questions": [
                { "id": "dup", "label": "One", "kind": "text" },
                { "id": "dup", "label": "Two", "kind": "text" }
            ]}]
        }),
    ];

    for payload in cases {
        let response = app
            .router
            .clone()
            .oneshot(authed_post("/internal/questionnaires", &jwt, payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn invitation_returns_a_working_public_link() {
    let app = common::create_test_app().await;
    let jwt = common::staff_token(&app.jwt_secret);

    let response = app
        .router
        .clone()
        .oneshot(authed_post(
            &format!("/internal/questionnaires/{}/invitations", FORM_FREE),
            &jwt,
            json!({ "respondent": "jane@example.com", "valid_for_hours": 72 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let invitation = json_body(response).await;

    let token = invitation["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 43);
    assert!(invitation["url"]
        .as_str()
        .unwrap()
        .ends_with(&format!("/form/{}", token)));
    assert!(invitation["expires_at"].is_string());

    // The issued link enters the flow
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/form/{}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn invitations_to_unknown_or_inactive_forms_fail() {
    let app = common::create_test_app().await;
    let jwt = common::staff_token(&app.jwt_secret);

    let response = app
        .router
        .clone()
        .oneshot(authed_post(
            "/internal/questionnaires/no-such-form/invitations",
            &jwt,
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_aggregates_answers_score_and_gaps() {
    let app = common::create_test_app().await;
    let jwt = common::staff_token(&app.jwt_secret);
    let token = common::issue_submission(&app.store, FORM_FREE).await;

    // Walk the form: skip the required name, answer the quiz correctly,
    // miss the single-choice points.
    let step1 = Request::builder()
        .method("POST")
        .uri(format!("/form/{}/step/1", token))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "answers": { "q_quiz": [2, 5], "q_pick": 2 } }).to_string(),
        ))
        .unwrap();
    app.router.clone().oneshot(step1).await.unwrap();

    let step3 = Request::builder()
        .method("POST")
        .uri(format!("/form/{}/step/3", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "answers": {} }).to_string()))
        .unwrap();
    app.router.clone().oneshot(step3).await.unwrap();

    let response = app
        .router
        .clone()
        .oneshot(authed_get(
            &format!("/internal/submissions/{}/report", token),
            &jwt,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;

    assert_eq!(report["status"], "completed");
    assert_eq!(report["total_steps"], 3);
    assert_eq!(report["score"]["earned"], 10);
    assert_eq!(report["score"]["possible"], 15);

    let entries = report["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 6);
    let quiz_entry = entries
        .iter()
        .find(|entry| entry["question_id"] == "q_quiz")
        .unwrap();
    assert_eq!(quiz_entry["points_earned"], 10);

    let gaps: Vec<&str> = report["unanswered_required"]
        .as_array()
        .unwrap()
        .iter()
        .map(|value| value.as_str().unwrap())
        .collect();
    assert_eq!(gaps, vec!["q_name"]);
}
