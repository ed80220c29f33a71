//! Pull request lifecycle integration tests.

mod common;

use common::{error_code, reviewers, TestApp};
use serde_json::{json, Value};

async fn backend_team(app: &TestApp) {
    app.create_team(
        "backend",
        &[("u1", "Alice"), ("u2", "Bob"), ("u3", "Carol"), ("u4", "Dave")],
    )
    .await;
}

#[tokio::test]
async fn create_pull_request_assigns_two_teammates() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;

    let pr = app.create_pull_request("pr-1", "u1").await;

    assert_eq!(pr["pull_request_id"], "pr-1");
    assert_eq!(pr["status"], "OPEN");
    assert_eq!(pr["author_id"], "u1");
    assert_eq!(reviewers(&pr), vec!["u2".to_string(), "u3".to_string()]);
    assert!(pr["createdAt"].is_string());
    assert!(pr.get("mergedAt").is_none());
}

#[tokio::test]
async fn create_pull_request_for_solo_author_has_no_reviewers() {
    let app = TestApp::spawn().await;
    app.create_team("solo", &[("u1", "Alice")]).await;

    let pr = app.create_pull_request("pr-1", "u1").await;

    assert!(reviewers(&pr).is_empty());
}

#[tokio::test]
async fn create_duplicate_pull_request_returns_conflict() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;

    let response = app
        .post(
            "/pullRequest/create",
            json!({"pull_request_id": "pr-1", "pull_request_name": "Again", "author_id": "u2"}),
        )
        .await;

    assert_status!(response, 409);
    assert_eq!(error_code(response).await, "PR_EXISTS");
}

#[tokio::test]
async fn create_pull_request_with_unknown_author_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/pullRequest/create",
            json!({"pull_request_id": "pr-1", "pull_request_name": "Fix", "author_id": "ghost"}),
        )
        .await;

    assert_status!(response, 404);
    assert_eq!(error_code(response).await, "NOT_FOUND");
}

#[tokio::test]
async fn create_pull_request_with_missing_name_returns_validation_error() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;

    let response = app
        .post(
            "/pullRequest/create",
            json!({"pull_request_id": "pr-1", "author_id": "u1"}),
        )
        .await;

    assert_status!(response, 400);
    assert_eq!(error_code(response).await, "VALIDATION_ERROR");
}

#[tokio::test]
async fn merge_is_idempotent() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;

    let first = app
        .post("/pullRequest/merge", json!({"pull_request_id": "pr-1"}))
        .await;
    assert_status!(first, 200);
    let first: Value = first.json().await.unwrap();

    let second = app
        .post("/pullRequest/merge", json!({"pull_request_id": "pr-1"}))
        .await;
    assert_status!(second, 200);
    let second: Value = second.json().await.unwrap();

    assert_eq!(first["pr"]["status"], "MERGED");
    assert!(first["pr"]["mergedAt"].is_string());
    assert_eq!(first["pr"]["mergedAt"], second["pr"]["mergedAt"]);
    assert_eq!(
        reviewers(&first["pr"]),
        vec!["u2".to_string(), "u3".to_string()]
    );
}

#[tokio::test]
async fn merge_unknown_pull_request_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post("/pullRequest/merge", json!({"pull_request_id": "pr-404"}))
        .await;

    assert_status!(response, 404);
    assert_eq!(error_code(response).await, "NOT_FOUND");
}

#[tokio::test]
async fn reassign_replaces_reviewer_with_teammate() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;

    let response = app
        .post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
        )
        .await;

    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["replaced_by"], "u4");
    assert_eq!(
        reviewers(&body["pr"]),
        vec!["u3".to_string(), "u4".to_string()]
    );
}

#[tokio::test]
async fn reassign_accepts_old_reviewer_id_field() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;

    let response = app
        .post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_reviewer_id": "u3"}),
        )
        .await;

    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["replaced_by"], "u4");
}

#[tokio::test]
async fn reassign_without_candidate_returns_conflict_and_keeps_reviewers() {
    let app = TestApp::spawn().await;
    app.create_team("trio", &[("u1", "Alice"), ("u2", "Bob"), ("u3", "Carol")])
        .await;
    app.create_pull_request("pr-1", "u1").await;

    let response = app
        .post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
        )
        .await;

    assert_status!(response, 409);
    assert_eq!(error_code(response).await, "NO_CANDIDATE");

    let response = app.get("/users/getReview?user_id=u2").await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pull_requests"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn reassign_on_merged_pull_request_returns_conflict() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;
    app.post("/pullRequest/merge", json!({"pull_request_id": "pr-1"}))
        .await;

    let response = app
        .post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
        )
        .await;

    assert_status!(response, 409);
    assert_eq!(error_code(response).await, "PR_MERGED");
}

#[tokio::test]
async fn reassign_unassigned_user_returns_conflict() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;

    let response = app
        .post(
            "/pullRequest/reassign",
            json!({"pull_request_id": "pr-1", "old_user_id": "u4"}),
        )
        .await;

    assert_status!(response, 409);
    assert_eq!(error_code(response).await, "NOT_ASSIGNED");
}

#[tokio::test]
async fn history_records_every_reviewer_change() {
    let app = TestApp::spawn().await;
    backend_team(&app).await;
    app.create_pull_request("pr-1", "u1").await;
    app.post(
        "/pullRequest/reassign",
        json!({"pull_request_id": "pr-1", "old_user_id": "u2"}),
    )
    .await;

    let response = app.get("/pullRequest/history?pull_request_id=pr-1").await;

    assert_status!(response, 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["pull_request_id"], "pr-1");
    let events: Vec<(String, String, String)> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["reviewer_id"].as_str().unwrap().to_string(),
                e["event_type"].as_str().unwrap().to_string(),
                e["source"].as_str().unwrap().to_string(),
            )
        })
        .collect();

    assert_eq!(events.len(), 4);
    assert_eq!(
        events[2],
        ("u2".to_string(), "UNASSIGNED".to_string(), "MANUAL_REASSIGN".to_string())
    );
    assert_eq!(
        events[3],
        ("u4".to_string(), "ASSIGNED".to_string(), "MANUAL_REASSIGN".to_string())
    );
    assert!(events[..2]
        .iter()
        .all(|(_, kind, source)| kind == "ASSIGNED" && source == "AUTO_ASSIGN"));
}

#[tokio::test]
async fn history_for_unknown_pull_request_returns_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get("/pullRequest/history?pull_request_id=pr-404").await;

    assert_status!(response, 404);
    assert_eq!(error_code(response).await, "NOT_FOUND");
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/pullRequest/create", app.base_url))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}
