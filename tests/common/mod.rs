//! Shared harness for HTTP integration tests.
//!
//! Every [`TestApp`] runs the full router against its own in-memory store on
//! an ephemeral port, with a shuffler that keeps candidates in ascending id
//! order so reviewer choices are predictable.

#![allow(dead_code)]

use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

use rota::engine::{ReviewService, Shuffler};
use rota::store::{MemoryStore, ReviewStore};
use rota::{create_router, AppState, Config};

/// Leaves candidates sorted, so the lowest ids are always picked first.
pub struct SortedShuffler;

impl Shuffler for SortedShuffler {
    fn shuffle(&self, _ids: &mut [String]) {}
}

pub struct TestApp {
    pub client: Client,
    pub base_url: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_store(Arc::new(MemoryStore::new())).await
    }

    pub async fn spawn_with_store(store: Arc<dyn ReviewStore>) -> Self {
        let config = Config::default_for_testing();
        let service = ReviewService::builder(store)
            .shuffler(Arc::new(SortedShuffler))
            .timeouts(config.timeouts.operations())
            .build();
        let state = AppState::new(Arc::new(service), &config);
        let app = create_router(state, &config);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://127.0.0.1:{}", port),
        }
    }

    /// Random suffix so names never collide across tests.
    pub fn unique(prefix: &str) -> String {
        format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    /// Creates `team_name` with one active member per `(user_id, username)`.
    pub async fn create_team(&self, team_name: &str, members: &[(&str, &str)]) -> Value {
        let members: Vec<Value> = members
            .iter()
            .map(|(user_id, username)| {
                json!({"user_id": user_id, "username": username, "is_active": true})
            })
            .collect();

        let response = self
            .post(
                "/team/add",
                json!({"team_name": team_name, "members": members}),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "team creation failed");
        response.json().await.expect("Failed to parse team")
    }

    pub async fn create_pull_request(&self, pull_request_id: &str, author_id: &str) -> Value {
        let response = self
            .post(
                "/pullRequest/create",
                json!({
                    "pull_request_id": pull_request_id,
                    "pull_request_name": format!("Change {}", pull_request_id),
                    "author_id": author_id
                }),
            )
            .await;
        assert_eq!(response.status().as_u16(), 201, "pull request creation failed");
        let body: Value = response.json().await.expect("Failed to parse pull request");
        body["pr"].clone()
    }
}

/// Reviewer ids of a serialized pull request.
pub fn reviewers(pr: &Value) -> Vec<String> {
    pr["assigned_reviewers"]
        .as_array()
        .expect("assigned_reviewers missing")
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect()
}

/// Error code of an `{"error": {...}}` body.
pub async fn error_code(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse error body");
    body["error"]["code"].as_str().unwrap_or_default().to_string()
}

#[macro_export]
macro_rules! assert_status {
    ($response:expr, $expected:expr) => {
        assert_eq!(
            $response.status().as_u16(),
            $expected,
            "Expected status {}, got {}",
            $expected,
            $response.status()
        );
    };
}
