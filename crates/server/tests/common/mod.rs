//! Common test utilities for API testing with mock providers.
//!
//! The fixture builds the full router in-process around a dispatcher whose
//! providers are `MockProvider`s, so no yt-dlp binary or network is needed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use tubeline_core::testing::MockProvider;
use tubeline_core::{
    Config, DownloadDispatcher, JobHistory, JobSnapshot, Provider, SqliteJobHistory,
};
use tubeline_server::state::AppState;

/// Re-export fixtures for test convenience
pub use tubeline_core::testing::fixtures;

/// Test fixture for API testing with mock providers.
pub struct TestFixture {
    pub router: Router,
    pub dispatcher: Arc<DownloadDispatcher>,
    pub primary: Arc<MockProvider>,
    pub secondary: Option<Arc<MockProvider>>,
    /// Download directory served under `/files`
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Attach a secondary mock provider
    pub with_secondary: bool,
    /// Record finished jobs in an in-memory history
    pub with_history: bool,
}

impl TestFixture {
    /// Create a fixture whose primary succeeds immediately.
    pub fn new() -> Self {
        Self::with_primary(MockProvider::new("primary"), TestConfig::default())
    }

    /// Create a fixture around a preconfigured primary mock.
    pub fn with_primary(primary: MockProvider, test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.downloads.dir = temp_dir.path().to_path_buf();

        let primary = Arc::new(primary);
        let secondary = test_config
            .with_secondary
            .then(|| Arc::new(MockProvider::new("secondary")));

        let mut dispatcher = DownloadDispatcher::new(
            fixtures::fast_config(temp_dir.path()),
            Arc::clone(&primary) as Arc<dyn Provider>,
            secondary
                .as_ref()
                .map(|s| Arc::clone(s) as Arc<dyn Provider>),
        );
        if test_config.with_history {
            let history: Arc<dyn JobHistory> = Arc::new(
                SqliteJobHistory::in_memory().expect("Failed to create history"),
            );
            dispatcher = dispatcher.with_history(history);
        }
        let dispatcher = Arc::new(dispatcher);

        let state = Arc::new(AppState::new(config, Arc::clone(&dispatcher)));
        let router = tubeline_server::api::create_router(state);

        Self {
            router,
            dispatcher,
            primary,
            secondary,
            temp_dir,
        }
    }

    /// Wait until a job reaches a terminal state.
    pub async fn wait_terminal(&self, job_id: &str) -> JobSnapshot {
        let dispatcher = Arc::clone(&self.dispatcher);
        fixtures::wait_for_terminal(Duration::from_secs(5), || dispatcher.status(job_id).ok())
            .await
            .expect("job did not finish in time")
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
