//! In-process identity provider for tests.
//!
//! Responds to refresh requests based on the refresh token it receives:
//! - `rt_bad*` → 401 `invalid_grant`
//! - `rt_error*` → 500
//! - `rt_slow*` → success after a 50ms delay
//! - anything else → 200 with `access_token = "at_" + rest` and the refresh
//!   token rotated to `<token>.next`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::client_id::FixedClientId;
use crate::token::TokenRefresher;

#[derive(Default)]
struct Recorded {
    hits: AtomicUsize,
    last_client_id: Mutex<Option<String>>,
}

/// Mock token endpoint bound to `127.0.0.1:0`. The server task is aborted on drop.
pub struct MockTokenEndpoint {
    url: String,
    recorded: Arc<Recorded>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock token endpoint");
        let addr = listener.local_addr().expect("mock endpoint address");
        let recorded = Arc::new(Recorded::default());

        let app = axum::Router::new()
            .route("/token", axum::routing::post(token_handler))
            .with_state(recorded.clone());
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            url: format!("http://{addr}/token"),
            recorded,
            handle,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of refresh requests received.
    pub fn hits(&self) -> usize {
        self.recorded.hits.load(Ordering::SeqCst)
    }

    /// `client_id` form field of the most recent request.
    pub fn last_client_id(&self) -> Option<String> {
        self.recorded
            .last_client_id
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
    }

    /// Refresher pointed at this endpoint with a fixed test client id.
    pub fn refresher(&self) -> TokenRefresher {
        TokenRefresher::new(
            reqwest::Client::new(),
            self.url.clone(),
            &FixedClientId("client_01TESTCLIENT".into()),
        )
        .with_timeout(Duration::from_secs(5))
    }
}

impl Drop for MockTokenEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn token_handler(
    State(recorded): State<Arc<Recorded>>,
    axum::Form(form): axum::Form<HashMap<String, String>>,
) -> Response {
    recorded.hits.fetch_add(1, Ordering::SeqCst);
    if let Ok(mut last) = recorded.last_client_id.lock() {
        *last = form.get("client_id").cloned();
    }

    if form.get("grant_type").map(String::as_str) != Some("refresh_token") {
        return (StatusCode::BAD_REQUEST, "unsupported grant_type").into_response();
    }
    let refresh_token = form.get("refresh_token").cloned().unwrap_or_default();

    if refresh_token.starts_with("rt_bad") {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "refresh token is invalid"
            })),
        )
            .into_response();
    }
    if refresh_token.starts_with("rt_error") {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream unavailable").into_response();
    }
    if refresh_token.starts_with("rt_slow") {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let suffix = refresh_token
        .strip_prefix("rt_")
        .unwrap_or(refresh_token.as_str());
    axum::Json(serde_json::json!({
        "access_token": format!("at_{suffix}"),
        "refresh_token": format!("{refresh_token}.next"),
        "user": {
            "id": "user_01TEST",
            "email": "dev@example.com",
            "first_name": "Test",
            "last_name": "User"
        },
        "organization_id": "org_01TEST"
    }))
    .into_response()
}
