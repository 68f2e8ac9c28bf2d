//! In-process fake of the Kakao token and token-info endpoints for tests.
//!
//! Replies are scripted per endpoint in FIFO order; an unscripted call gets a
//! 500 so a test that makes an unexpected request fails loudly.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::Secret;
use tokio::net::TcpListener;

use crate::constants::{BOOTSTRAP_REFRESH_HEADER, Endpoints};
use crate::error::{Error, Result};
use crate::sink::SecretSink;

/// One scripted HTTP reply.
#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    body: serde_json::Value,
    refresh_header: Option<String>,
}

impl Reply {
    pub fn ok(body: serde_json::Value) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            refresh_header: None,
        }
    }

    pub fn with_refresh_header(mut self, value: &str) -> Self {
        self.refresh_header = Some(value.to_string());
        self
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, axum::Json(self.body)).into_response();
        if let Some(value) = self.refresh_header {
            response.headers_mut().insert(
                BOOTSTRAP_REFRESH_HEADER,
                HeaderValue::from_str(&value).unwrap(),
            );
        }
        response
    }
}

#[derive(Default)]
struct FakeState {
    token_replies: VecDeque<Reply>,
    probe_replies: VecDeque<Reply>,
    token_requests: Vec<HashMap<String, String>>,
    probe_tokens: Vec<String>,
}

/// Scripted fake Kakao auth server. Clones share state.
#[derive(Clone, Default)]
pub struct FakeKakao {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeKakao {
    pub fn push_token(&self, reply: Reply) {
        self.inner.lock().unwrap().token_replies.push_back(reply);
    }

    pub fn push_probe(&self, reply: Reply) {
        self.inner.lock().unwrap().probe_replies.push_back(reply);
    }

    /// Form bodies received by the token endpoint, in order.
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.inner.lock().unwrap().token_requests.clone()
    }

    /// Bearer tokens presented to the probe endpoint, in order.
    pub fn probe_tokens(&self) -> Vec<String> {
        self.inner.lock().unwrap().probe_tokens.clone()
    }

    /// Bind to an ephemeral port and serve until the test ends.
    pub async fn start(&self) -> Endpoints {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = axum::Router::new()
            .route("/oauth/token", post(token_handler))
            .route("/v1/user/access_token_info", get(probe_handler))
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Endpoints::with_base(&format!("http://{addr}"))
    }
}

async fn token_handler(
    State(fake): State<FakeKakao>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let reply = {
        let mut state = fake.inner.lock().unwrap();
        state.token_requests.push(form);
        state.token_replies.pop_front()
    };
    reply
        .unwrap_or_else(|| Reply::status(500, serde_json::json!({"error": "unscripted"})))
        .into_response()
}

async fn probe_handler(State(fake): State<FakeKakao>, headers: HeaderMap) -> Response {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    let reply = {
        let mut state = fake.inner.lock().unwrap();
        state.probe_tokens.push(token);
        state.probe_replies.pop_front()
    };
    reply
        .unwrap_or_else(|| Reply::status(500, serde_json::json!({"error": "unscripted"})))
        .into_response()
}

/// Sink that records what it was asked to persist, optionally failing.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub persisted: Arc<Mutex<Vec<(String, String)>>>,
    pub fail: bool,
}

impl SecretSink for RecordingSink {
    fn persist<'a>(
        &'a self,
        name: &'a str,
        value: &'a Secret<String>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if self.fail {
                return Err(Error::Sink(format!("refusing to persist {name}")));
            }
            self.persisted
                .lock()
                .unwrap()
                .push((name.to_string(), value.expose().clone()));
            Ok(())
        })
    }
}
