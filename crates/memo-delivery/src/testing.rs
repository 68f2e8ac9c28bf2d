//! In-process fake of the Kakao endpoints the delivery loop touches.
//!
//! Send replies are scripted as status codes in FIFO order; once the script
//! runs out every send succeeds. Token replies are scripted JSON bodies and
//! the validity probe always answers 200, so a seeded access token is used
//! as-is until a send rejects it.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use common::Secret;
use kakao_auth::Endpoints;
use tokio::net::TcpListener;

use crate::source::{TokenFuture, TokenSource};

/// One request received by the send endpoint.
#[derive(Debug, Clone)]
pub struct SentMemo {
    pub token: String,
    pub text: String,
}

#[derive(Default)]
struct FakeState {
    send_replies: VecDeque<u16>,
    send_delay: Option<Duration>,
    token_replies: VecDeque<(u16, serde_json::Value)>,
    sends: Vec<SentMemo>,
    token_requests: Vec<HashMap<String, String>>,
}

/// Scripted fake Kakao API. Clones share state.
#[derive(Clone, Default)]
pub struct FakeKakaoApi {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeKakaoApi {
    pub fn push_send(&self, status: u16) {
        self.inner.lock().unwrap().send_replies.push_back(status);
    }

    /// Delay every send reply, for timeout tests.
    pub fn delay_sends(&self, delay: Duration) {
        self.inner.lock().unwrap().send_delay = Some(delay);
    }

    pub fn push_token(&self, status: u16, body: serde_json::Value) {
        self.inner
            .lock()
            .unwrap()
            .token_replies
            .push_back((status, body));
    }

    pub fn sends(&self) -> Vec<SentMemo> {
        self.inner.lock().unwrap().sends.clone()
    }

    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.inner.lock().unwrap().token_requests.clone()
    }

    /// Bind to an ephemeral port and serve until the test ends.
    pub async fn start(&self) -> Endpoints {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = axum::Router::new()
            .route("/v2/api/talk/memo/default/send", post(send_handler))
            .route("/oauth/token", post(token_handler))
            .route(
                "/v1/user/access_token_info",
                get(|| async { axum::Json(serde_json::json!({"id": 1})) }),
            )
            .with_state(self.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Endpoints::with_base(&format!("http://{addr}"))
    }
}

async fn send_handler(
    State(fake): State<FakeKakaoApi>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string();
    let text = form
        .get("template_object")
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
        .and_then(|t| t["text"].as_str().map(str::to_string))
        .unwrap_or_default();

    let (status, delay) = {
        let mut state = fake.inner.lock().unwrap();
        state.sends.push(SentMemo { token, text });
        (state.send_replies.pop_front().unwrap_or(200), state.send_delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = if status.is_success() {
        serde_json::json!({"result_code": 0})
    } else {
        serde_json::json!({"msg": "scripted failure", "code": -(status.as_u16() as i64)})
    };
    (status, axum::Json(body)).into_response()
}

async fn token_handler(
    State(fake): State<FakeKakaoApi>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let reply = {
        let mut state = fake.inner.lock().unwrap();
        state.token_requests.push(form);
        state.token_replies.pop_front()
    };
    let (status, body) =
        reply.unwrap_or((500, serde_json::json!({"error": "unscripted"})));
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, axum::Json(body)).into_response()
}

/// Token source handing out `at_0`, `at_1`, ... and counting calls.
#[derive(Default)]
pub struct CountingSource {
    pub issued: u32,
    pub ensure_calls: u32,
    pub forced: u32,
    /// Make `force_renewal` fail with `CredentialsExhausted`
    pub fail_renewal: bool,
}

impl CountingSource {
    fn current(&self) -> Secret<String> {
        Secret::new(format!("at_{}", self.issued))
    }
}

impl TokenSource for CountingSource {
    fn ensure_valid_token(&mut self) -> TokenFuture<'_> {
        Box::pin(async move {
            self.ensure_calls += 1;
            Ok(self.current())
        })
    }

    fn force_renewal(&mut self) -> TokenFuture<'_> {
        Box::pin(async move {
            self.forced += 1;
            if self.fail_renewal {
                return Err(kakao_auth::Error::CredentialsExhausted(
                    "refresh: rejected; bootstrap: none configured".into(),
                ));
            }
            self.issued += 1;
            Ok(self.current())
        })
    }
}
