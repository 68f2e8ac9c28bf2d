//! "Memo to self" send client
//!
//! Posts one text template per call and classifies the response:
//! 2xx delivered, 401 unauthorized (token renewal territory), anything else
//! an ordinary failure that counts against the retry budget.

use common::Secret;
use tracing::debug;

/// Fixed parts of the text template around each chunk.
#[derive(Debug, Clone)]
pub struct MemoTemplate {
    /// Link opened when the message is tapped
    pub link_url: String,
    pub button_title: Option<String>,
}

impl MemoTemplate {
    /// Serialized `template_object` form value for one chunk.
    pub fn render(&self, text: &str) -> String {
        let mut template = serde_json::json!({
            "object_type": "text",
            "text": text,
            "link": {
                "web_url": self.link_url,
                "mobile_web_url": self.link_url,
            },
        });
        if let Some(title) = &self.button_title {
            template["button_title"] = serde_json::Value::String(title.clone());
        }
        template.to_string()
    }
}

/// Result of a single send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// 401: the access token was not accepted
    Unauthorized,
    /// Any other non-success status
    Rejected { status: u16, body: String },
    /// Connection, TLS or timeout failure before a status was received
    Transport(String),
}

impl SendOutcome {
    /// Map a response status to an outcome. `body` is only kept for failures.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            200..=299 => SendOutcome::Delivered,
            401 => SendOutcome::Unauthorized,
            _ => SendOutcome::Rejected { status, body },
        }
    }

    /// Label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Delivered => "delivered",
            SendOutcome::Unauthorized => "unauthorized",
            SendOutcome::Rejected { .. } => "rejected",
            SendOutcome::Transport(_) => "transport",
        }
    }

    /// Human-readable failure reason.
    pub fn describe(&self) -> String {
        match self {
            SendOutcome::Delivered => "delivered".into(),
            SendOutcome::Unauthorized => "unauthorized after token renewal".into(),
            SendOutcome::Rejected { status, body } => format!("HTTP {status}: {body}"),
            SendOutcome::Transport(msg) => format!("transport error: {msg}"),
        }
    }
}

/// Client for the memo send endpoint.
#[derive(Debug, Clone)]
pub struct MemoClient {
    http: reqwest::Client,
    url: String,
    template: MemoTemplate,
}

impl MemoClient {
    pub fn new(http: reqwest::Client, url: String, template: MemoTemplate) -> Self {
        Self {
            http,
            url,
            template,
        }
    }

    /// Send one chunk with the given bearer token.
    pub async fn send(&self, token: &Secret<String>, text: &str) -> SendOutcome {
        let template_object = self.template.render(text);
        let response = match self
            .http
            .post(&self.url)
            .bearer_auth(token.expose())
            .form(&[("template_object", template_object.as_str())])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SendOutcome::Transport(e.to_string()),
        };

        let status = response.status().as_u16();
        if response.status().is_success() {
            debug!(status, "memo send accepted");
            return SendOutcome::Delivered;
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        SendOutcome::from_status(status, body)
    }
}
