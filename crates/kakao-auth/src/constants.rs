//! Kakao OAuth and API endpoints
//!
//! The defaults point at the production Kakao hosts. `Endpoints` exists so
//! the binary can be pointed at a staging host and tests at a local fake.

/// Token endpoint for refresh and authorization code exchange
pub const TOKEN_ENDPOINT: &str = "https://kauth.kakao.com/oauth/token";

/// Cheap authenticated call used as the access token validity probe
pub const TOKEN_INFO_ENDPOINT: &str = "https://kapi.kakao.com/v1/user/access_token_info";

/// "Memo to self" default template send endpoint
pub const MEMO_SEND_ENDPOINT: &str = "https://kapi.kakao.com/v2/api/talk/memo/default/send";

/// Response header carrying a refresh token on a successful bootstrap probe.
pub const BOOTSTRAP_REFRESH_HEADER: &str = "x-refresh-token";

/// Names under which rotated tokens are handed to the external secret sink.
pub const ACCESS_TOKEN_SECRET_NAME: &str = "KAKAO_ACCESS_TOKEN";
pub const REFRESH_TOKEN_SECRET_NAME: &str = "KAKAO_REFRESH_TOKEN";

/// Resolved endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token: String,
    pub token_info: String,
    pub memo_send: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: TOKEN_ENDPOINT.to_string(),
            token_info: TOKEN_INFO_ENDPOINT.to_string(),
            memo_send: MEMO_SEND_ENDPOINT.to_string(),
        }
    }
}

impl Endpoints {
    /// All three endpoints under a single base URL, using the production paths.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token: format!("{base}/oauth/token"),
            token_info: format!("{base}/v1/user/access_token_info"),
            memo_send: format!("{base}/v2/api/talk/memo/default/send"),
        }
    }
}
