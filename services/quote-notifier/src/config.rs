//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. Tokens, the client
//! secret and the REST API key come from the environment only and are never
//! read from the TOML file, so the file can be committed.

use common::Secret;
use kakao_auth::{Endpoints, OAuthClient, normalize_secret};
use serde::Deserialize;
use std::path::PathBuf;

/// Config file looked up when neither `--config` nor `CONFIG_PATH` is given
pub const DEFAULT_CONFIG_PATH: &str = "quote-notifier.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kakao: KakaoConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub secret_sink: Option<SecretSinkConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Kakao application and credential record settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KakaoConfig {
    /// REST API key (`KAKAO_REST_API_KEY`)
    #[serde(skip)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Bootstrap access token (`KAKAO_ACCESS_TOKEN`)
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
    /// Bootstrap refresh token (`KAKAO_REFRESH_TOKEN`), sentinels allowed
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
    /// One-time authorization code (`KAKAO_AUTH_CODE`)
    #[serde(skip)]
    pub auth_code: Option<Secret<String>>,
    pub credentials_path: PathBuf,
    pub redirect_uri: Option<String>,
    pub token_url: Option<String>,
    pub token_info_url: Option<String>,
    pub memo_send_url: Option<String>,
    pub http_timeout_secs: u64,
}

impl Default for KakaoConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            access_token: None,
            refresh_token: None,
            auth_code: None,
            credentials_path: PathBuf::from("kakao_access_token.json"),
            redirect_uri: None,
            token_url: None,
            token_info_url: None,
            memo_send_url: None,
            http_timeout_secs: 30,
        }
    }
}

/// Chunking, retry and template settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_chunk_chars: usize,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    /// Deadline for the whole run; unset means no deadline
    pub run_timeout_secs: Option<u64>,
    pub link_url: String,
    pub button_title: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: memo_delivery::DEFAULT_MAX_CHUNK_CHARS,
            max_attempts: 3,
            retry_delay_secs: 2,
            run_timeout_secs: None,
            link_url: "https://finance.yahoo.com".into(),
            button_title: None,
        }
    }
}

/// External command that persists rotated tokens, e.g. `["gh", "secret", "set"]`.
/// The credential name is appended as the last argument and the value is
/// written to the command's stdin.
#[derive(Debug, Deserialize)]
pub struct SecretSinkConfig {
    pub command: Vec<String>,
}

/// Prometheus textfile output
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub textfile_path: Option<PathBuf>,
}

/// Where the config file came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPath {
    pub path: PathBuf,
    /// Named by `--config` or `CONFIG_PATH`, so it must exist
    pub explicit: bool,
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// An implicit default file that does not exist means all defaults; an
    /// explicitly named file must exist.
    pub fn load_from(location: &ConfigPath) -> common::Result<Self> {
        match std::fs::read_to_string(&location.path) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !location.explicit => {
                Self::from_toml("")
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parse TOML, overlay the environment and validate.
    pub fn from_toml(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        let kakao = &mut self.kakao;

        kakao.client_id = std::env::var("KAKAO_REST_API_KEY")
            .ok()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .ok_or(common::Error::MissingEnv("KAKAO_REST_API_KEY"))?;

        // Sentinels like EMPTY are resolved here, once, for every credential
        kakao.client_secret = env_secret("KAKAO_CLIENT_SECRET");
        kakao.access_token = env_secret("KAKAO_ACCESS_TOKEN");
        kakao.refresh_token = env_secret("KAKAO_REFRESH_TOKEN");
        kakao.auth_code = env_secret("KAKAO_AUTH_CODE");

        if let Ok(uri) = std::env::var("KAKAO_REDIRECT_URI")
            && !uri.trim().is_empty()
        {
            kakao.redirect_uri = Some(uri.trim().to_owned());
        }

        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        let urls = [
            ("kakao.token_url", self.kakao.token_url.as_deref()),
            ("kakao.token_info_url", self.kakao.token_info_url.as_deref()),
            ("kakao.memo_send_url", self.kakao.memo_send_url.as_deref()),
            ("delivery.link_url", Some(self.delivery.link_url.as_str())),
        ];
        for (name, url) in urls {
            if let Some(url) = url
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.kakao.http_timeout_secs == 0 {
            return Err(common::Error::Config(
                "http_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.delivery.max_chunk_chars == 0 {
            return Err(common::Error::Config(
                "max_chunk_chars must be at least 1".into(),
            ));
        }

        if self.delivery.max_attempts == 0 {
            return Err(common::Error::Config(
                "max_attempts must be at least 1".into(),
            ));
        }

        if self.delivery.run_timeout_secs == Some(0) {
            return Err(common::Error::Config(
                "run_timeout_secs must be greater than 0 when set".into(),
            ));
        }

        if let Some(sink) = &self.secret_sink
            && sink.command.first().is_none_or(|program| program.trim().is_empty())
        {
            return Err(common::Error::Config(
                "secret_sink.command must name a program".into(),
            ));
        }

        Ok(())
    }

    /// Endpoints with any configured overrides applied.
    pub fn endpoints(&self) -> Endpoints {
        let mut endpoints = Endpoints::default();
        if let Some(url) = &self.kakao.token_url {
            endpoints.token = url.clone();
        }
        if let Some(url) = &self.kakao.token_info_url {
            endpoints.token_info = url.clone();
        }
        if let Some(url) = &self.kakao.memo_send_url {
            endpoints.memo_send = url.clone();
        }
        endpoints
    }

    pub fn oauth_client(&self) -> OAuthClient {
        OAuthClient {
            client_id: self.kakao.client_id.clone(),
            client_secret: self.kakao.client_secret.clone(),
            redirect_uri: self.kakao.redirect_uri.clone(),
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> ConfigPath {
        if let Some(p) = cli_path {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return ConfigPath {
                path: PathBuf::from(p),
                explicit: true,
            };
        }
        ConfigPath {
            path: PathBuf::from(DEFAULT_CONFIG_PATH),
            explicit: false,
        }
    }
}

fn env_secret(name: &str) -> Option<Secret<String>> {
    normalize_secret(std::env::var(name).ok().as_deref())
}
