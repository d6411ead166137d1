pub mod model;

pub use model::ModelKind;

use crate::cli::Args;
use crate::error::ChatError;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://chat.openai.com";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";
pub const DEFAULT_FALLBACK_TOKEN_URL: &str = "https://arkose-token-generator.zaieem.repl.co/token";
pub const DEFAULT_CHALLENGE_SURL: &str = "https://tcr9i.chat.openai.com";
pub const DEFAULT_CHALLENGE_PUBLIC_KEY: &str = "3D86FBBA-9D22-402A-B512-3420086BA6CC";
pub const SESSION_COOKIE_NAME: &str = "__Secure-next-auth.session-token";

pub const TOKEN_RETRY_ATTEMPTS: usize = 5;
pub const TOKEN_RETRY_DELAY: Duration = Duration::from_millis(700);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportPreference {
    /// Ask the backend which delivery mode the account supports.
    Auto,
    Http,
    WebSocket,
}

impl fmt::Display for TransportPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportPreference::Auto => "auto",
            TransportPreference::Http => "http",
            TransportPreference::WebSocket => "websocket",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for TransportPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TransportPreference::Auto),
            "http" | "sse" => Ok(TransportPreference::Http),
            "websocket" | "ws" => Ok(TransportPreference::WebSocket),
            _ => Err(format!("Invalid transport: '{}' (expected auto, http or websocket)", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: String,
    pub session_token: Option<String>,
    pub access_token: Option<String>,
    pub model: ModelKind,
    pub transport: TransportPreference,
    pub generate_challenge_token: bool,
    pub solver_path: Option<String>,
    pub local_minting: bool,
    pub fallback_token_url: String,
    pub challenge_surl: String,
    pub challenge_public_key: String,
    pub user_agent: String,
    pub retry_attempts: usize,
    pub retry_delay: Duration,
    pub data_path: Option<String>,
    pub data_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_token: None,
            access_token: None,
            model: ModelKind::default(),
            transport: TransportPreference::Auto,
            generate_challenge_token: false,
            solver_path: None,
            local_minting: true,
            fallback_token_url: DEFAULT_FALLBACK_TOKEN_URL.to_string(),
            challenge_surl: DEFAULT_CHALLENGE_SURL.to_string(),
            challenge_public_key: DEFAULT_CHALLENGE_PUBLIC_KEY.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry_attempts: TOKEN_RETRY_ATTEMPTS,
            retry_delay: TOKEN_RETRY_DELAY,
            data_path: None,
            data_key: None,
        }
    }
}

impl EngineConfig {
    pub fn from_args(args: &Args) -> Result<Self, ChatError> {
        Ok(Self {
            base_url: args.base_url.clone(),
            session_token: non_empty(&args.session_token),
            access_token: non_empty(&args.access_token),
            model: args.model.parse()?,
            transport: args.transport,
            generate_challenge_token: args.challenge_token,
            solver_path: non_empty(&args.solver_path),
            local_minting: args.local_minting,
            fallback_token_url: args.fallback_token_url.clone(),
            challenge_surl: args.challenge_surl.clone(),
            challenge_public_key: args.challenge_public_key.clone(),
            user_agent: args.user_agent.clone(),
            data_path: non_empty(&args.data_path),
            data_key: non_empty(&args.data_key),
            ..Self::default()
        })
    }

    /// `{base_url}/backend-api/{route}`
    pub fn api_url(&self, route: &str) -> String {
        format!("{}/backend-api/{}", self.base_url.trim_end_matches('/'), route.trim_start_matches('/'))
    }

    pub fn auth_session_url(&self) -> String {
        format!("{}/api/auth/session", self.base_url.trim_end_matches('/'))
    }

    /// Scheme, host and port of `base_url`, as browsers send in `Origin`.
    pub fn origin(&self) -> String {
        match Url::parse(&self.base_url) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => self.base_url.trim_end_matches('/').to_string(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
