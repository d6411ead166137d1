pub mod bda;
pub mod crypt;
pub mod fingerprint;
pub mod murmur;

use crate::config::EngineConfig;
use crate::error::{ ChatError, ChatResult };
use async_trait::async_trait;
use fingerprint::ChallengeSite;
use log::{ debug, info, warn };
use rand::Rng;
use reqwest::header::{ HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT };
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::OnceCell;

const CAPI_VERSION: &str = "1.5.5";

/// Produces a challenge token without the browser-data round trip.
#[async_trait]
pub trait NativeSolver: Send + Sync {
    async fn solve(&self, site: &ChallengeSite, user_agent: &str) -> ChatResult<String>;
}

/// Runs an external solver executable; its trimmed stdout is the token.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    path: PathBuf,
}

impl CommandSolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `None` when nothing exists at `path`.
    pub async fn locate(path: &str) -> Option<Self> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Some(Self::new(path)),
            Ok(_) => {
                warn!("Challenge solver path {} is not a file", path);
                None
            }
            Err(e) => {
                warn!("Challenge solver not found at {}: {}", path, e);
                None
            }
        }
    }
}

#[async_trait]
impl NativeSolver for CommandSolver {
    async fn solve(&self, site: &ChallengeSite, user_agent: &str) -> ChatResult<String> {
        let output = Command::new(&self.path)
            .arg("--surl")
            .arg(&site.surl)
            .arg("--public-key")
            .arg(&site.public_key)
            .arg("--user-agent")
            .arg(user_agent)
            .kill_on_drop(true)
            .output().await?;

        if !output.status.success() {
            return Err(
                ChatError::Io(
                    std::io::Error::new(
                        std::io::ErrorKind::Other,
                        format!("solver exited with {}", output.status)
                    )
                )
            );
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(ChatError::malformed("solver printed no token"));
        }
        Ok(token)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// Mints challenge tokens: native solver first, then a locally built
/// browser-data payload, then the remote fallback endpoint with bounded retry.
pub struct ChallengeTokenGenerator {
    http: reqwest::Client,
    site: ChallengeSite,
    user_agent: String,
    fallback_url: String,
    local_minting: bool,
    retry_attempts: usize,
    retry_delay: Duration,
    solver_path: Option<String>,
    solver: OnceCell<Option<Arc<dyn NativeSolver>>>,
}

impl ChallengeTokenGenerator {
    pub fn new(config: &EngineConfig) -> ChatResult<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            site: ChallengeSite {
                surl: config.challenge_surl.trim_end_matches('/').to_string(),
                public_key: config.challenge_public_key.clone(),
                site: Some(config.origin()),
                language: None,
            },
            user_agent: config.user_agent.clone(),
            fallback_url: config.fallback_token_url.clone(),
            local_minting: config.local_minting,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: config.retry_delay,
            solver_path: config.solver_path.clone(),
            solver: OnceCell::new(),
        })
    }

    /// Skips the solver lookup and uses `solver` for every token.
    pub fn with_solver(mut self, solver: Arc<dyn NativeSolver>) -> Self {
        self.solver = OnceCell::new_with(Some(Some(solver)));
        self
    }

    pub fn site(&self) -> &ChallengeSite {
        &self.site
    }

    async fn native_solver(&self) -> Option<Arc<dyn NativeSolver>> {
        self.solver
            .get_or_init(|| async {
                let path = self.solver_path.as_deref()?;
                let solver = CommandSolver::locate(path).await?;
                info!("Using native challenge solver at {}", path);
                Some(Arc::new(solver) as Arc<dyn NativeSolver>)
            }).await
            .clone()
    }

    pub async fn generate(&self) -> ChatResult<String> {
        if let Some(solver) = self.native_solver().await {
            match solver.solve(&self.site, &self.user_agent).await {
                Ok(token) => {
                    debug!("Challenge token from native solver");
                    return Ok(token);
                }
                Err(e) => warn!("Native challenge solver failed: {}", e),
            }
        }

        if self.local_minting {
            match self.mint_locally().await {
                Ok(token) => {
                    debug!("Challenge token minted locally");
                    return Ok(token);
                }
                Err(e) => warn!("Local challenge minting failed, using fallback endpoint: {}", e),
            }
        }

        self.fetch_fallback().await
    }

    fn mint_headers(&self) -> ChatResult<HeaderMap> {
        let header = |value: &str| {
            HeaderValue::from_str(value).map_err(|e| ChatError::Crypto(format!("invalid header value: {}", e)))
        };
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header(&self.user_agent)?);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert(ORIGIN, header(&self.site.surl)?);
        headers.insert(
            REFERER,
            header(
                &format!(
                    "{}/v2/{}/{}/enforcement.fbfc14b0d793c6ef8359e0e4b4a91f67.html",
                    self.site.surl,
                    self.site.public_key,
                    CAPI_VERSION
                )
            )?
        );
        Ok(headers)
    }

    async fn mint_locally(&self) -> ChatResult<String> {
        let bda = bda::build_bda(&self.user_agent, &self.site)?;
        let rnd = rand::thread_rng().gen::<f64>().to_string();
        let site = self.site.site.clone().unwrap_or_default();
        let form = [
            ("bda", bda.as_str()),
            ("public_key", self.site.public_key.as_str()),
            ("site", site.as_str()),
            ("userbrowser", self.user_agent.as_str()),
            ("capi_version", CAPI_VERSION),
            ("capi_mode", "inline"),
            ("style_theme", "default"),
            ("rnd", rnd.as_str()),
            ("language", "en"),
        ];

        let url = format!("{}/fc/gt2/public_key/{}", self.site.surl, self.site.public_key);
        let response = self.http.post(&url).headers(self.mint_headers()?).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ChatError::Backend { status: status.as_u16(), body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)?;
        parsed.token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ChatError::malformed("mint response carried no token"))
    }

    async fn fetch_fallback(&self) -> ChatResult<String> {
        for attempt in 1..=self.retry_attempts {
            match self.fetch_fallback_once().await {
                Ok(token) => {
                    debug!("Challenge token from fallback endpoint (attempt {})", attempt);
                    return Ok(token);
                }
                Err(e) => {
                    warn!("Fallback token attempt {}/{} failed: {}", attempt, self.retry_attempts, e);
                }
            }
            if attempt < self.retry_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(ChatError::RetryExhausted { endpoint: self.fallback_url.clone() })
    }

    async fn fetch_fallback_once(&self) -> ChatResult<String> {
        let body = self.http.get(&self.fallback_url).send().await?.text().await?;
        let parsed: Option<TokenResponse> = serde_json::from_str(&body)?;
        parsed
            .and_then(|response| response.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ChatError::malformed("fallback endpoint returned no token"))
    }
}
