use crate::config::{
    TransportPreference,
    DEFAULT_BASE_URL,
    DEFAULT_CHALLENGE_PUBLIC_KEY,
    DEFAULT_CHALLENGE_SURL,
    DEFAULT_FALLBACK_TOKEN_URL,
    DEFAULT_USER_AGENT,
};
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Backend / Auth Args ---
    /// Base URL of the chat backend (the web origin, not the API root)
    #[arg(long, env = "REGPT_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Long-lived session cookie ('__Secure-next-auth.session-token') exchanged for an access token
    #[arg(long, env = "REGPT_SESSION_TOKEN")]
    pub session_token: Option<String>,

    /// Short-lived bearer token. When set, the session exchange is skipped.
    #[arg(long, env = "REGPT_ACCESS_TOKEN")]
    pub access_token: Option<String>,

    // --- Conversation Args ---
    /// Model for new conversations (gpt-3.5, gpt-4)
    #[arg(short = 'm', long, env = "REGPT_MODEL", default_value = "gpt-3.5")]
    pub model: String,

    /// Resume an existing conversation by its server identifier
    #[arg(short = 'c', long, env = "REGPT_CONVERSATION_ID")]
    pub conversation_id: Option<String>,

    /// Local name under which the conversation is remembered in the data file
    #[arg(short = 'n', long, env = "REGPT_CONVERSATION_NAME")]
    pub name: Option<String>,

    /// Streaming transport (auto, http, websocket). 'auto' asks the backend.
    #[arg(long, env = "REGPT_TRANSPORT", default_value = "auto")]
    pub transport: TransportPreference,

    // --- Challenge Token Args ---
    /// Always attach a challenge token, even for models where it is optional
    #[arg(long, env = "REGPT_CHALLENGE_TOKEN", default_value = "false")]
    pub challenge_token: bool,

    /// Path to an external solver executable that prints a challenge token on stdout
    #[arg(long, env = "REGPT_SOLVER_PATH")]
    pub solver_path: Option<String>,

    /// Mint challenge tokens locally from a synthesized browser fingerprint before using the fallback endpoint
    #[arg(long, env = "REGPT_LOCAL_MINTING", default_value = "true", action = clap::ArgAction::Set)]
    pub local_minting: bool,

    /// Remote endpoint used when no local token source succeeds
    #[arg(long, env = "REGPT_FALLBACK_TOKEN_URL", default_value = DEFAULT_FALLBACK_TOKEN_URL)]
    pub fallback_token_url: String,

    /// Challenge service origin used for local minting
    #[arg(long, env = "REGPT_CHALLENGE_SURL", default_value = DEFAULT_CHALLENGE_SURL)]
    pub challenge_surl: String,

    /// Challenge service public key used for local minting
    #[arg(long, env = "REGPT_CHALLENGE_PUBLIC_KEY", default_value = DEFAULT_CHALLENGE_PUBLIC_KEY)]
    pub challenge_public_key: String,

    /// User agent sent to the backend; also the client identifier in the challenge key material
    #[arg(long, env = "REGPT_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    // --- Session Data Args ---
    /// File where named conversations are remembered between runs
    #[arg(long, env = "REGPT_DATA_PATH")]
    pub data_path: Option<String>,

    /// Optional key used to encrypt the data file
    #[arg(long, env = "REGPT_DATA_KEY")]
    pub data_key: Option<String>,

    // --- General App Args ---
    /// List the most recent conversations and exit
    #[arg(long, default_value = "false")]
    pub list: bool,

    /// Delete the selected conversation and exit
    #[arg(long, default_value = "false")]
    pub delete: bool,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,
}
