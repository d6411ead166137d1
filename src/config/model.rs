use crate::error::ChatError;
use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ModelKind {
    #[serde(rename = "gpt-3.5")]
    Gpt35,
    #[serde(rename = "gpt-4")]
    Gpt4,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Gpt35, ModelKind::Gpt4];

    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Gpt35 => "gpt-3.5",
            ModelKind::Gpt4 => "gpt-4",
        }
    }

    /// Identifier the backend uses in payloads and in message metadata.
    pub fn slug(&self) -> &'static str {
        match self {
            ModelKind::Gpt35 => "text-davinci-002-render-sha",
            ModelKind::Gpt4 => "gpt-4",
        }
    }

    pub fn needs_challenge_token(&self) -> bool {
        matches!(self, ModelKind::Gpt4)
    }

    pub fn from_slug(slug: &str) -> Result<Self, ChatError> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|model| model.slug() == slug)
            .ok_or_else(|| ChatError::UnknownModel(slug.to_string()))
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Gpt35
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpt-3.5" | "gpt3.5" | "gpt-35" => Ok(ModelKind::Gpt35),
            "gpt-4" | "gpt4" => Ok(ModelKind::Gpt4),
            other => ModelKind::from_slug(other).map_err(|_| ChatError::UnknownModel(s.to_string())),
        }
    }
}
