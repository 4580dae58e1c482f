use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Upstream text-generation service selected for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Gemini,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::OpenAi, Provider::Gemini];

    /// Identifier used on the wire and in settings files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI GPT",
            Self::Gemini => "Google Gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu)]
#[snafu(display("unknown provider '{raw}', expected one of: openai, gemini"))]
pub struct UnknownProviderError {
    raw: String,
}

impl FromStr for Provider {
    type Err = UnknownProviderError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim();
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str().eq_ignore_ascii_case(normalized))
            .ok_or_else(|| UnknownProviderError {
                raw: raw.to_string(),
            })
    }
}
