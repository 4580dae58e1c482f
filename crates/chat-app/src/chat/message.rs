use nexus_api::{ApiError, UsageReport};

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Assistant,
}

/// Whether an assistant turn carries generated content or an error surrogate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    Done,
    Failed,
}

/// Token accounting for one assistant reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// `None` means the gateway did not price the turn, which is not the same as free.
    pub cost_usd: Option<f64>,
}

impl Usage {
    pub fn from_report(report: &UsageReport) -> Self {
        Self {
            prompt_tokens: report.prompt_tokens,
            completion_tokens: report.completion_tokens,
            total_tokens: report.total_tokens,
            cost_usd: report
                .cost_usd
                .filter(|cost| cost.is_finite() && *cost >= 0.0),
        }
    }
}

/// One entry of the append-only conversation log.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    /// Provider that actually produced the reply; assistant replies only.
    pub provider: Option<String>,
    pub usage: Option<Usage>,
    pub processing_time_ms: Option<u64>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            status: MessageStatus::Done,
            provider: None,
            usage: None,
            processing_time_ms: None,
        }
    }

    pub fn assistant(
        content: impl Into<String>,
        provider: impl Into<String>,
        usage: Option<Usage>,
        processing_time_ms: u64,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            status: MessageStatus::Done,
            provider: Some(provider.into()),
            usage,
            processing_time_ms: Some(processing_time_ms),
        }
    }

    /// Assistant turn standing in for a reply that never arrived.
    pub fn assistant_failure(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            status: MessageStatus::Failed,
            provider: None,
            usage: None,
            processing_time_ms: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == MessageStatus::Failed
    }

    /// Provider, latency and usage joined for display, e.g. `openai, 120 ms, 42 tokens, $0.000150`.
    pub fn details(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(provider) = &self.provider {
            parts.push(provider.clone());
        }
        if let Some(elapsed) = self.processing_time_ms {
            parts.push(format!("{elapsed} ms"));
        }
        if let Some(usage) = self.usage {
            parts.push(format!("{} tokens", usage.total_tokens));
            if let Some(cost) = usage.cost_usd {
                parts.push(format!("${cost:.6}"));
            }
        }

        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

pub const CONNECTION_ERROR_TEXT: &str = "Error connecting to server.";
pub const UNREADABLE_RESPONSE_TEXT: &str = "Received an unreadable response from the server.";
pub const INTERRUPTED_TEXT: &str = "The request was interrupted before a reply arrived.";

/// Human-readable text for a failed generation request.
pub fn describe_generation_error(error: &ApiError) -> String {
    match error {
        ApiError::Status { status, .. } => match error.body_text() {
            Some(body) => format!("Server error: {body}"),
            None => format!("Server error: HTTP {status}"),
        },
        ApiError::Transport { .. } | ApiError::BuildClient { .. } => {
            CONNECTION_ERROR_TEXT.to_string()
        }
        ApiError::Decode { .. } => UNREADABLE_RESPONSE_TEXT.to_string(),
    }
}
