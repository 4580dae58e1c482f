use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ApiError {
    #[snafu(display("failed to build http client on `{stage}`: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {endpoint} failed on `{stage}`: {source}"))]
    Transport {
        stage: &'static str,
        endpoint: String,
        source: reqwest::Error,
    },
    #[snafu(display("{endpoint} responded with status {status}: {body}"))]
    Status {
        stage: &'static str,
        endpoint: String,
        status: u16,
        body: String,
    },
    #[snafu(display("failed to decode {endpoint} response on `{stage}`: {source}"))]
    Decode {
        stage: &'static str,
        endpoint: String,
        source: serde_json::Error,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// True when the gateway could not be reached at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::BuildClient { .. })
    }

    /// HTTP status of a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::BuildClient { .. } | Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }

    /// Trimmed error body of a non-2xx response, if the gateway sent one.
    pub fn body_text(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body.trim()).filter(|body| !body.is_empty()),
            Self::BuildClient { .. } | Self::Transport { .. } | Self::Decode { .. } => None,
        }
    }
}
