use snafu::Snafu;

/// Reasons the session refuses an event without touching the network.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("display name must not be empty"))]
    EmptyName { stage: &'static str },
    #[snafu(display("prompt must not be empty"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("a registration request is already in flight"))]
    RegistrationBusy { stage: &'static str },
    #[snafu(display("turn-{active} is still waiting for a reply"))]
    TurnInFlight { stage: &'static str, active: u64 },
    #[snafu(display("register a display name before sending messages"))]
    RegistrationRequired { stage: &'static str },
    #[snafu(display("an identity is already registered"))]
    AlreadyRegistered { stage: &'static str },
    #[snafu(display("session has been shut down"))]
    SessionClosed { stage: &'static str },
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Validation failures are shown inline; everything else is a guard rejection.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyName { .. } | Self::EmptyPrompt { .. })
    }
}
