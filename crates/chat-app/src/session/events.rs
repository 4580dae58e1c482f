use nexus_api::{ApiError, GenerateRequest, GenerateResponse, Provider, UserRecord};
use nexus_storage::Identity;

use crate::chat::TurnId;
use crate::health::ServerStatus;
use crate::registration::RegistrationTicket;

/// Everything that can change session state: UI actions and request completions.
#[derive(Debug)]
pub enum SessionEvent {
    InputChanged(String),
    Submit(String),
    SelectProvider(Provider),
    Register(String),
    SwitchIdentity,
    HealthChanged(ServerStatus),
    RegistrationFinished {
        ticket: RegistrationTicket,
        outcome: Result<UserRecord, ApiError>,
    },
    RegistrationAborted {
        ticket: RegistrationTicket,
    },
    GenerationFinished {
        turn: TurnId,
        outcome: Result<GenerateResponse, ApiError>,
    },
    GenerationAborted {
        turn: TurnId,
    },
}

impl SessionEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InputChanged(_) => "input-changed",
            Self::Submit(_) => "submit",
            Self::SelectProvider(_) => "select-provider",
            Self::Register(_) => "register",
            Self::SwitchIdentity => "switch-identity",
            Self::HealthChanged(_) => "health-changed",
            Self::RegistrationFinished { .. } => "registration-finished",
            Self::RegistrationAborted { .. } => "registration-aborted",
            Self::GenerationFinished { .. } => "generation-finished",
            Self::GenerationAborted { .. } => "generation-aborted",
        }
    }
}

/// Side effects the session asks its runtime to perform.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    RegisterUser {
        ticket: RegistrationTicket,
        name: String,
    },
    Generate {
        turn: TurnId,
        request: GenerateRequest,
    },
    PersistIdentity(Identity),
    ClearIdentity,
}
