//! Session orchestrator.
//!
//! [`ChatSession`] is a pure state machine: every [`SessionEvent`] yields the
//! next state plus the [`SessionCommand`]s to execute. [`SessionRuntime`] owns
//! the async side: it runs commands, feeds completions back as events and
//! publishes [`SessionView`] snapshots.

pub mod events;
pub mod runtime;
pub mod view;

use nexus_api::{GenerateRequest, Provider};
use nexus_storage::Identity;
use snafu::ensure;

pub use events::{SessionCommand, SessionEvent};
pub use runtime::{RuntimeOptions, SessionRuntime, ViewHandle};
pub use view::SessionView;

use crate::chat::{Conversation, GenerationParams};
use crate::error::{
    AlreadyRegisteredSnafu, RegistrationRequiredSnafu, SessionClosedSnafu, SessionResult,
};
use crate::health::ServerStatus;
use crate::registration::{Registration, RegistrationTicket};

/// Who the session talks as. Sending is only possible in `Ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    NeedsRegistration,
    Ready(Identity),
}

#[derive(Debug)]
pub struct ChatSession {
    access: Access,
    registration: Registration,
    conversation: Conversation,
    provider: Provider,
    params: GenerationParams,
    server_status: ServerStatus,
    closed: bool,
}

impl ChatSession {
    pub fn new(restored: Option<Identity>, provider: Provider, params: GenerationParams) -> Self {
        let access = match restored {
            Some(identity) => Access::Ready(identity),
            None => Access::NeedsRegistration,
        };

        Self {
            access,
            registration: Registration::new(),
            conversation: Conversation::new(),
            provider,
            params,
            server_status: ServerStatus::Checking,
            closed: false,
        }
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    pub fn identity(&self) -> Option<&Identity> {
        match &self.access {
            Access::Ready(identity) => Some(identity),
            Access::NeedsRegistration => None,
        }
    }

    pub fn registration_visible(&self) -> bool {
        matches!(self.access, Access::NeedsRegistration)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn server_status(&self) -> ServerStatus {
        self.server_status
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Rejects every later event, including completions of requests still in flight.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn handle(&mut self, event: SessionEvent) -> SessionResult<Vec<SessionCommand>> {
        ensure!(
            !self.closed,
            SessionClosedSnafu {
                stage: "handle-event",
            }
        );

        match event {
            SessionEvent::InputChanged(input) => {
                self.conversation.set_input(input);
                Ok(Vec::new())
            }
            SessionEvent::Submit(prompt) => self.submit(&prompt),
            SessionEvent::SelectProvider(provider) => {
                self.provider = provider;
                Ok(Vec::new())
            }
            SessionEvent::Register(name) => self.register(&name),
            SessionEvent::SwitchIdentity => Ok(self.switch_identity()),
            SessionEvent::HealthChanged(status) => {
                self.server_status = status;
                Ok(Vec::new())
            }
            SessionEvent::RegistrationFinished { ticket, outcome } => {
                Ok(self.finish_registration(ticket, outcome))
            }
            SessionEvent::RegistrationAborted { ticket } => {
                self.registration.abort(ticket);
                Ok(Vec::new())
            }
            SessionEvent::GenerationFinished { turn, outcome } => {
                self.conversation.complete_turn(turn, outcome);
                Ok(Vec::new())
            }
            SessionEvent::GenerationAborted { turn } => {
                self.conversation.abort_turn(turn);
                Ok(Vec::new())
            }
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            messages: self.conversation.messages().to_vec(),
            is_loading: self.conversation.is_loading(),
            server_status: self.server_status,
            identity: self.identity().cloned(),
            provider: self.provider,
            registration_visible: self.registration_visible(),
            registration_error: self.registration.error().map(str::to_string),
            registration_busy: self.registration.is_busy(),
            input: self.conversation.input().to_string(),
        }
    }

    fn submit(&mut self, prompt: &str) -> SessionResult<Vec<SessionCommand>> {
        let Access::Ready(identity) = &self.access else {
            // Registration is already the visible surface; nothing is recorded or sent.
            return RegistrationRequiredSnafu {
                stage: "submit-without-identity",
            }
            .fail();
        };
        let user_id = identity.user_id.clone();

        let turn = self.conversation.begin_turn(prompt)?;
        let request = GenerateRequest {
            user_id,
            prompt: prompt.to_string(),
            provider: self.provider,
            temperature: self.params.temperature,
            max_tokens: self.params.max_tokens,
        };

        tracing::debug!(%turn, provider = %self.provider, "submitting prompt");
        Ok(vec![SessionCommand::Generate { turn, request }])
    }

    fn register(&mut self, raw_name: &str) -> SessionResult<Vec<SessionCommand>> {
        ensure!(
            self.registration_visible(),
            AlreadyRegisteredSnafu {
                stage: "register-while-ready",
            }
        );

        let (ticket, name) = self.registration.begin(raw_name)?;
        Ok(vec![SessionCommand::RegisterUser { ticket, name }])
    }

    fn finish_registration(
        &mut self,
        ticket: RegistrationTicket,
        outcome: Result<nexus_api::UserRecord, nexus_api::ApiError>,
    ) -> Vec<SessionCommand> {
        let Some(identity) = self.registration.finish(ticket, outcome) else {
            return Vec::new();
        };

        tracing::info!(user_id = %identity.user_id, user_name = %identity.user_name, "registered identity");
        self.access = Access::Ready(identity.clone());
        vec![SessionCommand::PersistIdentity(identity)]
    }

    fn switch_identity(&mut self) -> Vec<SessionCommand> {
        if let Access::Ready(identity) = &self.access {
            tracing::info!(user_id = %identity.user_id, "switching identity");
        }

        self.access = Access::NeedsRegistration;
        self.registration.reopen();
        vec![SessionCommand::ClearIdentity]
    }
}
