use std::fmt;

use nexus_api::{ApiError, UserRecord};
use nexus_storage::Identity;
use snafu::ensure;

use crate::chat::message::CONNECTION_ERROR_TEXT;
use crate::error::{EmptyNameSnafu, RegistrationBusySnafu, SessionResult};

pub const EMPTY_NAME_TEXT: &str = "Please enter a display name.";
pub const REGISTRATION_FAILED_TEXT: &str = "Registration failed. Please try again.";

/// Identifier of one registration round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationTicket(pub u64);

impl RegistrationTicket {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RegistrationTicket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "registration-{}", self.0)
    }
}

/// Display-name form state: inline error and the single in-flight request.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    in_flight: Option<RegistrationTicket>,
    error: Option<String>,
    next_ticket: u64,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Validates the name and reserves a ticket for the backend call.
    ///
    /// Returns the trimmed name that must be sent.
    pub fn begin(&mut self, raw_name: &str) -> SessionResult<(RegistrationTicket, String)> {
        ensure!(
            self.in_flight.is_none(),
            RegistrationBusySnafu {
                stage: "begin-registration-busy",
            }
        );

        let name = raw_name.trim();
        if name.is_empty() {
            self.error = Some(EMPTY_NAME_TEXT.to_string());
            return EmptyNameSnafu {
                stage: "begin-registration-validate",
            }
            .fail();
        }

        self.error = None;
        self.next_ticket = self.next_ticket.saturating_add(1);
        let ticket = RegistrationTicket::new(self.next_ticket);
        self.in_flight = Some(ticket);
        Ok((ticket, name.to_string()))
    }

    /// Applies the backend outcome; yields the new identity on success.
    pub fn finish(
        &mut self,
        ticket: RegistrationTicket,
        outcome: Result<UserRecord, ApiError>,
    ) -> Option<Identity> {
        if !self.release(ticket) {
            return None;
        }

        match outcome {
            Ok(record) => {
                self.error = None;
                Some(Identity::new(record.id, record.name))
            }
            Err(error) => {
                tracing::warn!(%ticket, error = %error, "registration request failed");
                self.error = Some(describe_registration_error(&error));
                None
            }
        }
    }

    /// Releases a ticket whose task ended without an outcome.
    pub fn abort(&mut self, ticket: RegistrationTicket) {
        if self.release(ticket) {
            self.error = Some(REGISTRATION_FAILED_TEXT.to_string());
        }
    }

    /// Shows a fresh form. An in-flight request is kept so it cannot be issued twice.
    pub fn reopen(&mut self) {
        self.error = None;
    }

    fn release(&mut self, ticket: RegistrationTicket) -> bool {
        if self.in_flight != Some(ticket) {
            tracing::debug!(%ticket, active = ?self.in_flight, "ignoring stale registration result");
            return false;
        }

        self.in_flight = None;
        true
    }
}

fn describe_registration_error(error: &ApiError) -> String {
    if error.is_transport() {
        return CONNECTION_ERROR_TEXT.to_string();
    }

    error
        .body_text()
        .map(str::to_string)
        .unwrap_or_else(|| REGISTRATION_FAILED_TEXT.to_string())
}
