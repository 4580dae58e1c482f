//! Terminal chat client for the LLM Nexus gateway.
//!
//! The crate is split the way the session is driven: [`chat`] keeps the
//! message log, [`registration`] and [`health`] cover the two background
//! concerns, and [`session`] ties them into one event-driven state machine
//! with a tokio runtime around it. [`console`] is the line-oriented front end
//! the `nexus` binary drives.

pub mod chat;
pub mod console;
pub mod error;
pub mod health;
pub mod registration;
pub mod session;
pub mod settings;

pub use error::{SessionError, SessionResult};
pub use health::{HealthMonitor, ServerStatus};
pub use session::{
    Access, ChatSession, RuntimeOptions, SessionCommand, SessionEvent, SessionRuntime,
    SessionView, ViewHandle,
};
pub use settings::{Settings, SettingsError};
