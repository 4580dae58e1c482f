/// Conversation controller: message log and the in-flight turn.
pub mod conversation;
/// Message model and error-text mapping.
pub mod message;

pub use conversation::{
    Conversation, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerationParams, TurnId,
};
pub use message::{Message, MessageStatus, Role, Usage, describe_generation_error};
