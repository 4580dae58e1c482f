use std::fmt;

use nexus_api::{ApiError, GenerateResponse};
use snafu::ensure;

use crate::chat::message::{INTERRUPTED_TEXT, Message, Usage, describe_generation_error};
use crate::error::{EmptyPromptSnafu, SessionResult, TurnInFlightSnafu};

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 100;

/// Identifier of one generation round-trip.
///
/// Completions carrying any other id than the in-flight one are stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "turn-{}", self.0)
    }
}

/// Fixed sampling parameters sent with every turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Append-only message log plus the single in-flight turn.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    input: String,
    in_flight: Option<TurnId>,
    next_turn_id: u64,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<TurnId> {
        self.in_flight
    }

    /// Records the user's prompt and reserves the turn that will carry it.
    ///
    /// The prompt is stored verbatim; only the emptiness check trims it.
    pub fn begin_turn(&mut self, prompt: &str) -> SessionResult<TurnId> {
        ensure!(
            !prompt.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "begin-turn-validate",
            }
        );
        if let Some(active) = self.in_flight {
            return TurnInFlightSnafu {
                stage: "begin-turn-busy",
                active: active.0,
            }
            .fail();
        }

        self.messages.push(Message::user(prompt));
        self.input.clear();

        let turn = self.alloc_turn_id();
        self.in_flight = Some(turn);
        Ok(turn)
    }

    /// Folds a generation outcome into the log. Returns false for stale turns.
    pub fn complete_turn(
        &mut self,
        turn: TurnId,
        outcome: Result<GenerateResponse, ApiError>,
    ) -> bool {
        if !self.release(turn) {
            return false;
        }

        let message = match outcome {
            Ok(response) => Message::assistant(
                response.content,
                response.provider_used,
                response.usage.as_ref().map(Usage::from_report),
                response.processing_time_ms,
            ),
            Err(error) => {
                tracing::warn!(%turn, error = %error, "generation request failed");
                Message::assistant_failure(describe_generation_error(&error))
            }
        };
        self.messages.push(message);
        true
    }

    /// Closes a turn whose request task ended without reporting an outcome.
    pub fn abort_turn(&mut self, turn: TurnId) -> bool {
        if !self.release(turn) {
            return false;
        }

        self.messages.push(Message::assistant_failure(INTERRUPTED_TEXT));
        true
    }

    // Loading is cleared before the reply is built so no outcome can leave it set.
    fn release(&mut self, turn: TurnId) -> bool {
        if self.in_flight != Some(turn) {
            tracing::debug!(%turn, active = ?self.in_flight, "ignoring stale generation result");
            return false;
        }

        self.in_flight = None;
        true
    }

    fn alloc_turn_id(&mut self) -> TurnId {
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        TurnId::new(self.next_turn_id)
    }
}

#[cfg(test)]
mod tests {
    use nexus_api::UsageReport;

    use super::*;
    use crate::chat::message::{MessageStatus, Role};
    use crate::error::SessionError;

    fn reply(content: &str) -> GenerateResponse {
        GenerateResponse {
            content: content.to_string(),
            provider_used: "openai".to_string(),
            processing_time_ms: 42,
            usage: Some(UsageReport {
                prompt_tokens: 2,
                completion_tokens: 4,
                total_tokens: 6,
                cost_usd: None,
            }),
        }
    }

    fn server_error(status: u16, body: &str) -> ApiError {
        ApiError::Status {
            stage: "test",
            endpoint: "http://localhost:8080/api/generate".to_string(),
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn accepted_turns_alternate_in_submission_order() {
        let mut conversation = Conversation::new();

        for index in 0..5 {
            let prompt = format!("prompt {index}");
            let turn = conversation.begin_turn(&prompt).unwrap();
            assert!(conversation.is_loading());
            assert!(conversation.complete_turn(turn, Ok(reply(&format!("reply {index}")))));
            assert!(!conversation.is_loading());
        }

        let messages = conversation.messages();
        assert_eq!(messages.len(), 10);
        for (index, pair) in messages.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("prompt {index}"));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("reply {index}"));
        }
    }

    #[test]
    fn blank_prompt_changes_nothing() {
        let mut conversation = Conversation::new();
        conversation.set_input("   ");

        let error = conversation.begin_turn("  \n\t").unwrap_err();

        assert!(matches!(error, SessionError::EmptyPrompt { .. }));
        assert!(conversation.messages().is_empty());
        assert!(!conversation.is_loading());
        assert_eq!(conversation.input(), "   ");
    }

    #[test]
    fn begin_turn_keeps_raw_text_and_clears_input() {
        let mut conversation = Conversation::new();
        conversation.set_input("  hello  ");

        conversation.begin_turn("  hello  ").unwrap();

        assert_eq!(conversation.messages()[0].content, "  hello  ");
        assert_eq!(conversation.input(), "");
    }

    #[test]
    fn second_turn_is_rejected_while_one_is_in_flight() {
        let mut conversation = Conversation::new();
        let first = conversation.begin_turn("first").unwrap();

        let error = conversation.begin_turn("second").unwrap_err();

        assert!(matches!(error, SessionError::TurnInFlight { active, .. } if active == first.0));
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.in_flight(), Some(first));
    }

    #[test]
    fn failed_turn_appends_error_surrogate_and_resets_loading() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hi").unwrap();

        assert!(conversation.complete_turn(turn, Err(server_error(500, "rate limited"))));

        let last = conversation.messages().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.status, MessageStatus::Failed);
        assert_eq!(last.content, "Server error: rate limited");
        assert_eq!(last.provider, None);
        assert_eq!(last.usage, None);
        assert!(!conversation.is_loading());
    }

    #[test]
    fn successful_turn_keeps_provider_and_usage() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hi").unwrap();

        conversation.complete_turn(turn, Ok(reply("hello")));

        let last = conversation.messages().last().unwrap();
        assert_eq!(last.provider.as_deref(), Some("openai"));
        assert_eq!(last.processing_time_ms, Some(42));
        let usage = last.usage.unwrap();
        assert_eq!(usage.total_tokens, 6);
        assert_eq!(usage.cost_usd, None);
    }

    #[test]
    fn stale_results_are_ignored() {
        let mut conversation = Conversation::new();
        let first = conversation.begin_turn("first").unwrap();
        conversation.complete_turn(first, Ok(reply("one")));
        let second = conversation.begin_turn("second").unwrap();

        assert!(!conversation.complete_turn(first, Ok(reply("late duplicate"))));
        assert!(!conversation.abort_turn(TurnId::new(99)));

        assert_eq!(conversation.messages().len(), 3);
        assert_eq!(conversation.in_flight(), Some(second));
    }

    #[test]
    fn aborted_turn_still_clears_loading() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("hi").unwrap();

        assert!(conversation.abort_turn(turn));

        assert!(!conversation.is_loading());
        assert!(conversation.messages()[1].is_failure());
    }
}
