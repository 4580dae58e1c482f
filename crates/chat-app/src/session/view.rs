use nexus_api::Provider;
use nexus_storage::Identity;

use crate::chat::Message;
use crate::health::ServerStatus;

/// Snapshot consumed by the presentation layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionView {
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub server_status: ServerStatus,
    pub identity: Option<Identity>,
    pub provider: Provider,
    pub registration_visible: bool,
    pub registration_error: Option<String>,
    pub registration_busy: bool,
    pub input: String,
}

impl SessionView {
    /// Mirrors the send button: disabled while loading or with a blank buffer.
    pub fn can_send(&self) -> bool {
        !self.is_loading && !self.registration_visible && !self.input.trim().is_empty()
    }
}
