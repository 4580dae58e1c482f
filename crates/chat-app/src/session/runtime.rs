use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::FutureExt;
use nexus_api::{ChatBackend, GenerateRequest, Provider};
use nexus_storage::IdentityStore;
use tokio::sync::{mpsc, watch};

use super::{ChatSession, SessionCommand, SessionEvent, SessionView};
use crate::chat::{GenerationParams, TurnId};
use crate::error::SessionResult;
use crate::health::{DEFAULT_HEALTH_INTERVAL, HealthMonitor, ServerStatus};
use crate::registration::RegistrationTicket;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeOptions {
    pub provider: Provider,
    pub params: GenerationParams,
    pub health_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            params: GenerationParams::default(),
            health_interval: DEFAULT_HEALTH_INTERVAL,
        }
    }
}

/// Read-only handle to the latest published [`SessionView`].
#[derive(Clone)]
pub struct ViewHandle(Arc<ArcSwap<SessionView>>);

impl ViewHandle {
    pub fn current(&self) -> Arc<SessionView> {
        self.0.load_full()
    }
}

/// Drives a [`ChatSession`]: executes its commands, routes completions and
/// health changes back in as events, and republishes the view after each one.
pub struct SessionRuntime {
    session: ChatSession,
    backend: Arc<dyn ChatBackend>,
    identity_store: IdentityStore,
    health: HealthMonitor,
    health_status: watch::Receiver<ServerStatus>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    view: Arc<ArcSwap<SessionView>>,
}

impl SessionRuntime {
    /// Restores the stored identity and starts health monitoring. Must run inside a tokio runtime.
    pub fn start(
        backend: Arc<dyn ChatBackend>,
        identity_store: IdentityStore,
        options: RuntimeOptions,
    ) -> Self {
        let restored = identity_store.load();
        match &restored {
            Some(identity) => {
                tracing::info!(user_id = %identity.user_id, user_name = %identity.user_name, "restored identity");
            }
            None => tracing::info!("no stored identity, registration required"),
        }

        let session = ChatSession::new(restored, options.provider, options.params);
        let health = HealthMonitor::start(Arc::clone(&backend), options.health_interval);
        let health_status = health.subscribe();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let view = Arc::new(ArcSwap::from_pointee(session.view()));

        Self {
            session,
            backend,
            identity_store,
            health,
            health_status,
            events_tx,
            events_rx,
            view,
        }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn view(&self) -> Arc<SessionView> {
        self.view.load_full()
    }

    pub fn view_handle(&self) -> ViewHandle {
        ViewHandle(Arc::clone(&self.view))
    }

    /// Applies one event and runs the commands it produced.
    pub fn dispatch(&mut self, event: SessionEvent) -> SessionResult<()> {
        let kind = event.kind();
        let outcome = match self.session.handle(event) {
            Ok(commands) => {
                for command in commands {
                    self.execute(command);
                }
                Ok(())
            }
            Err(error) => {
                tracing::debug!(event = kind, error = %error, "session rejected event");
                Err(error)
            }
        };

        self.publish();
        outcome
    }

    /// Waits for the next completion or health change and applies it.
    /// Returns `false` once the runtime has shut down.
    pub async fn next_update(&mut self) -> bool {
        if self.session.is_closed() {
            return false;
        }

        let event = tokio::select! {
            Some(event) = self.events_rx.recv() => event,
            Ok(()) = self.health_status.changed() => {
                SessionEvent::HealthChanged(*self.health_status.borrow_and_update())
            }
            else => return false,
        };

        if let Err(error) = self.dispatch(event) {
            tracing::trace!(error = %error, "background update rejected");
        }
        true
    }

    /// Keeps applying updates until no registration or generation is pending.
    pub async fn wait_until_idle(&mut self) {
        loop {
            let view = self.view();
            if !view.is_loading && !view.registration_busy {
                return;
            }
            if !self.next_update().await {
                return;
            }
        }
    }

    /// Stops health monitoring and closes the session. Later completions are dropped.
    pub fn shutdown(&mut self) {
        if self.session.is_closed() {
            return;
        }

        self.health.stop();
        self.session.close();
        self.events_rx.close();
        self.publish();
        tracing::info!("session shut down");
    }

    fn publish(&self) {
        self.view.store(Arc::new(self.session.view()));
    }

    fn execute(&self, command: SessionCommand) {
        match command {
            SessionCommand::RegisterUser { ticket, name } => self.spawn_registration(ticket, name),
            SessionCommand::Generate { turn, request } => self.spawn_generation(turn, request),
            SessionCommand::PersistIdentity(identity) => {
                if let Err(error) = self.identity_store.save(&identity) {
                    tracing::warn!(
                        user_id = %identity.user_id,
                        error = %error,
                        "failed to persist identity, it will not survive a restart"
                    );
                }
            }
            SessionCommand::ClearIdentity => {
                if let Err(error) = self.identity_store.clear() {
                    tracing::warn!(error = %error, "failed to clear stored identity");
                }
            }
        }
    }

    fn spawn_registration(&self, ticket: RegistrationTicket, name: String) {
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async { backend.register_user(name).await })
                .catch_unwind()
                .await;
            let event = match outcome {
                Ok(outcome) => SessionEvent::RegistrationFinished { ticket, outcome },
                Err(_) => {
                    tracing::error!(%ticket, "registration task panicked");
                    SessionEvent::RegistrationAborted { ticket }
                }
            };

            if events.send(event).is_err() {
                tracing::debug!(%ticket, "session closed before registration finished");
            }
        });
    }

    fn spawn_generation(&self, turn: TurnId, request: GenerateRequest) {
        let backend = Arc::clone(&self.backend);
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(async { backend.generate(request).await })
                .catch_unwind()
                .await;
            let event = match outcome {
                Ok(outcome) => SessionEvent::GenerationFinished { turn, outcome },
                Err(_) => {
                    tracing::error!(%turn, "generation task panicked");
                    SessionEvent::GenerationAborted { turn }
                }
            };

            if events.send(event).is_err() {
                tracing::debug!(%turn, "session closed before generation finished");
            }
        });
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
