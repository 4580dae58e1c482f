#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use nexus::{RuntimeOptions, SessionRuntime, SessionView};
use nexus_api::{
    ApiError, ApiResult, ChatBackend, GenerateRequest, GenerateResponse, UsageReport, UserRecord,
};
use nexus_storage::{Identity, IdentityStore, MemoryStore};
use tokio::sync::oneshot;

/// How the backend answers one registration or generation call.
pub enum Scripted<T> {
    Now(ApiResult<T>),
    Gated(oneshot::Receiver<ApiResult<T>>),
    Panic,
}

/// In-process gateway whose answers are queued by the test.
pub struct ScriptedBackend {
    healthy: AtomicBool,
    health_probes: AtomicUsize,
    registrations: Mutex<VecDeque<Scripted<UserRecord>>>,
    generations: Mutex<VecDeque<Scripted<GenerateResponse>>>,
    registered_names: Mutex<Vec<String>>,
    generate_requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            health_probes: AtomicUsize::new(0),
            registrations: Mutex::new(VecDeque::new()),
            generations: Mutex::new(VecDeque::new()),
            registered_names: Mutex::new(Vec::new()),
            generate_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn health_probes(&self) -> usize {
        self.health_probes.load(Ordering::SeqCst)
    }

    pub fn script_registration(&self, script: Scripted<UserRecord>) {
        self.registrations.lock().unwrap().push_back(script);
    }

    pub fn gate_registration(&self) -> oneshot::Sender<ApiResult<UserRecord>> {
        let (tx, rx) = oneshot::channel();
        self.script_registration(Scripted::Gated(rx));
        tx
    }

    pub fn script_generation(&self, script: Scripted<GenerateResponse>) {
        self.generations.lock().unwrap().push_back(script);
    }

    pub fn gate_generation(&self) -> oneshot::Sender<ApiResult<GenerateResponse>> {
        let (tx, rx) = oneshot::channel();
        self.script_generation(Scripted::Gated(rx));
        tx
    }

    pub fn registered_names(&self) -> Vec<String> {
        self.registered_names.lock().unwrap().clone()
    }

    pub fn generate_requests(&self) -> Vec<GenerateRequest> {
        self.generate_requests.lock().unwrap().clone()
    }
}

async fn resolve<T>(script: Option<Scripted<T>>) -> ApiResult<T> {
    match script {
        Some(Scripted::Now(outcome)) => outcome,
        Some(Scripted::Gated(rx)) => rx
            .await
            .unwrap_or_else(|_| Err(server_error(503, "gate dropped"))),
        Some(Scripted::Panic) => panic!("scripted backend panic"),
        None => Err(server_error(501, "unscripted call")),
    }
}

impl ChatBackend for ScriptedBackend {
    fn check_health(&self) -> BoxFuture<'_, ApiResult<()>> {
        self.health_probes.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy.load(Ordering::SeqCst);
        Box::pin(async move {
            if healthy {
                Ok(())
            } else {
                Err(server_error(503, "down"))
            }
        })
    }

    fn register_user(&self, name: String) -> BoxFuture<'_, ApiResult<UserRecord>> {
        self.registered_names.lock().unwrap().push(name);
        let script = self.registrations.lock().unwrap().pop_front();
        Box::pin(resolve(script))
    }

    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, ApiResult<GenerateResponse>> {
        self.generate_requests.lock().unwrap().push(request);
        let script = self.generations.lock().unwrap().pop_front();
        Box::pin(resolve(script))
    }
}

pub fn server_error(status: u16, body: &str) -> ApiError {
    ApiError::Status {
        stage: "scripted-backend",
        endpoint: "http://localhost:8080/api".to_string(),
        status,
        body: body.to_string(),
    }
}

pub fn user(id: &str, name: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn reply(content: &str, provider_used: &str) -> GenerateResponse {
    GenerateResponse {
        content: content.to_string(),
        provider_used: provider_used.to_string(),
        processing_time_ms: 42,
        usage: Some(UsageReport {
            prompt_tokens: 5,
            completion_tokens: 7,
            total_tokens: 12,
            cost_usd: Some(0.0002),
        }),
    }
}

pub fn memory_identity_store(existing: Option<Identity>) -> IdentityStore {
    let store = IdentityStore::new(Arc::new(MemoryStore::new()));
    if let Some(identity) = existing {
        store.save(&identity).unwrap();
    }
    store
}

/// Health probes after the first one stay out of the way of request flows.
pub fn quiet_options() -> RuntimeOptions {
    RuntimeOptions {
        health_interval: Duration::from_secs(3600),
        ..RuntimeOptions::default()
    }
}

pub fn start(backend: &Arc<ScriptedBackend>, store: IdentityStore) -> SessionRuntime {
    SessionRuntime::start(backend.clone(), store, quiet_options())
}

/// Applies updates until `predicate` holds for the published view.
pub async fn settle_until(
    runtime: &mut SessionRuntime,
    predicate: impl Fn(&SessionView) -> bool,
) -> Arc<SessionView> {
    let wait = async {
        while !predicate(&runtime.view()) {
            if !runtime.next_update().await {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(120), wait)
        .await
        .expect("runtime did not reach the expected state");
    runtime.view()
}
