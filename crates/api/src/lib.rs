//! HTTP boundary of the LLM Nexus gateway.
//!
//! The session controller only talks to the gateway through [`ChatBackend`], so
//! tests and alternative transports can stand in for [`HttpBackend`].

mod client;
mod error;
mod provider;
mod wire;

use futures::future::BoxFuture;

pub use client::{BackendConfig, DEFAULT_API_BASE, DEFAULT_REQUEST_TIMEOUT, HttpBackend};
pub use error::{ApiError, ApiResult};
pub use provider::{Provider, UnknownProviderError};
pub use wire::{GenerateRequest, GenerateResponse, RegisterUserRequest, UsageReport, UserRecord};

pub const HEALTH_PATH: &str = "/api/health";
pub const USERS_PATH: &str = "/api/users";
pub const GENERATE_PATH: &str = "/api/generate";

/// Operations the gateway exposes to chat clients.
///
/// Futures are boxed so spawned tasks owning an `Arc<dyn ChatBackend>` can
/// drive them.
pub trait ChatBackend: Send + Sync {
    /// Resolves `Ok(())` only for a 2xx health response.
    fn check_health(&self) -> BoxFuture<'_, ApiResult<()>>;
    fn register_user(&self, name: String) -> BoxFuture<'_, ApiResult<UserRecord>>;
    fn generate(&self, request: GenerateRequest) -> BoxFuture<'_, ApiResult<GenerateResponse>>;
}
