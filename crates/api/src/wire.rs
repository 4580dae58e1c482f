use serde::{Deserialize, Serialize};

use crate::provider::Provider;

/// Body of `POST /api/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUserRequest {
    pub name: String,
}

/// Identity record returned by `POST /api/users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
}

/// Body of `POST /api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub user_id: String,
    pub prompt: String,
    pub provider: Provider,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub content: String,
    pub provider_used: String,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default)]
    pub usage: Option<UsageReport>,
}

/// Token accounting as reported by the gateway.
///
/// `cost_usd` stays `None` for both an absent field and an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    #[serde(default)]
    pub cost_usd: Option<f64>,
}
