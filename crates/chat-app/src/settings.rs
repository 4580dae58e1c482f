use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use nexus_api::{BackendConfig, Provider};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, GenerationParams};
use crate::health::{DEFAULT_HEALTH_INTERVAL, MIN_HEALTH_INTERVAL};
use crate::session::RuntimeOptions;

pub const SETTINGS_DIRECTORY_NAME: &str = "nexus";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const IDENTITY_FILE_NAME: &str = "identity.json";
pub const ENV_PREFIX: &str = "NEXUS_";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load settings on `{stage}`, {source}"))]
    Extract {
        stage: &'static str,
        source: Box<figment::Error>,
    },
}

pub type SettingsResult<T> = Result<T, SettingsError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Gateway origin; empty means the local default.
    #[serde(default)]
    pub api_base: String,
    #[serde(default)]
    pub default_provider: Provider,
    #[serde(default = "default_health_interval_secs")]
    pub health_interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_path: Option<PathBuf>,
}

fn default_health_interval_secs() -> u64 {
    DEFAULT_HEALTH_INTERVAL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            default_provider: Provider::default(),
            health_interval_secs: default_health_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            identity_path: None,
        }
    }
}

impl Settings {
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_DIRECTORY_NAME)
            .join(SETTINGS_FILE_NAME)
    }

    pub fn default_identity_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(SETTINGS_DIRECTORY_NAME)
            .join(IDENTITY_FILE_NAME)
    }

    /// Defaults, then the JSON file (if present), then `NEXUS_*` variables.
    pub fn figment(config_path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn load(config_path: Option<&Path>) -> SettingsResult<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_config_path);
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let settings = Self::from_figment(Self::figment(&path))?;
        tracing::debug!(?settings, "loaded settings");
        Ok(settings)
    }

    pub fn from_figment(figment: Figment) -> SettingsResult<Self> {
        let settings = figment
            .extract::<Settings>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-settings",
            })?;
        Ok(settings.normalized())
    }

    pub fn normalized(mut self) -> Self {
        self.api_base = self.api_base.trim().trim_end_matches('/').to_string();
        self.health_interval_secs = self
            .health_interval_secs
            .max(MIN_HEALTH_INTERVAL.as_secs());
        self.request_timeout_secs = self.request_timeout_secs.max(1);
        self.temperature = if self.temperature.is_finite() {
            self.temperature.clamp(0.0, MAX_TEMPERATURE)
        } else {
            DEFAULT_TEMPERATURE
        };
        self.max_tokens = self.max_tokens.max(1);
        self.identity_path = self
            .identity_path
            .filter(|path| !path.as_os_str().is_empty());
        self
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig::new(&self.api_base)
            .with_timeout(Some(Duration::from_secs(self.request_timeout_secs)))
    }

    pub fn identity_path(&self) -> PathBuf {
        self.identity_path
            .clone()
            .unwrap_or_else(Self::default_identity_path)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            provider: self.default_provider,
            params: self.generation_params(),
            health_interval: self.health_interval(),
        }
    }
}
