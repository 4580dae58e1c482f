use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use nexus::chat::Role;
use nexus::console::{self, Pacing};
use nexus::registration::REGISTRATION_FAILED_TEXT;
use nexus::{SessionError, SessionEvent, SessionRuntime, Settings, SettingsError};
use nexus_api::{ApiError, HttpBackend, Provider};
use nexus_storage::{IdentityStore, JsonFileStore};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nexus")]
#[command(about = "Chat with LLM providers through an LLM Nexus gateway", long_about = None)]
struct Cli {
    /// Settings file, defaults to <config dir>/nexus/settings.json
    #[arg(long)]
    config: Option<PathBuf>,
    /// Gateway origin, e.g. http://localhost:8080
    #[arg(long)]
    api_base: Option<String>,
    /// Provider for new turns (openai, gemini)
    #[arg(long)]
    provider: Option<Provider>,
    /// Send a single prompt, print the reply and exit
    #[arg(long)]
    prompt: Option<String>,
    /// Display name to register with when no identity is stored
    #[arg(long)]
    name: Option<String>,
}

impl Cli {
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(api_base) = &self.api_base {
            settings.api_base = api_base.clone();
        }
        if let Some(provider) = self.provider {
            settings.default_provider = provider;
        }
        settings.normalized()
    }
}

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed on `{stage}`"))]
    LoadSettings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed on `{stage}`"))]
    BuildBackend {
        stage: &'static str,
        source: ApiError,
    },
    #[snafu(display("failed on `{stage}`"))]
    Console {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("request refused on `{stage}`"))]
    Session {
        stage: &'static str,
        source: SessionError,
    },
    #[snafu(display("no identity stored, pass --name to register first"))]
    NameRequired { stage: &'static str },
    #[snafu(display("registration failed: {reason}"))]
    Registration { stage: &'static str, reason: String },
    #[snafu(display("generation failed: {reason}"))]
    Generation { stage: &'static str, reason: String },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), CliError> {
    init_tracing();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context(LoadSettingsSnafu {
        stage: "load-settings",
    })?;
    let settings = cli.apply(settings);

    let backend = HttpBackend::new(settings.backend_config()).context(BuildBackendSnafu {
        stage: "build-http-client",
    })?;
    let identity_store = IdentityStore::new(Arc::new(JsonFileStore::new(settings.identity_path())));
    let mut runtime =
        SessionRuntime::start(Arc::new(backend), identity_store, settings.runtime_options());

    let outcome = match &cli.prompt {
        Some(prompt) => run_once(&mut runtime, cli.name.as_deref(), prompt).await,
        None => run_interactive(&mut runtime, cli.name.as_deref()).await,
    };

    runtime.shutdown();
    outcome
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
}

async fn run_once(
    runtime: &mut SessionRuntime,
    name: Option<&str>,
    prompt: &str,
) -> Result<(), CliError> {
    if runtime.view().identity.is_none() {
        let name = name.context(NameRequiredSnafu {
            stage: "one-shot-registration",
        })?;
        register_and_wait(runtime, name).await?;
    }

    runtime
        .dispatch(SessionEvent::Submit(prompt.to_string()))
        .context(SessionSnafu {
            stage: "submit-prompt",
        })?;
    runtime.wait_until_idle().await;

    let view = runtime.view();
    let reply = view
        .messages
        .last()
        .filter(|message| message.role == Role::Assistant)
        .context(GenerationSnafu {
            stage: "await-reply",
            reason: "no reply arrived",
        })?;
    if reply.is_failure() {
        return GenerationSnafu {
            stage: "await-reply",
            reason: reply.content.clone(),
        }
        .fail();
    }

    console::write_message(&mut std::io::stdout(), reply).context(ConsoleSnafu {
        stage: "print-reply",
    })
}

async fn register_and_wait(runtime: &mut SessionRuntime, name: &str) -> Result<(), CliError> {
    runtime
        .dispatch(SessionEvent::Register(name.to_string()))
        .context(SessionSnafu {
            stage: "register-display-name",
        })?;
    runtime.wait_until_idle().await;

    let view = runtime.view();
    if view.identity.is_none() {
        return RegistrationSnafu {
            stage: "await-registration",
            reason: view
                .registration_error
                .clone()
                .unwrap_or_else(|| REGISTRATION_FAILED_TEXT.to_string()),
        }
        .fail();
    }
    Ok(())
}

async fn run_interactive(runtime: &mut SessionRuntime, name: Option<&str>) -> Result<(), CliError> {
    let pacing = if std::io::stdin().is_terminal() {
        Pacing::Interactive
    } else {
        Pacing::Sequential
    };

    if let Some(name) = name
        && runtime.view().identity.is_none()
    {
        console::report_rejection(
            &mut std::io::stdout(),
            runtime.dispatch(SessionEvent::Register(name.to_string())),
        )
        .context(ConsoleSnafu {
            stage: "register-display-name",
        })?;
    }

    console::run(
        runtime,
        BufReader::new(tokio::io::stdin()),
        std::io::stdout(),
        pacing,
    )
    .await
    .context(ConsoleSnafu {
        stage: "run-console",
    })
}
