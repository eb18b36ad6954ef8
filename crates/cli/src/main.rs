use std::{path::PathBuf, sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    parley_chat::{ChatChannel, ChatServices, Dispatcher, QuotaGuard},
    parley_config::{ParleyConfig, Severity, ValidationResult},
    parley_providers::{CredentialCell, ModelRegistry, OpenAiProvider},
    parley_sessions::SessionStore,
    secrecy::Secret,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "parley", version, about = "Telegram chat bot for OpenAI-compatible models")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (overrides discovery).
    #[arg(long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Shorthand for `--log-level debug`.
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Telegram bot token.
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Completion service API key. Can also be set at runtime with
    /// `/set credential`.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default).
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn init_telemetry(cli: &Cli) {
    let level = if cli.debug {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn configuration_error(message: impl Into<String>) -> anyhow::Error {
    parley_chat::Error::Configuration(message.into()).into()
}

/// An explicit path must load; a discovered file falls back to defaults.
fn load_configuration(path: Option<&PathBuf>) -> anyhow::Result<ParleyConfig> {
    match path {
        Some(path) => {
            parley_config::load_config(path).map_err(|e| configuration_error(e.to_string()))
        },
        None => Ok(parley_config::discover_and_load()),
    }
}

fn report(result: &ValidationResult) {
    for diagnostic in &result.diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => warn!("{diagnostic}"),
        }
    }
}

/// Command-line key wins over the config file. Blank values count as unset.
fn initial_credential(cli_key: Option<String>, config: &ParleyConfig) -> Option<Secret<String>> {
    cli_key
        .filter(|k| !k.trim().is_empty())
        .map(Secret::new)
        .or_else(|| config.completion.api_key.clone())
}

fn build_dispatcher(
    config: &ParleyConfig,
    credential: Arc<CredentialCell>,
    channel: Arc<dyn ChatChannel>,
) -> anyhow::Result<Dispatcher> {
    let registry = Arc::new(ModelRegistry::from_config(&config.models));

    let mut defaults = config.default_session_values.clone();
    defaults.model = registry
        .canonicalize(&defaults.model)
        .map(str::to_string)
        .ok_or_else(|| {
            configuration_error(format!("unknown default model \"{}\"", defaults.model))
        })?;

    let completion =
        OpenAiProvider::new(config.completion.base_url.clone(), Arc::clone(&credential));

    Ok(Dispatcher::new(ChatServices {
        store: Arc::new(SessionStore::new(defaults)),
        registry,
        credential,
        quota: Arc::new(QuotaGuard::from_config(&config.quota)),
        completion: Arc::new(completion),
        channel,
        completion_timeout: Duration::from_secs(config.completion.timeout_secs),
        max_reply_chars: config.telegram.max_reply_chars,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "parley starting");

    let config = load_configuration(cli.config.as_ref())?;
    let validation = parley_config::validate::validate(&config);
    report(&validation);
    if validation.has_errors() {
        return Err(configuration_error(format!(
            "configuration has {} error(s)",
            validation.count(Severity::Error)
        )));
    }

    if matches!(cli.command, Some(Commands::CheckConfig)) {
        println!(
            "configuration OK ({} warning(s))",
            validation.count(Severity::Warning)
        );
        return Ok(());
    }

    let Some(token) = cli
        .telegram_token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .map(Secret::new)
    else {
        return Err(configuration_error("TELEGRAM_TOKEN is not set."));
    };

    let credential = Arc::new(CredentialCell::new(initial_credential(
        cli.openai_api_key.clone(),
        &config,
    )));
    if !credential.is_set() {
        warn!("no completion credential configured; users will be asked to /set credential");
    }

    let bot = parley_telegram::build_bot(&token, &config.telegram)?;
    let channel = Arc::new(parley_telegram::TelegramChannel::new(bot.clone()));
    let dispatcher = Arc::new(build_dispatcher(&config, credential, channel)?);
    let (cancel, polling) =
        parley_telegram::start_polling(bot, &config.telegram, dispatcher).await?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutting down");
            cancel.cancel();
        },
        () = cancel.cancelled() => {},
    }

    polling.await?;
    Ok(())
}
