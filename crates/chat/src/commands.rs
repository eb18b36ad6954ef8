//! Administrative commands.

use std::{fmt, str::FromStr, sync::Arc};

use {
    async_trait::async_trait,
    parley_config::validate::TEMPERATURE_RANGE,
    parley_providers::{CredentialCell, ModelRegistry},
    parley_sessions::{SessionHandle, SessionStore},
    secrecy::Secret,
    tracing::info,
};

use crate::{
    error::{Context, Error, Result},
    event::{Command, EventPayload},
    pipeline::{Endpoint, EventContext},
};

pub const GREETING: &str =
    "ℹ️Welcome! Go ahead and say something to start the conversation. More features: /help";

pub const HELP: &str = "\
/start - Start the conversation
/reset - Reset all settings for this chat
/clear - Clear the chat history
/set <key> <value> - Change a setting (model, temperature, max_tokens, system_prompt, credential)
/show - Show the current settings
/help - Show this help";

/// Names accepted by [`CommandRouter`].
pub const COMMAND_NAMES: &[&str] = &["start", "help", "reset", "clear", "set", "show"];

/// Keys accepted by `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Model,
    Temperature,
    MaxTokens,
    SystemPrompt,
    Credential,
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "model" => Ok(Self::Model),
            "temperature" => Ok(Self::Temperature),
            "max_tokens" => Ok(Self::MaxTokens),
            "system_prompt" => Ok(Self::SystemPrompt),
            "credential" | "openai_api_key" => Ok(Self::Credential),
            other => Err(Error::validation(format!(
                "Unknown setting \"{other}\". {}",
                SettingKey::usage()
            ))),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Model => "model",
            Self::Temperature => "temperature",
            Self::MaxTokens => "max_tokens",
            Self::SystemPrompt => "system_prompt",
            Self::Credential => "credential",
        })
    }
}

impl SettingKey {
    fn usage() -> &'static str {
        "Please specify what to set (model, temperature, max_tokens, system_prompt, credential)."
    }
}

/// Dispatches `(name, args)` commands against the session store, the model
/// table and the process-wide credential.
pub struct CommandRouter {
    store: Arc<SessionStore>,
    registry: Arc<ModelRegistry>,
    credential: Arc<CredentialCell>,
}

impl CommandRouter {
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<ModelRegistry>,
        credential: Arc<CredentialCell>,
    ) -> Self {
        Self {
            store,
            registry,
            credential,
        }
    }

    /// Execute `command` for `session_id`. `session` is the handle bound by
    /// the pipeline, if any.
    pub async fn execute(
        &self,
        session_id: &str,
        session: Option<&SessionHandle>,
        command: &Command,
    ) -> Result<String> {
        match command.name.as_str() {
            "start" => Ok(GREETING.to_string()),
            "help" => Ok(HELP.to_string()),
            "reset" => Ok(if self.store.reset(session_id) {
                "ℹ️All settings have been reset.".to_string()
            } else {
                "ℹ️No session data to reset.".to_string()
            }),
            "clear" => Ok(if self.store.clear_history(session_id).await {
                "ℹ️Chat history is now empty!".to_string()
            } else {
                "ℹ️No chat history found.".to_string()
            }),
            "show" => {
                let session = self.session(session_id, session);
                let state = session.lock().await;
                let mut lines = vec!["ℹ️Session data:".to_string()];
                lines.extend(state.settings_lines());
                Ok(lines.join("\n"))
            },
            "set" => self.set(session_id, session, &command.args).await,
            other => Err(Error::validation(format!(
                "Unknown command /{other}. See /help."
            ))),
        }
    }

    async fn set(
        &self,
        session_id: &str,
        session: Option<&SessionHandle>,
        args: &[String],
    ) -> Result<String> {
        let Some((key, rest)) = args.split_first() else {
            return Err(Error::validation(SettingKey::usage()));
        };
        let key: SettingKey = key.parse()?;
        let value = rest.join(" ");

        if key == SettingKey::Credential {
            if value.trim().is_empty() {
                return Err(Error::validation(
                    "Please provide a key: /set credential THE_API_KEY",
                ));
            }
            self.credential.set(Secret::new(value));
            return Ok("✅API key has been set.".to_string());
        }

        let session = self.session(session_id, session);
        let mut state = session.lock().await;
        let shown = match key {
            SettingKey::Model => {
                let canonical = self.registry.canonicalize(&value).ok_or_else(|| {
                    let known: Vec<&str> = self.registry.models().collect();
                    Error::validation(format!(
                        "Unknown model \"{value}\". Available: {}.",
                        known.join(", ")
                    ))
                })?;
                state.model = canonical.to_string();
                state.chat_history.clear();
                canonical.to_string()
            },
            SettingKey::Temperature => {
                let temperature = value
                    .parse::<f64>()
                    .ok()
                    .filter(|t| TEMPERATURE_RANGE.contains(t))
                    .ok_or_else(|| {
                        Error::validation(format!(
                            "Temperature must be a number between {} and {}, got \"{value}\".",
                            TEMPERATURE_RANGE.start(),
                            TEMPERATURE_RANGE.end()
                        ))
                    })?;
                state.temperature = temperature;
                temperature.to_string()
            },
            SettingKey::MaxTokens => {
                if value.eq_ignore_ascii_case("none") {
                    state.max_tokens = None;
                    "none".to_string()
                } else {
                    let max_tokens = value.parse::<u32>().map_err(|_| {
                        Error::validation(format!(
                            "max_tokens must be a non-negative integer or \"none\", got \"{value}\"."
                        ))
                    })?;
                    state.max_tokens = Some(max_tokens);
                    max_tokens.to_string()
                }
            },
            SettingKey::SystemPrompt => {
                state.system_prompt = (!value.is_empty()).then(|| value.clone());
                if value.is_empty() {
                    "nothing".to_string()
                } else {
                    value
                }
            },
            SettingKey::Credential => {
                return Err(Error::message("credential is not a session setting"));
            },
        };

        info!(session_id, key = %key, "session setting changed");
        Ok(format!("✅{key} set to {shown}"))
    }

    fn session(&self, session_id: &str, bound: Option<&SessionHandle>) -> SessionHandle {
        bound
            .map(Arc::clone)
            .unwrap_or_else(|| self.store.get_or_init(session_id))
    }
}

#[async_trait]
impl Endpoint for CommandRouter {
    async fn call(&self, ctx: &mut EventContext) -> Result<String> {
        let EventPayload::Command(command) = &ctx.event.payload else {
            return Err(Error::message("command endpoint received content"));
        };
        let identity = ctx.identity.as_ref().context("identity not resolved")?;
        self.execute(&identity.session_id, ctx.session.as_ref(), command)
            .await
    }
}

#[cfg(test)]
mod tests {
    use {
        parley_common::types::Message,
        parley_config::{ModelsConfig, SessionDefaults},
        rstest::rstest,
        secrecy::ExposeSecret,
    };

    use super::*;

    struct Fixture {
        router: CommandRouter,
        store: Arc<SessionStore>,
        credential: Arc<CredentialCell>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SessionStore::new(SessionDefaults::default()));
        let credential = Arc::new(CredentialCell::default());
        let router = CommandRouter::new(
            Arc::clone(&store),
            Arc::new(ModelRegistry::from_config(&ModelsConfig::default())),
            Arc::clone(&credential),
        );
        Fixture {
            router,
            store,
            credential,
        }
    }

    impl Fixture {
        async fn run(&self, name: &str, args: &[&str]) -> Result<String> {
            self.router
                .execute("s1", None, &Command::new(name, args.iter().copied()))
                .await
        }

        async fn seed_history(&self) {
            let handle = self.store.get_or_init("s1");
            let mut state = handle.lock().await;
            state.chat_history.push(Message::user("hi"));
            state.chat_history.push(Message::assistant("hello"));
        }
    }

    #[tokio::test]
    async fn start_and_help_do_not_touch_sessions() {
        let f = fixture();
        assert_eq!(f.run("start", &[]).await.unwrap(), GREETING);
        assert!(f.run("help", &[]).await.unwrap().contains("/set"));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn reset_reports_whether_anything_existed() {
        let f = fixture();
        assert_eq!(
            f.run("reset", &[]).await.unwrap(),
            "ℹ️No session data to reset."
        );
        f.store.get_or_init("s1");
        assert_eq!(
            f.run("reset", &[]).await.unwrap(),
            "ℹ️All settings have been reset."
        );
        assert!(f.store.get("s1").is_none());
    }

    #[tokio::test]
    async fn clear_empties_history_only() {
        let f = fixture();
        assert_eq!(f.run("clear", &[]).await.unwrap(), "ℹ️No chat history found.");

        f.seed_history().await;
        f.run("set", &["temperature", "0.4"]).await.unwrap();
        assert_eq!(
            f.run("clear", &[]).await.unwrap(),
            "ℹ️Chat history is now empty!"
        );

        let state = f.store.snapshot("s1").await.unwrap();
        assert!(state.chat_history.is_empty());
        assert_eq!(state.temperature, 0.4);
        assert_eq!(state.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn show_lists_settings_without_history() {
        let f = fixture();
        f.seed_history().await;
        let shown = f.run("show", &[]).await.unwrap();
        assert!(shown.starts_with("ℹ️Session data:"));
        assert!(shown.contains("model: gpt-4o-mini"));
        assert!(shown.contains("temperature: 1"));
        assert!(!shown.contains("hello"));
    }

    #[tokio::test]
    async fn set_model_canonicalizes_and_clears_history() {
        let f = fixture();
        f.seed_history().await;

        assert_eq!(
            f.run("set", &["model", "4o"]).await.unwrap(),
            "✅model set to gpt-4o"
        );
        let state = f.store.snapshot("s1").await.unwrap();
        assert_eq!(state.model, "gpt-4o");
        assert!(state.chat_history.is_empty());
    }

    #[tokio::test]
    async fn set_unknown_model_leaves_state_unchanged() {
        let f = fixture();
        f.seed_history().await;
        let before = f.store.snapshot("s1").await.unwrap();

        let err = f.run("set", &["model", "davinci"]).await.unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("davinci")));
        assert_eq!(f.store.snapshot("s1").await.unwrap(), before);
    }

    #[rstest]
    #[case("0.0", true)]
    #[case("2.0", true)]
    #[case("0.7", true)]
    #[case("-0.01", false)]
    #[case("2.01", false)]
    #[case("warm", false)]
    #[case("NaN", false)]
    #[tokio::test]
    async fn set_temperature_range(#[case] value: &str, #[case] accepted: bool) {
        let f = fixture();
        let result = f.run("set", &["temperature", value]).await;
        let state = f.store.snapshot("s1").await.unwrap();
        if accepted {
            assert!(result.is_ok());
            assert_eq!(state.temperature, value.parse::<f64>().unwrap());
        } else {
            assert!(matches!(result, Err(Error::Validation(_))));
            assert_eq!(state.temperature, 1.0);
        }
    }

    #[tokio::test]
    async fn set_max_tokens() {
        let f = fixture();
        f.run("set", &["max_tokens", "512"]).await.unwrap();
        assert_eq!(f.store.snapshot("s1").await.unwrap().max_tokens, Some(512));

        assert!(f.run("set", &["max_tokens", "-1"]).await.is_err());
        assert!(f.run("set", &["max_tokens", "lots"]).await.is_err());
        assert_eq!(f.store.snapshot("s1").await.unwrap().max_tokens, Some(512));

        f.run("set", &["MAX_TOKENS", "none"]).await.unwrap();
        assert_eq!(f.store.snapshot("s1").await.unwrap().max_tokens, None);
    }

    #[tokio::test]
    async fn set_system_prompt_joins_tokens() {
        let f = fixture();
        f.run("set", &["system_prompt", "You", "are", "a", "pirate."])
            .await
            .unwrap();
        assert_eq!(
            f.store.snapshot("s1").await.unwrap().system_prompt.as_deref(),
            Some("You are a pirate.")
        );

        f.run("set", &["system_prompt"]).await.unwrap();
        assert_eq!(f.store.snapshot("s1").await.unwrap().system_prompt, None);
    }

    #[tokio::test]
    async fn set_credential_is_global() {
        let f = fixture();
        assert_eq!(
            f.run("set", &["openai_api_key", "sk-123"]).await.unwrap(),
            "✅API key has been set."
        );
        assert_eq!(f.credential.get().unwrap().expose_secret(), "sk-123");
        assert!(f.run("set", &["credential"]).await.is_err());
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn set_validation_errors() {
        let f = fixture();
        assert!(matches!(
            f.run("set", &[]).await,
            Err(Error::Validation(ref m)) if m.starts_with("Please specify")
        ));
        assert!(matches!(
            f.run("set", &["colour", "red"]).await,
            Err(Error::Validation(ref m)) if m.contains("colour")
        ));
    }

    #[tokio::test]
    async fn unknown_command_is_a_validation_error() {
        let f = fixture();
        assert!(matches!(
            f.run("frobnicate", &[]).await,
            Err(Error::Validation(_))
        ));
    }
}
