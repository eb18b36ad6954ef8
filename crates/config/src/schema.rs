//! Config schema types (session defaults, model table, quota, completion
//! backend, Telegram front end).

use std::collections::BTreeMap;

use {
    parley_common::text::MAX_REPLY_CHARS,
    secrecy::Secret,
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    /// Values copied into every newly created session.
    pub default_session_values: SessionDefaults,
    pub models: ModelsConfig,
    pub quota: QuotaConfig,
    pub completion: CompletionConfig,
    pub telegram: TelegramConfig,

    /// Top-level alias table as written by older `configuration.json` files.
    #[serde(rename = "VALID_MODELS")]
    pub legacy_valid_models: Option<BTreeMap<String, Vec<String>>>,

    /// Top-level vision list as written by older `configuration.json` files.
    #[serde(rename = "vision_models")]
    pub legacy_vision_models: Option<Vec<String>>,
}

impl ParleyConfig {
    /// Fold the legacy top-level keys into [`ModelsConfig`].
    ///
    /// Legacy keys win over the built-in defaults but an explicit `[models]`
    /// section is only replaced when the legacy key is present.
    pub fn absorb_legacy_keys(&mut self) {
        if let Some(aliases) = self.legacy_valid_models.take() {
            self.models.aliases = aliases;
        }
        if let Some(vision) = self.legacy_vision_models.take() {
            self.models.vision = vision;
        }
    }
}

/// Field values a fresh session starts with.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionDefaults {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 1.0,
            max_tokens: None,
            system_prompt: None,
        }
    }
}

/// Canonical model table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Canonical model id → accepted aliases.
    pub aliases: BTreeMap<String, Vec<String>>,
    /// Canonical ids that accept image input.
    pub vision: Vec<String>,
    /// Model whose requests always carry a fixed `max_tokens`.
    pub vision_override: Option<VisionOverride>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let aliases = [
            ("gpt-4o", &["4o", "gpt4o"][..]),
            ("gpt-4o-mini", &["mini", "4o-mini"][..]),
            ("gpt-4-turbo", &["turbo", "gpt4"][..]),
            ("gpt-3.5-turbo", &["3.5", "gpt3"][..]),
            ("gpt-4-vision-preview", &["vision"][..]),
        ]
        .into_iter()
        .map(|(id, names)| (id.to_string(), names.iter().map(|n| n.to_string()).collect()))
        .collect();

        Self {
            aliases,
            vision: vec![
                "gpt-4o".into(),
                "gpt-4o-mini".into(),
                "gpt-4-turbo".into(),
                "gpt-4-vision-preview".into(),
            ],
            vision_override: Some(VisionOverride::default()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VisionOverride {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for VisionOverride {
    fn default() -> Self {
        Self {
            model: "gpt-4-vision-preview".into(),
            max_tokens: 4096,
        }
    }
}

/// Free-usage policy per user identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Conversation turns allowed before an identity is denied.
    pub free_limit: u32,
    /// Identities that are never counted.
    pub allowlist: Vec<String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_limit: 3,
            allowlist: Vec::new(),
        }
    }
}

/// Completion backend (OpenAI-compatible chat completions endpoint).
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    /// Upper bound for a single completion round trip.
    pub timeout_secs: u64,
    /// Fallback credential when `OPENAI_API_KEY` is not set.
    pub api_key: Option<Secret<String>>,
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            timeout_secs: 60,
            api_key: None,
        }
    }
}

/// Telegram front end.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Long-polling timeout passed to `getUpdates`.
    pub poll_timeout_secs: u32,
    /// Ceiling for a single outbound message.
    pub max_reply_chars: usize,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
            max_reply_chars: MAX_REPLY_CHARS,
        }
    }
}
