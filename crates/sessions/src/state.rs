use {parley_common::types::Message, parley_config::SessionDefaults};

/// Per-session conversation settings and history.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub session_id: String,
    /// Canonical model id.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    /// Chronological, append-only except for an explicit clear.
    pub chat_history: Vec<Message>,
}

impl SessionState {
    /// Fresh session populated from the configured defaults.
    ///
    /// `model` must already be canonical; the store resolves it once when
    /// it is built.
    pub fn from_defaults(session_id: impl Into<String>, defaults: &SessionDefaults) -> Self {
        Self {
            session_id: session_id.into(),
            model: defaults.model.clone(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            system_prompt: defaults.system_prompt.clone(),
            chat_history: Vec::new(),
        }
    }

    /// `key: value` lines for every field except the history.
    #[must_use]
    pub fn settings_lines(&self) -> Vec<String> {
        vec![
            format!("session_id: {}", self.session_id),
            format!("model: {}", self.model),
            format!("temperature: {}", self.temperature),
            format!(
                "max_tokens: {}",
                self.max_tokens
                    .map_or_else(|| "not set".to_string(), |n| n.to_string())
            ),
            format!(
                "system_prompt: {}",
                self.system_prompt.as_deref().unwrap_or("not set")
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_defaults_copies_every_field() {
        let defaults = SessionDefaults {
            model: "gpt-4o".into(),
            temperature: 0.3,
            max_tokens: Some(256),
            system_prompt: Some("You are terse.".into()),
        };
        let state = SessionState::from_defaults("42", &defaults);
        assert_eq!(state.session_id, "42");
        assert_eq!(state.model, "gpt-4o");
        assert_eq!(state.temperature, 0.3);
        assert_eq!(state.max_tokens, Some(256));
        assert_eq!(state.system_prompt.as_deref(), Some("You are terse."));
        assert!(state.chat_history.is_empty());
    }

    #[test]
    fn settings_lines_skip_history() {
        let mut state = SessionState::from_defaults("7", &SessionDefaults::default());
        state.chat_history.push(Message::user("secret question"));
        let lines = state.settings_lines().join("\n");
        assert!(lines.contains("model: gpt-4o-mini"));
        assert!(lines.contains("max_tokens: not set"));
        assert!(!lines.contains("secret question"));
        assert!(!lines.contains("chat_history"));
    }
}
