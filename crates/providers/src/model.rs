use {async_trait::async_trait, parley_common::types::Message};

/// A single chat-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Canonical model id.
    pub model: String,
    /// Full ordered conversation, optionally prefixed by a system message.
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Body for an OpenAI-compatible `/chat/completions` call.
    ///
    /// `max_tokens` is omitted entirely when unset.
    #[must_use]
    pub fn to_openai_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": self.messages,
            "temperature": self.temperature,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::Value::from(max_tokens);
        }
        body
    }
}

/// External text/vision generation backend.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Backend name for logs (e.g. "openai").
    fn name(&self) -> &str;

    /// Generate the next assistant message for `request` and return its text.
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;
}
