use std::sync::Arc;

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    tracing::{debug, trace, warn},
};

use crate::{
    credential::CredentialCell,
    model::{CompletionRequest, CompletionService},
};

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
///
/// The credential is read on every call so `/set credential` takes effect
/// for the very next turn.
pub struct OpenAiProvider {
    base_url: String,
    credential: Arc<CredentialCell>,
    client: &'static reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, credential: Arc<CredentialCell>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            client: crate::shared_http_client(),
        }
    }
}

#[async_trait]
impl CompletionService for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
        let Some(api_key) = self.credential.get() else {
            anyhow::bail!("no API key configured");
        };

        let body = request.to_openai_body();
        debug!(
            model = %request.model,
            messages_count = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "openai complete request"
        );
        trace!(body = %serde_json::to_string(&body).unwrap_or_default(), "openai request body");

        let http_resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %request.model, body = %body_text, "openai API error");
            anyhow::bail!("OpenAI API error HTTP {status}: {body_text}");
        }

        let resp = http_resp.json::<serde_json::Value>().await?;
        trace!(response = %resp, "openai raw response");

        let text = resp["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("completion response carried no message content"))?;
        Ok(text.to_string())
    }
}
