//! Model registry, completion service abstraction, and the OpenAI-compatible
//! HTTP client.

pub mod credential;
pub mod model;
pub mod openai;
pub mod registry;

pub use {
    credential::CredentialCell,
    model::{CompletionRequest, CompletionService},
    openai::OpenAiProvider,
    registry::ModelRegistry,
};

/// Shared HTTP client for completion calls.
///
/// Reused across requests to share connection pools, DNS cache, and TLS
/// sessions.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}
