//! Callbacks into the messaging front end that delivered an event.

use async_trait::async_trait;

/// Front-end operations a conversation turn needs once it has passed the
/// gates: the typing indicator and attachment downloads.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Show a "typing" indicator in `context_id`. Best effort, no-op by default.
    async fn send_typing(&self, _context_id: &str) {}

    /// Download the attachment behind `file_id` and return an image reference
    /// the completion service can read (URL or data URI).
    async fn fetch_image(&self, file_id: &str) -> anyhow::Result<String>;
}
