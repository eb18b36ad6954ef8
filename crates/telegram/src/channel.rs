//! Typing indicator and photo downloads on behalf of the conversation engine.

use {
    async_trait::async_trait,
    base64::Engine,
    parley_chat::ChatChannel,
    teloxide::prelude::*,
    tracing::debug,
};

use crate::{
    error::{Error, Result},
    outbound,
};

pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Download a file through the Bot API file endpoint. Uses the bot's own
    /// client so the request shares its timeout.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.bot.get_file(file_id).await?;

        let mut url = self.bot.api_url();
        url.set_path(&format!("file/bot{}/{}", self.bot.token(), file.path));

        let response = self.bot.client().get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::message(format!(
                "failed to download file: HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    async fn send_typing(&self, context_id: &str) {
        match context_id.parse::<i64>() {
            Ok(id) => outbound::send_typing(&self.bot, ChatId(id)).await,
            Err(_) => debug!(context_id, "not a telegram chat id, skipping typing"),
        }
    }

    async fn fetch_image(&self, file_id: &str) -> anyhow::Result<String> {
        let bytes = self.download_file(file_id).await?;
        debug!(file_id, bytes = bytes.len(), "photo downloaded");
        Ok(jpeg_data_uri(&bytes))
    }
}

/// Telegram re-encodes every photo as JPEG.
fn jpeg_data_uri(bytes: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
