use std::sync::Arc;

use {parley_chat::Dispatcher, tokio_util::sync::CancellationToken};

/// Runtime state shared by every update task.
pub struct BotState {
    pub bot: teloxide::Bot,
    /// `@username` of this bot, used to filter commands addressed to others.
    pub bot_username: Option<String>,
    pub dispatcher: Arc<Dispatcher>,
    pub cancel: CancellationToken,
}
