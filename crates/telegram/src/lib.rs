//! Telegram front end.
//!
//! Long-polls the Bot API with teloxide, turns each message into an
//! [`InboundEvent`](parley_chat::InboundEvent), hands it to the
//! [`Dispatcher`](parley_chat::Dispatcher) and delivers the reply chunks,
//! rendering model output as Telegram HTML.

pub mod bot;
pub mod channel;
pub mod error;
pub mod handlers;
pub mod markdown;
pub mod outbound;
pub mod state;

pub use {
    bot::{build_bot, start_polling},
    channel::TelegramChannel,
    state::BotState,
};
