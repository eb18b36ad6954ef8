use std::{sync::Arc, time::Duration};

use {
    parley_chat::Dispatcher,
    parley_config::TelegramConfig,
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{handlers, state::BotState};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Build the Bot API client. File downloads share its timeout.
pub fn build_bot(token: &Secret<String>, config: &TelegramConfig) -> anyhow::Result<Bot> {
    // Client timeout must outlast the long-poll timeout.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
        .build()?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// Connect the bot and start the long-polling loop.
///
/// Each update is handled on its own task so a slow completion never
/// blocks polling. The loop runs until the returned token is cancelled or
/// another instance takes over the token.
pub async fn start_polling(
    bot: Bot,
    config: &TelegramConfig,
    dispatcher: Arc<Dispatcher>,
) -> anyhow::Result<(CancellationToken, tokio::task::JoinHandle<()>)> {
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Long polling and webhooks are mutually exclusive.
    bot.delete_webhook().send().await?;

    let commands = vec![
        BotCommand::new("start", "Start the conversation"),
        BotCommand::new("help", "Show available commands"),
        BotCommand::new("reset", "Reset all settings"),
        BotCommand::new("clear", "Clear chat history"),
        BotCommand::new("set", "Change a setting"),
        BotCommand::new("show", "Show current settings"),
    ];
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?bot_username, "telegram bot connected (webhook cleared)");

    let cancel = CancellationToken::new();
    let state = Arc::new(BotState {
        bot,
        bot_username,
        dispatcher,
        cancel: cancel.clone(),
    });
    let poll_timeout = config.poll_timeout_secs;
    let handle = tokio::spawn(poll_loop(state, poll_timeout));

    Ok((cancel, handle))
}

async fn poll_loop(state: Arc<BotState>, poll_timeout: u32) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let result = tokio::select! {
            () = state.cancel.cancelled() => break,
            result = state
                .bot
                .get_updates()
                .offset(offset)
                .timeout(poll_timeout)
                .allowed_updates(vec![AllowedUpdate::Message])
                .into_future() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    match update.kind {
                        UpdateKind::Message(msg) => {
                            let chat_id = msg.chat.id.0;
                            debug!(chat_id, "received telegram message");
                            let state = Arc::clone(&state);
                            tokio::spawn(async move {
                                if let Err(e) = handlers::handle_message(msg, state).await {
                                    error!(chat_id, error = %e, "error handling telegram message");
                                }
                            });
                        },
                        other => {
                            debug!("ignoring non-message update: {other:?}");
                        },
                    }
                }
            },
            Err(e) => {
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    warn!("telegram polling stopped: another instance is running with this token");
                    state.cancel.cancel();
                    break;
                }

                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = state.cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                }
            },
        }
    }

    info!("telegram polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_is_built_offline_with_token() {
        let config = TelegramConfig::default();
        let bot = build_bot(&Secret::new("123:abc".into()), &config).unwrap();
        assert_eq!(bot.token(), "123:abc");
    }
}
