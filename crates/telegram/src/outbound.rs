//! Reply delivery with rate-limit handling.

use std::{future::Future, time::Duration};

use {
    parley_chat::{Reply, ReplyFormat},
    teloxide::{
        RequestError,
        payloads::SendMessageSetters,
        prelude::*,
        types::{ChatAction, ParseMode},
    },
    tracing::{debug, warn},
};

use crate::markdown::markdown_to_telegram_html;

const RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Deliver a dispatcher reply. Model output goes out as HTML and falls back
/// to plain text when Telegram rejects the markup; notices are sent as is.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> Result<(), RequestError> {
    match reply.format {
        ReplyFormat::Plain => send_chunks(bot, chat_id, &reply.chunks).await,
        ReplyFormat::Markdown => {
            for chunk in &reply.chunks {
                send_markdown_chunk(bot, chat_id, chunk).await?;
            }
            debug!(chat_id = chat_id.0, chunks = reply.chunks.len(), "reply delivered");
            Ok(())
        },
    }
}

async fn send_markdown_chunk(bot: &Bot, chat_id: ChatId, chunk: &str) -> Result<(), RequestError> {
    let html = markdown_to_telegram_html(chunk);
    let sent = run_with_retry(chat_id, "send_message (html)", || {
        bot.send_message(chat_id, html.as_str())
            .parse_mode(ParseMode::Html)
            .into_future()
    })
    .await;

    if let Err(e) = sent {
        warn!(
            chat_id = chat_id.0,
            error = %e,
            "telegram HTML send failed, retrying as plain text"
        );
        run_with_retry(chat_id, "send_message (plain)", || {
            bot.send_message(chat_id, chunk).into_future()
        })
        .await?;
    }
    Ok(())
}

/// Send each chunk as its own message, in order.
pub async fn send_chunks(bot: &Bot, chat_id: ChatId, chunks: &[String]) -> Result<(), RequestError> {
    for chunk in chunks {
        run_with_retry(chat_id, "send_message", || bot.send_message(chat_id, chunk).into_future())
            .await?;
    }
    debug!(chat_id = chat_id.0, chunks = chunks.len(), "reply delivered");
    Ok(())
}

/// Best-effort "typing…" indicator.
pub async fn send_typing(bot: &Bot, chat_id: ChatId) {
    if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
        debug!(chat_id = chat_id.0, error = %e, "failed to send typing action");
    }
}

async fn run_with_retry<T, F, Fut>(
    chat_id: ChatId,
    operation: &'static str,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}
