//! Converting Telegram messages into inbound events and running them.

use std::sync::Arc;

use {
    parley_chat::{Command, EventPayload, InboundContent, InboundEvent, commands::COMMAND_NAMES},
    parley_common::types::ChatType,
    teloxide::{
        prelude::*,
        types::{ChatKind, MediaKind, MessageKind, PublicChatKind},
    },
    tracing::debug,
};

use crate::{error::Result, outbound, state::BotState};

/// Handle one incoming message end to end.
///
/// Typing and photo downloads happen inside the conversation engine, after
/// the credential, quota and model checks have admitted the turn.
pub async fn handle_message(msg: Message, state: Arc<BotState>) -> Result<()> {
    let Some(event) = extract(&msg, state.bot_username.as_deref()) else {
        debug!(chat_id = msg.chat.id.0, "ignoring message");
        return Ok(());
    };

    let reply = state.dispatcher.dispatch(event).await;
    outbound::send_reply(&state.bot, msg.chat.id, &reply).await?;
    Ok(())
}

/// Build the inbound event for `msg`, or `None` if it should be ignored
/// (service messages, commands for other bots, unknown commands).
pub fn extract(msg: &Message, bot_username: Option<&str>) -> Option<InboundEvent> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };

    let (chat_type, context_id) = classify_chat(msg);
    let identity_id = msg
        .from
        .as_ref()
        .map_or_else(|| context_id.clone(), |user| user.id.0.to_string());

    let payload = match &common.media_kind {
        MediaKind::Text(t) if t.text.starts_with('/') => {
            EventPayload::Command(parse_command(&t.text, bot_username)?)
        },
        MediaKind::Text(t) => EventPayload::Content(InboundContent::text(t.text.clone())),
        // Sizes are ordered smallest first.
        MediaKind::Photo(p) => match p.photo.last() {
            Some(size) => EventPayload::Content(InboundContent::photo_file(
                size.file.id.clone(),
                p.caption.clone(),
            )),
            None => EventPayload::Content(InboundContent::default()),
        },
        MediaKind::Voice(_) | MediaKind::Audio(_) => EventPayload::Content(InboundContent::voice()),
        _ => EventPayload::Content(InboundContent::default()),
    };

    Some(InboundEvent {
        identity_id,
        context_id,
        chat_type,
        payload,
    })
}

/// Tokenise `/name@bot arg1 arg2`. Returns `None` for commands addressed to
/// another bot and for names the router does not know.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<Command> {
    let mut tokens = text.split_whitespace();
    let head = tokens.next()?.strip_prefix('/')?;
    let (name, target) = match head.split_once('@') {
        Some((name, target)) => (name, Some(target)),
        None => (head, None),
    };

    if let (Some(target), Some(me)) = (target, bot_username)
        && !target.eq_ignore_ascii_case(me)
    {
        return None;
    }

    let name = name.to_lowercase();
    if !COMMAND_NAMES.contains(&name.as_str()) {
        return None;
    }
    Some(Command::new(name, tokens))
}

fn classify_chat(msg: &Message) -> (ChatType, String) {
    let chat_id = msg.chat.id.0.to_string();
    match &msg.chat.kind {
        ChatKind::Private(_) => (ChatType::Dm, chat_id),
        ChatKind::Public(p) => match p.kind {
            PublicChatKind::Channel(_) => (ChatType::Channel, chat_id),
            _ => (ChatType::Group, chat_id),
        },
    }
}
