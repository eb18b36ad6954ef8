//! Transport-neutral inbound events.

use parley_common::types::ChatType;

/// One inbound event from a messaging front end.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Originating user.
    pub identity_id: String,
    /// Chat the event was posted in.
    pub context_id: String,
    pub chat_type: ChatType,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Administrative command, already tokenised by the front end.
    Command(Command),
    /// Conversation content.
    Content(InboundContent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lowercase name without the leading slash.
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundContent {
    pub text: Option<String>,
    /// Image reference the completion service can fetch (URL or data URI).
    pub photo_reference: Option<String>,
    /// Front-end file handle, downloaded through the
    /// [`ChatChannel`](crate::channel::ChatChannel) only once the turn is
    /// admitted and the model can read images.
    pub photo_file_id: Option<String>,
    pub photo_caption: Option<String>,
    /// Voice note or audio file.
    pub voice: bool,
}

impl InboundContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn photo(reference: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            photo_reference: Some(reference.into()),
            photo_caption: caption,
            ..Self::default()
        }
    }

    /// Photo still held by the front end.
    pub fn photo_file(file_id: impl Into<String>, caption: Option<String>) -> Self {
        Self {
            photo_file_id: Some(file_id.into()),
            photo_caption: caption,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn has_photo(&self) -> bool {
        self.photo_reference.is_some() || self.photo_file_id.is_some()
    }

    pub fn voice() -> Self {
        Self {
            voice: true,
            ..Self::default()
        }
    }
}

impl InboundEvent {
    /// Whether handling needs a [`SessionState`](parley_sessions::SessionState)
    /// to exist first. `reset` and `clear` report on sessions that may not
    /// exist, so they must not create one.
    #[must_use]
    pub fn needs_session(&self) -> bool {
        match &self.payload {
            EventPayload::Content(_) => true,
            EventPayload::Command(cmd) => matches!(cmd.name.as_str(), "set" | "show"),
        }
    }
}
