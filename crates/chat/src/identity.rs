use crate::event::InboundEvent;

/// Keys an event is handled under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Shared chat id in groups and channels, the user id otherwise.
    pub session_id: String,
    /// Always the originating user. Quota is counted against this.
    pub identity_id: String,
}

/// Derive the session and identity keys for `event`.
#[must_use]
pub fn resolve(event: &InboundEvent) -> Identity {
    let session_id = if event.chat_type.is_shared() {
        event.context_id.clone()
    } else {
        event.identity_id.clone()
    };
    Identity {
        session_id,
        identity_id: event.identity_id.clone(),
    }
}
