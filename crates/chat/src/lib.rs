//! Conversation orchestration: identity, quota, commands, completion turns
//! and the middleware pipeline that ties them together.

pub mod channel;
pub mod commands;
pub mod engine;
pub mod error;
pub mod event;
pub mod identity;
pub mod pipeline;
pub mod quota;

use std::{sync::Arc, time::Duration};

use {
    parley_common::text::chunk_message,
    parley_providers::{CompletionService, CredentialCell, ModelRegistry},
    parley_sessions::SessionStore,
    tracing::debug,
};

pub use {
    channel::ChatChannel,
    commands::CommandRouter,
    engine::ConversationEngine,
    error::{Error, Result},
    event::{Command, EventPayload, InboundContent, InboundEvent},
    pipeline::ReplyFormat,
    quota::{QuotaDecision, QuotaGuard},
};

use pipeline::{
    CredentialGate, ErrorContainment, EventContext, IdentityResolution, Pipeline, QuotaCheck,
    SessionInit,
};

/// Shared components a [`Dispatcher`] is assembled from.
pub struct ChatServices {
    pub store: Arc<SessionStore>,
    pub registry: Arc<ModelRegistry>,
    pub credential: Arc<CredentialCell>,
    pub quota: Arc<QuotaGuard>,
    pub completion: Arc<dyn CompletionService>,
    /// Front end that delivered the events, for typing and attachments.
    pub channel: Arc<dyn ChatChannel>,
    /// Upper bound on a single completion call.
    pub completion_timeout: Duration,
    /// Outbound chunk ceiling, in characters.
    pub max_reply_chars: usize,
}

/// A reply split into delivery-sized chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chunks: Vec<String>,
    pub format: ReplyFormat,
}

/// Entry point for front ends: routes each event through the command or
/// conversation pipeline and returns the reply as delivery-sized chunks.
pub struct Dispatcher {
    commands: Pipeline,
    conversation: Pipeline,
    max_reply_chars: usize,
}

impl Dispatcher {
    pub fn new(services: ChatServices) -> Self {
        let router = CommandRouter::new(
            Arc::clone(&services.store),
            Arc::clone(&services.registry),
            Arc::clone(&services.credential),
        );
        let engine = ConversationEngine::new(
            Arc::clone(&services.registry),
            services.completion,
            services.channel,
            services.completion_timeout,
        );

        let commands = Pipeline::new(Arc::new(router))
            .stage(ErrorContainment)
            .stage(IdentityResolution)
            .stage(SessionInit::new(Arc::clone(&services.store)));
        let conversation = Pipeline::new(Arc::new(engine))
            .stage(ErrorContainment)
            .stage(IdentityResolution)
            .stage(SessionInit::new(services.store))
            .stage(CredentialGate::new(services.credential))
            .stage(QuotaCheck::new(services.quota));
        debug!(
            commands = ?commands.stage_names(),
            conversation = ?conversation.stage_names(),
            "pipelines assembled"
        );

        Self {
            commands,
            conversation,
            max_reply_chars: services.max_reply_chars,
        }
    }

    /// Handle one event. Never fails: errors become diagnostic replies.
    pub async fn dispatch(&self, event: InboundEvent) -> Reply {
        let pipeline = match event.payload {
            EventPayload::Command(_) => &self.commands,
            EventPayload::Content(_) => &self.conversation,
        };
        let mut ctx = EventContext::new(event);
        let reply = pipeline
            .run(&mut ctx)
            .await
            .unwrap_or_else(|err| err.diagnostic());

        let chunks = chunk_message(&reply, self.max_reply_chars);
        debug!(
            session_id = ctx.identity.as_ref().map(|i| i.session_id.as_str()),
            chunks = chunks.len(),
            format = ?ctx.format,
            "reply ready"
        );
        Reply {
            chunks,
            format: ctx.format,
        }
    }
}
