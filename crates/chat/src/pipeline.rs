//! Ordered middleware around a terminal [`Endpoint`].
//!
//! Each [`Stage`] receives the per-event context and a [`Next`] handle; it
//! may act before and after calling `next.run(ctx)`, or short-circuit by
//! returning without calling it.

use std::{panic::AssertUnwindSafe, sync::Arc};

use {
    async_trait::async_trait,
    futures::FutureExt,
    parley_providers::CredentialCell,
    parley_sessions::{SessionHandle, SessionStore},
    tracing::{debug, error, warn},
};

use crate::{
    error::{Context, Error, Result},
    event::InboundEvent,
    identity::{self, Identity},
    quota::{QuotaDecision, QuotaGuard},
};

/// Reply sent by the credential gate while no key is configured.
pub const CREDENTIAL_PROMPT: &str =
    "⚠️Please configure your OpenAI API key: /set credential THE_API_KEY";

/// How the front end should render a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplyFormat {
    /// Notices and diagnostics, sent verbatim.
    #[default]
    Plain,
    /// Model output, which may carry Markdown.
    Markdown,
}

/// State accumulated while an event travels down the pipeline.
#[derive(Debug)]
pub struct EventContext {
    pub event: InboundEvent,
    pub identity: Option<Identity>,
    pub session: Option<SessionHandle>,
    /// Set by the endpoint that produced the reply.
    pub format: ReplyFormat,
}

impl EventContext {
    pub fn new(event: InboundEvent) -> Self {
        Self {
            event,
            identity: None,
            session: None,
            format: ReplyFormat::Plain,
        }
    }
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, ctx: &mut EventContext, next: Next<'_>) -> Result<String>;
}

/// Terminal handler at the bottom of a pipeline.
#[async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, ctx: &mut EventContext) -> Result<String>;
}

/// The remainder of a pipeline, from the current stage inward.
pub struct Next<'a> {
    stages: &'a [Arc<dyn Stage>],
    endpoint: &'a dyn Endpoint,
}

impl Next<'_> {
    pub async fn run(self, ctx: &mut EventContext) -> Result<String> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                stage
                    .handle(ctx, Next {
                        stages: rest,
                        endpoint: self.endpoint,
                    })
                    .await
            },
            None => self.endpoint.call(ctx).await,
        }
    }
}

pub struct Pipeline {
    stages: Vec<Arc<dyn Stage>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Pipeline {
    pub fn new(endpoint: Arc<dyn Endpoint>) -> Self {
        Self {
            stages: Vec::new(),
            endpoint,
        }
    }

    /// Append a stage inside all previously added ones.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, ctx: &mut EventContext) -> Result<String> {
        Next {
            stages: &self.stages,
            endpoint: self.endpoint.as_ref(),
        }
        .run(ctx)
        .await
    }
}

// ── Stages ──────────────────────────────────────────────────────────────────

/// Turns every failure below it, panics included, into a diagnostic reply.
pub struct ErrorContainment;

#[async_trait]
impl Stage for ErrorContainment {
    fn name(&self) -> &'static str {
        "error_containment"
    }

    async fn handle(&self, ctx: &mut EventContext, next: Next<'_>) -> Result<String> {
        let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
        let session_id = ctx.identity.as_ref().map(|i| i.session_id.as_str());
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => {
                warn!(session_id, error = %err, retryable = err.is_retryable(), "event handling failed");
                ctx.format = ReplyFormat::Plain;
                Ok(err.diagnostic())
            },
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "internal error".to_string());
                error!(session_id, panic = %message, "event handler panicked");
                ctx.format = ReplyFormat::Plain;
                Ok(Error::message(message).diagnostic())
            },
        }
    }
}

/// Binds session and identity keys into the context.
pub struct IdentityResolution;

#[async_trait]
impl Stage for IdentityResolution {
    fn name(&self) -> &'static str {
        "identity_resolution"
    }

    async fn handle(&self, ctx: &mut EventContext, next: Next<'_>) -> Result<String> {
        let identity = identity::resolve(&ctx.event);
        debug!(
            session_id = %identity.session_id,
            identity_id = %identity.identity_id,
            "resolved identity"
        );
        ctx.identity = Some(identity);
        next.run(ctx).await
    }
}

/// Ensures the session exists for events that operate on it.
///
/// Content and `/set`/`/show` create the session on first use. `/start` and
/// `/help` never touch session state, and `/reset`/`/clear` must be able to
/// report that no session exists, so those four pass through without one.
pub struct SessionInit {
    store: Arc<SessionStore>,
}

impl SessionInit {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for SessionInit {
    fn name(&self) -> &'static str {
        "session_init"
    }

    async fn handle(&self, ctx: &mut EventContext, next: Next<'_>) -> Result<String> {
        if ctx.event.needs_session() {
            let identity = ctx.identity.as_ref().context("identity not resolved")?;
            ctx.session = Some(self.store.get_or_init(&identity.session_id));
        }
        next.run(ctx).await
    }
}

/// Short-circuits while no completion credential is configured.
pub struct CredentialGate {
    credential: Arc<CredentialCell>,
}

impl CredentialGate {
    pub fn new(credential: Arc<CredentialCell>) -> Self {
        Self { credential }
    }
}

#[async_trait]
impl Stage for CredentialGate {
    fn name(&self) -> &'static str {
        "credential_gate"
    }

    async fn handle(&self, ctx: &mut EventContext, next: Next<'_>) -> Result<String> {
        if !self.credential.is_set() {
            debug!("no completion credential, prompting");
            return Ok(CREDENTIAL_PROMPT.to_string());
        }
        next.run(ctx).await
    }
}

/// Consumes one unit of the identity's free quota.
pub struct QuotaCheck {
    guard: Arc<QuotaGuard>,
}

impl QuotaCheck {
    pub fn new(guard: Arc<QuotaGuard>) -> Self {
        Self { guard }
    }
}

#[async_trait]
impl Stage for QuotaCheck {
    fn name(&self) -> &'static str {
        "quota"
    }

    async fn handle(&self, ctx: &mut EventContext, next: Next<'_>) -> Result<String> {
        let identity = ctx.identity.as_ref().context("identity not resolved")?;
        match self.guard.check_and_increment(&identity.identity_id) {
            QuotaDecision::Allowed => next.run(ctx).await,
            QuotaDecision::Denied => Err(Error::QuotaExceeded {
                limit: self.guard.free_limit(),
            }),
        }
    }
}
