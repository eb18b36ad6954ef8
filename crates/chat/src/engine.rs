//! One conversation turn: content → history → completion → history.

use std::{sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    parley_common::{text::truncate_at_char_boundary, types::Message},
    parley_providers::{CompletionRequest, CompletionService, ModelRegistry},
    parley_sessions::SessionState,
    tracing::{debug, warn},
};

use crate::{
    channel::ChatChannel,
    error::{Context, Error, Result},
    event::{EventPayload, InboundContent},
    pipeline::{Endpoint, EventContext, ReplyFormat},
};

/// Caption used when a photo arrives without one.
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe this image.";

const LOG_PREVIEW_CHARS: usize = 80;

pub struct ConversationEngine {
    registry: Arc<ModelRegistry>,
    service: Arc<dyn CompletionService>,
    channel: Arc<dyn ChatChannel>,
    timeout: Duration,
}

impl ConversationEngine {
    pub fn new(
        registry: Arc<ModelRegistry>,
        service: Arc<dyn CompletionService>,
        channel: Arc<dyn ChatChannel>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            service,
            channel,
            timeout,
        }
    }

    /// Run one turn against `session` and return the assistant reply.
    ///
    /// Rejections (voice, images on a text-only model, empty content) leave
    /// the history untouched. Once the user turn is appended it stays, even
    /// when the completion call fails. Photos held by the front end are only
    /// downloaded after the model is known to read images.
    pub async fn handle(
        &self,
        session: &mut SessionState,
        identity_id: &str,
        context_id: &str,
        content: &InboundContent,
    ) -> Result<String> {
        let user_message = self.user_message(&session.model, context_id, content).await?;
        let prompt = user_message.content.text();
        debug!(
            session_id = %session.session_id,
            prompt = truncate_at_char_boundary(&prompt, LOG_PREVIEW_CHARS),
            image = user_message.has_image(),
            "user turn"
        );
        session.chat_history.push(user_message);

        let request = self.build_request(session);
        debug!(
            session_id = %session.session_id,
            identity_id,
            model = %request.model,
            history_len = session.chat_history.len(),
            service = self.service.name(),
            "requesting completion"
        );

        let text = match tokio::time::timeout(self.timeout, self.service.complete(&request)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!(session_id = %session.session_id, model = %request.model, error = %err, "completion failed");
                return Err(Error::completion(err));
            },
            Err(_) => {
                warn!(session_id = %session.session_id, model = %request.model, timeout_secs = self.timeout.as_secs(), "completion timed out");
                return Err(Error::Timeout {
                    secs: self.timeout.as_secs(),
                });
            },
        };

        debug!(
            session_id = %session.session_id,
            reply = truncate_at_char_boundary(&text, LOG_PREVIEW_CHARS),
            "completion received"
        );
        session.chat_history.push(Message::assistant(text.clone()));
        Ok(text)
    }

    async fn user_message(
        &self,
        model: &str,
        context_id: &str,
        content: &InboundContent,
    ) -> Result<Message> {
        if content.voice {
            return Err(Error::unsupported(
                "Voice messages are not supported. Please send text.",
            ));
        }

        self.channel.send_typing(context_id).await;

        if content.has_photo() {
            if !self.registry.is_vision_capable(model) {
                return Err(Error::unsupported(format!(
                    "Model {model} cannot read images. Switch to a vision model with /set model <name>."
                )));
            }
            let image = match (&content.photo_reference, &content.photo_file_id) {
                (Some(reference), _) => reference.clone(),
                (None, Some(file_id)) => {
                    self.channel.fetch_image(file_id).await.map_err(|err| {
                        warn!(context_id, file_id, error = %err, "attachment download failed");
                        Error::attachment(err)
                    })?
                },
                (None, None) => return Err(Error::message("photo without a source")),
            };
            let caption = content
                .photo_caption
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_IMAGE_PROMPT);
            return Ok(Message::user_with_image(caption, image));
        }

        match content.text.as_deref() {
            Some(text) if !text.trim().is_empty() => Ok(Message::user(text)),
            _ => Err(Error::unsupported(
                "Only text and photo messages are supported.",
            )),
        }
    }

    fn build_request(&self, session: &SessionState) -> CompletionRequest {
        let mut messages = Vec::with_capacity(session.chat_history.len() + 1);
        if let Some(prompt) = session.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(Message::system(prompt));
        }
        messages.extend(session.chat_history.iter().cloned());

        CompletionRequest {
            model: session.model.clone(),
            messages,
            temperature: session.temperature,
            max_tokens: self
                .registry
                .forced_max_tokens(&session.model)
                .or(session.max_tokens),
        }
    }
}

#[async_trait]
impl Endpoint for ConversationEngine {
    async fn call(&self, ctx: &mut EventContext) -> Result<String> {
        let EventPayload::Content(content) = &ctx.event.payload else {
            return Err(Error::message("conversation endpoint received a command"));
        };
        let identity = ctx.identity.as_ref().context("identity not resolved")?;
        let session = ctx.session.as_ref().context("session not initialised")?;

        let mut state = session.lock().await;
        let reply = self
            .handle(&mut state, &identity.identity_id, &ctx.event.context_id, content)
            .await?;
        ctx.format = ReplyFormat::Markdown;
        Ok(reply)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use {
        parley_common::types::Role,
        parley_config::{ModelsConfig, SessionDefaults},
    };

    use super::*;

    /// Completion fake that records requests and replays scripted outcomes.
    #[derive(Default)]
    pub(crate) struct FakeService {
        pub requests: Mutex<Vec<CompletionRequest>>,
        pub fail_with: Option<String>,
        pub delay: Option<Duration>,
    }

    impl FakeService {
        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Self::default()
            }
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl CompletionService for FakeService {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(message) => anyhow::bail!("{message}"),
                None => Ok(format!("reply #{}", self.calls())),
            }
        }
    }

    /// Channel fake that records typing calls and serves photos from memory.
    #[derive(Default)]
    pub(crate) struct FakeChannel {
        pub typing: Mutex<Vec<String>>,
        pub fetched: Mutex<Vec<String>>,
        pub fail_fetch: bool,
    }

    impl FakeChannel {
        pub fn typing_count(&self) -> usize {
            self.typing.lock().unwrap().len()
        }

        pub fn fetch_count(&self) -> usize {
            self.fetched.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatChannel for FakeChannel {
        async fn send_typing(&self, context_id: &str) {
            self.typing.lock().unwrap().push(context_id.to_string());
        }

        async fn fetch_image(&self, file_id: &str) -> anyhow::Result<String> {
            self.fetched.lock().unwrap().push(file_id.to_string());
            if self.fail_fetch {
                anyhow::bail!("file endpoint returned HTTP 502");
            }
            Ok(format!("data:image/jpeg;base64,{file_id}"))
        }
    }

    fn engine_with(service: Arc<FakeService>, channel: Arc<FakeChannel>) -> ConversationEngine {
        ConversationEngine::new(
            Arc::new(ModelRegistry::from_config(&ModelsConfig::default())),
            service,
            channel,
            Duration::from_secs(5),
        )
    }

    fn engine(service: Arc<FakeService>) -> ConversationEngine {
        engine_with(service, Arc::new(FakeChannel::default()))
    }

    fn session(model: &str) -> SessionState {
        let mut state = SessionState::from_defaults("s1", &SessionDefaults::default());
        state.model = model.to_string();
        state
    }

    #[tokio::test]
    async fn text_turn_appends_user_and_assistant() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-3.5-turbo");

        let reply = engine
            .handle(&mut state, "u1", "c1", &InboundContent::text("hello"))
            .await
            .unwrap();

        assert_eq!(reply, "reply #1");
        assert_eq!(state.chat_history, vec![
            Message::user("hello"),
            Message::assistant("reply #1")
        ]);
        let request = service.last_request();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.messages, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn full_history_is_sent_every_turn() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-4o");

        for text in ["one", "two", "three"] {
            engine
                .handle(&mut state, "u1", "c1", &InboundContent::text(text))
                .await
                .unwrap();
        }
        assert_eq!(state.chat_history.len(), 6);
        assert_eq!(service.last_request().messages.len(), 5);
    }

    #[tokio::test]
    async fn system_prompt_is_sent_but_not_stored() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-4o");
        state.system_prompt = Some("Answer in French.".into());

        engine
            .handle(&mut state, "u1", "c1", &InboundContent::text("hi"))
            .await
            .unwrap();

        let request = service.last_request();
        assert_eq!(request.messages[0], Message::system("Answer in French."));
        assert!(state.chat_history.iter().all(|m| m.role != Role::System));
    }

    #[tokio::test]
    async fn voice_is_rejected_without_mutation() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-4o");

        let err = engine
            .handle(&mut state, "u1", "c1", &InboundContent::voice())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedContent(_)));
        assert!(state.chat_history.is_empty());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn image_on_text_model_is_rejected_without_mutation() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-3.5-turbo");

        let err = engine
            .handle(
                &mut state,
                "u1",
                "c1",
                &InboundContent::photo("data:image/jpeg;base64,AAAA", None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedContent(ref m) if m.contains("gpt-3.5-turbo")));
        assert!(state.chat_history.is_empty());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn image_on_vision_model_uses_caption_or_default() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-4o");

        engine
            .handle(
                &mut state,
                "u1",
                "c1",
                &InboundContent::photo("data:image/jpeg;base64,AAAA", Some("What breed?".into())),
            )
            .await
            .unwrap();
        engine
            .handle(
                &mut state,
                "u1",
                "c1",
                &InboundContent::photo("data:image/jpeg;base64,BBBB", None),
            )
            .await
            .unwrap();

        assert_eq!(
            state.chat_history[0],
            Message::user_with_image("What breed?", "data:image/jpeg;base64,AAAA")
        );
        assert_eq!(
            state.chat_history[2],
            Message::user_with_image(DEFAULT_IMAGE_PROMPT, "data:image/jpeg;base64,BBBB")
        );
        assert!(state.chat_history[2].has_image());
    }

    #[tokio::test]
    async fn vision_override_forces_max_tokens() {
        let service = Arc::new(FakeService::default());
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-4-vision-preview");
        state.max_tokens = Some(100);

        engine
            .handle(&mut state, "u1", "c1", &InboundContent::text("hi"))
            .await
            .unwrap();
        assert_eq!(service.last_request().max_tokens, Some(4096));

        let mut other = session("gpt-4o");
        other.max_tokens = Some(100);
        engine
            .handle(&mut other, "u1", "c1", &InboundContent::text("hi"))
            .await
            .unwrap();
        assert_eq!(service.last_request().max_tokens, Some(100));
    }

    #[tokio::test]
    async fn failure_keeps_only_the_user_turn() {
        let service = Arc::new(FakeService::failing("upstream 500"));
        let engine = engine(Arc::clone(&service));
        let mut state = session("gpt-4o");

        let err = engine
            .handle(&mut state, "u1", "c1", &InboundContent::text("hello"))
            .await
            .unwrap_err();

        assert_eq!(err.diagnostic(), "An error occurred. e: upstream 500");
        assert_eq!(state.chat_history, vec![Message::user("hello")]);
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let engine = ConversationEngine::new(
            Arc::new(ModelRegistry::from_config(&ModelsConfig::default())),
            Arc::new(FakeService::slow(Duration::from_secs(30))),
            Arc::new(FakeChannel::default()),
            Duration::from_millis(20),
        );
        let mut state = session("gpt-4o");

        let err = engine
            .handle(&mut state, "u1", "c1", &InboundContent::text("hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_retryable());
        assert_eq!(state.chat_history.len(), 1);
    }

    #[tokio::test]
    async fn empty_content_is_rejected() {
        let engine = engine(Arc::new(FakeService::default()));
        let mut state = session("gpt-4o");

        for content in [InboundContent::default(), InboundContent::text("   ")] {
            let err = engine.handle(&mut state, "u1", "c1", &content).await.unwrap_err();
            assert!(matches!(err, Error::UnsupportedContent(_)));
        }
        assert!(state.chat_history.is_empty());
    }

    #[tokio::test]
    async fn typing_is_sent_to_the_chat_after_voice_check() {
        let channel = Arc::new(FakeChannel::default());
        let engine = engine_with(Arc::new(FakeService::default()), Arc::clone(&channel));
        let mut state = session("gpt-4o");

        engine
            .handle(&mut state, "u1", "c1", &InboundContent::voice())
            .await
            .unwrap_err();
        assert_eq!(channel.typing_count(), 0);

        engine
            .handle(&mut state, "u1", "c1", &InboundContent::text("hello"))
            .await
            .unwrap();
        assert_eq!(*channel.typing.lock().unwrap(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn held_photo_is_fetched_only_for_vision_models() {
        let service = Arc::new(FakeService::default());
        let channel = Arc::new(FakeChannel::default());
        let engine = engine_with(Arc::clone(&service), Arc::clone(&channel));
        let photo = InboundContent::photo_file("AgADfile", Some("Which city?".into()));

        let mut text_only = session("gpt-3.5-turbo");
        let err = engine
            .handle(&mut text_only, "u1", "c1", &photo)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedContent(_)));
        assert_eq!(channel.fetch_count(), 0);

        let mut vision = session("gpt-4o");
        engine.handle(&mut vision, "u1", "c1", &photo).await.unwrap();
        assert_eq!(*channel.fetched.lock().unwrap(), vec!["AgADfile".to_string()]);
        assert_eq!(
            service.last_request().messages[0],
            Message::user_with_image("Which city?", "data:image/jpeg;base64,AgADfile")
        );
    }

    #[tokio::test]
    async fn failed_photo_download_leaves_history_untouched() {
        let service = Arc::new(FakeService::default());
        let channel = Arc::new(FakeChannel {
            fail_fetch: true,
            ..FakeChannel::default()
        });
        let engine = engine_with(Arc::clone(&service), channel);
        let mut state = session("gpt-4o");

        let err = engine
            .handle(&mut state, "u1", "c1", &InboundContent::photo_file("AgADfile", None))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Attachment { .. }));
        assert!(state.chat_history.is_empty());
        assert_eq!(service.calls(), 0);
    }
}
