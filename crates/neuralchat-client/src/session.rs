//! Chat turns: send, stream, cancel, retry.
//!
//! A turn moves `Idle → Sending → Streaming → (Completed | Cancelled |
//! Errored) → Idle`. Every operation that starts a turn borrows the session
//! mutably, so at most one stream is in flight.

use std::time::Duration;

use futures::StreamExt;
use neuralchat_types::{ChatBody, ProviderKind, Role, StreamFrame, UploadResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::content::api_messages;
use crate::error::ClientError;
use crate::model::{FileAttachment, Message};
use crate::now_millis;
use crate::sse::SseDecoder;
use crate::store::ConversationStore;
use crate::transport::{ApiHeaders, ChatTransport, TransportError};

/// Delay before the single retry of a failed turn.
pub const RETRY_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Sending,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The first attempt failed on the network and the turn is being retried.
    Retrying,
    Cancelled,
    Error(String),
}

/// Receives progress of a turn as it happens.
pub trait TurnObserver {
    fn on_state(&mut self, _state: TurnState) {}

    /// The relay named the provider answering this turn.
    fn on_service(&mut self, _service: &str, _model: &str) {}

    fn on_fragment(&mut self, _fragment: &str) {}

    fn on_notice(&mut self, _notice: &Notice) {}
}

impl TurnObserver for () {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed {
        service: Option<String>,
        model: Option<String>,
        content: String,
    },
    Cancelled {
        kept_partial: bool,
    },
    Failed(String),
    /// Nothing to send.
    Ignored,
}

enum StreamEnd {
    Done,
    Cancelled,
}

#[derive(Default)]
struct Attempt {
    placeholder: bool,
    service: Option<String>,
    model: Option<String>,
    content: String,
}

pub struct ChatSession<T: ChatTransport> {
    store: ConversationStore,
    transport: T,
    retry_delay: Duration,
}

impl<T: ChatTransport> ChatSession<T> {
    pub fn new(store: ConversationStore, transport: T) -> Self {
        Self {
            store,
            transport,
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send the typed text with any pending files and stream the answer.
    pub async fn send_message(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome, ClientError> {
        if !self.store.has_api_key() {
            return Err(ClientError::NoApiKeys);
        }
        let text = text.trim();
        if text.is_empty() && self.store.pending_files().is_empty() {
            return Ok(TurnOutcome::Ignored);
        }

        let files = self
            .store
            .take_pending_files()
            .iter()
            .map(FileAttachment::from_upload)
            .collect();
        self.store
            .push_user_message(Message::user(text, files, now_millis()))
            .await;

        Ok(self.run_turn(cancel, observer).await)
    }

    /// Replace the text of a user message, drop what follows and answer again.
    pub async fn edit_message(
        &mut self,
        index: usize,
        text: &str,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome, ClientError> {
        if !self.store.has_api_key() {
            return Err(ClientError::NoApiKeys);
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Ignored);
        }
        self.store.edit_user_message(index, text).await?;
        Ok(self.run_turn(cancel, observer).await)
    }

    /// Drop the assistant message at `index` and everything after it, then
    /// answer the preceding user message again.
    pub async fn regenerate_from(
        &mut self,
        index: usize,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> Result<TurnOutcome, ClientError> {
        if !self.store.has_api_key() {
            return Err(ClientError::NoApiKeys);
        }
        let follows_user = index
            .checked_sub(1)
            .and_then(|prev| self.store.current()?.messages.get(prev))
            .is_some_and(|m| m.role == Role::User);
        if !follows_user {
            return Err(ClientError::InvalidMessage(index));
        }
        self.store.truncate_messages(index).await?;
        Ok(self.run_turn(cancel, observer).await)
    }

    /// Upload a file through the relay and queue it for the next message.
    pub async fn upload_file(
        &mut self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ClientError> {
        let upload = self.transport.upload(filename, bytes).await?;
        self.store.add_pending_file(upload.clone());
        Ok(upload)
    }

    /// Services the relay can use with the current credentials.
    pub async fn refresh_services(&self) -> Result<Vec<String>, ClientError> {
        Ok(self.transport.services(&self.store.api_headers()).await?)
    }

    pub async fn load_models(&self, service: ProviderKind) -> Result<Vec<String>, ClientError> {
        Ok(self
            .transport
            .models(service, &self.store.api_headers())
            .await?)
    }

    async fn run_turn(
        &mut self,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
    ) -> TurnOutcome {
        observer.on_state(TurnState::Sending);

        let Some(conversation) = self.store.current() else {
            observer.on_state(TurnState::Idle);
            return TurnOutcome::Ignored;
        };
        let body = ChatBody {
            messages: api_messages(conversation),
            service: Some(self.store.selected_service().to_string()),
        };
        let headers = self.store.api_headers();

        let mut retried = false;
        let mut placeholder = false;
        loop {
            let mut attempt = Attempt {
                placeholder,
                ..Attempt::default()
            };
            let result = self
                .stream_once(&body, &headers, cancel, observer, &mut attempt)
                .await;

            match result {
                Ok(StreamEnd::Done) => return self.complete(attempt, observer).await,
                Ok(StreamEnd::Cancelled) => return self.cancelled(attempt, observer).await,
                Err(e) if e.is_retryable() && !retried => {
                    retried = true;
                    warn!(error = %e, "Chat turn failed, retrying once");
                    // The retry streams into the same placeholder.
                    if attempt.placeholder {
                        self.store.reset_placeholder();
                        placeholder = true;
                    }
                    observer.on_notice(&Notice::Retrying);

                    let cancelled = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => true,
                        _ = tokio::time::sleep(self.retry_delay) => false,
                    };
                    if cancelled {
                        let attempt = Attempt {
                            placeholder,
                            ..Attempt::default()
                        };
                        return self.cancelled(attempt, observer).await;
                    }
                    observer.on_state(TurnState::Sending);
                }
                Err(e) => return self.failed(attempt, e, observer).await,
            }
        }
    }

    async fn stream_once(
        &mut self,
        body: &ChatBody,
        headers: &ApiHeaders,
        cancel: &CancellationToken,
        observer: &mut dyn TurnObserver,
        attempt: &mut Attempt,
    ) -> Result<StreamEnd, TransportError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            opened = self.transport.open_chat(body, headers) => opened,
        };
        let mut stream = opened?;

        if !attempt.placeholder {
            self.store.push_placeholder();
            attempt.placeholder = true;
        }
        observer.on_state(TurnState::Streaming);

        let mut decoder = SseDecoder::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else {
                debug!("Chat stream ended without a done marker");
                return Ok(StreamEnd::Done);
            };

            for frame in decoder.feed(&chunk?) {
                match frame {
                    StreamFrame::Meta { service, model } => {
                        self.store.set_provenance(&service, &model);
                        observer.on_service(&service, &model);
                        attempt.model = (!model.is_empty()).then_some(model);
                        attempt.service = Some(service);
                    }
                    StreamFrame::Content(fragment) => {
                        attempt.content.push_str(&fragment);
                        self.store.set_placeholder_content(&attempt.content);
                        observer.on_fragment(&fragment);
                    }
                    StreamFrame::Error(message) => return Err(TransportError::Provider(message)),
                    StreamFrame::Done => return Ok(StreamEnd::Done),
                }
            }
        }
    }

    async fn complete(&mut self, attempt: Attempt, observer: &mut dyn TurnObserver) -> TurnOutcome {
        if attempt.placeholder {
            self.store.settle_placeholder();
        }
        self.store.finish_turn().await;
        observer.on_state(TurnState::Completed);
        observer.on_state(TurnState::Idle);
        TurnOutcome::Completed {
            service: attempt.service,
            model: attempt.model,
            content: attempt.content,
        }
    }

    async fn cancelled(&mut self, attempt: Attempt, observer: &mut dyn TurnObserver) -> TurnOutcome {
        let kept_partial = attempt.placeholder && !self.store.settle_placeholder();
        self.store.finish_turn().await;
        observer.on_notice(&Notice::Cancelled);
        observer.on_state(TurnState::Cancelled);
        observer.on_state(TurnState::Idle);
        TurnOutcome::Cancelled { kept_partial }
    }

    async fn failed(
        &mut self,
        attempt: Attempt,
        error: TransportError,
        observer: &mut dyn TurnObserver,
    ) -> TurnOutcome {
        warn!(error = %error, "Chat turn failed");
        if attempt.placeholder {
            self.store.settle_placeholder();
        }
        self.store.finish_turn().await;
        let message = error.to_string();
        observer.on_notice(&Notice::Error(message.clone()));
        observer.on_state(TurnState::Errored);
        observer.on_state(TurnState::Idle);
        TurnOutcome::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::STORAGE_KEY;
    use crate::storage::{MemoryStorage, StateStorage};
    use crate::transport::ByteStream;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::stream;
    use neuralchat_types::UploadKind;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    enum Script {
        Reject(TransportError),
        /// Chunks, then either the end of the body or a stream that never yields.
        Stream(Vec<Result<Bytes, TransportError>>, bool),
    }

    #[derive(Default)]
    struct MockTransport {
        scripts: Mutex<VecDeque<Script>>,
        bodies: Mutex<Vec<ChatBody>>,
    }

    impl MockTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                bodies: Mutex::new(Vec::new()),
            }
        }

        fn opened(&self) -> usize {
            self.bodies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn services(&self, _headers: &ApiHeaders) -> Result<Vec<String>, TransportError> {
            Ok(vec!["auto".to_string(), "groq".to_string()])
        }

        async fn models(
            &self,
            service: ProviderKind,
            _headers: &ApiHeaders,
        ) -> Result<Vec<String>, TransportError> {
            Ok(service
                .curated_models()
                .iter()
                .map(|m| m.to_string())
                .collect())
        }

        async fn upload(
            &self,
            filename: &str,
            bytes: Vec<u8>,
        ) -> Result<UploadResponse, TransportError> {
            Ok(UploadResponse {
                kind: UploadKind::Text,
                filename: filename.to_string(),
                size: bytes.len() as u64,
                content: String::from_utf8_lossy(&bytes).into_owned(),
                mime_type: "text/plain".to_string(),
            })
        }

        async fn open_chat(
            &self,
            body: &ChatBody,
            _headers: &ApiHeaders,
        ) -> Result<ByteStream, TransportError> {
            self.bodies.lock().unwrap().push(body.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected chat request");
            match script {
                Script::Reject(e) => Err(e),
                Script::Stream(chunks, false) => Ok(Box::pin(stream::iter(chunks))),
                Script::Stream(chunks, true) => {
                    Ok(Box::pin(stream::iter(chunks).chain(stream::pending())))
                }
            }
        }
    }

    fn frame(frame: StreamFrame) -> Result<Bytes, TransportError> {
        Ok(Bytes::from(format!("data: {}\n\n", frame.to_data())))
    }

    fn meta() -> Result<Bytes, TransportError> {
        frame(StreamFrame::Meta {
            service: "Groq".to_string(),
            model: "llama".to_string(),
        })
    }

    fn content(text: &str) -> Result<Bytes, TransportError> {
        frame(StreamFrame::Content(text.to_string()))
    }

    fn reply(text: &str) -> Script {
        Script::Stream(vec![meta(), content(text), frame(StreamFrame::Done)], false)
    }

    fn network() -> TransportError {
        TransportError::Network("connection reset".to_string())
    }

    #[derive(Default)]
    struct Recorder {
        states: Vec<TurnState>,
        fragments: Vec<String>,
        notices: Vec<Notice>,
        cancel_on_service: Option<CancellationToken>,
        cancel_on_fragment: Option<CancellationToken>,
    }

    impl TurnObserver for Recorder {
        fn on_state(&mut self, state: TurnState) {
            self.states.push(state);
        }

        fn on_service(&mut self, _service: &str, _model: &str) {
            if let Some(token) = &self.cancel_on_service {
                token.cancel();
            }
        }

        fn on_fragment(&mut self, fragment: &str) {
            self.fragments.push(fragment.to_string());
            if let Some(token) = &self.cancel_on_fragment {
                token.cancel();
            }
        }

        fn on_notice(&mut self, notice: &Notice) {
            self.notices.push(notice.clone());
        }
    }

    async fn session(scripts: Vec<Script>) -> (ChatSession<MockTransport>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let mut store = ConversationStore::load(storage.clone()).await;
        store.save_service(ProviderKind::Groq, "gsk-test", "").await;
        let session = ChatSession::new(store, MockTransport::new(scripts))
            .with_retry_delay(Duration::from_millis(1));
        (session, storage)
    }

    fn messages(session: &ChatSession<MockTransport>) -> Vec<(Role, String)> {
        session
            .store()
            .current()
            .unwrap()
            .messages
            .iter()
            .map(|m| (m.role, m.text().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn streams_a_reply() {
        let (mut session, storage) = session(vec![Script::Stream(
            vec![meta(), content("Hel"), content("lo"), frame(StreamFrame::Done)],
            false,
        )])
        .await;
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("  hi  ", &CancellationToken::new(), &mut recorder)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                service: Some("Groq".to_string()),
                model: Some("llama".to_string()),
                content: "Hello".to_string(),
            }
        );
        assert_eq!(recorder.fragments, vec!["Hel", "lo"]);
        assert_eq!(
            recorder.states,
            vec![
                TurnState::Sending,
                TurnState::Streaming,
                TurnState::Completed,
                TurnState::Idle
            ]
        );
        assert_eq!(
            messages(&session),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, "Hello".to_string())
            ]
        );

        let conversation = session.store().current().unwrap();
        assert_eq!(conversation.title, "hi");
        assert_eq!(conversation.used_service.as_deref(), Some("Groq"));
        assert_eq!(conversation.messages[1].model.as_deref(), Some("llama"));

        // The finished turn is persisted.
        let saved = storage.load(STORAGE_KEY).await.unwrap().unwrap();
        assert!(saved.contains("Hello"));
    }

    #[tokio::test]
    async fn sequential_sends_carry_history() {
        let (mut session, _) = session(vec![reply("one"), reply("two")]).await;
        let cancel = CancellationToken::new();

        session.send_message("first", &cancel, &mut ()).await.unwrap();
        session.send_message("second", &cancel, &mut ()).await.unwrap();

        assert_eq!(messages(&session).len(), 4);
        let bodies = session.transport().bodies.lock().unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[1].messages.len(), 3);
        assert_eq!(bodies[1].messages[1].content, "one");
        assert_eq!(bodies[1].service.as_deref(), Some("auto"));
    }

    #[tokio::test]
    async fn abort_before_content_removes_the_placeholder() {
        let (mut session, _) = session(vec![Script::Stream(vec![meta()], true)]).await;
        let cancel = CancellationToken::new();
        let mut recorder = Recorder {
            cancel_on_service: Some(cancel.clone()),
            ..Default::default()
        };

        let outcome = session
            .send_message("hi", &cancel, &mut recorder)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Cancelled { kept_partial: false });
        assert_eq!(messages(&session), vec![(Role::User, "hi".to_string())]);
        assert_eq!(recorder.notices, vec![Notice::Cancelled]);
        assert_eq!(recorder.states.last(), Some(&TurnState::Idle));
    }

    #[tokio::test]
    async fn abort_after_content_keeps_the_partial_reply() {
        let (mut session, storage) =
            session(vec![Script::Stream(vec![meta(), content("partial")], true)]).await;
        let cancel = CancellationToken::new();
        let mut recorder = Recorder {
            cancel_on_fragment: Some(cancel.clone()),
            ..Default::default()
        };

        let outcome = session
            .send_message("hi", &cancel, &mut recorder)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Cancelled { kept_partial: true });
        assert_eq!(messages(&session)[1], (Role::Assistant, "partial".to_string()));
        let saved = storage.load(STORAGE_KEY).await.unwrap().unwrap();
        assert!(saved.contains("partial"));
    }

    #[tokio::test]
    async fn network_failures_are_retried_once() {
        let (mut session, _) = session(vec![
            Script::Stream(vec![meta(), content("lost"), Err(network())], false),
            reply("recovered"),
        ])
        .await;
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("hi", &CancellationToken::new(), &mut recorder)
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Completed { ref content, .. } if content == "recovered"));
        assert_eq!(recorder.notices, vec![Notice::Retrying]);
        assert_eq!(session.transport().opened(), 2);
        // One reply, holding only the second attempt's text.
        assert_eq!(
            messages(&session),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, "recovered".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn retry_reuses_the_partial_placeholder() {
        let (mut session, _) = session(vec![
            Script::Stream(
                vec![meta(), content("first "), content("try"), Err(network())],
                false,
            ),
            Script::Stream(
                vec![
                    frame(StreamFrame::Meta {
                        service: "Cerebras".to_string(),
                        model: String::new(),
                    }),
                    content("second try"),
                    frame(StreamFrame::Done),
                ],
                false,
            ),
        ])
        .await;
        let mut recorder = Recorder::default();

        session
            .send_message("hi", &CancellationToken::new(), &mut recorder)
            .await
            .unwrap();

        assert_eq!(recorder.fragments, vec!["first ", "try", "second try"]);
        let conversation = session.store().current().unwrap();
        let replies: Vec<_> = conversation
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "second try");
        assert_eq!(replies[0].service.as_deref(), Some("Cerebras"));
        assert_eq!(replies[0].model, None);
        assert_eq!(conversation.used_service.as_deref(), Some("Cerebras"));
    }

    #[tokio::test]
    async fn cancel_during_retry_wait_drops_the_reset_placeholder() {
        let (session, _) = session(vec![Script::Stream(
            vec![meta(), content("lost"), Err(network())],
            false,
        )])
        .await;
        let mut session = session.with_retry_delay(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = session.send_message("hi", &cancel, &mut ()).await.unwrap();

        assert_eq!(outcome, TurnOutcome::Cancelled { kept_partial: false });
        assert_eq!(messages(&session), vec![(Role::User, "hi".to_string())]);
        assert_eq!(session.store().current().unwrap().used_service, None);
    }

    #[tokio::test]
    async fn second_network_failure_is_reported() {
        let (mut session, _) =
            session(vec![Script::Reject(network()), Script::Reject(network())]).await;
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("hi", &CancellationToken::new(), &mut recorder)
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Failed(_)));
        assert_eq!(session.transport().opened(), 2);
        assert_eq!(recorder.notices.len(), 2);
        assert_eq!(recorder.states[recorder.states.len() - 2], TurnState::Errored);
    }

    #[tokio::test]
    async fn provider_errors_are_not_retried() {
        let (mut session, _) = session(vec![Script::Stream(
            vec![meta(), frame(StreamFrame::Error("rate limited".to_string()))],
            false,
        )])
        .await;
        let mut recorder = Recorder::default();

        let outcome = session
            .send_message("hi", &CancellationToken::new(), &mut recorder)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Failed("rate limited".to_string()));
        assert_eq!(session.transport().opened(), 1);
        assert_eq!(
            recorder.notices,
            vec![Notice::Error("rate limited".to_string())]
        );
        assert_eq!(messages(&session), vec![(Role::User, "hi".to_string())]);
        // The meta frame arrived, but no reply was kept to credit it.
        assert_eq!(session.store().current().unwrap().used_service, None);
    }

    #[tokio::test]
    async fn relay_rejections_are_not_retried() {
        let (mut session, _) = session(vec![Script::Reject(TransportError::Relay {
            status: 400,
            message: "No AI service configured".to_string(),
        })])
        .await;

        let outcome = session
            .send_message("hi", &CancellationToken::new(), &mut ())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Failed("No AI service configured".to_string())
        );
        assert_eq!(session.transport().opened(), 1);
    }

    #[tokio::test]
    async fn partial_content_survives_an_error() {
        let (mut session, _) = session(vec![Script::Stream(
            vec![
                meta(),
                content("half"),
                frame(StreamFrame::Error("upstream closed".to_string())),
            ],
            false,
        )])
        .await;

        session
            .send_message("hi", &CancellationToken::new(), &mut ())
            .await
            .unwrap();
        assert_eq!(messages(&session)[1], (Role::Assistant, "half".to_string()));
    }

    #[tokio::test]
    async fn sending_requires_a_key() {
        let storage = Arc::new(MemoryStorage::new());
        let store = ConversationStore::load(storage).await;
        let mut session = ChatSession::new(store, MockTransport::default());

        let err = session
            .send_message("hi", &CancellationToken::new(), &mut ())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoApiKeys));
        assert_eq!(err.to_string(), "Configure an API key first");
    }

    #[tokio::test]
    async fn blank_text_without_files_is_ignored() {
        let (mut session, _) = session(Vec::new()).await;
        let outcome = session
            .send_message("   ", &CancellationToken::new(), &mut ())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Ignored);
        assert_eq!(session.transport().opened(), 0);
        assert!(messages(&session).is_empty());
    }

    #[tokio::test]
    async fn attached_files_are_injected_but_not_displayed() {
        let (mut session, _) = session(vec![reply("Looks fine")]).await;
        session
            .upload_file("notes.txt", b"remember the milk".to_vec())
            .await
            .unwrap();
        assert_eq!(session.store().pending_files().len(), 1);

        session
            .send_message("check this", &CancellationToken::new(), &mut ())
            .await
            .unwrap();

        assert!(session.store().pending_files().is_empty());
        let user = &session.store().current().unwrap().messages[0];
        assert_eq!(user.display_text.as_deref(), Some("check this"));
        assert_eq!(user.files.len(), 1);

        let bodies = session.transport().bodies.lock().unwrap();
        let sent = &bodies[0].messages[0].content;
        assert!(sent.starts_with("check this\n\n"));
        assert!(sent.contains("--- File: notes.txt ---\nremember the milk"));
    }

    #[tokio::test]
    async fn edit_and_regenerate_replace_the_tail() {
        let (mut session, _) =
            session(vec![reply("one"), reply("two"), reply("three")]).await;
        let cancel = CancellationToken::new();
        session.send_message("first", &cancel, &mut ()).await.unwrap();

        session
            .edit_message(0, "first, edited", &cancel, &mut ())
            .await
            .unwrap();
        assert_eq!(
            messages(&session),
            vec![
                (Role::User, "first, edited".to_string()),
                (Role::Assistant, "two".to_string())
            ]
        );

        session.regenerate_from(1, &cancel, &mut ()).await.unwrap();
        assert_eq!(messages(&session)[1], (Role::Assistant, "three".to_string()));
        assert_eq!(messages(&session).len(), 2);

        // Neither operation applies to the wrong role.
        assert!(matches!(
            session.edit_message(1, "x", &cancel, &mut ()).await,
            Err(ClientError::InvalidMessage(1))
        ));
        assert!(matches!(
            session.regenerate_from(0, &cancel, &mut ()).await,
            Err(ClientError::InvalidMessage(0))
        ));
    }

    #[tokio::test]
    async fn services_and_models_use_the_transport() {
        let (session, _) = session(Vec::new()).await;
        assert_eq!(
            session.refresh_services().await.unwrap(),
            vec!["auto", "groq"]
        );
        assert_eq!(
            session.load_models(ProviderKind::Cerebras).await.unwrap()[0],
            "gpt-oss-120b"
        );
    }
}
