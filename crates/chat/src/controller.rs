use std::sync::Arc;

use duo_llm::{PromptEvent, PromptStreamHandle, Session, SessionResult};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::message::{
    ExchangeId, Message, MessageStatus, StreamState, StreamTarget, StreamTransition,
    local_timestamp,
};

/// Shown in place of the transcript until the first message is sent.
pub const PLACEHOLDER_TEXT: &str = "Start a conversation by sending a message";

/// Message used when a stream closes without `Done` or `Error`.
pub const STREAM_ENDED_EARLY: &str = "stream ended before completion";

/// Produces the timestamp label for new messages.
pub type Clock = fn() -> String;

/// How streamed chunks become the assistant reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkPolicy {
    /// Each chunk is the whole reply so far; the latest one wins.
    #[default]
    Replace,
    /// Each chunk is a delta appended to the reply.
    Accumulate,
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum SubmitRejection {
    #[snafu(display("message is empty"))]
    EmptyInput,
    #[snafu(display("model session is not initialized"))]
    SessionNotReady,
}

/// An accepted submit, ready to be opened against the session.
pub struct Exchange {
    pub target: StreamTarget,
    pub prompt: String,
    session: Arc<dyn Session>,
}

impl Exchange {
    pub fn open(&self) -> SessionResult<PromptStreamHandle> {
        self.session.prompt_streaming(self.prompt.clone())
    }
}

/// Transcript, input and panel state for one chat widget.
pub struct ChatController {
    open: bool,
    input: String,
    session: Option<Arc<dyn Session>>,
    transcript: Vec<Message>,
    /// The only record of which exchange is live.
    stream_state: StreamState,
    /// Transcript index of the live exchange's assistant slot.
    reply_index: usize,
    next_exchange_id: u64,
    chunk_policy: ChunkPolicy,
    clock: Clock,
    revision: u64,
}

impl ChatController {
    pub fn new(chunk_policy: ChunkPolicy) -> Self {
        Self::with_clock(chunk_policy, local_timestamp)
    }

    pub fn with_clock(chunk_policy: ChunkPolicy, clock: Clock) -> Self {
        Self {
            open: false,
            input: String::new(),
            session: None,
            transcript: Vec::new(),
            stream_state: StreamState::Idle,
            reply_index: 0,
            next_exchange_id: 1,
            chunk_policy,
            clock,
            revision: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn open(&mut self) {
        self.open = true;
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    pub fn toggle(&mut self) -> bool {
        self.open = !self.open;
        self.open
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    /// Stores the outcome of the mount-time session request.
    pub fn attach_session(&mut self, session: Option<Arc<dyn Session>>) {
        if session.is_none() {
            tracing::warn!("no language model session available; submissions are disabled");
        }
        self.session = session;
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.stream_state
    }

    pub fn is_streaming(&self) -> bool {
        self.stream_state.active_target().is_some()
    }

    /// Bumped on every transcript change; views scroll to the newest entry when it moves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Submits the current input buffer.
    pub fn submit(&mut self) -> Result<Exchange, SubmitRejection> {
        let text = self.input.clone();
        self.submit_text(text)
    }

    /// Appends the user message, clears the input and starts a new exchange.
    ///
    /// The returned exchange carries the untrimmed text. Any exchange still
    /// streaming is cancelled first.
    pub fn submit_text(&mut self, text: impl Into<String>) -> Result<Exchange, SubmitRejection> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SubmitRejection::EmptyInput);
        }

        let Some(session) = self.session.clone() else {
            tracing::error!("model session is not initialized");
            return Err(SubmitRejection::SessionNotReady);
        };

        if let Some(cancelled) = self.cancel_active() {
            tracing::debug!(exchange = cancelled.exchange_id.0, "superseded by new submit");
        }

        let target = self.alloc_target();
        self.stream_state = StreamState::Streaming(target);

        self.transcript
            .push(Message::user(text.clone(), (self.clock)()));
        self.input.clear();
        self.reply_index = self.transcript.len();
        self.touch();

        Ok(Exchange {
            target,
            prompt: text,
            session,
        })
    }

    /// Applies one stream event. Returns true when the transcript changed.
    pub fn apply_stream_event(&mut self, target: StreamTarget, event: PromptEvent) -> bool {
        if !self.stream_state.accepts_stream_event(target) {
            tracing::debug!(exchange = target.exchange_id.0, "dropping stale stream event");
            return false;
        }

        match event {
            PromptEvent::Chunk(chunk) => self.apply_chunk(chunk),
            PromptEvent::Done => self.finish(StreamTransition::Complete(target)),
            PromptEvent::Error(message) => self.fail(target, message),
        }
        true
    }

    /// Settles an exchange whose stream could not be opened.
    pub fn fail_exchange(&mut self, target: StreamTarget, message: impl Into<String>) -> bool {
        if !self.stream_state.accepts_stream_event(target) {
            return false;
        }
        self.fail(target, message.into());
        true
    }

    /// Called when the event source ends. Only matters if no terminal event arrived.
    pub fn stream_closed(&mut self, target: StreamTarget) -> bool {
        self.fail_exchange(target, STREAM_ENDED_EARLY)
    }

    /// Stops the in-flight exchange, keeping any partial reply.
    pub fn cancel_active(&mut self) -> Option<StreamTarget> {
        let target = self.stream_state.active_target()?;
        self.finish(StreamTransition::Cancel(target));
        Some(target)
    }

    fn apply_chunk(&mut self, chunk: String) {
        let content = match self.chunk_policy {
            ChunkPolicy::Replace => chunk,
            ChunkPolicy::Accumulate => {
                let mut content = self
                    .transcript
                    .get(self.reply_index)
                    .map(|message| message.content.clone())
                    .unwrap_or_default();
                content.push_str(&chunk);
                content
            }
        };

        self.transcript.truncate(self.reply_index);
        self.transcript
            .push(Message::ai_streaming(content, (self.clock)()));
        self.touch();
    }

    fn fail(&mut self, target: StreamTarget, message: String) {
        tracing::warn!(
            exchange = target.exchange_id.0,
            error = %message,
            "prompt stream failed"
        );
        let notice = format!("Error: {message}");
        self.finish(StreamTransition::Fail { target, message });
        self.transcript
            .push(Message::ai_error(notice, (self.clock)()));
        self.touch();
    }

    fn finish(&mut self, transition: StreamTransition) {
        let reply_status = match transition {
            StreamTransition::Complete(_) => MessageStatus::Complete,
            _ => MessageStatus::Interrupted,
        };

        match self.stream_state.apply(transition) {
            Ok(next) => self.stream_state = next,
            Err(rejection) => {
                tracing::warn!(?rejection, "ignored stream transition");
                return;
            }
        }

        if let Some(reply) = self.transcript.get(self.reply_index) {
            let settled = reply.with_status(reply_status);
            self.transcript[self.reply_index] = settled;
            self.touch();
        }
    }

    fn alloc_target(&mut self) -> StreamTarget {
        let target = StreamTarget::new(ExchangeId::new(self.next_exchange_id));
        self.next_exchange_id = self.next_exchange_id.saturating_add(1);
        target
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl Default for ChatController {
    fn default() -> Self {
        Self::new(ChunkPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use duo_llm::{PromptStream, make_prompt_stream};

    use super::*;
    use crate::message::Sender;

    fn fixed_clock() -> String {
        "09:30".to_string()
    }

    /// Session that replays a fixed event script for every prompt.
    #[derive(Default)]
    struct ScriptedSession {
        script: Vec<PromptEvent>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedSession {
        fn new(script: Vec<PromptEvent>) -> Arc<Self> {
            Arc::new(Self {
                script,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl Session for ScriptedSession {
        fn prompt_streaming(&self, text: String) -> SessionResult<PromptStreamHandle> {
            self.prompts.lock().unwrap().push(text);
            let (event_tx, stream, _cancel_rx) = make_prompt_stream();
            let script = self.script.clone();
            Ok(PromptStreamHandle {
                stream,
                worker: Box::pin(async move {
                    for event in script {
                        if event_tx.send(event).is_err() {
                            return;
                        }
                    }
                }),
            })
        }
    }

    fn chunks(parts: &[&str]) -> Vec<PromptEvent> {
        let mut events = parts
            .iter()
            .map(|part| PromptEvent::Chunk(part.to_string()))
            .collect::<Vec<_>>();
        events.push(PromptEvent::Done);
        events
    }

    fn controller_with(session: Arc<ScriptedSession>, policy: ChunkPolicy) -> ChatController {
        let mut controller = ChatController::with_clock(policy, fixed_clock);
        controller.attach_session(Some(session as Arc<dyn Session>));
        controller
    }

    async fn pump(controller: &mut ChatController, target: StreamTarget, mut stream: PromptStream) {
        while let Some(event) = stream.recv().await {
            controller.apply_stream_event(target, event);
        }
        controller.stream_closed(target);
    }

    async fn run_exchange(controller: &mut ChatController, exchange: Exchange) {
        let handle = exchange.open().expect("stream opens");
        handle.worker.await;
        pump(controller, exchange.target, handle.stream).await;
    }

    #[tokio::test]
    async fn scenario_hi_streams_into_single_reply() {
        let session = ScriptedSession::new(chunks(&["H", "Hi there"]));
        let mut controller = controller_with(session.clone(), ChunkPolicy::Replace);

        controller.set_input("Hi");
        let exchange = controller.submit().expect("accepted");
        run_exchange(&mut controller, exchange).await;

        let transcript = controller.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "Hi");
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[1].content, "Hi there");
        assert_eq!(transcript[1].sender, Sender::Ai);
        assert_eq!(transcript[1].status, MessageStatus::Complete);
        assert_eq!(transcript[1].timestamp, "09:30");
        assert!(matches!(controller.stream_state(), StreamState::Settled(_)));
        assert_eq!(session.prompts(), vec!["Hi".to_string()]);
    }

    #[tokio::test]
    async fn last_chunk_wins_under_replace_policy() {
        let session = ScriptedSession::new(chunks(&["Hel", "Hello"]));
        let mut controller = controller_with(session, ChunkPolicy::Replace);

        let exchange = controller.submit_text("greet me").unwrap();
        run_exchange(&mut controller, exchange).await;

        assert_eq!(controller.transcript().last().unwrap().content, "Hello");
        assert_eq!(controller.transcript().len(), 2);
    }

    #[tokio::test]
    async fn accumulate_policy_concatenates_deltas() {
        let session = ScriptedSession::new(chunks(&["Hel", "lo"]));
        let mut controller = controller_with(session, ChunkPolicy::Accumulate);

        let exchange = controller.submit_text("greet me").unwrap();
        run_exchange(&mut controller, exchange).await;

        assert_eq!(controller.transcript().last().unwrap().content, "Hello");
    }

    #[test]
    fn submit_appends_user_message_before_any_reply() {
        let session = ScriptedSession::new(chunks(&["reply"]));
        let mut controller = controller_with(session, ChunkPolicy::Replace);
        controller.set_input("  question with padding ");

        let exchange = controller.submit().unwrap();

        assert_eq!(controller.transcript().len(), 1);
        assert!(controller.transcript()[0].is_user());
        assert_eq!(controller.input(), "");
        assert_eq!(exchange.prompt, "  question with padding ");
        assert!(controller.is_streaming());
    }

    #[test]
    fn blank_input_is_a_no_op() {
        let session = ScriptedSession::new(chunks(&["unused"]));
        let mut controller = controller_with(session.clone(), ChunkPolicy::Replace);

        for blank in ["", "   ", "\n\t"] {
            controller.set_input(blank);
            assert_eq!(controller.submit().err(), Some(SubmitRejection::EmptyInput));
        }

        assert!(controller.is_empty());
        assert_eq!(controller.revision(), 0);
        assert!(session.prompts().is_empty());
    }

    #[test]
    fn submit_without_session_changes_nothing() {
        let mut controller = ChatController::with_clock(ChunkPolicy::Replace, fixed_clock);
        controller.set_input("hello?");

        assert_eq!(
            controller.submit().err(),
            Some(SubmitRejection::SessionNotReady)
        );
        assert!(controller.is_empty());
        assert_eq!(controller.input(), "hello?");
        assert_eq!(controller.stream_state(), &StreamState::Idle);
    }

    #[tokio::test]
    async fn stream_error_appends_visible_error_and_settles() {
        let session = ScriptedSession::new(vec![
            PromptEvent::Chunk("partial".to_string()),
            PromptEvent::Error("connection reset".to_string()),
        ]);
        let mut controller = controller_with(session, ChunkPolicy::Replace);

        let exchange = controller.submit_text("explain").unwrap();
        run_exchange(&mut controller, exchange).await;

        let transcript = controller.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].content, "partial");
        assert_eq!(transcript[1].status, MessageStatus::Interrupted);
        assert_eq!(transcript[2].content, "Error: connection reset");
        assert_eq!(transcript[2].status, MessageStatus::Error);
        assert!(matches!(controller.stream_state(), StreamState::Error { .. }));
        assert!(!controller.is_streaming());
    }

    #[tokio::test]
    async fn stream_closing_without_terminal_event_is_an_error() {
        let session = ScriptedSession::new(vec![PromptEvent::Chunk("cut".to_string())]);
        let mut controller = controller_with(session, ChunkPolicy::Replace);

        let exchange = controller.submit_text("go").unwrap();
        run_exchange(&mut controller, exchange).await;

        let last = controller.transcript().last().unwrap();
        assert_eq!(last.content, format!("Error: {STREAM_ENDED_EARLY}"));
    }

    #[test]
    fn new_submit_cancels_previous_exchange_and_drops_its_chunks() {
        let session = ScriptedSession::new(chunks(&["unused"]));
        let mut controller = controller_with(session, ChunkPolicy::Replace);

        let first = controller.submit_text("first").unwrap();
        assert!(controller.apply_stream_event(first.target, PromptEvent::Chunk("one".into())));

        let second = controller.submit_text("second").unwrap();
        assert_ne!(first.target, second.target);
        assert_eq!(
            controller.transcript()[1].status,
            MessageStatus::Interrupted
        );

        assert!(!controller.apply_stream_event(first.target, PromptEvent::Chunk("late".into())));
        assert!(controller.apply_stream_event(second.target, PromptEvent::Chunk("two".into())));

        let contents = controller
            .transcript()
            .iter()
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>();
        assert_eq!(contents, vec!["first", "one", "second", "two"]);
    }

    #[test]
    fn superseding_submit_leaves_only_the_new_exchange_live() {
        let session = ScriptedSession::new(Vec::new());
        let mut controller = controller_with(session, ChunkPolicy::Replace);

        let first = controller.submit_text("first").unwrap();
        let second = controller.submit_text("second").unwrap();

        assert_eq!(controller.stream_state(), &StreamState::Streaming(second.target));
        assert!(controller.is_streaming());
        assert!(!controller.stream_closed(first.target));

        assert_eq!(controller.cancel_active(), Some(second.target));
        assert_eq!(controller.stream_state(), &StreamState::Cancelled(second.target));
        assert!(!controller.is_streaming());
        assert_eq!(controller.cancel_active(), None);
    }

    #[test]
    fn failed_open_settles_exchange_with_error_message() {
        let session = ScriptedSession::new(Vec::new());
        let mut controller = controller_with(session, ChunkPolicy::Replace);

        let exchange = controller.submit_text("hello").unwrap();
        assert!(controller.fail_exchange(exchange.target, "no route"));
        assert!(!controller.fail_exchange(exchange.target, "again"));

        assert_eq!(controller.transcript().len(), 2);
        assert_eq!(controller.transcript()[1].content, "Error: no route");
    }

    #[test]
    fn toggling_panel_preserves_transcript() {
        let session = ScriptedSession::new(Vec::new());
        let mut controller = controller_with(session, ChunkPolicy::Replace);
        let exchange = controller.submit_text("keep me").unwrap();
        controller.apply_stream_event(exchange.target, PromptEvent::Chunk("kept".into()));
        controller.apply_stream_event(exchange.target, PromptEvent::Done);
        let before = controller.transcript().to_vec();

        assert!(controller.toggle());
        assert!(!controller.toggle());
        assert!(controller.toggle());

        assert!(controller.is_open());
        assert_eq!(controller.transcript(), before.as_slice());
    }
}
