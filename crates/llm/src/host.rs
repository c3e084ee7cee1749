use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type PromptWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type SessionResult<T> = Result<T, SessionError>;

/// Whether the host can hand out a language-model session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Availability {
    No,
    Readily,
    AfterDownload,
}

impl Availability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Readily => "readily",
            Self::AfterDownload => "after-download",
        }
    }

    /// Only `No` blocks session creation; a pending download still creates one.
    pub fn allows_session(self) -> bool {
        !matches!(self, Self::No)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub available: Availability,
}

impl Capabilities {
    pub const fn new(available: Availability) -> Self {
        Self { available }
    }
}

/// One event produced by a streaming prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptEvent {
    Chunk(String),
    Done,
    Error(String),
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    #[snafu(display("language model is unavailable on this host"))]
    Unavailable { stage: &'static str },
    #[snafu(display("capability query failed on `{stage}`: {message}"))]
    CapabilityQuery {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("session creation failed on `{stage}`: {message}"))]
    CreateSession {
        stage: &'static str,
        message: String,
    },
    #[snafu(display("missing API key for provider '{provider_id}'"))]
    MissingApiKey {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("provider '{provider_id}' is not supported"))]
    UnsupportedProvider {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("http client failed on `{stage}`, {source}"))]
    HttpClient {
        stage: &'static str,
        source: rig::http_client::Error,
    },
    #[snafu(display("completions failed on `{stage}`, {source}"))]
    CompletionsFailed {
        stage: &'static str,
        source: rig::completion::CompletionError,
    },
    #[snafu(display("prompt is empty"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("no chunk received within {seconds}s"))]
    IdleTimeout { stage: &'static str, seconds: u64 },
}

impl SessionError {
    pub fn capability_query(stage: &'static str, message: impl Into<String>) -> Self {
        Self::CapabilityQuery {
            stage,
            message: message.into(),
        }
    }

    pub fn create_session(stage: &'static str, message: impl Into<String>) -> Self {
        Self::CreateSession {
            stage,
            message: message.into(),
        }
    }
}

/// Source of language-model sessions provided by the hosting environment.
pub trait LanguageModelHost: Send + Sync {
    fn capabilities<'a>(&'a self) -> BoxFuture<'a, SessionResult<Capabilities>>;
    fn create<'a>(&'a self) -> BoxFuture<'a, SessionResult<Arc<dyn Session>>>;
}

/// A live model session.
///
/// Every call to `prompt_streaming` yields a fresh, one-shot event stream. The
/// returned worker must be driven (usually spawned on the tokio runtime) for
/// events to arrive.
pub trait Session: Send + Sync {
    fn prompt_streaming(&self, text: String) -> SessionResult<PromptStreamHandle>;
}

/// Receiving half of a prompt stream. Dropping it cancels the worker.
pub struct PromptStream {
    events: mpsc::UnboundedReceiver<PromptEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct PromptStreamHandle {
    pub stream: PromptStream,
    pub worker: PromptWorker,
}

impl PromptStream {
    fn new(events: mpsc::UnboundedReceiver<PromptEvent>, cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<PromptEvent> {
        self.events.recv().await
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for PromptStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Creates the channel pair shared by a session worker and its `PromptStream`.
pub fn make_prompt_stream() -> (
    mpsc::UnboundedSender<PromptEvent>,
    PromptStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (event_tx, PromptStream::new(event_rx, cancel_tx), cancel_rx)
}
