use chrono::{DateTime, Local, TimeZone};

/// Identifier for one prompt/response exchange.
///
/// This must change on every submit so chunks from an abandoned exchange can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

impl ExchangeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Stream routing key used for stale-chunk rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    pub exchange_id: ExchangeId,
}

impl StreamTarget {
    pub const fn new(exchange_id: ExchangeId) -> Self {
        Self { exchange_id }
    }
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Ai,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageStatus {
    Complete,
    Streaming,
    Interrupted,
    Error,
}

/// One transcript entry. Updates build a new value rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    pub sender: Sender,
    pub timestamp: String,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(
        content: impl Into<String>,
        sender: Sender,
        timestamp: impl Into<String>,
        status: MessageStatus,
    ) -> Self {
        Self {
            content: content.into(),
            sender,
            timestamp: timestamp.into(),
            status,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(content, Sender::User, timestamp, MessageStatus::Complete)
    }

    pub fn ai_streaming(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(content, Sender::Ai, timestamp, MessageStatus::Streaming)
    }

    pub fn ai_error(content: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self::new(content, Sender::Ai, timestamp, MessageStatus::Error)
    }

    pub fn with_status(&self, status: MessageStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender == Sender::User
    }
}

/// Formats a time the way message bubbles show it: two-digit hour and minute.
pub fn format_timestamp<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%H:%M").to_string()
}

pub fn local_timestamp() -> String {
    format_timestamp(&Local::now())
}

/// Exchange lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming(StreamTarget),
    Settled(StreamTarget),
    Error {
        target: StreamTarget,
        message: String,
    },
    Cancelled(StreamTarget),
}

/// State transition input for the exchange lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransition {
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
    Cancel(StreamTarget),
}

/// Rejection reason for illegal stream transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTransitionRejection {
    NoActiveStream,
    SessionMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
}

pub type StreamTransitionResult = Result<StreamState, StreamTransitionRejection>;

impl StreamState {
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Streaming(target) => Some(*target),
            Self::Idle | Self::Settled(_) | Self::Error { .. } | Self::Cancelled(_) => None,
        }
    }

    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if *active == target)
    }

    /// Applies one terminal transition. It must name the active exchange exactly.
    pub fn apply(&self, transition: StreamTransition) -> StreamTransitionResult {
        match transition {
            StreamTransition::Complete(target) => {
                self.apply_terminal(target, || Self::Settled(target))
            }
            StreamTransition::Fail { target, message } => {
                self.apply_terminal(target, || Self::Error { target, message })
            }
            StreamTransition::Cancel(target) => {
                self.apply_terminal(target, || Self::Cancelled(target))
            }
        }
    }

    fn apply_terminal(
        &self,
        target: StreamTarget,
        next: impl FnOnce() -> Self,
    ) -> StreamTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(next()),
            Self::Streaming(active) => Err(StreamTransitionRejection::SessionMismatch {
                active: *active,
                attempted: target,
            }),
            Self::Idle | Self::Settled(_) | Self::Error { .. } | Self::Cancelled(_) => {
                Err(StreamTransitionRejection::NoActiveStream)
            }
        }
    }
}
