//! Framework-independent state for the Duo chat widget.
//!
//! [`ChatController`] owns the transcript, the input buffer and the panel
//! visibility. The GPUI view feeds it user actions and prompt stream events
//! and renders whatever it holds.

pub mod controller;
pub mod events;
pub mod message;
pub mod settings;

pub use controller::{
    ChatController, ChunkPolicy, Clock, Exchange, PLACEHOLDER_TEXT, STREAM_ENDED_EARLY,
    SubmitRejection,
};
pub use events::{Stop, Submit};
pub use message::{
    ExchangeId, Message, MessageStatus, Sender, StreamState, StreamTarget, StreamTransition,
    StreamTransitionRejection, format_timestamp, local_timestamp,
};
pub use settings::{SettingsError, SettingsStore, ThemeModeSetting, WidgetSettings};
