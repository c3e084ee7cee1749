#![deny(unsafe_code)]

/// Floating GitLab Duo chat widget built with GPUI and gpui-component.
pub mod message_input;
pub mod message_list;
/// Rich-text rendering for assistant replies.
pub mod rich_text;
pub mod scroll_manager;
pub mod theme;
pub mod widget;

pub use message_input::MessageInput;
pub use message_list::MessageList;
pub use rich_text::{MarkdownRenderer, RichTextRenderer};
pub use widget::{ChatWidget, Quit, ToggleChat};
