use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use gpui::*;
use gpui_component::{
    IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    text::TextView,
};

/// Assistant replies larger than this are shown as plain text.
pub const PLAIN_TEXT_FALLBACK_THRESHOLD_BYTES: usize = 128 * 1024;

/// Turns assistant text into a UI element.
///
/// Implementations must treat the text as untrusted: it is rendered, never executed.
pub trait RichTextRenderer {
    fn render(&self, id: ElementId, text: &str, cx: &App) -> AnyElement;
}

/// Renders markdown through gpui-component's `TextView`, with a copy button on code blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownRenderer;

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl RichTextRenderer for MarkdownRenderer {
    fn render(&self, id: ElementId, text: &str, _cx: &App) -> AnyElement {
        if renders_as_plain_text(text) {
            return Label::new(text.to_string()).text_sm().into_any_element();
        }

        TextView::markdown(id, text.to_string())
            .code_block_actions(|code_block, _window, _cx| {
                let code = code_block.code().to_string();
                let copy_button_id = format!("copy-code-{}", content_hash(&code));

                h_flex().w_full().justify_end().child(
                    Button::new(copy_button_id)
                        .ghost()
                        .small()
                        .icon(IconName::Copy)
                        .on_click(move |_, _, cx| {
                            cx.write_to_clipboard(ClipboardItem::new_string(code.clone()));
                        }),
                )
            })
            .selectable(true)
            .into_any_element()
    }
}

pub fn renders_as_plain_text(text: &str) -> bool {
    text.len() > PLAIN_TEXT_FALLBACK_THRESHOLD_BYTES
}

fn content_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(text.as_bytes());
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[::core::prelude::v1::test]
    fn oversized_replies_skip_markdown() {
        assert!(!renders_as_plain_text("# heading\n\n`code`"));
        assert!(!renders_as_plain_text(
            &"a".repeat(PLAIN_TEXT_FALLBACK_THRESHOLD_BYTES)
        ));
        assert!(renders_as_plain_text(
            &"a".repeat(PLAIN_TEXT_FALLBACK_THRESHOLD_BYTES + 1)
        ));
    }

    #[::core::prelude::v1::test]
    fn copy_button_ids_follow_code_content() {
        assert_eq!(content_hash("fn main() {}"), content_hash("fn main() {}"));
        assert_ne!(content_hash("fn main() {}"), content_hash("fn main() { }"));
    }
}
