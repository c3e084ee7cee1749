use std::rc::Rc;

use duo_chat::{Message, MessageStatus};
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{ActiveTheme, h_flex, label::Label, v_flex};

use crate::rich_text::RichTextRenderer;
use crate::scroll_manager::ScrollManager;

const BUBBLE_MAX_WIDTH: Pixels = px(300.);
const BUBBLE_PADDING_X: Pixels = px(12.);
const BUBBLE_PADDING_Y: Pixels = px(8.);

/// Scrollable transcript. User messages render as plain text, assistant replies through the renderer.
pub struct MessageList {
    messages: Vec<Message>,
    renderer: Rc<dyn RichTextRenderer>,
    scroll_manager: ScrollManager,
}

impl MessageList {
    pub fn new(renderer: Rc<dyn RichTextRenderer>, _cx: &mut Context<Self>) -> Self {
        Self {
            messages: Vec::new(),
            renderer,
            scroll_manager: ScrollManager::new(),
        }
    }

    pub fn set_messages(&mut self, messages: &[Message], revision: u64, cx: &mut Context<Self>) {
        if !self.scroll_manager.observe_revision(revision) {
            return;
        }

        self.messages = messages.to_vec();
        cx.notify();
    }

    pub fn request_scroll_to_bottom(&mut self, cx: &mut Context<Self>) {
        self.scroll_manager.request_scroll_to_bottom();
        cx.notify();
    }

    fn render_message_row(&self, message: &Message, index: usize, cx: &App) -> AnyElement {
        let theme = cx.theme();

        if message.is_user() {
            return v_flex()
                .w_full()
                .items_end()
                .gap_1()
                .child(
                    div()
                        .max_w(BUBBLE_MAX_WIDTH)
                        .px(BUBBLE_PADDING_X)
                        .py(BUBBLE_PADDING_Y)
                        .rounded_lg()
                        .bg(theme.accent)
                        .text_color(theme.accent_foreground)
                        .child(Label::new(non_empty(&message.content)).text_sm()),
                )
                .child(
                    Label::new(message.timestamp.clone())
                        .text_xs()
                        .text_color(theme.muted_foreground),
                )
                .into_any_element();
        }

        let body = if message.status == MessageStatus::Error {
            Label::new(message.content.clone())
                .text_sm()
                .text_color(theme.danger)
                .into_any_element()
        } else {
            let id = ElementId::Name(SharedString::from(format!("duo-reply-{index}")));
            self.renderer
                .render(id, &non_empty(&message.content), cx)
        };

        let caption = status_caption(message.status);

        v_flex()
            .w_full()
            .items_start()
            .gap_1()
            .child(
                div()
                    .max_w(BUBBLE_MAX_WIDTH)
                    .px(BUBBLE_PADDING_X)
                    .py(BUBBLE_PADDING_Y)
                    .rounded_lg()
                    .bg(theme.secondary)
                    .text_color(theme.secondary_foreground)
                    .child(body),
            )
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .when(message.status == MessageStatus::Streaming, |row| {
                        row.child(div().size(px(6.)).rounded_full().bg(theme.primary))
                    })
                    .child(
                        Label::new(message.timestamp.clone())
                            .text_xs()
                            .text_color(theme.muted_foreground),
                    )
                    .when_some(caption, |row, caption| {
                        row.child(
                            Label::new(caption)
                                .text_xs()
                                .text_color(theme.muted_foreground),
                        )
                    }),
            )
            .into_any_element()
    }
}

impl Render for MessageList {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.scroll_manager.apply_pending_scroll();

        let rows = self
            .messages
            .iter()
            .enumerate()
            .map(|(index, message)| self.render_message_row(message, index, cx))
            .collect::<Vec<_>>();

        div()
            .id("duo-message-list")
            .size_full()
            .min_h_0()
            .overflow_y_scroll()
            .track_scroll(self.scroll_manager.handle())
            .child(v_flex().w_full().gap_3().px_3().py_3().children(rows))
    }
}

/// Small label shown under an assistant reply.
pub fn status_caption(status: MessageStatus) -> Option<&'static str> {
    match status {
        MessageStatus::Streaming => Some("Typing..."),
        MessageStatus::Interrupted => Some("Stopped"),
        MessageStatus::Complete | MessageStatus::Error => None,
    }
}

fn non_empty(content: &str) -> String {
    if content.is_empty() {
        " ".to_string()
    } else {
        content.to_string()
    }
}
