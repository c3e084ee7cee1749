use duo_chat::{Stop, Submit};
use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    input::{Input, InputEvent, InputState},
};

pub const INPUT_PLACEHOLDER: &str = "Type your message...";

/// Text box with a Send button. Emits [`Submit`] on Enter or Send and [`Stop`] while a reply streams.
pub struct MessageInput {
    input_state: Entity<InputState>,
    is_streaming: bool,
    pending_newline: bool,
}

impl EventEmitter<Submit> for MessageInput {}
impl EventEmitter<Stop> for MessageInput {}

impl MessageInput {
    pub fn new(window: &mut Window, cx: &mut Context<Self>) -> Self {
        let input_state = cx.new(|cx| {
            InputState::new(window, cx)
                .placeholder(INPUT_PLACEHOLDER)
                .clean_on_escape()
                .auto_grow(1, 4)
        });

        cx.subscribe_in(
            &input_state,
            window,
            |this, _, event: &InputEvent, window, cx| {
                if let InputEvent::PressEnter { secondary } = event {
                    if *secondary {
                        this.pending_newline = false;
                        return;
                    }

                    if this.pending_newline {
                        // Shift+Enter already inserted the newline; this enter is not a submit.
                        this.pending_newline = false;
                    } else {
                        this.trim_trailing_newline(window, cx);
                        this.handle_submit(cx);
                    }
                }
            },
        )
        .detach();

        Self {
            input_state,
            is_streaming: false,
            pending_newline: false,
        }
    }

    pub fn set_streaming(&mut self, streaming: bool, cx: &mut Context<Self>) {
        if self.is_streaming == streaming {
            return;
        }
        self.is_streaming = streaming;
        cx.notify();
    }

    pub fn focus(&self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.focus(window, cx);
        });
    }

    pub fn clear(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.set_value("", window, cx);
        });
        self.pending_newline = false;
    }

    fn handle_shift_enter(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.pending_newline = true;
        self.input_state.update(cx, |state, cx| {
            state.insert("\n", window, cx);
        });
        cx.notify();
    }

    fn trim_trailing_newline(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            let value = state.value().to_string();
            if let Some(trimmed) = value.strip_suffix('\n') {
                state.set_value(trimmed.to_string(), window, cx);
            }
        });
    }

    /// Emits the draft. The box keeps its text until the widget accepts the submit and clears it.
    fn handle_submit(&mut self, cx: &mut Context<Self>) {
        self.pending_newline = false;
        let content = self.input_state.read(cx).value().to_string();
        if let Some(submit) = submission_for(&content) {
            cx.emit(submit);
        }
    }

    fn handle_stop(&mut self, cx: &mut Context<Self>) {
        if !self.is_streaming {
            return;
        }

        cx.emit(Stop);
    }
}

impl Render for MessageInput {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();

        let send = Button::new("duo-send")
            .small()
            .primary()
            .icon(IconName::ArrowUp)
            .child("Send")
            .on_click(cx.listener(|this, _, _window, cx| {
                this.handle_submit(cx);
            }));

        let stop = self.is_streaming.then(|| {
            Button::new("duo-stop")
                .small()
                .danger()
                .icon(IconName::CircleX)
                .child("Stop")
                .on_click(cx.listener(|this, _, _window, cx| {
                    this.handle_stop(cx);
                }))
        });

        h_flex()
            .w_full()
            .gap_2()
            .p_3()
            .items_end()
            .bg(theme.background)
            .child(
                div()
                    .flex_1()
                    .min_w_0()
                    .on_key_down(cx.listener(|this, event: &KeyDownEvent, window, cx| {
                        if event.keystroke.key == "enter" && event.keystroke.modifiers.shift {
                            this.handle_shift_enter(window, cx);
                        }
                    }))
                    .child(Input::new(&self.input_state).w_full()),
            )
            .children(stop)
            .child(send)
    }
}

/// The event for a draft, or `None` when it is blank. The text is passed on untrimmed.
pub fn submission_for(draft: &str) -> Option<Submit> {
    if draft.trim().is_empty() {
        None
    } else {
        Some(Submit::new(draft))
    }
}
