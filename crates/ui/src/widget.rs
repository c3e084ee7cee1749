use std::rc::Rc;
use std::sync::Arc;

use duo_chat::{
    ChatController, ChunkPolicy, Exchange, PLACEHOLDER_TEXT, Stop, StreamTarget, Submit,
    SubmitRejection,
};
use duo_llm::{PromptEvent, PromptStream, PromptWorker, Session, SessionResult};
use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    label::Label,
    v_flex,
};
use gpui_tokio_bridge::Tokio;

use crate::message_input::MessageInput;
use crate::message_list::MessageList;
use crate::rich_text::{MarkdownRenderer, RichTextRenderer};

gpui::actions!(duo, [ToggleChat, Quit]);

const PANEL_WIDTH: Pixels = px(380.);
const PANEL_HEIGHT: Pixels = px(540.);
const LAUNCHER_MIN_WIDTH: Pixels = px(56.);
const WIDGET_INSET: Pixels = px(20.);

/// Tasks driving one exchange. Dropping them cancels the provider request.
struct StreamTasks {
    target: StreamTarget,
    _worker: Task<Result<(), gpui_tokio_bridge::JoinError>>,
    _reader: Task<()>,
}

/// The floating chat widget: a launcher button that expands into a chat panel.
pub struct ChatWidget {
    controller: ChatController,
    title: SharedString,
    needs_focus_input: bool,
    message_list: Entity<MessageList>,
    message_input: Entity<MessageInput>,
    session_task: Option<Task<()>>,
    stream_tasks: Option<StreamTasks>,
}

impl ChatWidget {
    pub fn new(
        title: impl Into<SharedString>,
        chunk_policy: ChunkPolicy,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        Self::with_renderer(
            title,
            chunk_policy,
            Rc::new(MarkdownRenderer::new()),
            window,
            cx,
        )
    }

    pub fn with_renderer(
        title: impl Into<SharedString>,
        chunk_policy: ChunkPolicy,
        renderer: Rc<dyn RichTextRenderer>,
        window: &mut Window,
        cx: &mut Context<Self>,
    ) -> Self {
        let message_list = cx.new(|cx| MessageList::new(renderer, cx));
        let message_input = cx.new(|cx| MessageInput::new(window, cx));

        cx.subscribe_in(
            &message_input,
            window,
            |this, _, event: &Submit, window, cx| {
                this.handle_submit(event, window, cx);
            },
        )
        .detach();
        cx.subscribe(&message_input, |this, _, _event: &Stop, cx| {
            this.handle_stop(cx);
        })
        .detach();
        cx.on_release(|this, _cx| {
            if let Some(target) = this.controller.cancel_active() {
                tracing::debug!(exchange = target.exchange_id.0, "exchange cancelled on unmount");
            }
        })
        .detach();

        let mut this = Self {
            controller: ChatController::new(chunk_policy),
            title: title.into(),
            needs_focus_input: false,
            message_list,
            message_input,
            session_task: None,
            stream_tasks: None,
        };
        this.resolve_session(cx);
        this
    }

    pub fn toggle(&mut self, cx: &mut Context<Self>) {
        let open = self.controller.toggle();
        self.panel_toggled(open, cx);
    }

    pub fn open(&mut self, cx: &mut Context<Self>) {
        if self.controller.is_open() {
            return;
        }
        self.controller.open();
        self.panel_toggled(true, cx);
    }

    pub fn close(&mut self, cx: &mut Context<Self>) {
        if !self.controller.is_open() {
            return;
        }
        self.controller.close();
        self.panel_toggled(false, cx);
    }

    fn panel_toggled(&mut self, open: bool, cx: &mut Context<Self>) {
        if open {
            // Focus needs a window, so it happens on the next render.
            self.needs_focus_input = true;
            self.message_list
                .update(cx, |list, cx| list.request_scroll_to_bottom(cx));
        }

        cx.notify();
    }

    /// Requests the shared model session. Runs at mount and again when a submit finds none.
    fn resolve_session(&mut self, cx: &mut Context<Self>) {
        let lookup = Tokio::spawn(cx, duo_llm::get_session());

        self.session_task = Some(cx.spawn(async move |this, cx| {
            let session = session_from_lookup(lookup.await);
            let _ = this.update(cx, |this, cx| {
                this.controller.attach_session(session);
                this.session_task = None;
                cx.notify();
            });
        }));
    }

    fn handle_submit(&mut self, event: &Submit, window: &mut Window, cx: &mut Context<Self>) {
        let exchange = match begin_exchange(&mut self.controller, &event.content) {
            SubmitOutcome::Started(exchange) => exchange,
            SubmitOutcome::Ignored => return,
            SubmitOutcome::NeedsSession => {
                // The draft stays in the input box for the next attempt.
                if self.session_task.is_none() {
                    tracing::info!("retrying model session lookup");
                    self.resolve_session(cx);
                }
                return;
            }
        };

        // Any previous exchange was cancelled by the controller; stop its tasks too.
        self.stream_tasks = None;
        self.message_input.update(cx, |input, cx| input.clear(window, cx));

        match exchange.open() {
            Ok(handle) => {
                let worker = self.spawn_stream_worker(handle.worker, cx);
                let reader = self.spawn_stream_reader(exchange.target, handle.stream, cx);
                self.stream_tasks = Some(StreamTasks {
                    target: exchange.target,
                    _worker: worker,
                    _reader: reader,
                });
            }
            Err(error) => {
                self.controller
                    .fail_exchange(exchange.target, error.to_string());
            }
        }

        self.sync_children(cx);
    }

    fn handle_stop(&mut self, cx: &mut Context<Self>) {
        let Some(target) = self.controller.cancel_active() else {
            return;
        };

        tracing::debug!(exchange = target.exchange_id.0, "exchange stopped by user");
        self.stream_tasks = None;
        self.sync_children(cx);
    }

    fn spawn_stream_worker(
        &mut self,
        worker: PromptWorker,
        cx: &mut Context<Self>,
    ) -> Task<Result<(), gpui_tokio_bridge::JoinError>> {
        Tokio::spawn(cx, worker)
    }

    fn spawn_stream_reader(
        &mut self,
        target: StreamTarget,
        mut stream: PromptStream,
        cx: &mut Context<Self>,
    ) -> Task<()> {
        cx.spawn(async move |this, cx| {
            while let Some(event) = stream.recv().await {
                let _ = this.update(cx, |this, cx| {
                    this.handle_stream_event(target, event, cx);
                });
            }

            let _ = this.update(cx, |this, cx| {
                this.handle_stream_closed(target, cx);
            });
        })
    }

    fn handle_stream_event(
        &mut self,
        target: StreamTarget,
        event: PromptEvent,
        cx: &mut Context<Self>,
    ) {
        if self.controller.apply_stream_event(target, event) {
            self.sync_children(cx);
        }
    }

    fn handle_stream_closed(&mut self, target: StreamTarget, cx: &mut Context<Self>) {
        if self.controller.stream_closed(target) {
            self.sync_children(cx);
        }

        if self
            .stream_tasks
            .as_ref()
            .is_some_and(|tasks| tasks.target == target)
        {
            self.stream_tasks = None;
        }
    }

    fn sync_children(&mut self, cx: &mut Context<Self>) {
        let transcript = self.controller.transcript();
        let revision = self.controller.revision();
        self.message_list.update(cx, |list, cx| {
            list.set_messages(transcript, revision, cx);
        });

        let streaming = self.controller.is_streaming();
        self.message_input.update(cx, |input, cx| {
            input.set_streaming(streaming, cx);
        });

        cx.notify();
    }

    fn render_launcher(&self, cx: &Context<Self>) -> AnyElement {
        div()
            .min_w(LAUNCHER_MIN_WIDTH)
            .rounded_full()
            .shadow_lg()
            .child(
                Button::new("duo-launcher")
                    .primary()
                    .large()
                    .icon(IconName::CircleUser)
                    .child(self.title.clone())
                    .on_click(cx.listener(|this, _, _window, cx| {
                        this.open(cx);
                    })),
            )
            .into_any_element()
    }

    fn render_panel(&self, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();

        let body = if self.controller.is_empty() {
            div()
                .flex_1()
                .min_h_0()
                .flex()
                .items_center()
                .justify_center()
                .px_6()
                .child(
                    Label::new(PLACEHOLDER_TEXT)
                        .text_sm()
                        .text_color(theme.muted_foreground),
                )
                .into_any_element()
        } else {
            div()
                .flex_1()
                .min_h_0()
                .child(self.message_list.clone())
                .into_any_element()
        };

        v_flex()
            .id("duo-panel")
            .w(PANEL_WIDTH)
            .h(PANEL_HEIGHT)
            .overflow_hidden()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.background)
            .shadow_lg()
            .child(
                h_flex()
                    .w_full()
                    .px_3()
                    .py_2()
                    .justify_between()
                    .items_center()
                    .border_b_1()
                    .border_color(theme.border)
                    .child(Label::new(self.title.clone()).text_sm())
                    .child(
                        Button::new("duo-close")
                            .ghost()
                            .small()
                            .icon(IconName::CircleX)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.close(cx);
                            })),
                    ),
            )
            .child(body)
            .child(
                div()
                    .flex_shrink_0()
                    .w_full()
                    .border_t_1()
                    .border_color(theme.border)
                    .child(self.message_input.clone()),
            )
            .into_any_element()
    }
}

impl Render for ChatWidget {
    fn render(&mut self, window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let open = self.controller.is_open();
        if open && self.needs_focus_input {
            self.needs_focus_input = false;
            self.message_input.update(cx, |input, cx| input.focus(window, cx));
        }

        div()
            .id("duo-chat-widget")
            .size_full()
            .relative()
            .bg(cx.theme().background)
            .child(
                div()
                    .absolute()
                    .bottom(WIDGET_INSET)
                    .right(WIDGET_INSET)
                    .when(open, |el| el.child(self.render_panel(cx)))
                    .when(!open, |el| el.child(self.render_launcher(cx))),
            )
    }
}

enum SubmitOutcome {
    Started(Exchange),
    Ignored,
    NeedsSession,
}

fn begin_exchange(controller: &mut ChatController, content: &str) -> SubmitOutcome {
    controller.set_input(content);
    match controller.submit() {
        Ok(exchange) => SubmitOutcome::Started(exchange),
        Err(SubmitRejection::EmptyInput) => SubmitOutcome::Ignored,
        Err(SubmitRejection::SessionNotReady) => SubmitOutcome::NeedsSession,
    }
}

fn session_from_lookup(
    lookup: Result<SessionResult<Option<Arc<dyn Session>>>, gpui_tokio_bridge::JoinError>,
) -> Option<Arc<dyn Session>> {
    match lookup {
        Ok(Ok(session)) => session,
        Ok(Err(error)) => {
            tracing::error!(%error, "failed to initialize model session");
            None
        }
        Err(error) => {
            tracing::error!(%error, "session lookup task failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use duo_llm::{PromptStreamHandle, make_prompt_stream};

    use super::*;

    struct SilentSession;

    impl Session for SilentSession {
        fn prompt_streaming(&self, _text: String) -> SessionResult<PromptStreamHandle> {
            let (_event_tx, stream, _cancel_rx) = make_prompt_stream();
            Ok(PromptStreamHandle {
                stream,
                worker: Box::pin(async {}),
            })
        }
    }

    #[::core::prelude::v1::test]
    fn submit_without_session_keeps_the_draft() {
        let mut controller = ChatController::default();

        let outcome = begin_exchange(&mut controller, "draft reply");

        assert!(matches!(outcome, SubmitOutcome::NeedsSession));
        assert_eq!(controller.input(), "draft reply");
        assert!(controller.is_empty());
    }

    #[::core::prelude::v1::test]
    fn accepted_submit_starts_an_exchange() {
        let mut controller = ChatController::default();
        controller.attach_session(Some(Arc::new(SilentSession) as Arc<dyn Session>));

        let outcome = begin_exchange(&mut controller, "hello");

        let SubmitOutcome::Started(exchange) = outcome else {
            panic!("submit should start an exchange");
        };
        assert_eq!(exchange.prompt, "hello");
        assert_eq!(controller.input(), "");
        assert_eq!(controller.transcript().len(), 1);
    }

    #[::core::prelude::v1::test]
    fn blank_submit_is_ignored() {
        let mut controller = ChatController::default();
        controller.attach_session(Some(Arc::new(SilentSession) as Arc<dyn Session>));

        assert!(matches!(
            begin_exchange(&mut controller, "   "),
            SubmitOutcome::Ignored
        ));
        assert!(controller.is_empty());
    }
}
