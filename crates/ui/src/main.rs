use std::sync::Arc;

use duo::theme::{apply_theme, default_themes_path};
use duo::{ChatWidget, Quit, ToggleChat};
use duo_chat::{SettingsStore, WidgetSettings};
use duo_llm::{SessionProvider, create_host, install_provider};
use gpui::*;
use gpui_component::{Root, ThemeRegistry};
use tracing_subscriber::EnvFilter;

#[cfg(target_os = "macos")]
const TOGGLE_CHAT_KEY: &str = "cmd-/";
#[cfg(not(target_os = "macos"))]
const TOGGLE_CHAT_KEY: &str = "ctrl-/";

#[cfg(target_os = "macos")]
const QUIT_KEY: &str = "cmd-q";
#[cfg(not(target_os = "macos"))]
const QUIT_KEY: &str = "ctrl-q";

/// Installs the process-wide session provider. Failure leaves the widget without a model.
fn install_session_provider(settings: &WidgetSettings) {
    match create_host(settings.to_host_config()) {
        Ok(host) => {
            if install_provider(SessionProvider::new(host)).is_err() {
                tracing::warn!("session provider already installed");
            }
        }
        Err(error) => {
            tracing::error!(%error, "language model host unavailable; chat submissions are disabled");
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings_store = SettingsStore::load();
    if let Err(error) = settings_store.ensure_file() {
        tracing::warn!(
            %error,
            path = ?settings_store.config_path(),
            "could not write default settings file"
        );
    }
    let settings = Arc::new(
        settings_store
            .settings()
            .as_ref()
            .clone()
            .with_environment_fallback(),
    );
    install_session_provider(&settings);

    let app = Application::new().with_assets(gpui_component_assets::Assets);

    app.run(move |cx| {
        gpui_tokio_bridge::init(cx);
        gpui_component::init(cx);

        let theme_settings = settings.clone();
        if let Err(err) = ThemeRegistry::watch_dir(default_themes_path(), cx, move |cx| {
            apply_theme(&theme_settings, None, cx);
        }) {
            tracing::warn!(
                "Failed to watch themes directory: {}. Using default themes.",
                err
            );
            apply_theme(&settings, None, cx);
        }

        cx.on_action(|_: &Quit, cx| {
            cx.quit();
        });

        cx.bind_keys([
            KeyBinding::new(QUIT_KEY, Quit, None),
            KeyBinding::new(TOGGLE_CHAT_KEY, ToggleChat, None),
        ]);

        let title = SharedString::from(settings.title.clone());
        let chunk_policy = settings.chunk_policy;

        cx.spawn(async move |cx| {
            cx.update(|cx| {
                let options = WindowOptions {
                    window_bounds: Some(WindowBounds::Windowed(Bounds::centered(
                        None,
                        size(px(960.), px(720.)),
                        cx,
                    ))),
                    titlebar: Some(TitlebarOptions {
                        title: Some(title.clone()),
                        ..Default::default()
                    }),
                    ..Default::default()
                };

                let opened = cx.open_window(options, |window, cx| {
                    let widget =
                        cx.new(|cx| ChatWidget::new(title.clone(), chunk_policy, window, cx));

                    let toggled = widget.clone();
                    cx.on_action(move |_: &ToggleChat, cx| {
                        toggled.update(cx, |widget, cx| widget.toggle(cx));
                    });

                    cx.new(|cx| Root::new(widget, window, cx))
                });

                if let Err(error) = opened {
                    tracing::error!(%error, "failed to open main window");
                    cx.quit();
                    return;
                }

                cx.activate(true);
            })
        })
        .detach();
    });
}
