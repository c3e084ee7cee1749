use std::path::PathBuf;

use duo_chat::{ThemeModeSetting, WidgetSettings};
use gpui::{App, SharedString, Window};
use gpui_component::{Theme, ThemeMode, ThemeRegistry};

pub fn default_themes_path() -> PathBuf {
    PathBuf::from("./themes")
}

pub fn theme_mode(setting: ThemeModeSetting) -> ThemeMode {
    match setting {
        ThemeModeSetting::Light => ThemeMode::Light,
        ThemeModeSetting::Dark => ThemeMode::Dark,
    }
}

/// Applies the named theme if the registry has it, otherwise only the light/dark mode.
pub fn apply_theme(settings: &WidgetSettings, window: Option<&mut Window>, cx: &mut App) {
    let theme_name = SharedString::from(settings.theme_name.clone());
    if !theme_name.is_empty()
        && let Some(theme_config) = ThemeRegistry::global(cx).themes().get(&theme_name).cloned()
    {
        let mode = theme_config.mode;
        let theme = Theme::global_mut(cx);
        if mode.is_dark() {
            theme.dark_theme = theme_config;
        } else {
            theme.light_theme = theme_config;
        }
        Theme::change(mode, window, cx);
        return;
    }

    Theme::change(theme_mode(settings.theme_mode), window, cx);
}
