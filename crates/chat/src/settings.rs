use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use duo_llm::{DEFAULT_OPENAI_MODEL, HostConfig};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::controller::ChunkPolicy;

pub const DEFAULT_PROVIDER_ID: &str = "openai";
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_TITLE: &str = "GitLab Duo";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
pub const SETTINGS_DIRECTORY_NAME: &str = "duo";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "DUO_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeModeSetting {
    #[default]
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSettings {
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub preamble: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
    /// Seconds without a chunk before a reply is abandoned; 0 disables the limit.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default)]
    pub chunk_policy: ChunkPolicy,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub theme_mode: ThemeModeSetting,
    #[serde(default)]
    pub theme_name: String,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            provider_id: default_provider_id(),
            api_key: String::new(),
            endpoint: default_endpoint(),
            model: default_model(),
            preamble: String::new(),
            temperature: None,
            max_tokens: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            chunk_policy: ChunkPolicy::default(),
            title: default_title(),
            theme_mode: ThemeModeSetting::default(),
            theme_name: String::new(),
        }
    }
}

impl WidgetSettings {
    pub fn is_valid(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    pub fn to_host_config(&self) -> HostConfig {
        let mut config = HostConfig::new(&self.provider_id, &self.api_key, &self.endpoint)
            .with_model(&self.model)
            .with_preamble(&self.preamble)
            .with_idle_timeout(self.idle_timeout());

        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }

        config
    }

    /// Fills an empty key, model or endpoint from the `OPENAI_*` variables.
    pub fn with_environment_fallback(self) -> Self {
        self.with_fallback_from(|name| std::env::var(name).ok())
    }

    fn with_fallback_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if self.api_key.trim().is_empty()
            && let Some(api_key) = read("OPENAI_API_KEY")
        {
            self.api_key = api_key;
            if let Some(model) = read("OPENAI_MODEL") {
                self.model = model;
            }
            if let Some(endpoint) = read("OPENAI_BASE_URL") {
                self.endpoint = endpoint;
            }
        }

        self
    }

    pub fn normalized(mut self) -> Self {
        self.provider_id = non_blank_or(self.provider_id, default_provider_id);
        self.api_key = self.api_key.trim().to_string();
        self.endpoint = non_blank_or(self.endpoint, default_endpoint);
        self.model = non_blank_or(self.model, default_model);
        self.title = non_blank_or(self.title, default_title);
        self.theme_name = self.theme_name.trim().to_string();
        self
    }
}

pub struct SettingsStore {
    settings: Arc<WidgetSettings>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".duo"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(settings),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<WidgetSettings> {
        self.settings.clone()
    }

    /// Writes a default settings file when none exists yet, so there is a file to edit.
    ///
    /// Returns whether a file was written. Values from the environment are never written out.
    pub fn ensure_file(&self) -> Result<bool, SettingsError> {
        if self.config_path.exists() {
            return Ok(false);
        }

        self.persist(&WidgetSettings::default())?;
        Ok(true)
    }

    fn load_from_disk(path: &Path) -> WidgetSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        let figment = Figment::from(Serialized::defaults(WidgetSettings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX));

        match figment.extract::<WidgetSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                WidgetSettings::default()
            }
        }
    }

    fn persist(&self, settings: &WidgetSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeSettingsSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeSettings {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn non_blank_or(value: String, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_string()
    }
}

fn default_provider_id() -> String {
    DEFAULT_PROVIDER_ID.to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_title() -> String {
    DEFAULT_TITLE.to_string()
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));

        let settings = store.settings();
        assert_eq!(settings.title, DEFAULT_TITLE);
        assert_eq!(settings.chunk_policy, ChunkPolicy::Replace);
        assert_eq!(settings.idle_timeout(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "model": " gpt-4o ", "chunk_policy": "accumulate", "theme_mode": "dark", "idle_timeout_secs": 0 }"#,
        )
        .unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.chunk_policy, ChunkPolicy::Accumulate);
        assert_eq!(settings.theme_mode, ThemeModeSetting::Dark);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.idle_timeout(), None);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "chunk_policy": "sideways" }"#).unwrap();

        let settings = SettingsStore::new(path).settings();
        assert_eq!(settings.chunk_policy, ChunkPolicy::Replace);
    }

    #[test]
    fn first_launch_writes_default_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = SettingsStore::new(path.clone());

        assert!(store.ensure_file().unwrap());
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = SettingsStore::new(path.clone()).settings();
        assert_eq!(*reloaded, WidgetSettings::default());
    }

    #[test]
    fn existing_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "api_key": "sk-file" }"#).unwrap();

        let store = SettingsStore::new(path.clone());
        assert!(!store.ensure_file().unwrap());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, r#"{ "api_key": "sk-file" }"#);
        assert!(store.settings().is_valid());
    }

    #[test]
    fn environment_fallback_only_fills_missing_key() {
        let lookup = |name: &str| match name {
            "OPENAI_API_KEY" => Some("sk-env".to_string()),
            "OPENAI_MODEL" => Some("gpt-4.1".to_string()),
            _ => None,
        };

        let filled = WidgetSettings::default().with_fallback_from(lookup);
        assert_eq!(filled.api_key, "sk-env");
        assert_eq!(filled.model, "gpt-4.1");
        assert_eq!(filled.endpoint, DEFAULT_ENDPOINT);

        let configured = WidgetSettings {
            api_key: "sk-file".to_string(),
            ..WidgetSettings::default()
        }
        .with_fallback_from(lookup);
        assert_eq!(configured.api_key, "sk-file");
        assert_eq!(configured.model, DEFAULT_OPENAI_MODEL);
    }

    #[test]
    fn host_config_carries_sampling_settings() {
        let settings = WidgetSettings {
            api_key: "sk-test".to_string(),
            preamble: "Be brief.".to_string(),
            temperature: Some(0.2),
            max_tokens: Some(512),
            ..WidgetSettings::default()
        };

        let config = settings.to_host_config();
        assert_eq!(config.model_id, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.preamble.as_deref(), Some("Be brief."));
        assert_eq!(config.temperature, Some(0.2));
        assert_eq!(config.max_tokens, Some(512));
    }
}
