use std::time::Duration;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Connection and sampling settings for a model host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub provider_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub model_id: String,
    pub preamble: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub idle_timeout: Option<Duration>,
}

impl HostConfig {
    pub fn new(
        provider_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            provider_id: provider_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            endpoint: endpoint.into().trim().to_string(),
            model_id: DEFAULT_OPENAI_MODEL.to_string(),
            preamble: None,
            temperature: None,
            max_tokens: None,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into().trim().to_string();
        if !model_id.is_empty() {
            self.model_id = model_id;
        }
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        let preamble = preamble.into();
        self.preamble = if preamble.trim().is_empty() {
            None
        } else {
            Some(preamble)
        };
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_trims_and_ignores_blank_values() {
        let config = HostConfig::new(" openai ", " sk-test ", "")
            .with_model("   ")
            .with_preamble("  ");

        assert_eq!(config.provider_id, "openai");
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model_id, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.preamble, None);
        assert_eq!(config.idle_timeout, Some(DEFAULT_IDLE_TIMEOUT));
        assert!(config.has_api_key());
    }
}
