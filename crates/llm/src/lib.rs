//! Language-model session acquisition for the Duo chat widget.
//!
//! A host reports whether a model is available and creates sessions; the
//! [`SessionProvider`] turns that into one lazily created, shared session.

use std::sync::Arc;

mod config;
mod host;
mod rig_adapter;
mod session;

pub use config::{DEFAULT_IDLE_TIMEOUT, DEFAULT_OPENAI_MODEL, HostConfig};
pub use host::{
    Availability, BoxFuture, Capabilities, LanguageModelHost, PromptEvent, PromptStream,
    PromptStreamHandle, PromptWorker, Session, SessionError, SessionResult, make_prompt_stream,
};
pub use rig_adapter::{RIG_OPENAI_PROVIDER_ID, RigHost, RigSession};
pub use session::{SessionProvider, get_session, global_provider, install_provider};

pub fn create_host(mut config: HostConfig) -> SessionResult<Arc<dyn LanguageModelHost>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openai" | "rig-openai" => {
            config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
            Ok(Arc::new(RigHost::new(config)))
        }
        _ => Err(SessionError::UnsupportedProvider {
            stage: "create-host",
            provider_id: config.provider_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_is_rejected() {
        let error = create_host(HostConfig::new("llamafile", "key", ""))
            .err()
            .expect("unsupported");
        assert!(matches!(error, SessionError::UnsupportedProvider { .. }));
    }

    #[test]
    fn blank_provider_defaults_to_openai() {
        assert!(create_host(HostConfig::new("", "", "")).is_ok());
    }
}
