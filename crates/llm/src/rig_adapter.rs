use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{Mutex, mpsc, oneshot};

use super::config::HostConfig;
use super::host::{
    Availability, BoxFuture, Capabilities, CompletionsFailedSnafu, EmptyPromptSnafu,
    HttpClientSnafu, LanguageModelHost, MissingApiKeySnafu, PromptEvent, PromptStreamHandle,
    PromptWorker, Session, SessionError, SessionResult, make_prompt_stream,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;
type RigStreamItem = <RigStreamingResponse as futures::Stream>::Item;

/// OpenAI-compatible host backed by rig.
///
/// Reports `Availability::No` until an API key is configured.
pub struct RigHost {
    config: HostConfig,
}

impl RigHost {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    fn build_client(config: &HostConfig) -> SessionResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }
}

impl LanguageModelHost for RigHost {
    fn capabilities<'a>(&'a self) -> BoxFuture<'a, SessionResult<Capabilities>> {
        Box::pin(async move {
            let available = if self.config.has_api_key() {
                Availability::Readily
            } else {
                Availability::No
            };
            Ok(Capabilities::new(available))
        })
    }

    fn create<'a>(&'a self) -> BoxFuture<'a, SessionResult<Arc<dyn Session>>> {
        Box::pin(async move {
            ensure!(
                self.config.has_api_key(),
                MissingApiKeySnafu {
                    stage: "rig-host-create",
                    provider_id: self.config.provider_id.clone(),
                }
            );

            // Fail creation early on a malformed endpoint instead of on first prompt.
            Self::build_client(&self.config)?;

            tracing::debug!(
                provider_id = %self.config.provider_id,
                model_id = %self.config.model_id,
                "creating rig session"
            );
            Ok(Arc::new(RigSession::new(self.config.clone())) as Arc<dyn Session>)
        })
    }
}

/// A stateful session: completed turns are replayed as context on each prompt.
pub struct RigSession {
    config: HostConfig,
    history: Arc<Mutex<Vec<RigMessage>>>,
}

impl RigSession {
    fn new(config: HostConfig) -> Self {
        Self {
            config,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn open_stream(
        config: &HostConfig,
        context: Vec<RigMessage>,
        prompt: &str,
    ) -> SessionResult<RigStreamingResponse> {
        let client = RigHost::build_client(config)?;
        let model = client.completion_model(config.model_id.clone());

        let mut builder = model
            .completion_request(RigMessage::user(prompt.to_string()))
            .messages(context);

        if let Some(preamble) = &config.preamble {
            builder = builder.preamble(preamble.clone());
        }

        if let Some(temperature) = config.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = config.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    async fn next_item(
        stream: &mut RigStreamingResponse,
        idle_timeout: Option<Duration>,
    ) -> Result<Option<RigStreamItem>, tokio::time::error::Elapsed> {
        match idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next()).await,
            None => Ok(stream.next().await),
        }
    }

    fn text_delta<R>(item: StreamedAssistantContent<R>) -> Option<String>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) if !text.text.is_empty() => Some(text.text),
            // Reasoning and tool traffic never reaches the transcript.
            _ => None,
        }
    }

    fn emit_error_event(event_tx: &mpsc::UnboundedSender<PromptEvent>, error: SessionError) {
        let _ = event_tx.send(PromptEvent::Error(error.to_string()));
    }

    async fn run_stream_worker(
        config: HostConfig,
        history: Arc<Mutex<Vec<RigMessage>>>,
        prompt: String,
        event_tx: mpsc::UnboundedSender<PromptEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let context = history.lock().await.clone();
        let mut stream = match Self::open_stream(&config, context, &prompt).await {
            Ok(stream) => stream,
            Err(error) => {
                tracing::error!(
                    provider_id = %config.provider_id,
                    model_id = %config.model_id,
                    error = %error,
                    "failed to open prompt stream"
                );
                Self::emit_error_event(&event_tx, error);
                return;
            }
        };

        // Hosts deliver cumulative snapshots, so every chunk carries the whole reply so far.
        let mut response = String::new();
        let mut cancelled = false;
        let mut stream_failed = false;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    tracing::debug!(model_id = %config.model_id, "prompt stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = Self::next_item(&mut stream, config.idle_timeout) => {
                    match next_item {
                        Ok(Some(Ok(item))) => {
                            if let Some(delta) = Self::text_delta(item) {
                                response.push_str(&delta);
                                if event_tx.send(PromptEvent::Chunk(response.clone())).is_err() {
                                    return;
                                }
                            }
                        }
                        Ok(Some(Err(source))) => {
                            stream_failed = true;
                            tracing::warn!(error = %source, "prompt stream emitted an error chunk");
                            Self::emit_error_event(
                                &event_tx,
                                SessionError::CompletionsFailed {
                                    stage: "stream-chunk",
                                    source,
                                },
                            );
                            break;
                        }
                        Ok(None) => break,
                        Err(_) => {
                            stream_failed = true;
                            let seconds = config.idle_timeout.map(|limit| limit.as_secs()).unwrap_or_default();
                            tracing::warn!(seconds, "prompt stream went idle");
                            stream.cancel();
                            Self::emit_error_event(
                                &event_tx,
                                SessionError::IdleTimeout {
                                    stage: "stream-idle",
                                    seconds,
                                },
                            );
                            break;
                        }
                    }
                }
            }
        }

        if cancelled || stream_failed {
            return;
        }

        {
            let mut history = history.lock().await;
            history.push(RigMessage::user(prompt));
            history.push(RigMessage::assistant(response));
        }

        let _ = event_tx.send(PromptEvent::Done);
    }
}

impl Session for RigSession {
    fn prompt_streaming(&self, text: String) -> SessionResult<PromptStreamHandle> {
        ensure!(
            !text.trim().is_empty(),
            EmptyPromptSnafu {
                stage: "prompt-streaming",
            }
        );

        let (event_tx, stream, cancel_rx) = make_prompt_stream();
        let worker: PromptWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            self.history.clone(),
            text,
            event_tx,
            cancel_rx,
        ));

        Ok(PromptStreamHandle { stream, worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_without_api_key_reports_unavailable() {
        let host = RigHost::new(HostConfig::new(RIG_OPENAI_PROVIDER_ID, "", ""));

        let capabilities = host.capabilities().await.unwrap();
        assert_eq!(capabilities.available, Availability::No);

        let error = host.create().await.err().expect("missing key");
        assert!(matches!(error, SessionError::MissingApiKey { .. }));
    }

    #[tokio::test]
    async fn host_with_api_key_reports_ready() {
        let host = RigHost::new(HostConfig::new(RIG_OPENAI_PROVIDER_ID, "sk-test", ""));

        let capabilities = host.capabilities().await.unwrap();
        assert_eq!(capabilities.available, Availability::Readily);
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_before_any_request() {
        let session = RigSession::new(HostConfig::new(RIG_OPENAI_PROVIDER_ID, "sk-test", ""));

        let error = session
            .prompt_streaming("   ".to_string())
            .err()
            .expect("blank prompt");
        assert!(matches!(error, SessionError::EmptyPrompt { .. }));
        assert!(session.history.lock().await.is_empty());
    }
}
