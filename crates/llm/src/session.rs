use std::sync::{Arc, OnceLock};

use tokio::sync::OnceCell;

use crate::host::{LanguageModelHost, Session, SessionError, SessionResult};

/// Lazily creates and memoizes a single session from a host.
///
/// Concurrent first calls share one pending initialization. A host reporting
/// `Availability::No` is not cached, so the next call checks again.
pub struct SessionProvider {
    host: Arc<dyn LanguageModelHost>,
    session: OnceCell<Arc<dyn Session>>,
}

impl SessionProvider {
    pub fn new(host: Arc<dyn LanguageModelHost>) -> Self {
        Self {
            host,
            session: OnceCell::new(),
        }
    }

    /// Returns the stored session, creating it on first use.
    ///
    /// `Ok(None)` means the host declared no model support.
    pub async fn get_session(&self) -> SessionResult<Option<Arc<dyn Session>>> {
        match self.session.get_or_try_init(|| self.initialize()).await {
            Ok(session) => Ok(Some(session.clone())),
            Err(SessionError::Unavailable { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.initialized()
    }

    async fn initialize(&self) -> SessionResult<Arc<dyn Session>> {
        let capabilities = self.host.capabilities().await?;
        tracing::info!(available = %capabilities.available, "language model capabilities");

        if !capabilities.available.allows_session() {
            return Err(SessionError::Unavailable {
                stage: "session-provider-capabilities",
            });
        }

        let session = self.host.create().await?;
        tracing::info!("language model session created");
        Ok(session)
    }
}

static SESSION_PROVIDER: OnceLock<Arc<SessionProvider>> = OnceLock::new();

/// Installs the process-wide provider. The first install wins; a later one is
/// handed back unchanged.
pub fn install_provider(provider: SessionProvider) -> Result<(), Arc<SessionProvider>> {
    SESSION_PROVIDER.set(Arc::new(provider))
}

pub fn global_provider() -> Option<Arc<SessionProvider>> {
    SESSION_PROVIDER.get().cloned()
}

/// Resolves the process-wide session, or `Ok(None)` when no provider is installed.
pub async fn get_session() -> SessionResult<Option<Arc<dyn Session>>> {
    match global_provider() {
        Some(provider) => provider.get_session().await,
        None => {
            tracing::warn!("no session provider installed");
            Ok(None)
        }
    }
}
