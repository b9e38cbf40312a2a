//! Application object - settings, services, index cache and sessions

use crate::presenter::{SessionPresenter, SessionRegistry};
use crate::session::ChatSession;
use crate::{ConfigError, GeminiClient, Settings, StartupError};
use docchat_core::{EmbeddingService, GenerationService};
use docchat_index::{IndexArtifact, IndexCache, IndexError};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct DocChat {
    settings: Settings,
    embedder: Arc<dyn EmbeddingService>,
    generator: Arc<dyn GenerationService>,
    cache: IndexCache,
    sessions: SessionRegistry,
}

impl DocChat {
    /// Build the application with the Gemini client for both services
    pub fn new(settings: Settings) -> Result<Self, StartupError> {
        let client = Arc::new(GeminiClient::from_settings(&settings)?);
        Ok(Self::with_services(settings, client.clone(), client))
    }

    /// Build the application over any service implementations
    pub fn with_services(
        settings: Settings,
        embedder: Arc<dyn EmbeddingService>,
        generator: Arc<dyn GenerationService>,
    ) -> Self {
        let cache = IndexCache::new(settings.failure_policy);
        Self {
            settings,
            embedder,
            generator,
            cache,
            sessions: SessionRegistry::new(),
        }
    }

    /// Check the startup preconditions that do not need the network
    pub fn preflight(settings: &Settings) -> Result<(), ConfigError> {
        if settings.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        if !settings.corpus_root.is_dir() {
            return Err(ConfigError::CorpusNotFound(settings.corpus_root.clone()));
        }
        Ok(())
    }

    /// Preflight, then build the index so the first user does not wait
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<Arc<IndexArtifact>, StartupError> {
        Self::preflight(&self.settings)?;
        let index = self.index().await?;
        info!("Ready to chat about {}", self.settings.topic);
        Ok(index)
    }

    /// The shared index, built on first use
    pub async fn index(&self) -> Result<Arc<IndexArtifact>, IndexError> {
        let loader = self.settings.loader();
        let options = self.settings.build_options();
        let embedder = Arc::clone(&self.embedder);

        self.cache
            .get_or_build(|| async move {
                let root = loader.root().display().to_string();
                let documents = tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|e| IndexError::Io {
                        path: root,
                        message: e.to_string(),
                    })??;
                IndexArtifact::build(documents, embedder.as_ref(), &options).await
            })
            .await
    }

    /// A fresh session over the shared index
    pub async fn new_session(&self) -> Result<ChatSession, IndexError> {
        let index = self.index().await?;
        Ok(ChatSession::new(
            index,
            Arc::clone(&self.embedder),
            Arc::clone(&self.generator),
            self.settings.session_options(),
        ))
    }

    pub async fn new_presenter(&self) -> Result<SessionPresenter, IndexError> {
        Ok(SessionPresenter::new(self.new_session().await?))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }
}
