use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{ClientConfig, ConfigError};
use crate::credentials::{CredentialHandle, CredentialStore, FileCredentialStore};
use crate::journal::JournalStore;
use crate::models::{
    Identity, JournalEntry, JournalEntryDraft, JournalEntryPatch, StrategicPlan, TraitSnapshot,
    TraitVector, UserCreate,
};
use crate::plans::{PlanWorkflow, WorkflowError};
use crate::session::{SessionError, SessionManager, SessionState};
use crate::store::{Page, StoreError};
use crate::traits::TraitsClient;
use crate::transport::{HttpBackend, ReqwestBackend, Transport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not logged in")]
    NotAuthenticated,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    pub fn display_message(&self) -> String {
        match self {
            ClientError::NotAuthenticated => "Please log in first".to_string(),
            ClientError::Config(e) => e.to_string(),
            ClientError::Session(e) => e.display_message(),
            ClientError::Store(e) => e.display_message(),
            ClientError::Workflow(e) => e.display_message(),
            ClientError::Transport(e) => e.display_message(),
        }
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            ClientError::Session(SessionError::Transport(e)) | ClientError::Transport(e) => Some(e),
            ClientError::Store(e) => e.transport(),
            ClientError::Workflow(e) => e.transport(),
            _ => None,
        }
    }
}

/// Journaling client: one session plus the stores that depend on it.
///
/// Store and workflow operations require an authenticated session. A 401 from
/// any of them ends the session and empties the local mirrors.
pub struct JournalClient {
    config: ClientConfig,
    transport: Transport,
    session: SessionManager,
    journal: JournalStore,
    plans: PlanWorkflow,
    traits: TraitsClient,
}

impl JournalClient {
    /// Client talking to the configured backend over HTTP, with the
    /// credential persisted at `storage.credential_path`.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let backend = ReqwestBackend::new(
            &config.api.base_url,
            Duration::from_secs(config.api.timeout_secs),
        )?;
        let store = FileCredentialStore::new(config.storage.credential_path.clone());
        Self::with_backend(config, Arc::new(backend), Arc::new(store))
    }

    pub fn with_backend(
        config: ClientConfig,
        backend: Arc<dyn HttpBackend>,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, ClientError> {
        let transport = Transport::new(backend, CredentialHandle::new());
        let session = SessionManager::new(transport.clone(), store)?;

        info!(
            base_url = %config.api.base_url,
            restoring = session.is_loading(),
            "journal client initialized"
        );

        Ok(Self {
            journal: JournalStore::new(transport.clone()),
            plans: PlanWorkflow::new(transport.clone()),
            traits: TraitsClient::new(transport.clone()),
            config,
            transport,
            session,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.identity()
    }

    pub fn journal(&self) -> &JournalStore {
        &self.journal
    }

    pub fn plans(&self) -> &PlanWorkflow {
        &self.plans
    }

    pub async fn restore(&mut self) -> SessionState {
        self.session.restore().await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<Identity, ClientError> {
        let identity = self.session.login(username, password).await?;
        self.reset_mirrors();
        Ok(identity)
    }

    pub async fn register(&mut self, user: &UserCreate) -> Result<Identity, ClientError> {
        let identity = self.session.register(user).await?;
        self.reset_mirrors();
        Ok(identity)
    }

    pub fn logout(&mut self) {
        self.session.logout();
        self.reset_mirrors();
    }

    pub async fn list_entries(&mut self, page: Option<Page>) -> Result<&[JournalEntry], ClientError> {
        self.require_auth()?;
        let page = page.unwrap_or_else(|| Page::first(self.config.paging.journal_page_size));
        let outcome = self.journal.list(page).await.map(|_| ());
        self.observe(outcome)?;
        Ok(self.journal.items())
    }

    pub async fn fetch_entry(&mut self, id: &str) -> Result<JournalEntry, ClientError> {
        self.require_auth()?;
        let outcome = self.journal.fetch(id).await;
        self.observe(outcome)
    }

    pub async fn create_entry(&mut self, draft: &JournalEntryDraft) -> Result<JournalEntry, ClientError> {
        self.require_auth()?;
        let outcome = self.journal.create(draft).await;
        self.observe(outcome)
    }

    pub async fn update_entry(
        &mut self,
        id: &str,
        patch: &JournalEntryPatch,
    ) -> Result<JournalEntry, ClientError> {
        self.require_auth()?;
        let outcome = self.journal.update(id, patch).await;
        self.observe(outcome)
    }

    pub async fn delete_entry(&mut self, id: &str) -> Result<(), ClientError> {
        self.require_auth()?;
        let outcome = self.journal.delete(id).await;
        self.observe(outcome)
    }

    /// Local search over the mirrored entries; no request is sent.
    pub fn search_entries(&self, text: &str) -> Vec<&JournalEntry> {
        self.journal.search(text)
    }

    pub async fn traits(&mut self) -> Result<TraitVector, ClientError> {
        self.require_auth()?;
        let outcome = self.traits.current().await;
        self.observe(outcome)
    }

    pub async fn trait_history(&mut self) -> Result<Vec<TraitSnapshot>, ClientError> {
        self.require_auth()?;
        let outcome = self.traits.history().await;
        self.observe(outcome)
    }

    pub async fn generate_plan(&mut self) -> Result<StrategicPlan, ClientError> {
        self.require_auth()?;
        let outcome = self.plans.generate().await;
        self.observe(outcome)
    }

    pub async fn plan_history(&mut self, page: Option<Page>) -> Result<Vec<StrategicPlan>, ClientError> {
        self.require_auth()?;
        let page = page.unwrap_or_else(|| Page::first(self.config.paging.plan_page_size));
        let outcome = self.plans.load_history(page).await;
        self.observe(outcome)
    }

    pub fn select_plan(&self, id: &str) -> Option<StrategicPlan> {
        self.plans.select(id)
    }

    fn require_auth(&self) -> Result<(), ClientError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(ClientError::NotAuthenticated)
        }
    }

    fn observe<T, E: Into<ClientError>>(&mut self, outcome: Result<T, E>) -> Result<T, ClientError> {
        outcome.map_err(|e| {
            let e = e.into();
            if let Some(transport) = e.transport() {
                if self.session.handle_rejection(transport) {
                    warn!("session rejected by backend, local state cleared");
                    self.reset_mirrors();
                }
            }
            e
        })
    }

    fn reset_mirrors(&mut self) {
        self.journal = JournalStore::new(self.transport.clone());
        self.plans = PlanWorkflow::new(self.transport.clone());
    }
}
