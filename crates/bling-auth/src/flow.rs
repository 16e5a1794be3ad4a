//! The two public credential flows
//!
//! `obtain_initial_token`: client credentials -> browser login -> code
//! exchange -> persistence. `refresh_token`: client credentials -> refresh
//! exchange -> persistence. Each call loads client credentials and builds its
//! header fresh; nothing is cached between calls.

use tracing::{info, warn};

use crate::acquire::CodeAcquirer;
use crate::browser::BrowserLauncher;
use crate::client::{ClientCredentials, CredentialSource, LoginCredentials};
use crate::env_store::EnvStore;
use crate::error::{Error, Result};
use crate::persistence::{EnvStoreBackend, PersistenceBackend, TextFileBackend};
use crate::token::{AuthorizationGrant, Credential, TokenExchanger};

/// Which stores a flow writes to. The flags are independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistTargets {
    pub text: bool,
    pub env: bool,
}

/// A store that failed to record the credential.
#[derive(Debug)]
pub struct PersistenceFailure {
    pub backend: &'static str,
    pub error: Error,
}

/// Result of a successful exchange. The credential is returned even when
/// some stores could not be written.
#[derive(Debug)]
pub struct FlowOutcome {
    pub credential: Credential,
    pub persistence_failures: Vec<PersistenceFailure>,
}

impl FlowOutcome {
    pub fn fully_persisted(&self) -> bool {
        self.persistence_failures.is_empty()
    }
}

pub struct OAuthFlow<L> {
    source: CredentialSource,
    env_store: EnvStore,
    exchanger: TokenExchanger,
    acquirer: CodeAcquirer<L>,
    text_backend: TextFileBackend,
    env_backend: EnvStoreBackend,
}

impl<L: BrowserLauncher> OAuthFlow<L> {
    /// `env_store` provides the login credentials and receives env-store
    /// persistence; `text_backend` receives text persistence.
    pub fn new(
        source: CredentialSource,
        env_store: EnvStore,
        exchanger: TokenExchanger,
        acquirer: CodeAcquirer<L>,
        text_backend: TextFileBackend,
    ) -> Self {
        Self {
            source,
            env_backend: EnvStoreBackend::new(env_store.clone()),
            env_store,
            exchanger,
            acquirer,
            text_backend,
        }
    }

    /// First authorization: log in through the browser and exchange the code.
    pub async fn obtain_initial_token(&self, targets: PersistTargets) -> Result<FlowOutcome> {
        let client = ClientCredentials::load(&self.source).await?;
        let headers = client.auth_header()?;
        let login = LoginCredentials::load(&self.env_store).await?;

        let code = self.acquirer.acquire_code(&client.client_id, &login).await?;
        let credential = self
            .exchanger
            .exchange(&AuthorizationGrant::AuthorizationCode { code }, &headers)
            .await?;

        info!(client_id = %client.client_id, "initial authorization complete");
        Ok(self.persist(credential, targets).await)
    }

    /// Trade a refresh token for a new credential.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        targets: PersistTargets,
    ) -> Result<FlowOutcome> {
        let client = ClientCredentials::load(&self.source).await?;
        let headers = client.auth_header()?;

        let grant = AuthorizationGrant::RefreshGrant {
            refresh_token: refresh_token.to_owned(),
        };
        let credential = self.exchanger.exchange(&grant, &headers).await?;

        info!(client_id = %client.client_id, "token refreshed");
        Ok(self.persist(credential, targets).await)
    }

    pub fn env_store(&self) -> &EnvStore {
        &self.env_store
    }

    pub fn text_backend(&self) -> &TextFileBackend {
        &self.text_backend
    }

    async fn persist(&self, credential: Credential, targets: PersistTargets) -> FlowOutcome {
        let mut backends: Vec<&dyn PersistenceBackend> = Vec::with_capacity(2);
        if targets.text {
            backends.push(&self.text_backend);
        }
        if targets.env {
            backends.push(&self.env_backend);
        }

        let mut persistence_failures = Vec::new();
        for backend in backends {
            if let Err(error) = backend.persist(&credential).await {
                warn!(backend = backend.name(), error = %error, "failed to persist credential");
                persistence_failures.push(PersistenceFailure {
                    backend: backend.name(),
                    error,
                });
            }
        }

        FlowOutcome {
            credential,
            persistence_failures,
        }
    }
}
