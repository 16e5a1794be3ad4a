//! Bling API v3 OAuth credential lifecycle
//!
//! Obtains, refreshes, and stores access/refresh token pairs for a single
//! Bling application. Standalone library: the `bling-token` service is a thin
//! shell over [`flow::OAuthFlow`].
//!
//! Credential flow:
//! 1. `client::ClientCredentials::load()` reads the client id/secret
//! 2. `acquire::CodeAcquirer::acquire_code()` logs in through a browser and
//!    captures the authorization code
//! 3. `token::TokenExchanger::exchange()` trades the code (or a refresh
//!    token) for a `Credential` with an absolute expiration instant
//! 4. `persistence::PersistenceBackend::persist()` writes it to the text file
//!    and/or the env store

pub mod acquire;
pub mod browser;
pub mod client;
pub mod constants;
pub mod env_store;
pub mod error;
pub mod expiration;
pub mod flow;
pub mod persistence;
pub mod token;

pub use acquire::{CodeAcquirer, LoginSelectors, RedirectWait};
pub use browser::{BrowserKind, BrowserLauncher, BrowserSession, DriverError, WebDriverLauncher};
pub use client::{ClientCredentials, CredentialSource, LoginCredentials};
pub use constants::*;
pub use env_store::EnvStore;
pub use error::{Error, Result};
pub use expiration::{Clock, FixedClock, SystemClock, compute_expiration, is_expired};
pub use flow::{FlowOutcome, OAuthFlow, PersistTargets, PersistenceFailure};
pub use persistence::{
    EnvStoreBackend, PersistedRecord, PersistenceBackend, TextFileBackend, read_text,
};
pub use token::{AuthorizationGrant, Credential, TokenExchanger};
