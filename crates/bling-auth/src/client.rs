//! Client application credentials and the token endpoint auth header
//!
//! The client id/secret pair comes either from a small text file in the
//! `client_id:...,\nclient_secret:...` layout or from the env store. Login
//! credentials for the automated browser flow always come from the env store.

use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::Secret;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use crate::constants::{
    API_VERSION, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_LOGIN_PASSWORD, ENV_LOGIN_USERNAME,
};
use crate::env_store::EnvStore;
use crate::error::{Error, Result};

/// Where the client id/secret pair is read from.
#[derive(Debug, Clone)]
pub enum CredentialSource {
    File(PathBuf),
    EnvStore(EnvStore),
}

/// Bling application registration.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl ClientCredentials {
    pub async fn load(source: &CredentialSource) -> Result<Self> {
        let credentials = match source {
            CredentialSource::File(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    Error::Configuration(format!(
                        "reading client credential file {}: {e}",
                        path.display()
                    ))
                })?;
                parse_credential_file(&contents)?
            }
            CredentialSource::EnvStore(store) => Self {
                client_id: require(store, ENV_CLIENT_ID).await?,
                client_secret: Secret::new(require(store, ENV_CLIENT_SECRET).await?),
            },
        };
        debug!(client_id = %credentials.client_id, "loaded client credentials");
        Ok(credentials)
    }

    /// `Accept` and `Basic` authorization headers for the token endpoint.
    pub fn auth_header(&self) -> Result<HeaderMap> {
        let pair = format!("{}:{}", self.client_id, self.client_secret.expose());
        let mut authorization = HeaderValue::from_str(&format!("Basic {}", STANDARD.encode(pair)))
            .map_err(|e| Error::Configuration(format!("invalid authorization header: {e}")))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(API_VERSION));
        headers.insert(AUTHORIZATION, authorization);
        Ok(headers)
    }
}

/// Username and password for the Bling login page.
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: Secret<String>,
}

impl LoginCredentials {
    pub async fn load(store: &EnvStore) -> Result<Self> {
        Ok(Self {
            username: require(store, ENV_LOGIN_USERNAME).await?,
            password: Secret::new(require(store, ENV_LOGIN_PASSWORD).await?),
        })
    }
}

/// Parse the two-entry credential file:
///
/// ```text
/// client_id:<id>,
/// client_secret:<secret>
/// ```
fn parse_credential_file(contents: &str) -> Result<ClientCredentials> {
    let entries: Vec<&str> = contents.split(',').collect();
    let [id_entry, secret_entry] = entries.as_slice() else {
        return Err(Error::Configuration(format!(
            "client credential file must hold exactly two comma-separated entries, found {}",
            entries.len()
        )));
    };

    let client_id = labelled_value(id_entry, "client_id")?;
    let client_secret = labelled_value(secret_entry, "client_secret")?;
    Ok(ClientCredentials {
        client_id,
        client_secret: Secret::new(client_secret),
    })
}

fn labelled_value(entry: &str, label: &str) -> Result<String> {
    let value = entry
        .trim()
        .strip_prefix(label)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or_else(|| {
            Error::Configuration(format!("client credential file entry is missing `{label}:`"))
        })?
        .trim();
    if value.is_empty() {
        return Err(Error::Configuration(format!(
            "client credential file has an empty `{label}`"
        )));
    }
    Ok(value.to_owned())
}

async fn require(store: &EnvStore, key: &str) -> Result<String> {
    match store.get(key).await? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Configuration(format!(
            "{key} not set in {}",
            store.path().display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(id: &str, secret: &str) -> ClientCredentials {
        ClientCredentials {
            client_id: id.into(),
            client_secret: Secret::new(secret.to_owned()),
        }
    }

    #[test]
    fn parses_two_entry_file() {
        let parsed = parse_credential_file("client_id:abc123,\nclient_secret:def456").unwrap();
        assert_eq!(parsed.client_id, "abc123");
        assert_eq!(parsed.client_secret.expose(), "def456");
    }

    #[test]
    fn tolerates_crlf_and_trailing_newline() {
        let parsed = parse_credential_file("client_id:abc123,\r\nclient_secret:def456\r\n").unwrap();
        assert_eq!(parsed.client_id, "abc123");
        assert_eq!(parsed.client_secret.expose(), "def456");
    }

    #[test]
    fn rejects_wrong_entry_count() {
        for contents in [
            "client_id:abc123",
            "client_id:a,\nclient_secret:b,\nextra:c",
            "",
        ] {
            let err = parse_credential_file(contents).unwrap_err();
            assert!(
                matches!(err, Error::Configuration(_)),
                "{contents:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_missing_labels() {
        let err = parse_credential_file("abc123,\nclient_secret:def456").unwrap_err();
        assert!(err.to_string().contains("client_id"), "got: {err}");

        let err = parse_credential_file("client_id:abc123,\nsecret:def456").unwrap_err();
        assert!(err.to_string().contains("client_secret"), "got: {err}");
    }

    #[tokio::test]
    async fn load_from_missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = CredentialSource::File(dir.path().join("credential.txt"));
        let err = ClientCredentials::load(&source).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.txt");
        std::fs::write(&path, "client_id:abc123,\nclient_secret:def456").unwrap();

        let loaded = ClientCredentials::load(&CredentialSource::File(path))
            .await
            .unwrap();
        assert_eq!(loaded.client_id, "abc123");
    }

    #[tokio::test]
    async fn load_from_env_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "BLING_CLIENT_ID=abc123\nBLING_CLIENT_SECRET=def456\n").unwrap();

        let source = CredentialSource::EnvStore(EnvStore::new(&path));
        let loaded = ClientCredentials::load(&source).await.unwrap();
        assert_eq!(loaded.client_id, "abc123");
        assert_eq!(loaded.client_secret.expose(), "def456");
    }

    #[tokio::test]
    async fn env_store_missing_secret_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "BLING_CLIENT_ID=abc123\nBLING_CLIENT_SECRET=\n").unwrap();

        let source = CredentialSource::EnvStore(EnvStore::new(&path));
        let err = ClientCredentials::load(&source).await.unwrap_err();
        assert!(err.to_string().contains("BLING_CLIENT_SECRET"), "got: {err}");
    }

    #[tokio::test]
    async fn login_credentials_from_env_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "BLING_USUARIO=loja\nBLING_SENHA_USUARIO='p@ss w0rd'\n").unwrap();

        let login = LoginCredentials::load(&EnvStore::new(&path)).await.unwrap();
        assert_eq!(login.username, "loja");
        assert_eq!(login.password.expose(), "p@ss w0rd");

        let err = LoginCredentials::load(&EnvStore::new(dir.path().join("missing.env")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("BLING_USUARIO"), "got: {err}");
    }

    #[test]
    fn auth_header_is_basic_base64_of_id_and_secret() {
        let headers = credentials("abc", "123").auth_header().unwrap();
        assert_eq!(headers[ACCEPT], "1.0");
        // base64("abc:123")
        assert_eq!(headers[AUTHORIZATION], "Basic YWJjOjEyMw==");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }
}
