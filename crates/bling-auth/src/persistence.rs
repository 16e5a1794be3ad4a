//! Durable storage for issued credentials
//!
//! Two backends share one record layout: a flat `KEY=value` text file that
//! is rewritten in full on every save, and the dotenv env store where each
//! key is upserted on its own. Both store the derived expiration instant
//! next to the raw `expires_in`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::constants::{
    KEY_ACCESS_TOKEN, KEY_EXPIRATION, KEY_EXPIRES_IN, KEY_REFRESH_TOKEN, KEY_SCOPE,
};
use crate::env_store::EnvStore;
use crate::error::{Error, Result};
use crate::token::Credential;

/// The persisted view of a [`Credential`], every field as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    pub access_token: String,
    pub expires_in: String,
    /// RFC 3339 expiration instant
    pub expiration: String,
    pub refresh_token: String,
    pub scope: String,
}

impl PersistedRecord {
    pub fn from_credential(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token.clone(),
            expires_in: credential.expires_in.to_string(),
            expiration: credential.expiration_instant.to_rfc3339(),
            refresh_token: credential.refresh_token.clone(),
            scope: credential.scope.clone(),
        }
    }

    /// Key/value pairs in file order.
    pub fn entries(&self) -> [(&'static str, &str); 5] {
        [
            (KEY_ACCESS_TOKEN, self.access_token.as_str()),
            (KEY_EXPIRES_IN, self.expires_in.as_str()),
            (KEY_EXPIRATION, self.expiration.as_str()),
            (KEY_REFRESH_TOKEN, self.refresh_token.as_str()),
            (KEY_SCOPE, self.scope.as_str()),
        ]
    }

    pub fn to_text(&self) -> String {
        self.entries()
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect()
    }

    /// Parse the text file layout. Unknown keys are ignored; each of the
    /// five record keys must be present.
    pub fn parse_text(contents: &str) -> Result<Self> {
        let mut record = Partial::default();
        for line in contents.lines() {
            if let Some((key, value)) = line.split_once('=') {
                record.set(key.trim(), value.to_owned());
            }
        }
        record.finish()
    }

    /// Read the record back from the env store.
    pub async fn from_env_store(store: &EnvStore) -> Result<Self> {
        let mut record = Partial::default();
        for key in RECORD_KEYS {
            if let Some(value) = store.get(key).await? {
                record.set(key, value);
            }
        }
        record.finish()
    }
}

const RECORD_KEYS: [&str; 5] = [
    KEY_ACCESS_TOKEN,
    KEY_EXPIRES_IN,
    KEY_EXPIRATION,
    KEY_REFRESH_TOKEN,
    KEY_SCOPE,
];

#[derive(Default)]
struct Partial {
    access_token: Option<String>,
    expires_in: Option<String>,
    expiration: Option<String>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl Partial {
    fn set(&mut self, key: &str, value: String) {
        let slot = match key {
            KEY_ACCESS_TOKEN => &mut self.access_token,
            KEY_EXPIRES_IN => &mut self.expires_in,
            KEY_EXPIRATION => &mut self.expiration,
            KEY_REFRESH_TOKEN => &mut self.refresh_token,
            KEY_SCOPE => &mut self.scope,
            _ => return,
        };
        *slot = Some(value);
    }

    fn finish(self) -> Result<PersistedRecord> {
        fn field(value: Option<String>, key: &str) -> Result<String> {
            value.ok_or_else(|| Error::Persistence(format!("stored credential is missing {key}")))
        }
        Ok(PersistedRecord {
            access_token: field(self.access_token, KEY_ACCESS_TOKEN)?,
            expires_in: field(self.expires_in, KEY_EXPIRES_IN)?,
            expiration: field(self.expiration, KEY_EXPIRATION)?,
            refresh_token: field(self.refresh_token, KEY_REFRESH_TOKEN)?,
            scope: field(self.scope, KEY_SCOPE)?,
        })
    }
}

/// A durable home for credentials.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Short name used in logs and failure reports.
    fn name(&self) -> &'static str;

    async fn persist(&self, credential: &Credential) -> Result<()>;
}

/// Flat `KEY=value` file, overwritten on every save.
#[derive(Debug, Clone)]
pub struct TextFileBackend {
    path: PathBuf,
}

impl TextFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PersistenceBackend for TextFileBackend {
    fn name(&self) -> &'static str {
        "text"
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Persistence(format!("creating credential directory {}: {e}", dir.display()))
            })?;
        }

        let record = PersistedRecord::from_credential(credential);
        write_atomic(&self.path, record.to_text().as_bytes()).await?;
        info!(path = %self.path.display(), "saved credential to text file");
        Ok(())
    }
}

/// Per-key upserts into the dotenv env store.
#[derive(Debug, Clone)]
pub struct EnvStoreBackend {
    store: EnvStore,
}

impl EnvStoreBackend {
    pub fn new(store: EnvStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistenceBackend for EnvStoreBackend {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn persist(&self, credential: &Credential) -> Result<()> {
        let record = PersistedRecord::from_credential(credential);
        for (key, value) in record.entries() {
            self.store.upsert(key, value).await?;
        }
        info!(path = %self.store.path().display(), "saved credential to env store");
        Ok(())
    }
}

/// Read a credential previously written by [`TextFileBackend`].
pub async fn read_text(path: &Path) -> Result<PersistedRecord> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Persistence(format!("reading {}: {e}", path.display())))?;
    PersistedRecord::parse_text(&contents)
}

/// Replace `path` with `contents` via a temp file in the same directory and a
/// rename, so readers never observe a half-written file. The file is 0600 on
/// unix since it holds tokens.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Persistence(format!("{} has no file name", path.display())))?;

    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| Error::Persistence(format!("writing temp file {}: {e}", tmp_path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Persistence(format!("setting file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Persistence(format!("replacing {}: {e}", path.display())))?;

    debug!(path = %path.display(), "persisted file");
    Ok(())
}
