//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Client secrets and login passwords never live in the TOML; they are read
//! from the credential file or the env store at flow time.

use bling_auth::{
    AUTHORIZE_ENDPOINT, BrowserKind, CredentialSource, EnvStore, LoginSelectors, RedirectWait,
    TOKEN_ENDPOINT,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub storage: StorageConfig,
    pub provider: ProviderConfig,
    pub browser: BrowserConfig,
}

/// Where client and login credentials come from
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// `client_id:...,\nclient_secret:...` file. When unset the client
    /// credentials are read from `env_file`.
    pub credentials_file: Option<PathBuf>,
    /// Dotenv store holding BLING_* settings; also the env persistence target
    pub env_file: PathBuf,
}

/// Text-file persistence target
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub text_path: PathBuf,
}

/// Bling OAuth endpoints
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub token_endpoint: String,
    pub authorize_endpoint: String,
}

/// WebDriver settings for the automated login
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub browser: BrowserKind,
    pub headless: bool,
    pub implicit_wait_secs: u64,
    pub redirect_poll_attempts: u32,
    pub redirect_poll_interval_ms: u64,
    pub selectors: LoginSelectors,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials_file: None,
            env_file: PathBuf::from(".env"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            text_path: PathBuf::from("credential/token.txt"),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token_endpoint: TOKEN_ENDPOINT.to_owned(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_owned(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_owned(),
            browser: BrowserKind::Chrome,
            headless: true,
            implicit_wait_secs: 10,
            redirect_poll_attempts: 20,
            redirect_poll_interval_ms: 500,
            selectors: LoginSelectors::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file at a path the user did not
    /// ask for explicitly falls back to defaults.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if !explicit && !path.exists() {
            let mut config = Config::default();
            config.apply_env();
            config.validate()?;
            return Ok(config);
        }
        Self::load(path)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    ///
    /// The flag reports whether the path was chosen explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from("bling-token.toml"), false)
    }

    pub fn credential_source(&self) -> CredentialSource {
        match &self.client.credentials_file {
            Some(path) => CredentialSource::File(path.clone()),
            None => CredentialSource::EnvStore(self.env_store()),
        }
    }

    pub fn env_store(&self) -> EnvStore {
        EnvStore::new(&self.client.env_file)
    }

    pub fn redirect_wait(&self) -> RedirectWait {
        RedirectWait {
            attempts: self.browser.redirect_poll_attempts,
            interval: Duration::from_millis(self.browser.redirect_poll_interval_ms),
        }
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
    }

    fn validate(&self) -> common::Result<()> {
        for (field, url) in [
            ("provider.token_endpoint", &self.provider.token_endpoint),
            ("provider.authorize_endpoint", &self.provider.authorize_endpoint),
            ("browser.webdriver_url", &self.browser.webdriver_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.browser.redirect_poll_attempts == 0 {
            return Err(common::Error::Config(
                "browser.redirect_poll_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}
