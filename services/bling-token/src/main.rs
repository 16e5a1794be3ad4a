//! Bling OAuth token tool
//!
//! Single-binary front end for `bling-auth`:
//! 1. `authorize` logs in through a WebDriver-controlled browser, exchanges
//!    the authorization code, and stores the token pair
//! 2. `refresh` trades a refresh token (given, or read from the stores) for a
//!    new pair
//!
//! The issued credential is printed to stdout as JSON; logs go to stderr.

mod cli;
mod config;

use std::time::Duration;

use anyhow::{Context, Result};
use bling_auth::{
    CodeAcquirer, Credential, FlowOutcome, OAuthFlow, PersistedRecord, SystemClock,
    TextFileBackend, TokenExchanger, WebDriverLauncher, is_expired, read_text,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;

/// Exit code when the token was issued but at least one store write failed.
const EXIT_PERSISTENCE_FAILED: i32 = 2;
/// Exit code for malformed command lines (sysexits EX_USAGE).
const EXIT_USAGE: i32 = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr with LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    // clap's own usage exit code would collide with EXIT_PERSISTENCE_FAILED
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            std::process::exit(if e.use_stderr() { EXIT_USAGE } else { 0 });
        }
    };

    let (config_path, explicit) = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load_or_default(&config_path, explicit)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let flow = build_flow(&config);

    let outcome = match cli.command {
        Command::Authorize { save } => flow
            .obtain_initial_token(save.into())
            .await
            .context("initial authorization failed")?,
        Command::Refresh { token, save } => {
            let token = match token {
                Some(token) => token,
                None => stored_refresh_token(&flow).await?,
            };
            flow.refresh_token(&token, save.into())
                .await
                .context("token refresh failed")?
        }
    };

    report(&outcome)
}

fn build_flow(config: &Config) -> OAuthFlow<WebDriverLauncher> {
    let client = reqwest::Client::new();

    let exchanger =
        TokenExchanger::new(client.clone()).with_endpoint(config.provider.token_endpoint.clone());

    let launcher = WebDriverLauncher::new(client, config.browser.webdriver_url.clone())
        .with_browser(config.browser.browser)
        .with_headless(config.browser.headless)
        .with_implicit_wait(Duration::from_secs(config.browser.implicit_wait_secs));
    let acquirer = CodeAcquirer::new(launcher)
        .with_authorize_endpoint(config.provider.authorize_endpoint.clone())
        .with_selectors(config.browser.selectors.clone())
        .with_redirect_wait(config.redirect_wait());

    OAuthFlow::new(
        config.credential_source(),
        config.env_store(),
        exchanger,
        acquirer,
        TextFileBackend::new(&config.storage.text_path),
    )
}

/// Refresh token from the text file, falling back to the env store.
async fn stored_refresh_token(flow: &OAuthFlow<WebDriverLauncher>) -> Result<String> {
    let text_path = flow.text_backend().path();
    match read_text(text_path).await {
        Ok(record) => {
            info!(path = %text_path.display(), "using refresh token from text file");
            return Ok(record.refresh_token);
        }
        Err(e) => warn!(error = %e, "no usable credential in text file"),
    }

    let record = PersistedRecord::from_env_store(flow.env_store())
        .await
        .context("no stored refresh token; pass one explicitly or run `authorize` first")?;
    info!(path = %flow.env_store().path().display(), "using refresh token from env store");
    Ok(record.refresh_token)
}

fn report(outcome: &FlowOutcome) -> Result<()> {
    let credential: &Credential = &outcome.credential;
    if is_expired(&credential.expiration_instant, &SystemClock) {
        warn!(
            expires_in = credential.expires_in,
            "provider issued a token that is already expired"
        );
    }

    let summary = serde_json::json!({
        "access_token": credential.access_token,
        "token_type": credential.token_type,
        "scope": credential.scope,
        "expires_in": credential.expires_in,
        "refresh_token": credential.refresh_token,
        "expiration": credential.expiration_instant.to_rfc3339(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !outcome.fully_persisted() {
        for failure in &outcome.persistence_failures {
            error!(backend = failure.backend, error = %failure.error, "credential not saved");
        }
        std::process::exit(EXIT_PERSISTENCE_FAILED);
    }
    Ok(())
}
