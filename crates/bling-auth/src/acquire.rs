//! Authorization code acquisition through an automated browser
//!
//! Pure state machine plus a driver loop. `transition` decides the next state
//! from the current one and the outcome of the last browser step; the
//! acquirer performs the browser I/O that each state calls for.
//!
//! ```text
//! Start -> NavigatedToAuthUrl -> LoggedIn -> AuthorizationPromptHandled -> RedirectCaptured -> CodeExtracted
//!                                    |                                          ^
//!                                    +------------ AlreadyAuthorized -----------+
//! ```
//!
//! The `AlreadyAuthorized` edge is taken when the authorize button is absent,
//! which is how Bling presents an app the user has already granted.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, BrowserSession, DriverError};
use crate::client::LoginCredentials;
use crate::constants::{AUTHORIZATION_STATE, AUTHORIZE_ENDPOINT};
use crate::error::{Error, Result};

/// CSS selectors for the Bling login and consent pages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoginSelectors {
    pub username: String,
    pub password: String,
    pub submit: String,
    pub authorize: String,
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            username: "#username".into(),
            password: "input[type='password']".into(),
            submit: "button[type='submit']".into(),
            authorize: "#authorization-confirm".into(),
        }
    }
}

/// How long to poll the browser URL for the post-authorization redirect.
#[derive(Debug, Clone, Copy)]
pub struct RedirectWait {
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for RedirectWait {
    fn default() -> Self {
        Self {
            attempts: 20,
            interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionState {
    Start,
    NavigatedToAuthUrl,
    LoggedIn,
    AuthorizationPromptHandled,
    RedirectCaptured { url: String },
    CodeExtracted { code: String },
}

impl AcquisitionState {
    /// State name without its payload; the payload may hold the live code.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::NavigatedToAuthUrl => "navigated_to_auth_url",
            Self::LoggedIn => "logged_in",
            Self::AuthorizationPromptHandled => "authorization_prompt_handled",
            Self::RedirectCaptured { .. } => "redirect_captured",
            Self::CodeExtracted { .. } => "code_extracted",
        }
    }
}

/// Outcome of the browser step performed in a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionEvent {
    Navigated,
    LoginSubmitted,
    AuthorizeClicked,
    /// No authorize button: consent was granted on an earlier run.
    AlreadyAuthorized { url: String },
    Redirected { url: String },
    CodeParsed { code: String },
}

impl AcquisitionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Navigated => "navigated",
            Self::LoginSubmitted => "login_submitted",
            Self::AuthorizeClicked => "authorize_clicked",
            Self::AlreadyAuthorized { .. } => "already_authorized",
            Self::Redirected { .. } => "redirected",
            Self::CodeParsed { .. } => "code_parsed",
        }
    }
}

/// Advance the state machine. Pure function: no I/O.
pub fn transition(state: AcquisitionState, event: AcquisitionEvent) -> Result<AcquisitionState> {
    use AcquisitionEvent as E;
    use AcquisitionState as S;

    match (state, event) {
        (S::Start, E::Navigated) => Ok(S::NavigatedToAuthUrl),
        (S::NavigatedToAuthUrl, E::LoginSubmitted) => Ok(S::LoggedIn),
        (S::LoggedIn, E::AuthorizeClicked) => Ok(S::AuthorizationPromptHandled),
        (S::LoggedIn, E::AlreadyAuthorized { url }) => Ok(S::RedirectCaptured { url }),
        (S::AuthorizationPromptHandled, E::Redirected { url }) => Ok(S::RedirectCaptured { url }),
        (S::RedirectCaptured { .. }, E::CodeParsed { code }) => Ok(S::CodeExtracted { code }),
        (state, event) => Err(Error::Acquisition(format!(
            "unexpected {} in state {}",
            event.name(),
            state.name()
        ))),
    }
}

/// Drives a browser through Bling's login and consent pages.
#[derive(Debug, Clone)]
pub struct CodeAcquirer<L> {
    launcher: L,
    authorize_endpoint: String,
    selectors: LoginSelectors,
    redirect_wait: RedirectWait,
}

impl<L: BrowserLauncher> CodeAcquirer<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_owned(),
            selectors: LoginSelectors::default(),
            redirect_wait: RedirectWait::default(),
        }
    }

    pub fn with_authorize_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorize_endpoint = endpoint.into();
        self
    }

    pub fn with_selectors(mut self, selectors: LoginSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_redirect_wait(mut self, wait: RedirectWait) -> Self {
        self.redirect_wait = wait;
        self
    }

    pub fn authorization_url(&self, client_id: &str) -> String {
        format!(
            "{}?response_type=code&client_id={client_id}&state={AUTHORIZATION_STATE}",
            self.authorize_endpoint
        )
    }

    /// Log in, grant consent if asked, and return the authorization code.
    ///
    /// The browser session is closed before returning, whatever the outcome.
    pub async fn acquire_code(&self, client_id: &str, login: &LoginCredentials) -> Result<String> {
        let url = self.authorization_url(client_id);
        let mut session = self
            .launcher
            .launch()
            .await
            .map_err(|e| Error::Acquisition(format!("starting browser session: {e}")))?;

        let result = self.drive(&mut session, &url, login).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "failed to close browser session");
        }
        result
    }

    async fn drive(
        &self,
        session: &mut L::Session,
        url: &str,
        login: &LoginCredentials,
    ) -> Result<String> {
        let mut state = AcquisitionState::Start;
        loop {
            let event = match &state {
                AcquisitionState::Start => {
                    session.navigate(url).await.map_err(step_error("navigating"))?;
                    AcquisitionEvent::Navigated
                }
                AcquisitionState::NavigatedToAuthUrl => {
                    let s = &self.selectors;
                    session
                        .fill(&s.username, &login.username)
                        .await
                        .map_err(step_error("filling username"))?;
                    session
                        .fill(&s.password, login.password.expose())
                        .await
                        .map_err(step_error("filling password"))?;
                    session
                        .click(&s.submit)
                        .await
                        .map_err(step_error("submitting login"))?;
                    AcquisitionEvent::LoginSubmitted
                }
                AcquisitionState::LoggedIn => match session.click(&self.selectors.authorize).await {
                    Ok(()) => AcquisitionEvent::AuthorizeClicked,
                    Err(DriverError::ElementNotFound(_)) => {
                        info!("authorize button absent, application already authorized");
                        AcquisitionEvent::AlreadyAuthorized {
                            url: self.wait_for_redirect(session).await?,
                        }
                    }
                    Err(e) => return Err(step_error("authorizing")(e)),
                },
                AcquisitionState::AuthorizationPromptHandled => AcquisitionEvent::Redirected {
                    url: self.wait_for_redirect(session).await?,
                },
                AcquisitionState::RedirectCaptured { url } => AcquisitionEvent::CodeParsed {
                    code: extract_code(url)?,
                },
                AcquisitionState::CodeExtracted { code } => {
                    info!("authorization code captured");
                    return Ok(code.clone());
                }
            };
            debug!(state = state.name(), event = event.name(), "acquisition step complete");
            state = transition(state, event)?;
        }
    }

    /// Poll the browser URL until it carries a `code` parameter, returning
    /// the last URL seen once the attempts run out.
    async fn wait_for_redirect(&self, session: &mut L::Session) -> Result<String> {
        let mut url = String::new();
        for attempt in 0..self.redirect_wait.attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(self.redirect_wait.interval).await;
            }
            url = session
                .current_url()
                .await
                .map_err(step_error("reading redirect url"))?;
            if extract_code(&url).is_ok() {
                break;
            }
        }
        Ok(url)
    }
}

fn step_error(step: &'static str) -> impl Fn(DriverError) -> Error {
    move |e| Error::Acquisition(format!("{step}: {e}"))
}

/// Pull the `code` query parameter out of the redirect URL.
pub fn extract_code(url: &str) -> Result<String> {
    let (_, query) = url.split_once('?').ok_or_else(|| {
        Error::Acquisition(format!(
            "redirect url has no query string: {}",
            without_query(url)
        ))
    })?;
    let query = query.split('#').next().unwrap_or_default();

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, value)| *key == "code" && !value.is_empty())
        .map(|(_, value)| value.to_owned())
        .ok_or_else(|| {
            Error::Acquisition(format!(
                "redirect url has no code parameter: {}",
                without_query(url)
            ))
        })
}

/// Scheme, host and path only. Query and fragment can carry the code.
fn without_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or_default()
}
