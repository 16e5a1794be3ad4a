//! Browser automation seam and its W3C WebDriver implementation
//!
//! The acquirer only needs five operations from a browser, so it talks to
//! the [`BrowserSession`] trait. [`WebDriverLauncher`] speaks the WebDriver
//! HTTP protocol to a running chromedriver or geckodriver.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Key W3C WebDriver uses for element references in JSON payloads.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// No element matched the selector within the implicit wait.
    #[error("no element matches `{0}`")]
    ElementNotFound(String),

    #[error("webdriver: {0}")]
    WebDriver(String),
}

/// One open browser window.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    /// Type `text` into the element matching the CSS `selector`.
    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn click(&mut self, selector: &str) -> Result<(), DriverError>;

    async fn current_url(&mut self) -> Result<String, DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, DriverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chrome,
    Firefox,
}

/// Starts sessions on a WebDriver server such as `chromedriver --port=4444`.
#[derive(Debug, Clone)]
pub struct WebDriverLauncher {
    client: reqwest::Client,
    endpoint: String,
    browser: BrowserKind,
    headless: bool,
    implicit_wait: Duration,
}

impl WebDriverLauncher {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            browser: BrowserKind::Chrome,
            headless: true,
            implicit_wait: Duration::from_secs(10),
        }
    }

    pub fn with_browser(mut self, browser: BrowserKind) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// How long element lookups wait before reporting "no such element".
    pub fn with_implicit_wait(mut self, wait: Duration) -> Self {
        self.implicit_wait = wait;
        self
    }

    fn capabilities(&self) -> Value {
        let always_match = match self.browser {
            BrowserKind::Chrome => {
                let args: Vec<&str> = if self.headless {
                    vec!["--headless=new", "--disable-gpu"]
                } else {
                    vec![]
                };
                json!({"browserName": "chrome", "goog:chromeOptions": {"args": args}})
            }
            BrowserKind::Firefox => {
                let args: Vec<&str> = if self.headless { vec!["-headless"] } else { vec![] };
                json!({"browserName": "firefox", "moz:firefoxOptions": {"args": args}})
            }
        };
        json!({"capabilities": {"alwaysMatch": always_match}})
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    type Session = WebDriverSession;

    async fn launch(&self) -> Result<WebDriverSession, DriverError> {
        let value = command(
            &self.client,
            Method::POST,
            &format!("{}/session", self.endpoint),
            Some(self.capabilities()),
        )
        .await?;
        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::WebDriver("new session response has no sessionId".into()))?;

        let mut session = WebDriverSession {
            client: self.client.clone(),
            base: format!("{}/session/{session_id}", self.endpoint),
        };
        debug!(session = session_id, browser = ?self.browser, "webdriver session started");

        let implicit_ms = u64::try_from(self.implicit_wait.as_millis()).unwrap_or(u64::MAX);
        if let Err(e) = session
            .post("timeouts", json!({"implicit": implicit_ms}))
            .await
        {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(session)
    }
}

/// An open WebDriver session.
#[derive(Debug)]
pub struct WebDriverSession {
    client: reqwest::Client,
    base: String,
}

impl WebDriverSession {
    async fn post(&self, path: &str, body: Value) -> Result<Value, DriverError> {
        command(
            &self.client,
            Method::POST,
            &format!("{}/{path}", self.base),
            Some(body),
        )
        .await
    }

    async fn find(&self, selector: &str) -> Result<String, DriverError> {
        let value = self
            .post("element", json!({"using": "css selector", "value": selector}))
            .await
            .map_err(|e| match e {
                DriverError::ElementNotFound(_) => DriverError::ElementNotFound(selector.to_owned()),
                other => other,
            })?;
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| DriverError::WebDriver(format!("malformed element reference for `{selector}`")))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        self.post("url", json!({"url": url})).await.map(drop)
    }

    async fn fill(&mut self, selector: &str, text: &str) -> Result<(), DriverError> {
        let element = self.find(selector).await?;
        self.post(&format!("element/{element}/value"), json!({"text": text}))
            .await
            .map(drop)
    }

    async fn click(&mut self, selector: &str) -> Result<(), DriverError> {
        let element = self.find(selector).await?;
        self.post(&format!("element/{element}/click"), json!({}))
            .await
            .map(drop)
    }

    async fn current_url(&mut self) -> Result<String, DriverError> {
        let value = command(&self.client, Method::GET, &format!("{}/url", self.base), None).await?;
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| DriverError::WebDriver("current url is not a string".into()))
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        command(&self.client, Method::DELETE, &self.base, None)
            .await
            .map(drop)
    }
}

/// Send one WebDriver command and unwrap the `value` envelope.
async fn command(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, DriverError> {
    let mut request = client.request(method.clone(), url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request
        .send()
        .await
        .map_err(|e| DriverError::WebDriver(format!("{method} {url} failed: {e}")))?;

    let status = response.status();
    let mut payload: Value = response
        .json()
        .await
        .map_err(|e| DriverError::WebDriver(format!("{method} {url} returned invalid JSON: {e}")))?;
    let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    if error == "no such element" {
        Err(DriverError::ElementNotFound(message.to_owned()))
    } else {
        Err(DriverError::WebDriver(format!("{error} ({status}): {message}")))
    }
}
