//! Async client speaking the web frontend's private protocol
//!
//! The client authenticates with the `__Secure-1PSID` / `__Secure-1PSIDTS`
//! browser session cookies, scrapes the page-embedded access token on init,
//! and keeps the session alive with a background cookie rotation task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::auth::{self, SECURE_1PSID, SECURE_1PSIDTS};
use crate::chat::ChatSession;
use crate::config::ClientConfig;
use crate::cookies::{self, cookie_header};
use crate::endpoints::{Endpoints, BOQ_VERSION, USER_AGENT};
use crate::error::{GeminiError, Result};
use crate::model::{Model, MODEL_HEADER};
use crate::types::{parse_response, ModelOutput};
use crate::upload;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversation position `[cid, rid, rcid]` threaded through follow-ups
pub(crate) type ChatMetadata = [Option<String>; 3];

struct ClientInner {
    http: reqwest::Client,
    endpoints: Endpoints,
    config: ClientConfig,
    model: Model,
    auto_refresh: bool,
    refresh_interval: Duration,
    cookies: RwLock<HashMap<String, String>>,
    access_token: RwLock<Option<String>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.refresh_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

/// Client for the Gemini web app. Clones share one session.
#[derive(Clone)]
pub struct GeminiClient {
    inner: Arc<ClientInner>,
}

/// Configures and builds a [`GeminiClient`]
pub struct GeminiClientBuilder {
    secure_1psid: Option<String>,
    secure_1psidts: Option<String>,
    model: Model,
    timeout: Duration,
    auto_refresh: bool,
    refresh_interval: Duration,
    config: ClientConfig,
    endpoints: Endpoints,
}

impl GeminiClientBuilder {
    /// Set the session cookies explicitly instead of relying on environment
    /// variables or browser stores
    pub fn secure_1psid(mut self, value: impl Into<String>) -> Self {
        self.secure_1psid = Some(value.into());
        self
    }

    pub fn secure_1psidts(mut self, value: impl Into<String>) -> Self {
        self.secure_1psidts = Some(value.into());
        self
    }

    /// Default model for requests that do not override it
    pub fn model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether `init` starts the background cookie rotation task
    pub fn auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Interval between `__Secure-1PSIDTS` rotations
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    #[doc(hidden)]
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn build(self) -> Result<GeminiClient> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        let mut cookies = HashMap::new();
        if let Some(psid) = self.secure_1psid {
            cookies.insert(SECURE_1PSID.to_string(), psid);
        }
        if let Some(psidts) = self.secure_1psidts {
            cookies.insert(SECURE_1PSIDTS.to_string(), psidts);
        }

        Ok(GeminiClient {
            inner: Arc::new(ClientInner {
                http,
                endpoints: self.endpoints,
                config: self.config,
                model: self.model,
                auto_refresh: self.auto_refresh,
                refresh_interval: self.refresh_interval,
                cookies: RwLock::new(cookies),
                access_token: RwLock::new(None),
                refresh_task: Mutex::new(None),
            }),
        })
    }
}

impl GeminiClient {
    pub fn builder() -> GeminiClientBuilder {
        GeminiClientBuilder {
            secure_1psid: None,
            secure_1psidts: None,
            model: Model::default(),
            timeout: DEFAULT_TIMEOUT,
            auto_refresh: true,
            refresh_interval: auth::ROTATE_INTERVAL,
            config: ClientConfig::from_env(),
            endpoints: Endpoints::default(),
        }
    }

    /// New client with default configuration. Cookies come from the
    /// `SECURE_1PSID` / `SECURE_1PSIDTS` environment variables or, when
    /// auto-loading is enabled, from installed browsers during [`init`].
    ///
    /// [`init`]: GeminiClient::init
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// New client with explicit session cookies, suppressing environment
    /// and browser lookup
    pub fn with_cookies(
        secure_1psid: impl Into<String>,
        secure_1psidts: Option<String>,
    ) -> Result<Self> {
        let mut builder = Self::builder().secure_1psid(secure_1psid);
        if let Some(psidts) = secure_1psidts {
            builder = builder.secure_1psidts(psidts);
        }
        builder.build()
    }

    /// Fill in missing cookies, fetch the access token, and start the
    /// background cookie rotation task. Called implicitly by the first
    /// generate call if skipped.
    pub async fn init(&self) -> Result<()> {
        self.assemble_cookies().await?;

        let mut cookies = self.inner.cookies.write().await;
        let token =
            auth::fetch_access_token(&self.inner.http, &self.inner.endpoints, &mut cookies).await?;
        drop(cookies);
        *self.inner.access_token.write().await = Some(token);

        if self.inner.auto_refresh {
            self.spawn_refresh_task();
        }
        debug!("client initialized");
        Ok(())
    }

    /// Resolve session cookies in precedence order: explicit, environment,
    /// browser stores
    async fn assemble_cookies(&self) -> Result<()> {
        let mut cookies = self.inner.cookies.write().await;

        if !cookies.contains_key(SECURE_1PSID) {
            let (psid, psidts) = crate::config::env_cookies();
            if let Some(psid) = psid {
                cookies.insert(SECURE_1PSID.to_string(), psid);
            }
            if let Some(psidts) = psidts {
                cookies.entry(SECURE_1PSIDTS.to_string()).or_insert(psidts);
            }
        }

        if !cookies.contains_key(SECURE_1PSID) && self.inner.config.auto_load_cookies {
            debug!("no session cookies provided, scanning browser stores");
            let loaded = cookies::load_browser_cookies(
                &self.inner.config.cookie_domain,
                self.inner.config.preferred_browser.as_deref(),
            );
            for (name, value) in loaded {
                cookies.entry(name).or_insert(value);
            }
        }

        if !cookies.contains_key(SECURE_1PSID) {
            return Err(GeminiError::Auth(format!(
                "no {SECURE_1PSID} cookie available; pass it explicitly, set the \
                 SECURE_1PSID environment variable, or sign in to gemini.google.com \
                 in a supported browser"
            )));
        }
        Ok(())
    }

    /// Periodically rotates `__Secure-1PSIDTS` so the session outlives the
    /// cookie's short server-side lifetime. Holds only a weak reference; the
    /// task dies with the last client clone.
    fn spawn_refresh_task(&self) {
        let Ok(mut guard) = self.inner.refresh_task.lock() else {
            return;
        };
        if guard.is_some() {
            return;
        }

        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.refresh_interval;
        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let snapshot = inner.cookies.read().await.clone();
                match auth::rotate_1psidts(&inner.http, &inner.endpoints, &snapshot).await {
                    Ok(Some(psidts)) => {
                        debug!("rotated {SECURE_1PSIDTS}");
                        inner
                            .cookies
                            .write()
                            .await
                            .insert(SECURE_1PSIDTS.to_string(), psidts);
                    }
                    Ok(None) => {}
                    Err(GeminiError::Auth(reason)) => {
                        warn!(%reason, "cookie rotation failed, stopping refresh task");
                        return;
                    }
                    Err(e) => warn!(error = %e, "cookie rotation attempt failed"),
                }
            }
        }));
    }

    /// One-shot generation outside any conversation
    pub async fn generate_content(
        &self,
        prompt: &str,
        files: &[PathBuf],
    ) -> Result<ModelOutput> {
        self.generate(prompt, files, &Default::default(), self.inner.model)
            .await
    }

    /// One-shot generation with an explicit model, overriding the client
    /// default for this call only
    pub async fn generate_content_with_model(
        &self,
        prompt: &str,
        files: &[PathBuf],
        model: Model,
    ) -> Result<ModelOutput> {
        self.generate(prompt, files, &Default::default(), model).await
    }

    /// Upload a file and return the identifier generate requests reference
    /// it by
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        upload::upload_file(&self.inner.http, &self.inner.endpoints, path).await
    }

    /// Begin a conversation using the client's default model
    pub fn start_chat(&self) -> ChatSession {
        ChatSession::new(self.clone(), self.inner.model)
    }

    /// Begin a conversation with an explicit model
    pub fn start_chat_with_model(&self, model: Model) -> ChatSession {
        ChatSession::new(self.clone(), model)
    }

    /// Stop the background rotation task and forget the access token.
    /// The client can be re-initialized afterwards.
    pub async fn close(&self) {
        if let Ok(mut guard) = self.inner.refresh_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
        *self.inner.access_token.write().await = None;
    }

    /// Snapshot of the session cookies currently in use
    pub async fn cookies(&self) -> HashMap<String, String> {
        self.inner.cookies.read().await.clone()
    }

    pub fn auto_load_cookies(&self) -> bool {
        self.inner.config.auto_load_cookies
    }

    pub fn preferred_browser(&self) -> Option<&str> {
        self.inner.config.preferred_browser.as_deref()
    }

    pub(crate) async fn generate(
        &self,
        prompt: &str,
        files: &[PathBuf],
        metadata: &ChatMetadata,
        model: Model,
    ) -> Result<ModelOutput> {
        if prompt.is_empty() {
            return Err(GeminiError::InvalidArgument("prompt must not be empty".into()));
        }
        if self.inner.access_token.read().await.is_none() {
            self.init().await?;
        }
        let token = self
            .inner
            .access_token
            .read()
            .await
            .clone()
            .ok_or_else(|| GeminiError::Auth("client is not initialized".into()))?;

        let f_req = self.build_request_envelope(prompt, files, metadata).await?;
        let cookies = self.inner.cookies.read().await.clone();
        let reqid = reqid();

        let mut request = self
            .inner
            .http
            .post(self.inner.endpoints.generate_url())
            .query(&[("bl", BOQ_VERSION), ("_reqid", reqid.as_str())])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::COOKIE, cookie_header(&cookies))
            .form(&[("at", token.as_str()), ("f.req", f_req.as_str())]);
        if let Some(header_value) = model.header_value() {
            request = request.header(MODEL_HEADER, header_value);
        }

        let response = request.send().await?.error_for_status()?;
        let text = response.text().await?;
        parse_response(&text, model.name(), &cookies)
    }

    /// Build the doubly-encoded `f.req` form field
    async fn build_request_envelope(
        &self,
        prompt: &str,
        files: &[PathBuf],
        metadata: &ChatMetadata,
    ) -> Result<String> {
        let prompt_part = if files.is_empty() {
            json!([prompt])
        } else {
            let mut entries = Vec::with_capacity(files.len());
            for file in files {
                let identifier =
                    upload::upload_file(&self.inner.http, &self.inner.endpoints, file).await?;
                let name = file_name(file)?;
                entries.push(json!([[identifier], name]));
            }
            json!([prompt, 0, Value::Null, entries])
        };

        let meta: Value = if metadata.iter().all(Option::is_none) {
            Value::Null
        } else {
            json!(metadata)
        };

        let inner = json!([prompt_part, Value::Null, meta]);
        Ok(json!([Value::Null, inner.to_string()]).to_string())
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| GeminiError::Parse(format!("path has no file name: {}", path.display())))
}

/// Request sequence id the frontend sends; the server only needs it to be
/// plausible
fn reqid() -> String {
    format!("{}", 100_000 + chrono::Utc::now().timestamp_subsec_micros() % 900_000)
}
