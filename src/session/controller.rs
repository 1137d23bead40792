//! Session controller

use super::retry::RetryPolicy;
use super::SessionState;
use crate::backend::cdp::ChromiumBackend;
use crate::backend::{
    BrowserBackend, ContextHandle, LaunchSpec, MouseEvent, NavigateOptions, PageHandle,
    ScreenshotOptions, WaitUntil,
};
use crate::behavior::{HumanBehavior, MouseMoveOptions, ScrollOptions, TypingOptions};
use crate::config::{BrowserEngine, SessionConfig};
use crate::fingerprint::{FingerprintProfile, ProfileGenerator, Spoofer};
use crate::identity::{Identity, IdentityPool};
use crate::storage::{self, StorageSnapshot};
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Orchestrates one browsing session
///
/// Owns the lifecycle of a single browser context: acquires an identity,
/// generates and applies a fingerprint profile, seeds persisted storage, and
/// routes every page operation through the session's retry budget.
#[derive(Debug)]
pub struct SessionController {
    id: Uuid,
    config: SessionConfig,
    pool: Arc<IdentityPool>,
    backend: Arc<dyn BrowserBackend>,
    behavior: HumanBehavior,
    retry: RetryPolicy,
    retries_left: u32,
    state: SessionState,
    identity: Option<Identity>,
    profile: Option<FingerprintProfile>,
    context: Option<Arc<dyn ContextHandle>>,
    page: Option<Arc<dyn PageHandle>>,
}

impl SessionController {
    /// Create a controller over an explicit backend
    pub fn new(
        config: SessionConfig,
        pool: Arc<IdentityPool>,
        backend: Arc<dyn BrowserBackend>,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        let retries_left = config.retry_budget;

        Self {
            id: Uuid::new_v4(),
            config,
            pool,
            backend,
            behavior: HumanBehavior::new(),
            retry,
            retries_left,
            state: SessionState::Created,
            identity: None,
            profile: None,
            context: None,
            page: None,
        }
    }

    /// Create a controller over the Chromium backend
    pub fn chromium(config: SessionConfig, pool: Arc<IdentityPool>) -> Result<Self> {
        if config.browser_engine != BrowserEngine::Chromium {
            return Err(Error::configuration(format!(
                "browser engine {:?} is not supported by the Chromium backend",
                config.browser_engine
            )));
        }
        Ok(Self::new(config, pool, Arc::new(ChromiumBackend::new())))
    }

    /// Start the session: acquire identity, launch, fingerprint, seed storage
    pub async fn start(&mut self) -> Result<()> {
        match self.state {
            SessionState::Created => {}
            SessionState::Started => {
                return Err(Error::internal("session already started"));
            }
            SessionState::Closed => return Err(Error::SessionClosed),
        }

        // An empty pool is not an error: the session runs with the config's
        // own proxy/user-agent (or none at all).
        let identity = if self.pool.is_empty() {
            None
        } else {
            Some(self.pool.acquire()?)
        };
        if let Some(identity) = &identity {
            info!("Session using identity {}", identity.proxy);
        }

        let profile = if self.config.stealth {
            Some(ProfileGenerator::new().generate(
                self.config.fingerprint_preset.as_deref(),
                self.config.fingerprint_seed,
            )?)
        } else {
            None
        };

        let spec = self.launch_spec(identity.as_ref(), profile.as_ref());
        let backend = Arc::clone(&self.backend);
        let context = self
            .retry
            .clone()
            .run(&mut self.retries_left, "launch_context", || {
                let backend = Arc::clone(&backend);
                let spec = spec.clone();
                async move { backend.launch_context(&spec).await }
            })
            .await?;

        let setup = async {
            // Fingerprint overrides go in before any page exists, so every
            // document the context ever loads sees the spoofed values.
            if let Some(profile) = &profile {
                Spoofer::new().apply(profile, context.as_ref()).await?;
            }

            let page = self
                .retry
                .clone()
                .run(&mut self.retries_left, "new_page", || {
                    let context = Arc::clone(&context);
                    async move { context.new_page().await }
                })
                .await?;

            if let Some(path) = &self.config.storage_state_path {
                if path.exists() {
                    let snapshot = storage::load(path)?;
                    if !snapshot.is_empty() {
                        context.set_storage_state(&snapshot).await?;
                        info!(
                            "Seeded session from {} ({} cookies, {} origins)",
                            path.display(),
                            snapshot.cookies.len(),
                            snapshot.origins.len()
                        );
                    }
                } else {
                    debug!("No storage snapshot at {}", path.display());
                }
            }

            Ok::<Arc<dyn PageHandle>, Error>(page)
        };

        // A failure past the launch must not leak the browser process or its
        // user-data directory.
        let page = match setup.await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    warn!("Context close after failed start: {}", close_err);
                }
                return Err(e);
            }
        };

        self.identity = identity;
        self.profile = profile;
        self.context = Some(context);
        self.page = Some(page);
        self.state = SessionState::Started;
        info!("Session {} started", self.id);
        Ok(())
    }

    /// Navigate to `url`, waiting for the load event
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        let options = NavigateOptions {
            timeout: self.default_timeout(),
            wait_until: WaitUntil::Load,
        };
        self.navigate_with(url, &options).await
    }

    /// Navigate to `url` with an explicit timeout and wait condition
    pub async fn navigate_with(&mut self, url: &str, options: &NavigateOptions) -> Result<()> {
        let page = self.require_page()?;

        // Validation happens before the first attempt; a bad URL never
        // consumes retry budget.
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https" | "about" | "file") {
            return Err(Error::InvalidUrl(format!(
                "{}: unsupported scheme '{}'",
                url,
                parsed.scheme()
            )));
        }

        let url = url.to_string();
        let options = options.clone();

        self.retry
            .clone()
            .run(&mut self.retries_left, "navigate", || {
                let page = Arc::clone(&page);
                let url = url.clone();
                let options = options.clone();
                async move { page.goto(&url, &options).await }
            })
            .await
    }

    /// Click the element matched by `selector`
    pub async fn click(&mut self, selector: &str) -> Result<()> {
        let timeout = self.default_timeout();
        self.click_with(selector, timeout).await
    }

    /// Click with an explicit per-call timeout
    ///
    /// A timed-out attempt counts as transient and draws from the retry
    /// budget like any other timeout.
    pub async fn click_with(&mut self, selector: &str, timeout: Duration) -> Result<()> {
        let page = self.require_page()?;
        let human_like = self.config.human_like;
        let behavior = &self.behavior;
        let selector = selector.to_string();

        self.retry
            .clone()
            .run(&mut self.retries_left, "click", || {
                let page = Arc::clone(&page);
                let selector = selector.clone();
                async move {
                    let action = async {
                        if human_like {
                            behavior
                                .click(page.as_ref(), &selector, &MouseMoveOptions::default())
                                .await
                        } else {
                            page.click(&selector).await
                        }
                    };
                    match tokio::time::timeout(timeout, action).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout("click")),
                    }
                }
            })
            .await
    }

    /// Fill the element matched by `selector` with `value`
    ///
    /// In human-like mode the value is typed key by key instead of set
    /// directly; the end state is identical.
    pub async fn fill(&mut self, selector: &str, value: &str) -> Result<()> {
        let timeout = self.default_timeout();
        self.fill_with(selector, value, timeout).await
    }

    /// Fill with an explicit per-call timeout
    pub async fn fill_with(
        &mut self,
        selector: &str,
        value: &str,
        timeout: Duration,
    ) -> Result<()> {
        let page = self.require_page()?;
        let human_like = self.config.human_like;
        let behavior = &self.behavior;
        let selector = selector.to_string();
        let value = value.to_string();

        self.retry
            .clone()
            .run(&mut self.retries_left, "fill", || {
                let page = Arc::clone(&page);
                let selector = selector.clone();
                let value = value.clone();
                async move {
                    let action = async {
                        if human_like {
                            behavior
                                .type_text(
                                    page.as_ref(),
                                    &selector,
                                    &value,
                                    &TypingOptions::default(),
                                )
                                .await
                        } else {
                            page.fill(&selector, &value).await
                        }
                    };
                    match tokio::time::timeout(timeout, action).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout("fill")),
                    }
                }
            })
            .await
    }

    /// Scroll the page by `distance` CSS pixels
    pub async fn scroll(&mut self, distance: f64) -> Result<()> {
        let page = self.require_page()?;

        if self.config.human_like {
            self.behavior
                .scroll(page.as_ref(), distance, &ScrollOptions::default())
                .await
        } else {
            let x = self.config.viewport.width as f64 / 2.0;
            let y = self.config.viewport.height as f64 / 2.0;
            page.dispatch_mouse(&MouseEvent::wheel(x, y, distance)).await
        }
    }

    /// Evaluate JavaScript in the page and return the JSON result
    pub async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value> {
        let timeout = self.default_timeout();
        self.evaluate_with(script, timeout).await
    }

    /// Evaluate with an explicit per-call timeout
    pub async fn evaluate_with(
        &mut self,
        script: &str,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let page = self.require_page()?;
        let script = script.to_string();

        self.retry
            .clone()
            .run(&mut self.retries_left, "evaluate", || {
                let page = Arc::clone(&page);
                let script = script.clone();
                async move {
                    match tokio::time::timeout(timeout, page.evaluate(&script)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout("evaluate")),
                    }
                }
            })
            .await
    }

    /// Capture a screenshot of the page
    pub async fn screenshot(&mut self, options: ScreenshotOptions) -> Result<Vec<u8>> {
        let timeout = self.default_timeout();
        self.screenshot_with(options, timeout).await
    }

    /// Screenshot with an explicit per-call timeout
    pub async fn screenshot_with(
        &mut self,
        options: ScreenshotOptions,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let page = self.require_page()?;

        self.retry
            .clone()
            .run(&mut self.retries_left, "screenshot", || {
                let page = Arc::clone(&page);
                let options = options.clone();
                async move {
                    match tokio::time::timeout(timeout, page.screenshot(&options)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout("screenshot")),
                    }
                }
            })
            .await
    }

    /// Capture the context's current storage state
    pub async fn storage_snapshot(&self) -> Result<StorageSnapshot> {
        let context = self.require_context()?;
        storage::snapshot(context.as_ref()).await
    }

    /// Load a persisted snapshot into the live context
    ///
    /// Only valid before the first navigation; documents already loaded
    /// would not see the seeded cookies and local storage.
    pub async fn load_storage(&self, path: &std::path::Path) -> Result<()> {
        let context = self.require_context()?;
        if context.has_navigated() {
            return Err(Error::configuration(
                "storage state can only be loaded before the first navigation",
            ));
        }
        let snapshot = storage::load(path)?;
        if !snapshot.is_empty() {
            context.set_storage_state(&snapshot).await?;
        }
        Ok(())
    }

    /// Persist the context's storage state to the configured path
    pub async fn save_storage(&self) -> Result<()> {
        let context = self.require_context()?;
        let path = self
            .config
            .storage_state_path
            .clone()
            .ok_or_else(|| Error::configuration("storage_state_path is not set"))?;

        let snapshot = storage::snapshot(context.as_ref()).await?;
        storage::save(&snapshot, &path)
    }

    /// Ban the identity this session is using
    ///
    /// Other sessions already holding the identity keep running; the pool
    /// stops handing it out until the ban expires.
    pub fn ban_current_identity(&self, reason: impl Into<String>, duration: Duration) {
        match &self.identity {
            Some(identity) => self.pool.ban(identity, reason, duration),
            None => debug!("Session has no pool identity to ban"),
        }
    }

    /// Release the browser context and its resources
    ///
    /// Idempotent; closing an already-closed or never-started session is a
    /// no-op. When `storage_state_path` is configured the context's storage
    /// is persisted first and a persistence failure is returned, while
    /// page/context release failures are logged so teardown always runs to
    /// completion.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let was_started = self.state == SessionState::Started;
        self.state = SessionState::Closed;

        let page = self.page.take();
        let context = self.context.take();

        let mut persisted = Ok(());
        if was_started {
            if let (Some(context), Some(path)) =
                (context.as_deref(), &self.config.storage_state_path)
            {
                persisted = match storage::snapshot(context).await {
                    Ok(snapshot) => storage::save(&snapshot, path),
                    Err(e) => Err(e),
                };
                if let Err(e) = &persisted {
                    warn!("Storage persistence during close failed: {}", e);
                }
            }
        }

        if let Some(page) = page {
            if let Err(e) = page.close().await {
                debug!("Page close during session shutdown: {}", e);
            }
        }
        if let Some(context) = context {
            if let Err(e) = context.close().await {
                warn!("Context close during session shutdown: {}", e);
            }
        }

        info!("Session {} closed", self.id);
        persisted
    }

    /// Stable identifier for this session
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The identity acquired at start, if any
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The fingerprint profile applied at start, if any
    pub fn fingerprint(&self) -> Option<&FingerprintProfile> {
        self.profile.as_ref()
    }

    /// Retries remaining in this session's budget
    pub fn retry_budget_remaining(&self) -> u32 {
        self.retries_left
    }

    fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.config.default_timeout_ms)
    }

    fn launch_spec(
        &self,
        identity: Option<&Identity>,
        profile: Option<&FingerprintProfile>,
    ) -> LaunchSpec {
        // Explicit config overrides win over the acquired identity; the
        // fingerprint profile's user agent is the last resort so the wire UA
        // and the spoofed navigator stay in the same family.
        let proxy = self
            .config
            .proxy
            .clone()
            .or_else(|| identity.map(|i| i.proxy.server_url()));
        let user_agent = self
            .config
            .user_agent
            .clone()
            .or_else(|| identity.map(|i| i.user_agent.clone()))
            .or_else(|| profile.map(|p| p.user_agent.clone()));

        LaunchSpec {
            headless: self.config.headless,
            proxy,
            user_agent,
            viewport_width: self.config.viewport.width,
            viewport_height: self.config.viewport.height,
            ignore_https_errors: self.config.ignore_https_errors,
            slow_mo_ms: self.config.slow_mo_ms,
            executable_path: self.config.executable_path.clone(),
        }
    }

    fn require_page(&self) -> Result<Arc<dyn PageHandle>> {
        match self.state {
            SessionState::Created => Err(Error::SessionNotStarted),
            SessionState::Closed => Err(Error::SessionClosed),
            SessionState::Started => self
                .page
                .clone()
                .ok_or_else(|| Error::internal("started session has no page")),
        }
    }

    fn require_context(&self) -> Result<Arc<dyn ContextHandle>> {
        match self.state {
            SessionState::Created => Err(Error::SessionNotStarted),
            SessionState::Closed => Err(Error::SessionClosed),
            SessionState::Started => self
                .context
                .clone()
                .ok_or_else(|| Error::internal("started session has no context")),
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        if self.state == SessionState::Started {
            // Resources cannot be released from a sync Drop; the owner
            // should have called close().
            warn!("SessionController dropped while started; call close() to release the browser");
        }
    }
}
