//! Chromium process launch and context-level operations

use super::connection::CdpConnection;
use super::page::CdpPage;
use crate::backend::{BrowserBackend, ContextHandle, LaunchSpec, PageHandle};
use crate::storage::{Cookie, LocalStorageEntry, OriginState, StorageSnapshot};
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How long to wait for the DevTools endpoint after spawning the process
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Chromium browser backend
///
/// Each `launch_context` call spawns a dedicated Chromium process with its
/// own user-data directory, so contexts never share cookies or cache.
#[derive(Debug, Default)]
pub struct ChromiumBackend;

impl ChromiumBackend {
    /// Create a new Chromium backend
    pub fn new() -> Self {
        Self
    }

    /// Locate a Chromium binary on PATH
    fn default_executable() -> Result<String> {
        const CANDIDATES: &[&str] = &[
            "chromium",
            "chromium-browser",
            "google-chrome",
            "google-chrome-stable",
        ];

        let path = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path) {
            for candidate in CANDIDATES {
                if dir.join(candidate).is_file() {
                    return Ok(candidate.to_string());
                }
            }
        }

        Err(Error::browser_launch(
            "no Chromium binary found on PATH; set executable_path",
        ))
    }

    fn build_args(spec: &LaunchSpec, port: u16, user_data_dir: &PathBuf) -> Vec<String> {
        let mut args = vec![
            format!("--remote-debugging-port={}", port),
            format!("--user-data-dir={}", user_data_dir.display()),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-blink-features=AutomationControlled".to_string(),
            format!(
                "--window-size={},{}",
                spec.viewport_width.max(1),
                spec.viewport_height.max(1)
            ),
        ];

        if spec.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(proxy) = &spec.proxy {
            args.push(format!("--proxy-server={}", proxy));
        }
        if let Some(user_agent) = &spec.user_agent {
            args.push(format!("--user-agent={}", user_agent));
        }
        if spec.ignore_https_errors {
            args.push("--ignore-certificate-errors".to_string());
        }

        args.push("about:blank".to_string());
        args
    }

    /// Reserve an ephemeral port for the debugging endpoint
    fn free_port() -> Result<u16> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")
            .map_err(|e| Error::browser_launch(format!("no free port: {}", e)))?;
        let port = listener
            .local_addr()
            .map_err(|e| Error::browser_launch(format!("no free port: {}", e)))?
            .port();
        Ok(port)
    }

    /// Poll /json/version until the endpoint answers
    async fn wait_for_endpoint(http: &reqwest::Client, endpoint: &str) -> Result<()> {
        let url = format!("{}/json/version", endpoint);
        let deadline = tokio::time::Instant::now() + LAUNCH_TIMEOUT;

        loop {
            match http.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                _ if tokio::time::Instant::now() >= deadline => {
                    return Err(Error::browser_launch(format!(
                        "DevTools endpoint {} did not come up within {:?}",
                        endpoint, LAUNCH_TIMEOUT
                    )));
                }
                _ => tokio::time::sleep(LAUNCH_POLL_INTERVAL).await,
            }
        }
    }
}

#[async_trait]
impl BrowserBackend for ChromiumBackend {
    async fn launch_context(&self, spec: &LaunchSpec) -> Result<Arc<dyn ContextHandle>> {
        let executable = match &spec.executable_path {
            Some(path) => path.clone(),
            None => Self::default_executable()?,
        };

        let port = Self::free_port()?;
        let context_id = uuid::Uuid::new_v4().to_string();
        let user_data_dir = std::env::temp_dir().join(format!("veil-oxide-{}", context_id));
        std::fs::create_dir_all(&user_data_dir)?;

        let args = Self::build_args(spec, port, &user_data_dir);
        info!(
            "Launching {} on port {} (headless: {})",
            executable, port, spec.headless
        );

        let child = Command::new(&executable)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::browser_launch(format!("failed to spawn {}: {}", executable, e))
            })?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::browser_launch(format!("HTTP client: {}", e)))?;

        let endpoint = format!("http://127.0.0.1:{}", port);
        Self::wait_for_endpoint(&http, &endpoint).await?;

        Ok(Arc::new(ChromiumContext {
            id: context_id,
            endpoint,
            http,
            child: Mutex::new(Some(child)),
            user_data_dir,
            slow_mo: Duration::from_millis(spec.slow_mo_ms),
            pages: Mutex::new(Vec::new()),
            init_scripts: Mutex::new(Vec::new()),
            navigated: Arc::new(AtomicBool::new(false)),
            active: AtomicBool::new(true),
        }))
    }
}

/// A running Chromium process seen as one browser context
#[derive(Debug)]
pub struct ChromiumContext {
    id: String,
    /// DevTools HTTP endpoint, e.g. "http://127.0.0.1:9222"
    endpoint: String,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
    user_data_dir: PathBuf,
    slow_mo: Duration,
    pages: Mutex<Vec<Arc<CdpPage>>>,
    init_scripts: Mutex<Vec<String>>,
    navigated: Arc<AtomicBool>,
    active: AtomicBool,
}

impl ChromiumContext {
    /// Create a page target via the /json/new HTTP API and return its
    /// DevTools WebSocket URL
    async fn create_target(&self) -> Result<String> {
        let url = format!("{}/json/new?about:blank", self.endpoint);

        let response = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| Error::websocket(format!("failed to create target: {}", e)))?;

        let target: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::protocol(format!("bad /json/new response: {}", e)))?;

        target
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::protocol("no webSocketDebuggerUrl in /json/new response"))
    }

    /// Any live page connection, for browser-wide commands like cookies
    async fn any_page(&self) -> Result<Arc<CdpPage>> {
        let pages = self.pages.lock().await;
        pages
            .iter()
            .find(|p| p.is_active())
            .cloned()
            .ok_or_else(|| Error::target_closed("context has no open pages"))
    }

    /// Init script that seeds localStorage for persisted origins
    ///
    /// localStorage is origin-scoped and only writable from a document of
    /// that origin, so restoration happens lazily: the script runs in every
    /// new document and fills in the entries recorded for its origin.
    fn local_storage_seed_script(origins: &[OriginState]) -> Result<String> {
        let by_origin: std::collections::HashMap<&str, Vec<(&str, &str)>> = origins
            .iter()
            .map(|o| {
                (
                    o.origin.as_str(),
                    o.local_storage
                        .iter()
                        .map(|e| (e.name.as_str(), e.value.as_str()))
                        .collect(),
                )
            })
            .collect();

        let data = serde_json::to_string(&by_origin)?;
        Ok(format!(
            r#"(function() {{
                const seeds = {data};
                const entries = seeds[location.origin];
                if (!entries) return;
                for (const [key, value] of entries) {{
                    if (localStorage.getItem(key) === null) {{
                        localStorage.setItem(key, value);
                    }}
                }}
            }})();"#,
            data = data
        ))
    }
}

#[async_trait]
impl ContextHandle for ChromiumContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        if !self.is_active() {
            return Err(Error::target_closed("context closed"));
        }

        let ws_url = self.create_target().await?;
        let connection = CdpConnection::connect(&ws_url).await?;

        connection.send_command("Page.enable", serde_json::Value::Null).await?;
        connection
            .send_command("Runtime.enable", serde_json::Value::Null)
            .await?;

        let page = Arc::new(CdpPage::new(
            connection,
            Arc::clone(&self.navigated),
            self.slow_mo,
        ));

        // Scripts registered before this page was opened still apply to it.
        for script in self.init_scripts.lock().await.iter() {
            page.add_init_script(script).await?;
        }

        self.pages.lock().await.push(Arc::clone(&page));
        debug!("Opened page {} in context {}", page.id(), self.id);
        Ok(page)
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.init_scripts.lock().await.push(source.to_string());

        for page in self.pages.lock().await.iter() {
            page.add_init_script(source).await?;
        }
        Ok(())
    }

    fn has_navigated(&self) -> bool {
        self.navigated.load(Ordering::SeqCst)
    }

    async fn storage_state(&self) -> Result<StorageSnapshot> {
        let page = self.any_page().await?;

        let result = page
            .send_command("Network.getAllCookies", serde_json::Value::Null)
            .await?;

        let mut cookies = Vec::new();
        if let Some(raw) = result.get("cookies").and_then(|v| v.as_array()) {
            for cookie in raw {
                cookies.push(Cookie {
                    name: str_field(cookie, "name"),
                    value: str_field(cookie, "value"),
                    domain: str_field(cookie, "domain"),
                    path: str_field(cookie, "path"),
                    expires: cookie
                        .get("expires")
                        .and_then(|v| v.as_f64())
                        .filter(|e| *e >= 0.0),
                    http_only: bool_field(cookie, "httpOnly"),
                    secure: bool_field(cookie, "secure"),
                    same_site: cookie
                        .get("sameSite")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                });
            }
        }

        // localStorage can only be read from a document of the owning
        // origin; capture what the open pages can see.
        let mut origins: Vec<OriginState> = Vec::new();
        for page in self.pages.lock().await.iter().filter(|p| p.is_active()) {
            let value = page
                .evaluate(
                    r#"(() => {
                        try {
                            if (location.origin === 'null') return null;
                            return { origin: location.origin, entries: Object.entries(localStorage) };
                        } catch (e) {
                            return null;
                        }
                    })()"#,
                )
                .await?;

            let Some(origin) = value.get("origin").and_then(|v| v.as_str()) else {
                continue;
            };
            if origins.iter().any(|o| o.origin == origin) {
                continue;
            }

            let local_storage = value
                .get("entries")
                .and_then(|v| v.as_array())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|pair| {
                            let name = pair.get(0)?.as_str()?.to_string();
                            let value = pair.get(1)?.as_str()?.to_string();
                            Some(LocalStorageEntry { name, value })
                        })
                        .collect()
                })
                .unwrap_or_default();

            origins.push(OriginState {
                origin: origin.to_string(),
                local_storage,
            });
        }

        Ok(StorageSnapshot { cookies, origins })
    }

    async fn set_storage_state(&self, state: &StorageSnapshot) -> Result<()> {
        if !state.cookies.is_empty() {
            let cookies: Vec<serde_json::Value> = state
                .cookies
                .iter()
                .map(|c| {
                    let mut cookie = serde_json::json!({
                        "name": c.name,
                        "value": c.value,
                        "domain": c.domain,
                        "path": c.path,
                        "httpOnly": c.http_only,
                        "secure": c.secure,
                    });
                    if let Some(expires) = c.expires {
                        cookie["expires"] = serde_json::json!(expires);
                    }
                    if let Some(same_site) = &c.same_site {
                        cookie["sameSite"] = serde_json::json!(same_site);
                    }
                    cookie
                })
                .collect();

            let page = self.any_page().await?;
            page.send_command(
                "Network.setCookies",
                serde_json::json!({ "cookies": cookies }),
            )
            .await?;
        }

        if !state.origins.is_empty() {
            let script = Self::local_storage_seed_script(&state.origins)?;
            self.add_init_script(&script).await?;
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.active.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        for page in self.pages.lock().await.drain(..) {
            if let Err(e) = page.close().await {
                debug!("Page close during context shutdown: {}", e);
            }
        }

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill browser process: {}", e);
            }
        }

        if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
            debug!("Could not remove user data dir: {}", e);
        }

        info!("Closed context {}", self.id);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

fn str_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

fn bool_field(value: &serde_json::Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_reflect_the_spec() {
        let spec = LaunchSpec {
            headless: true,
            proxy: Some("http://10.0.0.1:3128".to_string()),
            user_agent: Some("UA".to_string()),
            viewport_width: 1280,
            viewport_height: 720,
            ignore_https_errors: true,
            ..Default::default()
        };

        let dir = PathBuf::from("/tmp/profile");
        let args = ChromiumBackend::build_args(&spec, 9333, &dir);

        assert!(args.contains(&"--remote-debugging-port=9333".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--proxy-server=http://10.0.0.1:3128".to_string()));
        assert!(args.contains(&"--user-agent=UA".to_string()));
        assert!(args.contains(&"--window-size=1280,720".to_string()));
        assert!(args.contains(&"--ignore-certificate-errors".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
    }

    #[test]
    fn headful_launch_omits_headless_flag() {
        let spec = LaunchSpec {
            headless: false,
            viewport_width: 1920,
            viewport_height: 1080,
            ..Default::default()
        };

        let dir = PathBuf::from("/tmp/profile");
        let args = ChromiumBackend::build_args(&spec, 9333, &dir);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.iter().any(|a| a.starts_with("--proxy-server")));
    }

    #[test]
    fn seed_script_covers_every_origin() {
        let origins = vec![OriginState {
            origin: "https://example.com".to_string(),
            local_storage: vec![LocalStorageEntry {
                name: "token".to_string(),
                value: "abc".to_string(),
            }],
        }];

        let script = ChromiumContext::local_storage_seed_script(&origins).unwrap();
        assert!(script.contains("https://example.com"));
        assert!(script.contains("token"));
        assert!(script.contains("localStorage.setItem"));
    }
}
