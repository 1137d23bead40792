//! Page-level DevTools operations

use super::connection::CdpConnection;
use super::types::EvaluateResponse;
use crate::backend::{
    KeyEvent, KeyEventKind, MouseEvent, MouseEventKind, NavigateOptions, PageHandle,
    ScreenshotFormat, ScreenshotOptions, WaitUntil,
};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const READY_STATE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Quiet period after load for the network-idle condition
const NETWORK_IDLE_GRACE: Duration = Duration::from_millis(500);

/// A page driven over its own DevTools connection
#[derive(Debug)]
pub struct CdpPage {
    id: String,
    connection: Arc<CdpConnection>,
    /// Context-wide navigation flag, shared with the owning context
    context_navigated: Arc<AtomicBool>,
    slow_mo: Duration,
}

impl CdpPage {
    pub(super) fn new(
        connection: Arc<CdpConnection>,
        context_navigated: Arc<AtomicBool>,
        slow_mo: Duration,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            connection,
            context_navigated,
            slow_mo,
        }
    }

    /// Raw command passthrough for context-level callers
    pub(super) async fn send_command(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.connection.send_command(method, params).await
    }

    pub(super) fn is_active(&self) -> bool {
        self.connection.is_active()
    }

    /// Register a script evaluated in every new document of this target
    pub(super) async fn add_init_script(&self, source: &str) -> Result<()> {
        self.connection
            .send_command(
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": source }),
            )
            .await?;
        Ok(())
    }

    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    /// Evaluate an expression expected to locate an element
    ///
    /// The script must return `null` when the selector matches nothing; that
    /// is translated to `ElementNotFound` here so every selector-based
    /// operation reports misses the same way.
    async fn evaluate_on_element(
        &self,
        selector: &str,
        script: String,
    ) -> Result<serde_json::Value> {
        let value = self.evaluate(&script).await?;
        if value.is_null() {
            return Err(Error::element_not_found(selector));
        }
        Ok(value)
    }

    /// Poll document.readyState until the wait condition is met
    async fn wait_for_load(&self, options: &NavigateOptions) -> Result<()> {
        let accept_interactive = options.wait_until == WaitUntil::DomContentLoaded;
        let deadline = tokio::time::Instant::now() + options.timeout;

        loop {
            match self.evaluate("document.readyState").await {
                Ok(value) => {
                    let state = value.as_str().unwrap_or("");
                    if state == "complete" || (accept_interactive && state == "interactive") {
                        break;
                    }
                }
                // The document may be mid-swap; keep polling until deadline.
                Err(e) => debug!("readyState poll: {}", e),
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::timeout(format!(
                    "navigation did not reach {:?} within {:?}",
                    options.wait_until, options.timeout
                )));
            }
            tokio::time::sleep(READY_STATE_POLL_INTERVAL).await;
        }

        if options.wait_until == WaitUntil::NetworkIdle {
            tokio::time::sleep(NETWORK_IDLE_GRACE).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<()> {
        self.pace().await;
        debug!("Navigating page {} to {}", self.id, url);

        let result = self
            .connection
            .send_command("Page.navigate", serde_json::json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(Error::Navigation(format!("{}: {}", url, error_text)));
            }
        }

        self.context_navigated.store(true, Ordering::SeqCst);
        self.wait_for_load(options).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.pace().await;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                el.click();
                return true;
            }})()"#,
            sel = serde_json::json!(selector),
        );
        self.evaluate_on_element(selector, script).await?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.pace().await;
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                el.value = {val};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = serde_json::json!(selector),
            val = serde_json::json!(value),
        );
        self.evaluate_on_element(selector, script).await?;
        Ok(())
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                el.focus();
                return true;
            }})()"#,
            sel = serde_json::json!(selector),
        );
        self.evaluate_on_element(selector, script).await?;
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .connection
            .send_command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": script,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        let response: EvaluateResponse = serde_json::from_value(result)?;
        if let Some(exception) = response.exception_details {
            let description = exception
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .unwrap_or("unknown script error");
            return Err(Error::ScriptExecution(description.to_string()));
        }

        Ok(response.result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                return {{ value: el.value ?? '' }};
            }})()"#,
            sel = serde_json::json!(selector),
        );
        let value = self.evaluate_on_element(selector, script).await?;
        Ok(value
            .get("value")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                return [r.left + r.width / 2, r.top + r.height / 2];
            }})()"#,
            sel = serde_json::json!(selector),
        );
        let value = self.evaluate_on_element(selector, script).await?;

        let point = value
            .as_array()
            .and_then(|a| Some((a.first()?.as_f64()?, a.get(1)?.as_f64()?)))
            .ok_or_else(|| Error::protocol("malformed element center"))?;
        Ok(point)
    }

    async fn dispatch_mouse(&self, event: &MouseEvent) -> Result<()> {
        let kind = match event.kind {
            MouseEventKind::Moved => "mouseMoved",
            MouseEventKind::Pressed => "mousePressed",
            MouseEventKind::Released => "mouseReleased",
            MouseEventKind::Wheel => "mouseWheel",
        };

        let mut params = serde_json::json!({
            "type": kind,
            "x": event.x,
            "y": event.y,
        });
        match event.kind {
            MouseEventKind::Pressed | MouseEventKind::Released => {
                params["button"] = serde_json::json!("left");
                params["clickCount"] = serde_json::json!(1);
            }
            MouseEventKind::Wheel => {
                params["deltaX"] = serde_json::json!(0.0);
                params["deltaY"] = serde_json::json!(event.delta_y);
            }
            MouseEventKind::Moved => {}
        }

        self.connection
            .send_command("Input.dispatchMouseEvent", params)
            .await?;
        Ok(())
    }

    async fn dispatch_key(&self, event: &KeyEvent) -> Result<()> {
        let kind = match event.kind {
            KeyEventKind::Down => "keyDown",
            KeyEventKind::Up => "keyUp",
        };

        let mut params = serde_json::json!({
            "type": kind,
            "key": event.key,
        });
        if let Some(text) = &event.text {
            params["text"] = serde_json::json!(text);
        }

        self.connection
            .send_command("Input.dispatchKeyEvent", params)
            .await?;
        Ok(())
    }

    async fn scroll_offset(&self) -> Result<f64> {
        let value = self.evaluate("window.scrollY").await?;
        Ok(value.as_f64().unwrap_or(0.0))
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>> {
        self.pace().await;

        let mut params = match options.format {
            ScreenshotFormat::Png => serde_json::json!({ "format": "png" }),
            ScreenshotFormat::Jpeg(quality) => {
                serde_json::json!({ "format": "jpeg", "quality": quality.min(100) })
            }
        };
        if options.full_page {
            params["captureBeyondViewport"] = serde_json::json!(true);
        }

        let result = self
            .connection
            .send_command("Page.captureScreenshot", params)
            .await?;

        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::protocol("no data in screenshot result"))?;

        BASE64
            .decode(data)
            .map_err(|e| Error::protocol(format!("bad screenshot payload: {}", e)))
    }

    async fn close(&self) -> Result<()> {
        if !self.connection.is_active() {
            return Ok(());
        }
        // Page.close tears the target down; the connection drops with it.
        let _ = self
            .connection
            .send_command("Page.close", serde_json::Value::Null)
            .await;
        self.connection.close().await
    }
}
