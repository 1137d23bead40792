//! Browser backend boundary
//!
//! The session controller never talks to a protocol client directly; it
//! depends on the narrow capability traits defined here. `cdp` provides the
//! real Chrome DevTools Protocol implementation, `mock` an in-process fake
//! for tests and downstream test doubles.

pub mod cdp;
pub mod mock;

use crate::storage::StorageSnapshot;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Launch parameters for one browser context
///
/// Assembled by the session controller from its configuration and the
/// identity acquired for the session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchSpec {
    /// Headless mode
    pub headless: bool,
    /// Proxy server in `scheme://host:port` form, if any
    pub proxy: Option<String>,
    /// User agent override, if any
    pub user_agent: Option<String>,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Ignore HTTPS certificate errors
    pub ignore_https_errors: bool,
    /// Artificial per-operation delay in milliseconds
    pub slow_mo_ms: u64,
    /// Browser executable path override
    pub executable_path: Option<String>,
}

/// Page load completion condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// Navigation options
#[derive(Debug, Clone)]
pub struct NavigateOptions {
    /// Timeout for the whole navigation
    pub timeout: Duration,
    /// Completion condition
    pub wait_until: WaitUntil,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            wait_until: WaitUntil::Load,
        }
    }
}

/// Screenshot options
#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    pub format: ScreenshotFormat,
    pub full_page: bool,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            format: ScreenshotFormat::Png,
            full_page: false,
        }
    }
}

/// Screenshot image format
#[derive(Debug, Clone, Copy, Default)]
pub enum ScreenshotFormat {
    #[default]
    Png,
    /// JPEG with quality 0-100
    Jpeg(u8),
}

/// Raw mouse event dispatched at a page
#[derive(Debug, Clone)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub x: f64,
    pub y: f64,
    /// Wheel delta for `Wheel` events, CSS pixels, positive scrolls down
    pub delta_y: f64,
}

/// Mouse event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Moved,
    Pressed,
    Released,
    Wheel,
}

impl MouseEvent {
    /// Pointer move event
    pub fn moved(x: f64, y: f64) -> Self {
        Self {
            kind: MouseEventKind::Moved,
            x,
            y,
            delta_y: 0.0,
        }
    }

    /// Left button press
    pub fn pressed(x: f64, y: f64) -> Self {
        Self {
            kind: MouseEventKind::Pressed,
            x,
            y,
            delta_y: 0.0,
        }
    }

    /// Left button release
    pub fn released(x: f64, y: f64) -> Self {
        Self {
            kind: MouseEventKind::Released,
            x,
            y,
            delta_y: 0.0,
        }
    }

    /// Wheel scroll at the given position
    pub fn wheel(x: f64, y: f64, delta_y: f64) -> Self {
        Self {
            kind: MouseEventKind::Wheel,
            x,
            y,
            delta_y,
        }
    }
}

/// Raw key event dispatched at the focused element
#[derive(Debug, Clone)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    /// DOM key value ("a", "Backspace", ...)
    pub key: String,
    /// Text produced by the key, for printable characters
    pub text: Option<String>,
}

/// Key event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    Down,
    Up,
}

impl KeyEvent {
    /// Down+text event for a printable character
    pub fn char_down(ch: char) -> Self {
        Self {
            kind: KeyEventKind::Down,
            key: ch.to_string(),
            text: Some(ch.to_string()),
        }
    }

    /// Up event for a printable character
    pub fn char_up(ch: char) -> Self {
        Self {
            kind: KeyEventKind::Up,
            key: ch.to_string(),
            text: None,
        }
    }

    /// Backspace down event
    pub fn backspace_down() -> Self {
        Self {
            kind: KeyEventKind::Down,
            key: "Backspace".to_string(),
            text: None,
        }
    }

    /// Backspace up event
    pub fn backspace_up() -> Self {
        Self {
            kind: KeyEventKind::Up,
            key: "Backspace".to_string(),
            text: None,
        }
    }
}

/// Browser backend trait
///
/// The single entry point the session controller uses to obtain browser
/// resources. Swapping automation backends means providing another
/// implementation of this trait.
#[async_trait]
pub trait BrowserBackend: Send + Sync + std::fmt::Debug {
    /// Launch a browser context configured per `spec`
    ///
    /// Fails with `Error::BrowserLaunch` when the underlying browser process
    /// cannot start; that failure is fatal for the session.
    async fn launch_context(&self, spec: &LaunchSpec) -> Result<Arc<dyn ContextHandle>>;
}

/// A launched browser context
///
/// Owned exclusively by one session for its lifetime.
#[async_trait]
pub trait ContextHandle: Send + Sync + std::fmt::Debug {
    /// Context ID
    fn id(&self) -> &str;

    /// Open a new page in this context
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>>;

    /// Register a script evaluated in every new document before page scripts
    async fn add_init_script(&self, source: &str) -> Result<()>;

    /// Whether any page in this context has navigated yet
    fn has_navigated(&self) -> bool;

    /// Read cookies and per-origin local storage from the live context
    async fn storage_state(&self) -> Result<StorageSnapshot>;

    /// Seed cookies and local storage; call before first navigation
    async fn set_storage_state(&self, state: &StorageSnapshot) -> Result<()>;

    /// Release the context and its browser resources
    async fn close(&self) -> Result<()>;

    /// Whether the context is still usable
    fn is_active(&self) -> bool;
}

/// A page within a context
#[async_trait]
pub trait PageHandle: Send + Sync + std::fmt::Debug {
    /// Page ID
    fn id(&self) -> &str;

    /// Navigate to `url` and wait for the configured load condition
    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<()>;

    /// Click the element matched by `selector`
    async fn click(&self, selector: &str) -> Result<()>;

    /// Replace the value of the element matched by `selector`
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    /// Focus the element matched by `selector`
    async fn focus(&self, selector: &str) -> Result<()>;

    /// Evaluate JavaScript and return the JSON result value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Current value of the input matched by `selector`
    async fn input_value(&self, selector: &str) -> Result<String>;

    /// Viewport-relative center point of the element matched by `selector`
    async fn element_center(&self, selector: &str) -> Result<(f64, f64)>;

    /// Dispatch a raw mouse event
    async fn dispatch_mouse(&self, event: &MouseEvent) -> Result<()>;

    /// Dispatch a raw key event at the focused element
    async fn dispatch_key(&self, event: &KeyEvent) -> Result<()>;

    /// Current vertical scroll offset
    async fn scroll_offset(&self) -> Result<f64>;

    /// Capture a screenshot
    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>>;

    /// Close the page
    async fn close(&self) -> Result<()>;
}
