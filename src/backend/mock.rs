//! Mock browser backend for tests
//!
//! An in-process fake of the backend traits. It records every launch, keeps
//! a key-event-driven input-field model per page, and supports scripted
//! failure sequences per operation so retry behavior can be tested
//! deterministically.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::{
    BrowserBackend, ContextHandle, KeyEvent, KeyEventKind, LaunchSpec, MouseEvent,
    MouseEventKind, NavigateOptions, PageHandle, ScreenshotOptions,
};
use crate::storage::StorageSnapshot;
use crate::{Error, Result};

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

/// Scripted failures, keyed by operation name
///
/// Queued failures fire once each, in order; an "always" entry fires on
/// every call once the queue is drained. A stall entry delays the operation
/// before the failure check so per-call timeouts can be exercised.
#[derive(Default)]
struct FailureScript {
    queued: Mutex<HashMap<String, VecDeque<ErrorFactory>>>,
    always: Mutex<HashMap<String, ErrorFactory>>,
    stalls: Mutex<HashMap<String, std::time::Duration>>,
}

impl FailureScript {
    fn take(&self, operation: &str) -> Option<Error> {
        if let Some(queue) = self.queued.lock().unwrap().get_mut(operation) {
            if let Some(factory) = queue.pop_front() {
                return Some(factory());
            }
        }

        self.always
            .lock()
            .unwrap()
            .get(operation)
            .map(|factory| factory())
    }

    async fn gate(&self, operation: &str) -> Result<()> {
        let stall = self.stalls.lock().unwrap().get(operation).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        match self.take(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FailureScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureScript").finish_non_exhaustive()
    }
}

/// Mock backend
#[derive(Debug, Default)]
pub struct MockBackend {
    launches: Mutex<Vec<LaunchSpec>>,
    contexts: Mutex<Vec<Arc<MockContext>>>,
    failures: Arc<FailureScript>,
}

impl MockBackend {
    /// Create a new mock backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `times` one-shot failures for `operation`
    ///
    /// Operation names: `launch`, `new_page`, `goto`, `click`, `fill`,
    /// `evaluate`, `screenshot`.
    pub fn fail_next<F>(&self, operation: &str, times: usize, factory: F)
    where
        F: Fn() -> Error + Send + Sync + Clone + 'static,
    {
        let mut queued = self.failures.queued.lock().unwrap();
        let queue = queued.entry(operation.to_string()).or_default();
        for _ in 0..times {
            let factory = factory.clone();
            queue.push_back(Box::new(factory));
        }
    }

    /// Make every call to `operation` fail
    pub fn fail_always<F>(&self, operation: &str, factory: F)
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        self.failures
            .always
            .lock()
            .unwrap()
            .insert(operation.to_string(), Box::new(factory));
    }

    /// Make every call to `operation` sleep for `delay` before completing
    pub fn stall(&self, operation: &str, delay: std::time::Duration) {
        self.failures
            .stalls
            .lock()
            .unwrap()
            .insert(operation.to_string(), delay);
    }

    /// Launch specs recorded so far, in launch order
    pub fn launched_specs(&self) -> Vec<LaunchSpec> {
        self.launches.lock().unwrap().clone()
    }

    /// Init scripts registered on the given context
    pub fn init_scripts(&self, context_id: &str) -> Vec<String> {
        self.contexts
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == context_id)
            .map(|c| c.init_scripts.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// The most recently launched mock context, if any
    pub fn last_context(&self) -> Option<Arc<MockContext>> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl BrowserBackend for MockBackend {
    async fn launch_context(&self, spec: &LaunchSpec) -> Result<Arc<dyn ContextHandle>> {
        if let Some(error) = self.failures.take("launch") {
            return Err(error);
        }

        self.launches.lock().unwrap().push(spec.clone());

        let context = Arc::new(MockContext {
            id: uuid::Uuid::new_v4().to_string(),
            init_scripts: Mutex::new(Vec::new()),
            navigated: Arc::new(AtomicBool::new(false)),
            active: AtomicBool::new(true),
            storage: Mutex::new(StorageSnapshot::default()),
            pages: Mutex::new(Vec::new()),
            failures: Arc::clone(&self.failures),
        });

        self.contexts.lock().unwrap().push(Arc::clone(&context));
        Ok(context)
    }
}

/// Mock browser context
#[derive(Debug)]
pub struct MockContext {
    id: String,
    init_scripts: Mutex<Vec<String>>,
    navigated: Arc<AtomicBool>,
    active: AtomicBool,
    storage: Mutex<StorageSnapshot>,
    pages: Mutex<Vec<Arc<MockPage>>>,
    failures: Arc<FailureScript>,
}

impl MockContext {
    /// Seed the storage state the context will report
    pub fn seed_storage(&self, snapshot: StorageSnapshot) {
        *self.storage.lock().unwrap() = snapshot;
    }

    /// The pages opened in this context, in creation order
    pub fn pages(&self) -> Vec<Arc<MockPage>> {
        self.pages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContextHandle for MockContext {
    fn id(&self) -> &str {
        &self.id
    }

    async fn new_page(&self) -> Result<Arc<dyn PageHandle>> {
        if let Some(error) = self.failures.take("new_page") {
            return Err(error);
        }
        if !self.is_active() {
            return Err(Error::target_closed("context closed"));
        }

        let page = Arc::new(MockPage {
            id: uuid::Uuid::new_v4().to_string(),
            context_navigated: Arc::clone(&self.navigated),
            navigations: Mutex::new(Vec::new()),
            navigate_options: Mutex::new(Vec::new()),
            elements: Mutex::new(HashMap::new()),
            focused: Mutex::new(None),
            scroll_y: Mutex::new(0.0),
            mouse_events: Mutex::new(Vec::new()),
            failures: Arc::clone(&self.failures),
        });

        self.pages.lock().unwrap().push(Arc::clone(&page));
        Ok(page)
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.init_scripts.lock().unwrap().push(source.to_string());
        Ok(())
    }

    fn has_navigated(&self) -> bool {
        self.navigated.load(Ordering::SeqCst)
    }

    async fn storage_state(&self) -> Result<StorageSnapshot> {
        Ok(self.storage.lock().unwrap().clone())
    }

    async fn set_storage_state(&self, state: &StorageSnapshot) -> Result<()> {
        *self.storage.lock().unwrap() = state.clone();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// A registered element on a mock page
#[derive(Debug, Clone, Default)]
struct MockElement {
    center: (f64, f64),
    value: String,
}

/// Mock page
#[derive(Debug)]
pub struct MockPage {
    id: String,
    context_navigated: Arc<AtomicBool>,
    navigations: Mutex<Vec<String>>,
    navigate_options: Mutex<Vec<NavigateOptions>>,
    elements: Mutex<HashMap<String, MockElement>>,
    focused: Mutex<Option<String>>,
    scroll_y: Mutex<f64>,
    mouse_events: Mutex<Vec<MouseEvent>>,
    failures: Arc<FailureScript>,
}

impl MockPage {
    /// Register an element so selector-based operations can find it
    pub fn register_element(&self, selector: &str, center: (f64, f64)) {
        self.elements.lock().unwrap().insert(
            selector.to_string(),
            MockElement {
                center,
                value: String::new(),
            },
        );
    }

    /// URLs navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// Options each navigation was issued with, in order
    pub fn navigate_options(&self) -> Vec<NavigateOptions> {
        self.navigate_options.lock().unwrap().clone()
    }

    /// Mouse events dispatched at this page, in order
    pub fn mouse_events(&self) -> Vec<MouseEvent> {
        self.mouse_events.lock().unwrap().clone()
    }

    fn with_element<T>(&self, selector: &str, f: impl FnOnce(&mut MockElement) -> T) -> Result<T> {
        let mut elements = self.elements.lock().unwrap();
        match elements.get_mut(selector) {
            Some(element) => Ok(f(element)),
            None => Err(Error::element_not_found(selector)),
        }
    }
}

#[async_trait]
impl PageHandle for MockPage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn goto(&self, url: &str, options: &NavigateOptions) -> Result<()> {
        self.failures.gate("goto").await?;

        self.navigations.lock().unwrap().push(url.to_string());
        self.navigate_options.lock().unwrap().push(options.clone());
        self.context_navigated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        self.failures.gate("click").await?;
        self.with_element(selector, |_| ())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        self.failures.gate("fill").await?;
        self.with_element(selector, |element| {
            element.value = value.to_string();
        })
    }

    async fn focus(&self, selector: &str) -> Result<()> {
        self.with_element(selector, |_| ())?;
        *self.focused.lock().unwrap() = Some(selector.to_string());
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<serde_json::Value> {
        self.failures.gate("evaluate").await?;
        Ok(serde_json::Value::Null)
    }

    async fn input_value(&self, selector: &str) -> Result<String> {
        self.with_element(selector, |element| element.value.clone())
    }

    async fn element_center(&self, selector: &str) -> Result<(f64, f64)> {
        self.with_element(selector, |element| element.center)
    }

    async fn dispatch_mouse(&self, event: &MouseEvent) -> Result<()> {
        if event.kind == MouseEventKind::Wheel {
            *self.scroll_y.lock().unwrap() += event.delta_y;
        }
        self.mouse_events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn dispatch_key(&self, event: &KeyEvent) -> Result<()> {
        // Only key-down events mutate the focused field, matching how
        // browsers apply input.
        if event.kind != KeyEventKind::Down {
            return Ok(());
        }

        let focused = self.focused.lock().unwrap().clone();
        let selector = match focused {
            Some(selector) => selector,
            None => return Ok(()),
        };

        self.with_element(&selector, |element| {
            if event.key == "Backspace" {
                element.value.pop();
            } else if let Some(text) = &event.text {
                element.value.push_str(text);
            }
        })
    }

    async fn scroll_offset(&self) -> Result<f64> {
        Ok(*self.scroll_y.lock().unwrap())
    }

    async fn screenshot(&self, _options: &ScreenshotOptions) -> Result<Vec<u8>> {
        self.failures.gate("screenshot").await?;
        // Minimal PNG signature is enough for callers that sniff the format.
        Ok(vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A])
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn launch_records_specs() {
        let backend = MockBackend::new();
        let spec = LaunchSpec {
            proxy: Some("http://proxy:8080".to_string()),
            ..Default::default()
        };

        backend.launch_context(&spec).await.unwrap();
        backend
            .launch_context(&LaunchSpec::default())
            .await
            .unwrap();

        let specs = backend.launched_specs();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(specs[1].proxy, None);
    }

    #[tokio::test]
    async fn scripted_failures_fire_in_order() {
        let backend = MockBackend::new();
        backend.fail_next("goto", 2, || Error::timeout("goto"));

        let ctx = backend
            .launch_context(&LaunchSpec::default())
            .await
            .unwrap();
        let page = ctx.new_page().await.unwrap();

        assert!(page.goto("https://a", &Default::default()).await.is_err());
        assert!(page.goto("https://a", &Default::default()).await.is_err());
        assert!(page.goto("https://a", &Default::default()).await.is_ok());
    }

    #[tokio::test]
    async fn stalls_delay_the_operation() {
        let backend = MockBackend::new();
        backend.stall("evaluate", std::time::Duration::from_millis(30));

        let ctx = backend
            .launch_context(&LaunchSpec::default())
            .await
            .unwrap();
        let page = ctx.new_page().await.unwrap();

        let start = std::time::Instant::now();
        page.evaluate("1 + 1").await.unwrap();
        assert!(start.elapsed() >= std::time::Duration::from_millis(30));
    }

    #[tokio::test]
    async fn key_events_drive_the_input_model() {
        let backend = MockBackend::new();
        backend
            .launch_context(&LaunchSpec::default())
            .await
            .unwrap();
        let ctx = backend.last_context().unwrap();
        ctx.new_page().await.unwrap();
        let page = ctx.pages().into_iter().next().unwrap();

        page.register_element("#name", (10.0, 10.0));
        page.focus("#name").await.unwrap();
        for ch in "hi".chars() {
            page.dispatch_key(&KeyEvent::char_down(ch)).await.unwrap();
            page.dispatch_key(&KeyEvent::char_up(ch)).await.unwrap();
        }
        page.dispatch_key(&KeyEvent::backspace_down()).await.unwrap();

        assert_eq!(page.input_value("#name").await.unwrap(), "h");
    }

    #[tokio::test]
    async fn storage_state_round_trips() {
        let backend = MockBackend::new();
        let ctx = backend
            .launch_context(&LaunchSpec::default())
            .await
            .unwrap();

        let snapshot = StorageSnapshot {
            cookies: vec![crate::storage::Cookie {
                name: "sid".to_string(),
                value: "abc".to_string(),
                domain: "example.com".to_string(),
                path: "/".to_string(),
                expires: None,
                http_only: true,
                secure: true,
                same_site: Some("Lax".to_string()),
            }],
            origins: Vec::new(),
        };

        ctx.set_storage_state(&snapshot).await.unwrap();
        assert_eq!(ctx.storage_state().await.unwrap(), snapshot);
    }
}
