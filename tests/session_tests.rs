//! End-to-end session tests over the mock backend
//!
//! These validate complete workflows: identity rotation across sessions,
//! retry exhaustion timing, human-like input fidelity, and storage
//! persistence through the controller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use veil_oxide::backend::mock::MockBackend;
use veil_oxide::config::IdentityConfig;
use veil_oxide::storage::{Cookie, StorageSnapshot};
use veil_oxide::{Error, IdentityPool, PageHandle, SessionConfig, SessionController};

fn identity(host: &str, ua: &str) -> IdentityConfig {
    IdentityConfig {
        proxy: format!("http://{}:8080", host),
        user_agent: ua.to_string(),
    }
}

fn fast_config() -> SessionConfig {
    // Every test builds its config here; subscriber init is idempotent.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    SessionConfig {
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 100,
        retry_budget: 3,
        ..Default::default()
    }
}

#[tokio::test]
async fn banned_identity_never_reaches_the_browser() {
    let pool = Arc::new(
        IdentityPool::from_config(&[
            identity("proxy-good.example.com", "UA-Good"),
            identity("proxy-bad.example.com", "UA-Bad"),
        ])
        .unwrap(),
    );
    let backend = Arc::new(MockBackend::new());

    // Ban one identity up front.
    let banned = loop {
        let candidate = pool.acquire().unwrap();
        if candidate.proxy.host == "proxy-bad.example.com" {
            break candidate;
        }
    };
    pool.ban(&banned, "blocked by target", Duration::from_secs(3600));

    for _ in 0..10 {
        let mut session =
            SessionController::new(fast_config(), Arc::clone(&pool), backend.clone());
        session.start().await.unwrap();
        session.close().await.unwrap();
    }

    let specs = backend.launched_specs();
    assert_eq!(specs.len(), 10);
    for spec in specs {
        assert_eq!(
            spec.proxy.as_deref(),
            Some("http://proxy-good.example.com:8080")
        );
    }
}

#[tokio::test]
async fn all_identities_banned_fails_fast() {
    let pool = Arc::new(
        IdentityPool::from_config(&[identity("proxy-a.example.com", "UA")]).unwrap(),
    );
    let victim = pool.acquire().unwrap();
    pool.ban(&victim, "captcha wall", Duration::from_secs(3600));

    let backend = Arc::new(MockBackend::new());
    let mut session = SessionController::new(fast_config(), pool, backend);

    assert!(matches!(session.start().await, Err(Error::PoolExhausted)));
}

#[tokio::test]
async fn retry_exhaustion_reports_attempts_and_backs_off() {
    let backend = Arc::new(MockBackend::new());
    let mut session = SessionController::new(
        fast_config(),
        Arc::new(IdentityPool::new()),
        backend.clone(),
    );
    session.start().await.unwrap();

    backend.fail_always("goto", || Error::timeout("navigate"));
    let start = Instant::now();
    let result = session.navigate("https://example.com").await;
    let elapsed = start.elapsed();

    match result {
        Err(Error::SessionExhausted { attempts, source }) => {
            // Initial attempt plus the full retry budget.
            assert_eq!(attempts, 4);
            assert!(matches!(*source, Error::Timeout(_)));
        }
        other => panic!("expected SessionExhausted, got {:?}", other),
    }

    // Backoff slept 10 + 20 + 40 ms between attempts.
    assert!(elapsed >= Duration::from_millis(70));
    assert_eq!(session.retry_budget_remaining(), 0);

    session.close().await.unwrap();
}

#[tokio::test]
async fn recovery_within_budget_succeeds() {
    let backend = Arc::new(MockBackend::new());
    let mut session = SessionController::new(
        fast_config(),
        Arc::new(IdentityPool::new()),
        backend.clone(),
    );
    session.start().await.unwrap();

    backend.fail_next("goto", 2, || Error::ConnectionReset("proxy hiccup".into()));
    session.navigate("https://example.com").await.unwrap();
    assert_eq!(session.retry_budget_remaining(), 1);

    let page = backend.last_context().unwrap().pages()[0].clone();
    assert_eq!(page.navigations(), vec!["https://example.com"]);

    session.close().await.unwrap();
}

#[tokio::test]
async fn stalled_interaction_hits_the_per_call_timeout() {
    let backend = Arc::new(MockBackend::new());
    let mut session = SessionController::new(
        fast_config(),
        Arc::new(IdentityPool::new()),
        backend.clone(),
    );
    session.start().await.unwrap();

    let page = backend.last_context().unwrap().pages()[0].clone();
    page.register_element("#go", (50.0, 50.0));
    backend.stall("click", Duration::from_secs(5));

    let result = session.click_with("#go", Duration::from_millis(20)).await;
    match result {
        Err(Error::SessionExhausted { attempts, source }) => {
            assert_eq!(attempts, 4);
            assert!(matches!(*source, Error::Timeout(_)));
        }
        other => panic!("expected SessionExhausted, got {:?}", other),
    }

    session.close().await.unwrap();
}

#[tokio::test]
async fn logical_errors_skip_the_retry_machinery() {
    let backend = Arc::new(MockBackend::new());
    let mut session = SessionController::new(
        fast_config(),
        Arc::new(IdentityPool::new()),
        backend.clone(),
    );
    session.start().await.unwrap();

    let result = session.click("#does-not-exist").await;
    assert!(matches!(result, Err(Error::ElementNotFound(_))));
    // No retries were spent on an error that cannot heal.
    assert_eq!(session.retry_budget_remaining(), 3);

    session.close().await.unwrap();
}

#[tokio::test]
async fn human_like_fill_produces_the_exact_text() {
    let config = SessionConfig {
        human_like: true,
        ..fast_config()
    };
    let backend = Arc::new(MockBackend::new());
    let mut session =
        SessionController::new(config, Arc::new(IdentityPool::new()), backend.clone());
    session.start().await.unwrap();

    let page = backend.last_context().unwrap().pages()[0].clone();
    page.register_element("#search", (200.0, 80.0));

    session.fill("#search", "hello world").await.unwrap();

    // Typed key by key, possibly with corrected errors, but the end state
    // is exact.
    assert_eq!(page.input_value("#search").await.unwrap(), "hello world");

    session.close().await.unwrap();
}

#[tokio::test]
async fn storage_state_survives_a_session_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    let snapshot = StorageSnapshot {
        cookies: vec![Cookie {
            name: "sid".to_string(),
            value: "abc123".to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            expires: None,
            http_only: true,
            secure: true,
            same_site: Some("Lax".to_string()),
        }],
        origins: Vec::new(),
    };
    veil_oxide::storage::save(&snapshot, &path).unwrap();

    let config = SessionConfig {
        storage_state_path: Some(path.clone()),
        ..fast_config()
    };
    let backend = Arc::new(MockBackend::new());
    let mut session =
        SessionController::new(config, Arc::new(IdentityPool::new()), backend.clone());
    session.start().await.unwrap();

    // The context was seeded from the file.
    assert_eq!(session.storage_snapshot().await.unwrap(), snapshot);

    // Persisting writes the same state back out.
    std::fs::remove_file(&path).unwrap();
    session.save_storage().await.unwrap();
    assert_eq!(veil_oxide::storage::load(&path).unwrap(), snapshot);

    session.close().await.unwrap();
}

#[tokio::test]
async fn corrupt_snapshot_aborts_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{ definitely not json").unwrap();

    let config = SessionConfig {
        storage_state_path: Some(path),
        ..fast_config()
    };
    let backend = Arc::new(MockBackend::new());
    let mut session = SessionController::new(config, Arc::new(IdentityPool::new()), backend);

    let result = session.start().await;
    assert!(matches!(result, Err(Error::CorruptSnapshot(_))));
}

#[tokio::test]
async fn banning_mid_session_redirects_the_next_session() {
    let pool = Arc::new(
        IdentityPool::from_config(&[
            identity("proxy-a.example.com", "UA-A"),
            identity("proxy-b.example.com", "UA-B"),
        ])
        .unwrap(),
    );
    let backend = Arc::new(MockBackend::new());

    let mut first = SessionController::new(fast_config(), Arc::clone(&pool), backend.clone());
    first.start().await.unwrap();
    let used_host = first.identity().unwrap().proxy.host.clone();
    first.ban_current_identity("403 wall", Duration::from_secs(3600));
    first.close().await.unwrap();

    // Every subsequent session avoids the banned identity.
    for _ in 0..5 {
        let mut next =
            SessionController::new(fast_config(), Arc::clone(&pool), backend.clone());
        next.start().await.unwrap();
        assert_ne!(next.identity().unwrap().proxy.host, used_host);
        next.close().await.unwrap();
    }
}
