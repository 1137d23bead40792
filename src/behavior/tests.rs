//! Behavior simulator tests

use super::{HumanBehavior, MouseMoveOptions, ScrollOptions, TypingOptions};
use crate::backend::mock::{MockBackend, MockPage};
use crate::backend::{BrowserBackend, ContextHandle, LaunchSpec, MouseEventKind, PageHandle};
use std::sync::Arc;

async fn mock_page() -> Arc<MockPage> {
    let backend = MockBackend::new();
    let ctx = backend
        .launch_context(&LaunchSpec::default())
        .await
        .unwrap();
    ctx.new_page().await.unwrap();
    backend
        .last_context()
        .unwrap()
        .pages()
        .into_iter()
        .next()
        .unwrap()
}

fn fast_move() -> MouseMoveOptions {
    MouseMoveOptions {
        duration_ms: 10,
        ..Default::default()
    }
}

#[tokio::test]
async fn mouse_path_is_curved_not_teleported() {
    let page = mock_page().await;
    let behavior = HumanBehavior::new();

    behavior
        .move_mouse(page.as_ref(), (300.0, 200.0), &fast_move())
        .await
        .unwrap();

    let moves: Vec<_> = page
        .mouse_events()
        .into_iter()
        .filter(|e| e.kind == MouseEventKind::Moved)
        .collect();

    // Many intermediate points, ending exactly at the target.
    assert!(moves.len() > 10);
    let last = moves.last().unwrap();
    assert!((last.x - 300.0).abs() < 1e-6);
    assert!((last.y - 200.0).abs() < 1e-6);

    // Eased sampling means steps are not uniformly spaced.
    let d = |a: &crate::backend::MouseEvent, b: &crate::backend::MouseEvent| {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    };
    let first_step = d(&moves[0], &moves[1]);
    let mid_step = d(&moves[moves.len() / 2 - 1], &moves[moves.len() / 2]);
    assert!(mid_step > first_step);
}

#[tokio::test]
async fn consecutive_moves_chain_from_last_position() {
    let page = mock_page().await;
    let behavior = HumanBehavior::new();

    behavior
        .move_mouse(page.as_ref(), (100.0, 100.0), &fast_move())
        .await
        .unwrap();
    behavior
        .move_mouse(page.as_ref(), (50.0, 50.0), &fast_move())
        .await
        .unwrap();

    let moves: Vec<_> = page
        .mouse_events()
        .into_iter()
        .filter(|e| e.kind == MouseEventKind::Moved)
        .collect();

    // Both paths emit the same number of points; the second starts exactly
    // where the first ended.
    assert_eq!(moves.len() % 2, 0);
    let start_of_second = &moves[moves.len() / 2];
    assert!((start_of_second.x - 100.0).abs() < 1e-6);
    assert!((start_of_second.y - 100.0).abs() < 1e-6);
}

#[tokio::test]
async fn click_moves_then_presses_and_releases_at_center() {
    let page = mock_page().await;
    page.register_element("#submit", (320.0, 240.0));

    let behavior = HumanBehavior::new();
    behavior
        .click(page.as_ref(), "#submit", &fast_move())
        .await
        .unwrap();

    let events = page.mouse_events();
    let pressed = events
        .iter()
        .position(|e| e.kind == MouseEventKind::Pressed)
        .unwrap();
    let released = events
        .iter()
        .position(|e| e.kind == MouseEventKind::Released)
        .unwrap();

    assert!(pressed < released);
    assert!((events[pressed].x - 320.0).abs() < 1e-6);
    assert!((events[pressed].y - 240.0).abs() < 1e-6);
    // Movement happens before the press.
    assert!(events[..pressed]
        .iter()
        .any(|e| e.kind == MouseEventKind::Moved));
}

#[tokio::test]
async fn click_on_missing_element_surfaces_the_page_error() {
    let page = mock_page().await;
    let behavior = HumanBehavior::new();

    let result = behavior
        .click(page.as_ref(), "#missing", &fast_move())
        .await;
    assert!(matches!(result, Err(crate::Error::ElementNotFound(_))));
}

#[tokio::test]
async fn scroll_emits_steps_that_sum_to_the_distance() {
    let page = mock_page().await;
    let behavior = HumanBehavior::new();

    let options = ScrollOptions {
        duration_ms: 20,
        steps: 8,
    };
    behavior
        .scroll(page.as_ref(), 640.0, &options)
        .await
        .unwrap();

    let wheels: Vec<_> = page
        .mouse_events()
        .into_iter()
        .filter(|e| e.kind == MouseEventKind::Wheel)
        .collect();

    assert_eq!(wheels.len(), 8);
    let total: f64 = wheels.iter().map(|e| e.delta_y).sum();
    assert!((total - 640.0).abs() < 1e-6);
    assert!((page.scroll_offset().await.unwrap() - 640.0).abs() < 1e-6);
}

#[tokio::test]
async fn typing_errors_are_always_corrected() {
    let page = mock_page().await;
    page.register_element("#q", (10.0, 10.0));

    let behavior = HumanBehavior::new();
    let options = TypingOptions {
        mean_delay_ms: 10,
        std_dev_ms: 0,
        error_rate: 1.0,
    };
    behavior
        .type_text(page.as_ref(), "#q", "hello", &options)
        .await
        .unwrap();

    // Every character was first mistyped and backspaced, yet the final
    // value is exact.
    assert_eq!(page.input_value("#q").await.unwrap(), "hello");
}

#[tokio::test]
async fn typing_without_errors_is_exact() {
    let page = mock_page().await;
    page.register_element("#q", (10.0, 10.0));

    let behavior = HumanBehavior::new();
    let options = TypingOptions {
        mean_delay_ms: 10,
        std_dev_ms: 5,
        error_rate: 0.0,
    };
    behavior
        .type_text(page.as_ref(), "#q", "rust 2024", &options)
        .await
        .unwrap();

    assert_eq!(page.input_value("#q").await.unwrap(), "rust 2024");
}

#[tokio::test]
async fn random_delay_respects_bounds() {
    use std::time::{Duration, Instant};

    let behavior = HumanBehavior::new();
    let start = Instant::now();
    behavior
        .random_delay(Duration::from_millis(5), Duration::from_millis(20))
        .await;
    assert!(start.elapsed() >= Duration::from_millis(5));
}
