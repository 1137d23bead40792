//! Human-behavior simulator implementation

use crate::backend::{KeyEvent, MouseEvent, PageHandle};
use crate::Result;
use bezier_rs::Bezier;
use rand::Rng;
use std::time::Duration;
use tokio::sync::Mutex;

/// Mouse movement options
#[derive(Debug, Clone)]
pub struct MouseMoveOptions {
    /// Total movement duration in milliseconds
    pub duration_ms: u64,
    /// Control point deviation from the direct line, in pixels
    pub deviation: f64,
    /// Number of intermediate path points
    pub points: u32,
}

impl Default for MouseMoveOptions {
    fn default() -> Self {
        Self {
            duration_ms: 500,
            deviation: 50.0,
            points: 20,
        }
    }
}

/// Scroll options
#[derive(Debug, Clone)]
pub struct ScrollOptions {
    /// Total scroll duration in milliseconds
    pub duration_ms: u64,
    /// Number of wheel increments
    pub steps: u32,
}

impl Default for ScrollOptions {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            steps: 10,
        }
    }
}

/// Typing options
#[derive(Debug, Clone)]
pub struct TypingOptions {
    /// Mean inter-key delay in milliseconds
    pub mean_delay_ms: u64,
    /// Delay spread in milliseconds
    pub std_dev_ms: u64,
    /// Per-character probability of typing a wrong character first
    ///
    /// Every injected error is followed by a backspace and the correct
    /// character, so the final field value always equals the requested text.
    pub error_rate: f64,
}

impl Default for TypingOptions {
    fn default() -> Self {
        Self {
            mean_delay_ms: 100,
            std_dev_ms: 50,
            error_rate: 0.02,
        }
    }
}

/// Pre-generated typing step
enum TypingAction {
    Char(char),
    Backspace,
    Delay(u64),
}

/// Human-behavior simulator
///
/// Tracks the cursor position across calls so consecutive movements chain
/// naturally instead of teleporting back to the origin.
#[derive(Debug)]
pub struct HumanBehavior {
    cursor: Mutex<(f64, f64)>,
}

impl Default for HumanBehavior {
    fn default() -> Self {
        Self::new()
    }
}

impl HumanBehavior {
    /// Create a new simulator with the cursor at the origin
    pub fn new() -> Self {
        Self {
            cursor: Mutex::new((0.0, 0.0)),
        }
    }

    /// Move the mouse to `target` along a curved, eased path
    ///
    /// Never a straight line or constant velocity: linear motion is the
    /// primary human-behavior detection signal.
    pub async fn move_mouse(
        &self,
        page: &dyn PageHandle,
        target: (f64, f64),
        options: &MouseMoveOptions,
    ) -> Result<()> {
        let mut cursor = self.cursor.lock().await;
        let start = *cursor;

        // All randomness is drawn before the first await.
        let path = Self::bezier_path(start, target, options);
        let jitter: Vec<f64> = {
            let mut rng = rand::thread_rng();
            (0..path.len()).map(|_| rng.gen_range(0.7..1.3)).collect()
        };

        let step_delay = Duration::from_millis(options.duration_ms) / path.len().max(1) as u32;

        for (i, (x, y)) in path.iter().enumerate() {
            page.dispatch_mouse(&MouseEvent::moved(*x, *y)).await?;
            tokio::time::sleep(step_delay.mul_f64(jitter[i])).await;
        }

        *cursor = target;
        Ok(())
    }

    /// Move to the element's center, then press and release
    pub async fn click(
        &self,
        page: &dyn PageHandle,
        selector: &str,
        options: &MouseMoveOptions,
    ) -> Result<()> {
        let (x, y) = page.element_center(selector).await?;
        self.move_mouse(page, (x, y), options).await?;

        let hold = {
            let mut rng = rand::thread_rng();
            rng.gen_range(40..120)
        };

        page.dispatch_mouse(&MouseEvent::pressed(x, y)).await?;
        tokio::time::sleep(Duration::from_millis(hold)).await;
        page.dispatch_mouse(&MouseEvent::released(x, y)).await?;

        Ok(())
    }

    /// Scroll by `distance` CSS pixels in eased increments
    ///
    /// Emits a sequence of smaller wheel steps with variable pauses rather
    /// than one jump, mimicking incremental reading.
    pub async fn scroll(
        &self,
        page: &dyn PageHandle,
        distance: f64,
        options: &ScrollOptions,
    ) -> Result<()> {
        let steps = options.steps.max(1);
        let (cursor_x, cursor_y) = *self.cursor.lock().await;

        let jitter: Vec<f64> = {
            let mut rng = rand::thread_rng();
            (0..steps).map(|_| rng.gen_range(0.6..1.4)).collect()
        };

        let base_delay = Duration::from_millis(options.duration_ms) / steps;
        let mut emitted = 0.0;

        for i in 0..steps {
            // Ease-in-out: small increments at the edges, larger mid-scroll.
            let progress = (i + 1) as f64 / steps as f64;
            let eased = Self::ease_in_out(progress);
            let target = distance * eased;
            let delta = target - emitted;
            emitted = target;

            page.dispatch_mouse(&MouseEvent::wheel(cursor_x, cursor_y, delta))
                .await?;
            tokio::time::sleep(base_delay.mul_f64(jitter[i as usize])).await;
        }

        Ok(())
    }

    /// Type `text` into the element matched by `selector`
    ///
    /// Per-character key events with randomized inter-key delay; with
    /// probability `error_rate` per character a wrong character is typed,
    /// backspaced, and corrected.
    pub async fn type_text(
        &self,
        page: &dyn PageHandle,
        selector: &str,
        text: &str,
        options: &TypingOptions,
    ) -> Result<()> {
        page.focus(selector).await?;

        // Pre-generate the whole action sequence so no RNG lives across awaits.
        let actions = Self::typing_actions(text, options);

        for action in actions {
            match action {
                TypingAction::Char(ch) => {
                    page.dispatch_key(&KeyEvent::char_down(ch)).await?;
                    page.dispatch_key(&KeyEvent::char_up(ch)).await?;
                }
                TypingAction::Backspace => {
                    page.dispatch_key(&KeyEvent::backspace_down()).await?;
                    page.dispatch_key(&KeyEvent::backspace_up()).await?;
                }
                TypingAction::Delay(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                }
            }
        }

        Ok(())
    }

    /// Suspend for a uniformly-random duration in `[min, max]`
    pub async fn random_delay(&self, min: Duration, max: Duration) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let delay = {
            let mut rng = rand::thread_rng();
            rng.gen_range(min.as_millis()..=max.as_millis()) as u64
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    /// Cubic Bézier path with randomly displaced control points, sampled at
    /// eased parameter values so velocity varies along the way
    fn bezier_path(
        start: (f64, f64),
        end: (f64, f64),
        options: &MouseMoveOptions,
    ) -> Vec<(f64, f64)> {
        let mut rng = rand::thread_rng();
        let (dx, dy) = (end.0 - start.0, end.1 - start.1);
        let deviation = options.deviation;

        let cp1 = (
            start.0 + dx * 0.25 + rng.gen_range(-0.5..0.5) * deviation,
            start.1 + dy * 0.25 + rng.gen_range(-0.5..0.5) * deviation,
        );
        let cp2 = (
            end.0 - dx * 0.25 + rng.gen_range(-0.5..0.5) * deviation,
            end.1 - dy * 0.25 + rng.gen_range(-0.5..0.5) * deviation,
        );

        let bezier = Bezier::from_cubic_coordinates(
            start.0, start.1, cp1.0, cp1.1, cp2.0, cp2.1, end.0, end.1,
        );

        let points = options.points.max(2);
        (0..=points)
            .map(|i| {
                let u = i as f64 / points as f64;
                let t = Self::ease_in_out(u);
                let point = bezier.evaluate(bezier_rs::TValue::Parametric(t));
                (point.x, point.y)
            })
            .collect()
    }

    fn ease_in_out(t: f64) -> f64 {
        if t < 0.5 {
            2.0 * t * t
        } else {
            1.0 - 2.0 * (1.0 - t).powi(2)
        }
    }

    fn typing_actions(text: &str, options: &TypingOptions) -> Vec<TypingAction> {
        let mut rng = rand::thread_rng();
        let mut actions = Vec::new();

        for ch in text.chars() {
            if rng.gen_range(0.0..1.0) < options.error_rate {
                actions.push(TypingAction::Char(Self::wrong_char(&mut rng, ch)));
                actions.push(TypingAction::Delay(Self::key_delay(&mut rng, options)));
                actions.push(TypingAction::Backspace);
                actions.push(TypingAction::Delay(Self::key_delay(&mut rng, options)));
            }

            actions.push(TypingAction::Char(ch));
            actions.push(TypingAction::Delay(Self::key_delay(&mut rng, options)));
        }

        actions
    }

    /// A plausible mistyped character that differs from the intended one
    fn wrong_char(rng: &mut impl Rng, intended: char) -> char {
        const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
        loop {
            let candidate = LETTERS[rng.gen_range(0..LETTERS.len())] as char;
            if candidate != intended {
                return candidate;
            }
        }
    }

    fn key_delay(rng: &mut impl Rng, options: &TypingOptions) -> u64 {
        let spread = rng.gen_range(-1.0..1.0) * options.std_dev_ms as f64;
        (options.mean_delay_ms as f64 + spread).max(10.0) as u64
    }
}
