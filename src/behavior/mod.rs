//! Human-behavior simulation
//!
//! Generates randomized, physically-plausible input sequences and replays
//! them against a live page: curved mouse paths with eased velocity, stepped
//! scrolling, and typing with deliberate errors. The simulator adds timing
//! and path realism only; interaction errors from the page surface
//! unmodified.

mod simulator;

#[cfg(test)]
mod tests;

pub use simulator::{HumanBehavior, MouseMoveOptions, ScrollOptions, TypingOptions};
