//! Fingerprint spoofing engine
//!
//! Generates a coherent synthetic device/browser fingerprint and injects
//! script-level overrides into a browser context before any page loads.
//! Consistency across signals matters more than any individual value:
//! detection systems cross-check the platform string against hardware
//! concurrency and screen resolution, so every field of a profile is drawn
//! from one preset table rather than sampled independently.

mod generator;
mod presets;
mod spoofer;


pub use generator::ProfileGenerator;
pub use presets::{preset_names, Preset, PRESETS};
pub use spoofer::{AppliedFingerprint, Spoofer};

use serde::{Deserialize, Serialize};

/// Spoofed screen dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenResolution {
    pub width: u32,
    pub height: u32,
}

/// A synthetic device/browser fingerprint
///
/// Generated once per session and immutable for the lifetime of the browser
/// context it is applied to; changing fingerprints requires a new context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintProfile {
    /// Name of the preset every field was drawn from
    pub preset: String,
    /// `navigator.platform` value
    pub platform: String,
    /// `navigator.hardwareConcurrency` value
    pub hardware_concurrency: u32,
    /// `screen.width`/`screen.height` values
    pub screen: ScreenResolution,
    /// WebGL UNMASKED_VENDOR_WEBGL answer
    pub webgl_vendor: String,
    /// WebGL UNMASKED_RENDERER_WEBGL answer
    pub webgl_renderer: String,
    /// Seed for deterministic canvas noise
    pub canvas_noise_seed: u32,
    /// Seed for deterministic audio noise
    pub audio_noise_seed: u32,
    /// User agent consistent with the platform
    pub user_agent: String,
}
