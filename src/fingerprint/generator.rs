//! Fingerprint profile generation

use super::presets::{preset_names, Preset, PRESETS};
use super::{FingerprintProfile, ScreenResolution};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generates fingerprint profiles from the preset tables
#[derive(Debug, Default)]
pub struct ProfileGenerator;

impl ProfileGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self
    }

    /// Generate a profile
    ///
    /// A named preset is used when given; otherwise one is picked at random.
    /// A caller-supplied seed makes generation fully deterministic for
    /// reproducible test runs; without it wall-clock entropy is used. Fails
    /// with `Error::UnknownPreset` when `preset_name` is not registered.
    pub fn generate(
        &self,
        preset_name: Option<&str>,
        seed: Option<u64>,
    ) -> Result<FingerprintProfile> {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (name, preset) = match preset_name {
            Some(name) => {
                let preset = PRESETS
                    .get(name)
                    .ok_or_else(|| Error::UnknownPreset(name.to_string()))?;
                (name, preset)
            }
            None => {
                let names = preset_names();
                let name = names[rng.gen_range(0..names.len())];
                let preset = PRESETS
                    .get(name)
                    .ok_or_else(|| Error::UnknownPreset(name.to_string()))?;
                (name, preset)
            }
        };

        Ok(Self::draw(name, preset, &mut rng))
    }

    /// Draw every field from one preset so the profile stays self-consistent
    fn draw(name: &str, preset: &Preset, rng: &mut StdRng) -> FingerprintProfile {
        let (width, height) = preset.resolutions[rng.gen_range(0..preset.resolutions.len())];
        let (webgl_vendor, webgl_renderer) = preset.webgl[rng.gen_range(0..preset.webgl.len())];
        let concurrency =
            preset.hardware_concurrency[rng.gen_range(0..preset.hardware_concurrency.len())];
        let user_agent = preset.user_agents[rng.gen_range(0..preset.user_agents.len())];

        FingerprintProfile {
            preset: name.to_string(),
            platform: preset.platform.to_string(),
            hardware_concurrency: concurrency,
            screen: ScreenResolution { width, height },
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
            canvas_noise_seed: rng.gen(),
            audio_noise_seed: rng.gen(),
            user_agent: user_agent.to_string(),
        }
    }
}
