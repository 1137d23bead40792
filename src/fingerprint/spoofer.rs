//! Script-level fingerprint overrides
//!
//! Renders the override scripts for one profile and installs them in a
//! browser context as init scripts, so they run in every new document before
//! page scripts can read the original values.

use super::FingerprintProfile;
use crate::backend::ContextHandle;
use crate::Result;
use tracing::{debug, warn};

/// Result of applying a profile to a context
#[derive(Debug, Clone)]
pub struct AppliedFingerprint {
    /// Override groups that were installed
    pub features: Vec<String>,
    /// True when the context had already navigated at apply time
    ///
    /// Non-fatal: pages loaded before injection may have cached the original
    /// values, but later documents still get the overrides.
    pub late: bool,
}

/// Installs fingerprint overrides into browser contexts
#[derive(Debug, Default)]
pub struct Spoofer;

impl Spoofer {
    /// Create a new spoofer
    pub fn new() -> Self {
        Self
    }

    /// Apply `profile` to `ctx`
    ///
    /// Must run before the first navigation in the context; a late
    /// application is flagged in the result and logged, not rejected.
    pub async fn apply(
        &self,
        profile: &FingerprintProfile,
        ctx: &dyn ContextHandle,
    ) -> Result<AppliedFingerprint> {
        let late = ctx.has_navigated();
        if late {
            warn!(
                "Fingerprint applied after first navigation in context {}; \
                 already-loaded pages may report original values",
                ctx.id()
            );
        }

        let mut features = Vec::with_capacity(5);

        ctx.add_init_script(&Self::navigator_script(profile)).await?;
        features.push("navigator".to_string());

        ctx.add_init_script(&Self::screen_script(profile)).await?;
        features.push("screen".to_string());

        ctx.add_init_script(&Self::webgl_script(profile)).await?;
        features.push("webgl".to_string());

        ctx.add_init_script(&Self::canvas_script(profile.canvas_noise_seed))
            .await?;
        features.push("canvas".to_string());

        ctx.add_init_script(&Self::audio_script(profile.audio_noise_seed))
            .await?;
        features.push("audio".to_string());

        debug!(
            "Applied fingerprint preset '{}' to context {} ({} override groups)",
            profile.preset,
            ctx.id(),
            features.len()
        );

        Ok(AppliedFingerprint { features, late })
    }

    /// Seeded in-page PRNG (mulberry32) so noise is stable per profile
    /// instead of changing on every read, which is itself detectable.
    fn seeded_prng_js(seed: u32) -> String {
        format!(
            r#"const rand = (function(seed) {{
                return function() {{
                    seed |= 0; seed = seed + 0x6D2B79F5 | 0;
                    let t = Math.imul(seed ^ seed >>> 15, 1 | seed);
                    t = t + Math.imul(t ^ t >>> 7, 61 | t) ^ t;
                    return ((t ^ t >>> 14) >>> 0) / 4294967296;
                }};
            }})({});"#,
            seed
        )
    }

    fn navigator_script(profile: &FingerprintProfile) -> String {
        format!(
            r#"(function() {{
                Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}' }});
                Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => {cores} }});
                Object.defineProperty(navigator, 'webdriver', {{ get: () => false }});
            }})();"#,
            platform = profile.platform,
            cores = profile.hardware_concurrency,
        )
    }

    fn screen_script(profile: &FingerprintProfile) -> String {
        // availHeight loses the usual taskbar strip.
        let avail_height = profile.screen.height.saturating_sub(40);
        format!(
            r#"(function() {{
                Object.defineProperty(screen, 'width', {{ get: () => {width} }});
                Object.defineProperty(screen, 'height', {{ get: () => {height} }});
                Object.defineProperty(screen, 'availWidth', {{ get: () => {width} }});
                Object.defineProperty(screen, 'availHeight', {{ get: () => {avail_height} }});
                Object.defineProperty(screen, 'colorDepth', {{ get: () => 24 }});
                Object.defineProperty(screen, 'pixelDepth', {{ get: () => 24 }});
            }})();"#,
            width = profile.screen.width,
            height = profile.screen.height,
            avail_height = avail_height,
        )
    }

    fn webgl_script(profile: &FingerprintProfile) -> String {
        // 37445/37446 are UNMASKED_VENDOR_WEBGL / UNMASKED_RENDERER_WEBGL.
        format!(
            r#"(function() {{
                const getParameter = WebGLRenderingContext.prototype.getParameter;
                WebGLRenderingContext.prototype.getParameter = function(parameter) {{
                    if (parameter === 37445) return '{vendor}';
                    if (parameter === 37446) return '{renderer}';
                    return getParameter.call(this, parameter);
                }};
            }})();"#,
            vendor = profile.webgl_vendor,
            renderer = profile.webgl_renderer,
        )
    }

    fn canvas_script(seed: u32) -> String {
        format!(
            r#"(function() {{
                {prng}
                const addNoise = (data) => {{
                    for (let i = 0; i < data.length; i += 4) {{
                        data[i] += rand() * 0.1;
                        data[i + 1] += rand() * 0.1;
                        data[i + 2] += rand() * 0.1;
                    }}
                }};

                const originalToDataURL = HTMLCanvasElement.prototype.toDataURL;
                HTMLCanvasElement.prototype.toDataURL = function(type) {{
                    const context = this.getContext('2d');
                    if (context) {{
                        const imageData = context.getImageData(0, 0, this.width, this.height);
                        addNoise(imageData.data);
                        context.putImageData(imageData, 0, 0);
                    }}
                    return originalToDataURL.apply(this, arguments);
                }};

                const originalGetImageData = CanvasRenderingContext2D.prototype.getImageData;
                CanvasRenderingContext2D.prototype.getImageData = function() {{
                    const imageData = originalGetImageData.apply(this, arguments);
                    addNoise(imageData.data);
                    return imageData;
                }};
            }})();"#,
            prng = Self::seeded_prng_js(seed),
        )
    }

    fn audio_script(seed: u32) -> String {
        format!(
            r#"(function() {{
                {prng}
                const originalGetChannelData = AudioBuffer.prototype.getChannelData;
                AudioBuffer.prototype.getChannelData = function() {{
                    const data = originalGetChannelData.apply(this, arguments);
                    for (let i = 0; i < data.length; i++) {{
                        data[i] += rand() * 0.0001;
                    }}
                    return data;
                }};
            }})();"#,
            prng = Self::seeded_prng_js(seed),
        )
    }
}
