//! Named fingerprint presets
//!
//! Each preset is a mutually consistent table: every platform string,
//! concurrency option, resolution, WebGL pair and user agent in a preset is
//! plausible for that device class. Profiles never mix fields across presets.

use phf::phf_map;

/// A coherent device-class table profiles are drawn from
#[derive(Debug)]
pub struct Preset {
    /// `navigator.platform` value
    pub platform: &'static str,
    /// Plausible `navigator.hardwareConcurrency` values
    pub hardware_concurrency: &'static [u32],
    /// Plausible screen resolutions for the device class
    pub resolutions: &'static [(u32, u32)],
    /// Plausible (vendor, renderer) WebGL pairs
    pub webgl: &'static [(&'static str, &'static str)],
    /// User agents consistent with the platform
    pub user_agents: &'static [&'static str],
}

/// Registered presets, keyed by name
pub static PRESETS: phf::Map<&'static str, Preset> = phf_map! {
    "windows-desktop" => Preset {
        platform: "Win32",
        hardware_concurrency: &[4, 6, 8, 12, 16, 24],
        resolutions: &[(1920, 1080), (2560, 1440), (3840, 2160), (1366, 768)],
        webgl: &[
            (
                "Google Inc. (NVIDIA)",
                "ANGLE (NVIDIA GeForce RTX 3080 Direct3D11 vs_5_0 ps_5_0)",
            ),
            (
                "Google Inc. (NVIDIA)",
                "ANGLE (NVIDIA GeForce RTX 3070 Direct3D11 vs_5_0 ps_5_0)",
            ),
            (
                "Google Inc. (Intel)",
                "ANGLE (Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0)",
            ),
            (
                "Google Inc. (AMD)",
                "ANGLE (AMD Radeon RX 6800 Direct3D11 vs_5_0 ps_5_0)",
            ),
        ],
        user_agents: &[
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        ],
    },
    "macos-desktop" => Preset {
        platform: "MacIntel",
        hardware_concurrency: &[8, 10, 12, 16],
        resolutions: &[(2560, 1440), (2880, 1800), (3840, 2160), (5120, 2880)],
        webgl: &[
            ("Google Inc. (Apple)", "ANGLE (Apple, Apple M2, OpenGL 4.1)"),
            ("Google Inc. (Apple)", "ANGLE (Apple, Apple M1 Pro, OpenGL 4.1)"),
            ("Google Inc. (Apple)", "ANGLE (Apple, Apple M3 Max, OpenGL 4.1)"),
        ],
        user_agents: &[
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Safari/605.1.15",
        ],
    },
    "linux-desktop" => Preset {
        platform: "Linux x86_64",
        hardware_concurrency: &[4, 8, 12, 16, 32],
        resolutions: &[(1920, 1080), (2560, 1440), (3840, 2160)],
        webgl: &[
            ("Google Inc. (Intel)", "ANGLE (Intel, Mesa Intel(R) UHD Graphics 630, OpenGL 4.6)"),
            ("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 6700 XT, OpenGL 4.6)"),
        ],
        user_agents: &[
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
            "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:132.0) Gecko/20100101 Firefox/132.0",
        ],
    },
    "android-mobile" => Preset {
        platform: "Linux armv8l",
        hardware_concurrency: &[4, 8],
        resolutions: &[(360, 800), (390, 844), (412, 915), (393, 851)],
        webgl: &[
            ("Qualcomm", "Adreno (TM) 740"),
            ("ARM", "Mali-G715-Immortalis MC11"),
        ],
        user_agents: &[
            "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
            "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Mobile Safari/537.36",
        ],
    },
    "ios-mobile" => Preset {
        platform: "iPhone",
        hardware_concurrency: &[4, 6],
        resolutions: &[(390, 844), (414, 896), (393, 852)],
        webgl: &[
            ("Apple Inc.", "Apple GPU"),
        ],
        user_agents: &[
            "Mozilla/5.0 (iPhone; CPU iPhone OS 18_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.2 Mobile/15E148 Safari/604.1",
        ],
    },
};

/// Preset names in stable order, for deterministic random selection
pub fn preset_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = PRESETS.keys().copied().collect();
    names.sort_unstable();
    names
}
