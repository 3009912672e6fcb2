//! Predefined identities
//!
//! OS/browser presets and GPU presets that combine into coherent
//! [`VmProfile`]s. Only combinations a real machine could report are produced:
//! Apple GPUs only on macOS, ANGLE Direct3D11 strings only on Windows, Mesa or
//! proprietary OpenGL strings only on Linux.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::{
    AudioParameters, BrowserIdentity, CanvasParameters, FontPolicy, GpuCapabilities,
    HardwareCapabilities, HexSeed, OsIdentity, PluginInfo, PrecisionMode, RawSeeds,
    ScreenGeometry, TargetOs, VmProfile,
};

/// OS and browser combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfilePreset {
    WindowsChrome,
    WindowsEdge,
    MacChrome,
    MacSafari,
    LinuxChrome,
}

impl ProfilePreset {
    /// All presets
    pub fn all() -> &'static [ProfilePreset] {
        &[
            ProfilePreset::WindowsChrome,
            ProfilePreset::WindowsEdge,
            ProfilePreset::MacChrome,
            ProfilePreset::MacSafari,
            ProfilePreset::LinuxChrome,
        ]
    }

    /// Weighted the way desktop traffic is: Windows Chrome dominates.
    fn weight(&self) -> u32 {
        match self {
            ProfilePreset::WindowsChrome => 50,
            ProfilePreset::WindowsEdge => 15,
            ProfilePreset::MacChrome => 20,
            ProfilePreset::MacSafari => 10,
            ProfilePreset::LinuxChrome => 5,
        }
    }

    pub fn os(&self) -> TargetOs {
        match self {
            ProfilePreset::WindowsChrome | ProfilePreset::WindowsEdge => TargetOs::Windows,
            ProfilePreset::MacChrome | ProfilePreset::MacSafari => TargetOs::MacOs,
            ProfilePreset::LinuxChrome => TargetOs::Linux,
        }
    }

    /// Get the platform string for this preset
    pub fn platform(&self) -> &'static str {
        match self.os() {
            TargetOs::Windows => "Win32",
            TargetOs::MacOs => "MacIntel",
            TargetOs::Linux => "Linux x86_64",
        }
    }

    /// Get the vendor string for this preset
    pub fn vendor(&self) -> &'static str {
        match self {
            ProfilePreset::MacSafari => "Apple Computer, Inc.",
            _ => "Google Inc.",
        }
    }

    fn os_version(&self) -> &'static str {
        match self.os() {
            TargetOs::Windows => "10.0",
            TargetOs::MacOs => "10.15.7",
            TargetOs::Linux => "x86_64",
        }
    }

    fn slug(&self) -> &'static str {
        match self {
            ProfilePreset::WindowsChrome => "win-chrome",
            ProfilePreset::WindowsEdge => "win-edge",
            ProfilePreset::MacChrome => "mac-chrome",
            ProfilePreset::MacSafari => "mac-safari",
            ProfilePreset::LinuxChrome => "linux-chrome",
        }
    }

    fn user_agents(&self) -> &'static [&'static str] {
        match self {
            ProfilePreset::WindowsChrome => &[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
            ],
            ProfilePreset::WindowsEdge => &[
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36 Edg/125.0.0.0",
            ],
            ProfilePreset::MacChrome => &[
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
            ],
            ProfilePreset::MacSafari => &[
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Safari/605.1.15",
            ],
            ProfilePreset::LinuxChrome => &[
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
            ],
        }
    }

    fn screens(&self) -> &'static [(u32, u32, f64)] {
        match self.os() {
            TargetOs::Windows => &[
                (1920, 1080, 1.0),
                (1920, 1080, 1.25),
                (2560, 1440, 1.0),
                (1366, 768, 1.0),
                (1536, 864, 1.25),
                (1440, 900, 1.0),
            ],
            TargetOs::MacOs => &[
                (1440, 900, 2.0),
                (1512, 982, 2.0),
                (1728, 1117, 2.0),
                (1680, 1050, 2.0),
                (2560, 1440, 1.0),
            ],
            TargetOs::Linux => &[(1920, 1080, 1.0), (2560, 1440, 1.0), (1366, 768, 1.0)],
        }
    }

    /// Pixels the OS chrome (taskbar, menu bar, panel) takes from the screen height.
    fn reserved_height(&self) -> u32 {
        match self.os() {
            TargetOs::Windows => 40,
            TargetOs::MacOs => 25,
            TargetOs::Linux => 27,
        }
    }

    fn audio_fingerprint_base(&self) -> f64 {
        match self {
            ProfilePreset::MacSafari => 124.043_449_684_751_98,
            _ => 124.043_475_275_160_74,
        }
    }
}

/// Predefined WebGL/GPU profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuPreset {
    // NVIDIA profiles
    NvidiaGtx1660,
    NvidiaRtx3060,
    NvidiaRtx4070,

    // AMD profiles
    AmdRx580,
    AmdRx6700Xt,

    // Intel integrated graphics
    IntelUhd630,
    IntelIrisXe,

    // Apple Silicon
    AppleM1,
    AppleM2,
    AppleM3,

    // Software renderer
    SwiftShader,
}

impl GpuPreset {
    /// Get all available GPU presets
    pub fn all() -> &'static [GpuPreset] {
        &[
            GpuPreset::NvidiaGtx1660,
            GpuPreset::NvidiaRtx3060,
            GpuPreset::NvidiaRtx4070,
            GpuPreset::AmdRx580,
            GpuPreset::AmdRx6700Xt,
            GpuPreset::IntelUhd630,
            GpuPreset::IntelIrisXe,
            GpuPreset::AppleM1,
            GpuPreset::AppleM2,
            GpuPreset::AppleM3,
            GpuPreset::SwiftShader,
        ]
    }

    /// GPUs a machine running `os` plausibly has.
    pub fn for_os(os: TargetOs) -> &'static [GpuPreset] {
        match os {
            TargetOs::Windows => &[
                GpuPreset::NvidiaGtx1660,
                GpuPreset::NvidiaRtx3060,
                GpuPreset::NvidiaRtx4070,
                GpuPreset::AmdRx580,
                GpuPreset::AmdRx6700Xt,
                GpuPreset::IntelUhd630,
                GpuPreset::IntelIrisXe,
            ],
            TargetOs::MacOs => &[GpuPreset::AppleM1, GpuPreset::AppleM2, GpuPreset::AppleM3],
            TargetOs::Linux => &[
                GpuPreset::NvidiaRtx3060,
                GpuPreset::AmdRx6700Xt,
                GpuPreset::IntelUhd630,
            ],
        }
    }

    fn brand(&self) -> &'static str {
        match self {
            GpuPreset::NvidiaGtx1660 | GpuPreset::NvidiaRtx3060 | GpuPreset::NvidiaRtx4070 => {
                "NVIDIA"
            }
            GpuPreset::AmdRx580 | GpuPreset::AmdRx6700Xt => "AMD",
            GpuPreset::IntelUhd630 | GpuPreset::IntelIrisXe => "Intel",
            GpuPreset::AppleM1 | GpuPreset::AppleM2 | GpuPreset::AppleM3 => "Apple",
            GpuPreset::SwiftShader => "Google",
        }
    }

    /// Marketing model name
    pub fn model(&self) -> &'static str {
        match self {
            GpuPreset::NvidiaGtx1660 => "NVIDIA GeForce GTX 1660 SUPER",
            GpuPreset::NvidiaRtx3060 => "NVIDIA GeForce RTX 3060",
            GpuPreset::NvidiaRtx4070 => "NVIDIA GeForce RTX 4070",
            GpuPreset::AmdRx580 => "AMD Radeon RX 580 Series",
            GpuPreset::AmdRx6700Xt => "AMD Radeon RX 6700 XT",
            GpuPreset::IntelUhd630 => "Intel(R) UHD Graphics 630",
            GpuPreset::IntelIrisXe => "Intel(R) Iris(R) Xe Graphics",
            GpuPreset::AppleM1 => "Apple M1",
            GpuPreset::AppleM2 => "Apple M2",
            GpuPreset::AppleM3 => "Apple M3",
            GpuPreset::SwiftShader => "SwiftShader Device (Subzero)",
        }
    }

    /// `UNMASKED_VENDOR_WEBGL` as the given browser reports it.
    pub fn unmasked_vendor(&self, preset: ProfilePreset) -> String {
        if preset == ProfilePreset::MacSafari {
            return "Apple Inc.".to_string();
        }
        match (preset.os(), self) {
            (TargetOs::Linux, GpuPreset::NvidiaRtx3060) => {
                "Google Inc. (NVIDIA Corporation)".to_string()
            }
            _ => format!("Google Inc. ({})", self.brand()),
        }
    }

    /// `UNMASKED_RENDERER_WEBGL` as the given browser reports it.
    pub fn unmasked_renderer(&self, preset: ProfilePreset) -> String {
        if preset == ProfilePreset::MacSafari {
            return "Apple GPU".to_string();
        }
        match preset.os() {
            TargetOs::Windows => match self {
                GpuPreset::SwiftShader => "ANGLE (Google, Vulkan 1.3.0 (SwiftShader Device (Subzero) (0x0000C0DE)), SwiftShader driver)".to_string(),
                _ => format!(
                    "ANGLE ({}, {} Direct3D11 vs_5_0 ps_5_0, D3D11)",
                    self.brand(),
                    self.model()
                ),
            },
            TargetOs::MacOs => format!(
                "ANGLE (Apple, ANGLE Metal Renderer: {}, Unspecified Version)",
                self.model()
            ),
            TargetOs::Linux => match self {
                GpuPreset::NvidiaRtx3060 => {
                    "ANGLE (NVIDIA Corporation, NVIDIA GeForce RTX 3060/PCIe/SSE2, OpenGL 4.5.0)"
                        .to_string()
                }
                GpuPreset::AmdRx6700Xt => "ANGLE (AMD, AMD Radeon RX 6700 XT (radeonsi, navi22, LLVM 15.0.7, DRM 3.49, 6.1.0), OpenGL 4.6)".to_string(),
                GpuPreset::IntelUhd630 => {
                    "ANGLE (Intel, Mesa Intel(R) UHD Graphics 630 (CFL GT2), OpenGL 4.6)".to_string()
                }
                other => format!("ANGLE ({}, {}, OpenGL 4.6)", other.brand(), other.model()),
            },
        }
    }

    fn extensions(&self, preset: ProfilePreset) -> Vec<String> {
        let mut list: Vec<&str> = vec![
            "ANGLE_instanced_arrays",
            "EXT_blend_minmax",
            "EXT_color_buffer_half_float",
            "EXT_float_blend",
            "EXT_frag_depth",
            "EXT_shader_texture_lod",
            "EXT_sRGB",
            "EXT_texture_filter_anisotropic",
            "KHR_parallel_shader_compile",
            "OES_element_index_uint",
            "OES_fbo_render_mipmap",
            "OES_standard_derivatives",
            "OES_texture_float",
            "OES_texture_float_linear",
            "OES_texture_half_float",
            "OES_texture_half_float_linear",
            "OES_vertex_array_object",
            "WEBGL_color_buffer_float",
            "WEBGL_debug_renderer_info",
            "WEBGL_depth_texture",
            "WEBGL_draw_buffers",
            "WEBGL_lose_context",
            "WEBGL_multi_draw",
        ];
        match self {
            GpuPreset::AppleM1 | GpuPreset::AppleM2 | GpuPreset::AppleM3 => {
                list.extend([
                    "WEBGL_compressed_texture_astc",
                    "WEBGL_compressed_texture_etc",
                    "WEBGL_compressed_texture_etc1",
                    "WEBGL_compressed_texture_pvrtc",
                ]);
            }
            _ => {
                list.extend([
                    "EXT_disjoint_timer_query",
                    "EXT_texture_compression_bptc",
                    "EXT_texture_compression_rgtc",
                    "WEBGL_compressed_texture_s3tc",
                    "WEBGL_compressed_texture_s3tc_srgb",
                    "WEBGL_debug_shaders",
                ]);
            }
        }
        if preset == ProfilePreset::MacSafari {
            list.retain(|e| *e != "KHR_parallel_shader_compile" && *e != "WEBGL_multi_draw");
        }
        list.sort_unstable();
        list.into_iter().map(String::from).collect()
    }

    /// WebGL capability numbers for this GPU under the given browser.
    pub fn capabilities(&self, preset: ProfilePreset) -> GpuCapabilities {
        let is_apple = matches!(
            self,
            GpuPreset::AppleM1 | GpuPreset::AppleM2 | GpuPreset::AppleM3
        );
        let (webgl_version, shading_language_version) = if preset == ProfilePreset::MacSafari {
            ("WebGL 1.0".to_string(), "WebGL GLSL ES 1.0 (1.0)".to_string())
        } else {
            (
                "WebGL 1.0 (OpenGL ES 2.0 Chromium)".to_string(),
                "WebGL GLSL ES 1.0 (OpenGL ES GLSL ES 1.0 Chromium)".to_string(),
            )
        };
        let integrated = matches!(self, GpuPreset::IntelUhd630 | GpuPreset::IntelIrisXe);

        GpuCapabilities {
            vendor: "WebKit".to_string(),
            renderer: "WebKit WebGL".to_string(),
            unmasked_vendor: self.unmasked_vendor(preset),
            unmasked_renderer: self.unmasked_renderer(preset),
            webgl_version,
            shading_language_version,
            max_texture_size: 16384,
            max_viewport_dims: if is_apple { [16384, 16384] } else { [32767, 32767] },
            max_renderbuffer_size: 16384,
            max_vertex_attribs: 16,
            max_varying_vectors: if is_apple { 31 } else { 30 },
            max_vertex_uniform_vectors: if is_apple || integrated { 1024 } else { 4096 },
            max_fragment_uniform_vectors: 1024,
            max_texture_image_units: 16,
            max_combined_texture_image_units: 32,
            aliased_line_width_range: [1.0, 1.0],
            aliased_point_size_range: if is_apple { [1.0, 511.0] } else { [1.0, 1024.0] },
            extensions: self.extensions(preset),
            vertex_precision: PrecisionMode::Highp,
            fragment_precision: PrecisionMode::Highp,
        }
    }
}

const TIMEZONES: &[(&str, i32, &[&str])] = &[
    ("America/New_York", -300, &["en-US", "en"]),
    ("America/Chicago", -360, &["en-US", "en"]),
    ("America/Denver", -420, &["en-US", "en"]),
    ("America/Los_Angeles", -480, &["en-US", "en"]),
    ("Europe/London", 0, &["en-GB", "en"]),
    ("Europe/Paris", 60, &["fr-FR", "fr", "en-US", "en"]),
    ("Europe/Berlin", 60, &["de-DE", "de", "en-US", "en"]),
    ("Asia/Tokyo", 540, &["ja-JP", "ja", "en-US", "en"]),
];

impl VmProfile {
    /// Builds a profile from presets, drawing the remaining choices from `rng`.
    pub fn from_preset<R: Rng + ?Sized>(
        preset: ProfilePreset,
        gpu: GpuPreset,
        rng: &mut R,
    ) -> VmProfile {
        let os = preset.os();
        let user_agent = preset
            .user_agents()
            .choose(rng)
            .copied()
            .unwrap_or_default()
            .to_string();
        let &(width, height, dpr) = preset.screens().choose(rng).unwrap_or(&(1920, 1080, 1.0));
        let &(timezone, offset, languages) =
            TIMEZONES.choose(rng).unwrap_or(&TIMEZONES[0]);
        let cores: &[u32] = match os {
            TargetOs::MacOs => &[8, 10, 12],
            _ => &[4, 8, 12, 16],
        };
        let hardware_concurrency = cores.choose(rng).copied().unwrap_or(8);
        let device_memory = if hardware_concurrency <= 4 { 4 } else { 8 };
        let sample_rate = if os == TargetOs::Windows && rng.gen_bool(0.3) {
            44100
        } else {
            48000
        };
        let seeds = RawSeeds {
            canvas: HexSeed(rng.gen()),
            audio: HexSeed(rng.gen()),
            gpu_renderer: HexSeed(rng.gen()),
        };
        let id = format!("{}-{:08x}", preset.slug(), rng.gen::<u32>());

        let mut browser = BrowserIdentity {
            user_agent,
            app_version: String::new(),
            vendor: preset.vendor().to_string(),
            product_sub: "20030107".to_string(),
            languages: languages.iter().map(|l| l.to_string()).collect(),
            timezone: timezone.to_string(),
            timezone_offset_minutes: offset,
            do_not_track: None,
            plugins: PluginInfo::chromium_pdf_set(),
        };
        browser.app_version = browser.effective_app_version();

        VmProfile {
            id,
            os: OsIdentity {
                name: os,
                version: preset.os_version().to_string(),
                platform: preset.platform().to_string(),
            },
            browser,
            hardware: HardwareCapabilities {
                hardware_concurrency,
                device_memory,
                max_touch_points: 0,
            },
            gpu: gpu.capabilities(preset),
            screen: ScreenGeometry {
                width,
                height,
                avail_width: width,
                avail_height: height.saturating_sub(preset.reserved_height()),
                color_depth: if os == TargetOs::MacOs { 30 } else { 24 },
                pixel_depth: if os == TargetOs::MacOs { 30 } else { 24 },
                device_pixel_ratio: dpr,
            },
            audio: AudioParameters {
                sample_rate,
                max_channel_count: 2,
                base_latency: if sample_rate == 44100 { 0.01 } else { 0.005_333_333_333_333_333 },
                fingerprint_base: preset.audio_fingerprint_base(),
            },
            canvas: CanvasParameters::default(),
            seeds,
            fonts: FontPolicy::default(),
        }
    }

    /// Draws a weighted preset and a matching GPU from `rng`.
    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> VmProfile {
        let preset = ProfilePreset::all()
            .choose_weighted(rng, |p| p.weight())
            .copied()
            .unwrap_or(ProfilePreset::WindowsChrome);
        let gpu = GpuPreset::for_os(preset.os())
            .choose(rng)
            .copied()
            .unwrap_or(GpuPreset::IntelUhd630);
        VmProfile::from_preset(preset, gpu, rng)
    }

    /// A fresh random identity.
    pub fn random() -> VmProfile {
        VmProfile::random_with(&mut rand::thread_rng())
    }

    /// The same seed string always yields the same profile.
    pub fn consistent(seed: &str) -> VmProfile {
        let digest = Sha256::digest(seed.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        let mut rng = StdRng::from_seed(key);
        VmProfile::random_with(&mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        let mut rng = StdRng::seed_from_u64(7);
        for preset in ProfilePreset::all() {
            for gpu in GpuPreset::for_os(preset.os()) {
                let profile = VmProfile::from_preset(*preset, *gpu, &mut rng);
                assert!(
                    profile.validate().is_ok(),
                    "{:?}/{:?} failed validation",
                    preset,
                    gpu
                );
                assert_eq!(profile.os.name, preset.os());
            }
        }
    }

    #[test]
    fn test_consistent_profile() {
        let a = VmProfile::consistent("seed-a");
        let b = VmProfile::consistent("seed-a");
        let c = VmProfile::consistent("seed-b");
        assert_eq!(a, b);
        assert_ne!(a.seeds, c.seeds);
    }

    #[test]
    fn test_apple_gpu_only_on_mac() {
        for _ in 0..50 {
            let profile = VmProfile::random();
            let apple = profile.gpu.unmasked_renderer.contains("Apple");
            assert_eq!(apple, profile.os.name == TargetOs::MacOs);
        }
    }

    #[test]
    fn test_windows_renderer_is_direct3d() {
        let profile = VmProfile::from_preset(
            ProfilePreset::WindowsChrome,
            GpuPreset::NvidiaRtx3060,
            &mut StdRng::seed_from_u64(1),
        );
        assert!(profile.gpu.unmasked_renderer.contains("Direct3D11"));
        assert_eq!(profile.gpu.unmasked_vendor, "Google Inc. (NVIDIA)");
        assert!(profile
            .gpu
            .extensions
            .contains(&"WEBGL_debug_renderer_info".to_string()));
    }

    #[test]
    fn test_safari_strings() {
        let profile = VmProfile::from_preset(
            ProfilePreset::MacSafari,
            GpuPreset::AppleM2,
            &mut StdRng::seed_from_u64(1),
        );
        assert_eq!(profile.gpu.unmasked_renderer, "Apple GPU");
        assert_eq!(profile.browser.vendor, "Apple Computer, Inc.");
        assert!(profile.browser.user_agent.contains("Safari/605"));
    }
}
