//! Virtual Machine Profiles
//!
//! A [`VmProfile`] is the complete target identity presented to web content:
//! OS and browser identity strings, CPU/GPU capability numbers, screen geometry,
//! audio parameters, the three raw fingerprint seeds and a font policy.
//!
//! Profiles are passive records. They are produced by an external loader (or by
//! the presets in [`presets`]) and are read-only for the lifetime of every
//! context that references them.
//!
//! # Example
//!
//! ```rust
//! use ki_browser_spoof::profile::{TargetOs, VmProfile};
//!
//! let profile = VmProfile::consistent("session-42");
//! assert!(profile.validate().is_ok());
//! assert_eq!(profile, VmProfile::consistent("session-42"));
//! let _os: TargetOs = profile.os.name;
//! ```

pub mod presets;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub use presets::{GpuPreset, ProfilePreset};

/// Errors raised while loading or validating a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// A raw seed is not a valid 64-bit hex number.
    #[error("Invalid hex seed: {0}")]
    InvalidSeed(String),

    /// A field holds an impossible value.
    #[error("Invalid profile: {0}")]
    ValidationError(String),

    /// Failed to read the profile file.
    #[error("Failed to read profile file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse a TOML profile.
    #[error("Failed to parse TOML profile: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize a TOML profile.
    #[error("Failed to serialize TOML profile: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse a JSON profile.
    #[error("Failed to parse JSON profile: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unsupported file format.
    #[error("Unsupported profile file format: {0}")]
    UnsupportedFormat(String),
}

/// Operating system family a profile impersonates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetOs {
    /// Microsoft Windows.
    #[serde(alias = "windows", alias = "win")]
    Windows,
    /// Apple macOS.
    #[serde(rename = "macOS", alias = "macos", alias = "mac", alias = "osx")]
    MacOs,
    /// Desktop Linux.
    #[serde(alias = "linux")]
    Linux,
}

impl TargetOs {
    /// The OS this binary was compiled for, if it is one of the three families.
    pub fn host() -> Option<TargetOs> {
        if cfg!(target_os = "windows") {
            Some(TargetOs::Windows)
        } else if cfg!(target_os = "macos") {
            Some(TargetOs::MacOs)
        } else if cfg!(target_os = "linux") {
            Some(TargetOs::Linux)
        } else {
            None
        }
    }

    /// All supported OS families.
    pub fn all() -> [TargetOs; 3] {
        [TargetOs::Windows, TargetOs::MacOs, TargetOs::Linux]
    }
}

impl fmt::Display for TargetOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetOs::Windows => write!(f, "Windows"),
            TargetOs::MacOs => write!(f, "macOS"),
            TargetOs::Linux => write!(f, "Linux"),
        }
    }
}

impl FromStr for TargetOs {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "windows" | "win" | "win32" | "win64" => Ok(TargetOs::Windows),
            "macos" | "mac" | "osx" | "darwin" => Ok(TargetOs::MacOs),
            "linux" => Ok(TargetOs::Linux),
            _ => Err(ProfileError::ValidationError(format!(
                "Unknown OS: {}. Valid values are: Windows, macOS, Linux",
                s
            ))),
        }
    }
}

/// Floating point precision a GPU exposes for one shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionMode {
    /// 8-bit-ish fixed range.
    Lowp,
    /// Half float.
    Mediump,
    /// Full 32-bit float.
    Highp,
}

impl PrecisionMode {
    /// GLSL qualifier keyword.
    pub fn as_glsl(&self) -> &'static str {
        match self {
            PrecisionMode::Lowp => "lowp",
            PrecisionMode::Mediump => "mediump",
            PrecisionMode::Highp => "highp",
        }
    }

    /// Parses a GLSL qualifier keyword.
    pub fn from_glsl(word: &str) -> Option<PrecisionMode> {
        match word {
            "lowp" => Some(PrecisionMode::Lowp),
            "mediump" => Some(PrecisionMode::Mediump),
            "highp" => Some(PrecisionMode::Highp),
            _ => None,
        }
    }
}

impl Default for PrecisionMode {
    fn default() -> Self {
        PrecisionMode::Highp
    }
}

impl fmt::Display for PrecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_glsl())
    }
}

/// A raw 64-bit fingerprint seed, written as hex in profile files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HexSeed(pub u64);

impl HexSeed {
    /// The seed value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl FromStr for HexSeed {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 16 {
            return Err(ProfileError::InvalidSeed(s.to_string()));
        }
        u64::from_str_radix(digits, 16)
            .map(HexSeed)
            .map_err(|_| ProfileError::InvalidSeed(s.to_string()))
    }
}

impl fmt::Display for HexSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl Serialize for HexSeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HexSeed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexSeedVisitor;

        impl<'de> Visitor<'de> for HexSeedVisitor {
            type Value = HexSeed;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 64-bit hex string such as \"0x1f2e3d4c5b6a7988\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<HexSeed, E> {
                v.parse().map_err(|_| E::custom(format!("invalid hex seed: {}", v)))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<HexSeed, E> {
                Ok(HexSeed(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<HexSeed, E> {
                Ok(HexSeed(v as u64))
            }
        }

        deserializer.deserialize_any(HexSeedVisitor)
    }
}

/// Information about a browser plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name
    pub name: String,
    /// Plugin description
    pub description: String,
    /// Plugin filename
    pub filename: String,
    /// MIME types supported by this plugin
    #[serde(default)]
    pub mime_types: Vec<MimeTypeInfo>,
}

impl PluginInfo {
    /// Create a new plugin info
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            filename: filename.into(),
            mime_types: Vec::new(),
        }
    }

    /// Add a MIME type
    pub fn with_mime_type(mut self, mime_type: MimeTypeInfo) -> Self {
        self.mime_types.push(mime_type);
        self
    }

    /// The five PDF viewer entries every current Chromium build reports.
    pub fn chromium_pdf_set() -> Vec<PluginInfo> {
        [
            "PDF Viewer",
            "Chrome PDF Viewer",
            "Chromium PDF Viewer",
            "Microsoft Edge PDF Viewer",
            "WebKit built-in PDF",
        ]
        .iter()
        .map(|name| {
            PluginInfo::new(*name, "Portable Document Format", "internal-pdf-viewer")
                .with_mime_type(MimeTypeInfo::pdf())
                .with_mime_type(MimeTypeInfo::text_pdf())
        })
        .collect()
    }
}

/// Information about a MIME type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MimeTypeInfo {
    /// MIME type string (e.g., "application/pdf")
    pub mime_type: String,
    /// Description of the MIME type
    pub description: String,
    /// File extensions (e.g., "pdf")
    pub suffixes: String,
}

impl MimeTypeInfo {
    /// Create a new MIME type info
    pub fn new(
        mime_type: impl Into<String>,
        description: impl Into<String>,
        suffixes: impl Into<String>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            description: description.into(),
            suffixes: suffixes.into(),
        }
    }

    /// PDF MIME type
    pub fn pdf() -> Self {
        Self::new("application/pdf", "Portable Document Format", "pdf")
    }

    /// Text PDF MIME type
    pub fn text_pdf() -> Self {
        Self::new("text/pdf", "Portable Document Format", "pdf")
    }
}

/// OS identity strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsIdentity {
    /// OS family.
    pub name: TargetOs,
    /// Marketing version, e.g. "10.0" or "14.2".
    pub version: String,
    /// `navigator.platform` value, e.g. "Win32".
    pub platform: String,
}

/// Browser identity strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserIdentity {
    /// Full user agent string.
    pub user_agent: String,
    /// `navigator.appVersion`; derived from the user agent when empty.
    #[serde(default)]
    pub app_version: String,
    /// `navigator.vendor`, e.g. "Google Inc.".
    pub vendor: String,
    /// `navigator.productSub`.
    #[serde(default = "default_product_sub")]
    pub product_sub: String,
    /// Accepted languages, most preferred first.
    pub languages: Vec<String>,
    /// IANA timezone name.
    pub timezone: String,
    /// Minutes east of UTC (`-getTimezoneOffset()`).
    pub timezone_offset_minutes: i32,
    /// `navigator.doNotTrack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_not_track: Option<String>,
    /// Plugins reported through `navigator.plugins`.
    #[serde(default)]
    pub plugins: Vec<PluginInfo>,
}

fn default_product_sub() -> String {
    "20030107".to_string()
}

impl BrowserIdentity {
    /// `navigator.appVersion`, falling back to everything after "Mozilla/".
    pub fn effective_app_version(&self) -> String {
        if !self.app_version.is_empty() {
            return self.app_version.clone();
        }
        match self.user_agent.find("Mozilla/") {
            Some(pos) => self.user_agent[pos + 8..].to_string(),
            None => self.user_agent.clone(),
        }
    }
}

/// CPU and memory capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    /// Logical CPU cores.
    pub hardware_concurrency: u32,
    /// Device memory in GB (power of two, capped at 8 by browsers).
    pub device_memory: u32,
    /// Touch points, 0 on desktops.
    #[serde(default)]
    pub max_touch_points: u32,
}

/// GPU strings and WebGL capability numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuCapabilities {
    /// Masked `VENDOR` parameter.
    #[serde(default = "default_masked_vendor")]
    pub vendor: String,
    /// Masked `RENDERER` parameter.
    #[serde(default = "default_masked_renderer")]
    pub renderer: String,
    /// `UNMASKED_VENDOR_WEBGL`.
    pub unmasked_vendor: String,
    /// `UNMASKED_RENDERER_WEBGL`.
    pub unmasked_renderer: String,
    /// `VERSION`.
    pub webgl_version: String,
    /// `SHADING_LANGUAGE_VERSION`.
    pub shading_language_version: String,
    pub max_texture_size: u32,
    pub max_viewport_dims: [u32; 2],
    pub max_renderbuffer_size: u32,
    pub max_vertex_attribs: u32,
    pub max_varying_vectors: u32,
    pub max_vertex_uniform_vectors: u32,
    pub max_fragment_uniform_vectors: u32,
    pub max_texture_image_units: u32,
    pub max_combined_texture_image_units: u32,
    #[serde(default = "default_line_width_range")]
    pub aliased_line_width_range: [f32; 2],
    #[serde(default = "default_point_size_range")]
    pub aliased_point_size_range: [f32; 2],
    /// WebGL extension names (`getSupportedExtensions`).
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Float precision of the vertex stage.
    #[serde(default)]
    pub vertex_precision: PrecisionMode,
    /// Float precision of the fragment stage.
    #[serde(default)]
    pub fragment_precision: PrecisionMode,
}

fn default_masked_vendor() -> String {
    "WebKit".to_string()
}

fn default_masked_renderer() -> String {
    "WebKit WebGL".to_string()
}

fn default_line_width_range() -> [f32; 2] {
    [1.0, 1.0]
}

fn default_point_size_range() -> [f32; 2] {
    [1.0, 1024.0]
}

/// Screen geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub avail_width: u32,
    pub avail_height: u32,
    #[serde(default = "default_color_depth")]
    pub color_depth: u32,
    #[serde(default = "default_color_depth")]
    pub pixel_depth: u32,
    #[serde(default = "default_dpr")]
    pub device_pixel_ratio: f64,
}

fn default_color_depth() -> u32 {
    24
}

fn default_dpr() -> f64 {
    1.0
}

/// Web Audio parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioParameters {
    /// `AudioContext.sampleRate`.
    pub sample_rate: u32,
    /// `destination.maxChannelCount`.
    #[serde(default = "default_max_channels")]
    pub max_channel_count: u32,
    /// `AudioContext.baseLatency` in seconds.
    #[serde(default = "default_base_latency")]
    pub base_latency: f64,
    /// Centre of the oscillator/compressor probe sum for this browser build.
    #[serde(default = "default_fingerprint_base")]
    pub fingerprint_base: f64,
}

fn default_max_channels() -> u32 {
    2
}

fn default_base_latency() -> f64 {
    0.01
}

fn default_fingerprint_base() -> f64 {
    124.043_475_275_160_74
}

/// Canvas readback parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasParameters {
    /// Fraction of pixels whose low bit is perturbed on readback.
    #[serde(default = "default_canvas_noise")]
    pub noise_intensity: f64,
}

fn default_canvas_noise() -> f64 {
    0.0001
}

impl Default for CanvasParameters {
    fn default() -> Self {
        Self {
            noise_intensity: default_canvas_noise(),
        }
    }
}

/// The three raw seeds every sub-fingerprint is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSeeds {
    /// Drives canvas, font and client-rect noise.
    pub canvas: HexSeed,
    /// Drives audio noise and the audio fingerprint value.
    pub audio: HexSeed,
    /// Drives WebGL readback noise and shader noise.
    pub gpu_renderer: HexSeed,
}

/// Which fonts the page may observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontPolicy {
    /// Restrict to the target OS font list.
    #[serde(default = "default_true")]
    pub restrict_to_target_os: bool,
    /// Fonts added on top of the OS list.
    #[serde(default)]
    pub extra_fonts: Vec<String>,
    /// Fonts removed from the OS list.
    #[serde(default)]
    pub blocked_fonts: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for FontPolicy {
    fn default() -> Self {
        Self {
            restrict_to_target_os: true,
            extra_fonts: Vec::new(),
            blocked_fonts: Vec::new(),
        }
    }
}

/// A complete target identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmProfile {
    /// Stable profile identifier.
    pub id: String,
    pub os: OsIdentity,
    pub browser: BrowserIdentity,
    pub hardware: HardwareCapabilities,
    pub gpu: GpuCapabilities,
    pub screen: ScreenGeometry,
    pub audio: AudioParameters,
    #[serde(default)]
    pub canvas: CanvasParameters,
    pub seeds: RawSeeds,
    #[serde(default)]
    pub fonts: FontPolicy,
}

impl VmProfile {
    /// Loads a profile from a TOML or JSON file, chosen by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ProfileError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let profile: VmProfile = match extension.as_str() {
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            ext => return Err(ProfileError::UnsupportedFormat(ext.to_string())),
        };
        profile.validate()?;
        Ok(profile)
    }

    /// Writes the profile to a TOML or JSON file, chosen by extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ProfileError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = match extension.as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ProfileError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Checks the profile for values no real browser reports.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.id.trim().is_empty() {
            return Err(ProfileError::ValidationError(
                "Profile id cannot be empty".to_string(),
            ));
        }
        if self.browser.user_agent.is_empty() {
            return Err(ProfileError::ValidationError(
                "User agent cannot be empty".to_string(),
            ));
        }
        if self.os.platform.is_empty() {
            return Err(ProfileError::ValidationError(
                "Platform cannot be empty".to_string(),
            ));
        }
        if self.browser.languages.is_empty() {
            return Err(ProfileError::ValidationError(
                "At least one language is required".to_string(),
            ));
        }
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(ProfileError::ValidationError(
                "Screen dimensions must be non-zero".to_string(),
            ));
        }
        if self.screen.avail_width > self.screen.width
            || self.screen.avail_height > self.screen.height
        {
            return Err(ProfileError::ValidationError(
                "Available screen area cannot exceed the screen size".to_string(),
            ));
        }
        if !(self.screen.device_pixel_ratio > 0.0 && self.screen.device_pixel_ratio <= 8.0) {
            return Err(ProfileError::ValidationError(format!(
                "Device pixel ratio out of range: {}",
                self.screen.device_pixel_ratio
            )));
        }
        if self.hardware.hardware_concurrency == 0 {
            return Err(ProfileError::ValidationError(
                "Hardware concurrency must be at least 1".to_string(),
            ));
        }
        if !self.hardware.device_memory.is_power_of_two() {
            return Err(ProfileError::ValidationError(format!(
                "Device memory must be a power of 2, got {}",
                self.hardware.device_memory
            )));
        }
        if self.audio.sample_rate < 8000 || self.audio.sample_rate > 192_000 {
            return Err(ProfileError::ValidationError(format!(
                "Sample rate out of range: {}",
                self.audio.sample_rate
            )));
        }
        if !(0.0..=0.1).contains(&self.canvas.noise_intensity) {
            return Err(ProfileError::ValidationError(format!(
                "Canvas noise intensity out of range: {}",
                self.canvas.noise_intensity
            )));
        }
        if self.gpu.unmasked_renderer.is_empty() {
            return Err(ProfileError::ValidationError(
                "GPU renderer cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolves the profile bound to a context handle.
///
/// This is the profile-loader boundary: the core does not care how profiles
/// are stored, encrypted or selected.
pub trait ProfileSource: Send + Sync {
    /// Profile for `handle`, if one is known.
    fn profile_for(&self, handle: i32) -> Option<Arc<VmProfile>>;
}

/// In-memory [`ProfileSource`] keyed by context handle.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<i32, Arc<VmProfile>>>,
    default_profile: RwLock<Option<Arc<VmProfile>>>,
}

impl ProfileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `profile` to `handle`, replacing any previous binding.
    pub fn insert(&self, handle: i32, profile: Arc<VmProfile>) {
        self.profiles.write().insert(handle, profile);
    }

    /// Removes the binding for `handle`.
    pub fn remove(&self, handle: i32) -> Option<Arc<VmProfile>> {
        self.profiles.write().remove(&handle)
    }

    /// Profile returned for handles without an explicit binding.
    pub fn set_default(&self, profile: Option<Arc<VmProfile>>) {
        *self.default_profile.write() = profile;
    }

    /// Number of explicit bindings.
    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    /// Returns true if no handle has an explicit binding.
    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileSource for ProfileStore {
    fn profile_for(&self, handle: i32) -> Option<Arc<VmProfile>> {
        if let Some(profile) = self.profiles.read().get(&handle) {
            return Some(Arc::clone(profile));
        }
        self.default_profile.read().clone()
    }
}

static GLOBAL_PROFILES: Lazy<Arc<ProfileStore>> = Lazy::new(|| Arc::new(ProfileStore::new()));

/// Process-wide profile store used by the C accessor surface.
pub fn global_profiles() -> Arc<ProfileStore> {
    Arc::clone(&GLOBAL_PROFILES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_seed_parsing() {
        assert_eq!("0x10".parse::<HexSeed>().unwrap(), HexSeed(16));
        assert_eq!("ff".parse::<HexSeed>().unwrap(), HexSeed(255));
        assert_eq!(
            "0XFFFFFFFFFFFFFFFF".parse::<HexSeed>().unwrap(),
            HexSeed(u64::MAX)
        );
        assert!("".parse::<HexSeed>().is_err());
        assert!("0x".parse::<HexSeed>().is_err());
        assert!("xyz".parse::<HexSeed>().is_err());
        assert!("0x1ffffffffffffffff".parse::<HexSeed>().is_err());
    }

    #[test]
    fn test_hex_seed_display() {
        assert_eq!(HexSeed(0xabc).to_string(), "0x0000000000000abc");
    }

    #[test]
    fn test_target_os_parsing() {
        assert_eq!("Windows".parse::<TargetOs>().unwrap(), TargetOs::Windows);
        assert_eq!("macOS".parse::<TargetOs>().unwrap(), TargetOs::MacOs);
        assert_eq!("darwin".parse::<TargetOs>().unwrap(), TargetOs::MacOs);
        assert_eq!("linux".parse::<TargetOs>().unwrap(), TargetOs::Linux);
        assert!("beos".parse::<TargetOs>().is_err());
        assert_eq!(TargetOs::MacOs.to_string(), "macOS");
    }

    #[test]
    fn test_precision_ordering() {
        assert!(PrecisionMode::Lowp < PrecisionMode::Mediump);
        assert!(PrecisionMode::Mediump < PrecisionMode::Highp);
        assert_eq!(PrecisionMode::from_glsl("mediump"), Some(PrecisionMode::Mediump));
        assert_eq!(PrecisionMode::from_glsl("float"), None);
    }

    #[test]
    fn test_json_round_trip_keeps_seeds() {
        let profile = VmProfile::consistent("round-trip");
        let json = serde_json::to_string(&profile).unwrap();
        assert!(json.contains("\"0x"));
        let parsed: VmProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, profile);
    }

    #[test]
    fn test_toml_round_trip() {
        let profile = VmProfile::consistent("toml");
        let text = toml::to_string_pretty(&profile).unwrap();
        let parsed: VmProfile = toml::from_str(&text).unwrap();
        assert_eq!(parsed.seeds, profile.seeds);
        assert_eq!(parsed.os.name, profile.os.name);
    }

    #[test]
    fn test_invalid_seed_rejected_on_load() {
        let profile = VmProfile::consistent("bad-seed");
        let json = serde_json::to_string(&profile)
            .unwrap()
            .replace(&profile.seeds.canvas.to_string(), "0xnothex");
        assert!(serde_json::from_str::<VmProfile>(&json).is_err());
    }

    #[test]
    fn test_validation() {
        let mut profile = VmProfile::consistent("validate");
        assert!(profile.validate().is_ok());

        profile.hardware.device_memory = 6;
        assert!(profile.validate().is_err());

        let mut profile = VmProfile::consistent("validate");
        profile.screen.avail_width = profile.screen.width + 1;
        assert!(profile.validate().is_err());

        let mut profile = VmProfile::consistent("validate");
        profile.browser.languages.clear();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_app_version_fallback() {
        let mut profile = VmProfile::consistent("ua");
        profile.browser.app_version.clear();
        profile.browser.user_agent = "Mozilla/5.0 (X11; Linux x86_64) Test".to_string();
        assert_eq!(
            profile.browser.effective_app_version(),
            "5.0 (X11; Linux x86_64) Test"
        );
    }

    #[test]
    fn test_profile_store_default() {
        let store = ProfileStore::new();
        assert!(store.profile_for(1).is_none());

        let fallback = Arc::new(VmProfile::consistent("default"));
        store.set_default(Some(Arc::clone(&fallback)));
        assert_eq!(store.profile_for(1).unwrap().id, fallback.id);

        let bound = Arc::new(VmProfile::consistent("bound"));
        store.insert(1, Arc::clone(&bound));
        assert_eq!(store.profile_for(1).unwrap().id, bound.id);
        assert_eq!(store.len(), 1);

        store.remove(1);
        assert_eq!(store.profile_for(1).unwrap().id, fallback.id);
    }
}
