//! Spoofing settings and configuration management.
//!
//! Settings come from several sources; later sources override earlier ones:
//! defaults, a TOML or JSON file, `KI_SPOOF_*` environment variables and
//! CLI arguments.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::profile::TargetOs;
use crate::shader::TranslationOptions;

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),

    /// Failed to serialize TOML configuration.
    #[error("Failed to serialize TOML configuration: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    /// Failed to parse JSON configuration.
    #[error("Failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Unsupported file format.
    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// What worker patchers do when no profile is known for a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerFallback {
    /// Draw a random profile once per context handle and keep using it.
    RandomProfile,
    /// Leave the worker source untouched.
    Unpatched,
}

impl Default for WorkerFallback {
    fn default() -> Self {
        Self::RandomProfile
    }
}

impl std::fmt::Display for WorkerFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerFallback::RandomProfile => write!(f, "random_profile"),
            WorkerFallback::Unpatched => write!(f, "unpatched"),
        }
    }
}

impl std::str::FromStr for WorkerFallback {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "random_profile" | "random" => Ok(WorkerFallback::RandomProfile),
            "unpatched" | "none" => Ok(WorkerFallback::Unpatched),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown worker fallback: {}. Valid values are: random_profile, unpatched",
                s
            ))),
        }
    }
}

/// Shader translation toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderSettings {
    #[serde(default = "default_true")]
    pub precision_normalization: bool,

    #[serde(default)]
    pub emulate_precision: bool,

    #[serde(default = "default_true")]
    pub downgrade_qualifiers: bool,

    #[serde(default = "default_true")]
    pub vendor_quirks: bool,

    #[serde(default = "default_true")]
    pub extension_filtering: bool,

    /// Blend seeded noise into fragment output.
    #[serde(default)]
    pub noise_injection: bool,

    /// Peak noise offset in normalized color units.
    #[serde(default = "default_noise_amplitude")]
    pub noise_amplitude: f32,

    #[serde(default)]
    pub debug_banner: bool,
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_noise_amplitude() -> f32 {
    1.0 / 255.0
}

impl Default for ShaderSettings {
    fn default() -> Self {
        Self {
            precision_normalization: true,
            emulate_precision: false,
            downgrade_qualifiers: true,
            vendor_quirks: true,
            extension_filtering: true,
            noise_injection: false,
            noise_amplitude: default_noise_amplitude(),
            debug_banner: false,
        }
    }
}

impl ShaderSettings {
    /// Translator options with `noise_seed` as the noise key.
    pub fn translation_options(&self, noise_seed: u64) -> TranslationOptions {
        TranslationOptions {
            precision_normalization: self.precision_normalization,
            emulate_precision: self.emulate_precision,
            downgrade_qualifiers: self.downgrade_qualifiers,
            vendor_quirks: self.vendor_quirks,
            extension_filtering: self.extension_filtering,
            noise_injection: self.noise_injection,
            noise_seed,
            noise_amplitude: self.noise_amplitude,
            debug_banner: self.debug_banner,
        }
    }
}

/// Main spoofing settings.
///
/// # Example
///
/// ```rust
/// use ki_browser_spoof::config::{SpoofSettings, WorkerFallback};
///
/// let settings = SpoofSettings::default()
///     .with_worker_fallback(WorkerFallback::Unpatched)
///     .with_host_device_pixel_ratio(2.0);
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpoofSettings {
    /// Global switch. When off, generators return empty scripts.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host OS used for font exclusion; auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_os: Option<TargetOs>,

    /// Device pixel ratio of the real display; defaults to the profile's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_device_pixel_ratio: Option<f64>,

    /// Include the Worker/SharedWorker interceptor in injection bundles.
    #[serde(default = "default_true")]
    pub intercept_workers: bool,

    /// Include the iframe interceptor in injection bundles.
    #[serde(default = "default_true")]
    pub intercept_iframes: bool,

    /// Include the Blob URL interceptors in injection bundles.
    #[serde(default = "default_true")]
    pub intercept_blobs: bool,

    #[serde(default)]
    pub worker_fallback: WorkerFallback,

    #[serde(default)]
    pub shader: ShaderSettings,
}

impl Default for SpoofSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host_os: None,
            host_device_pixel_ratio: None,
            intercept_workers: true,
            intercept_iframes: true,
            intercept_blobs: true,
            worker_fallback: WorkerFallback::default(),
            shader: ShaderSettings::default(),
        }
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl SpoofSettings {
    /// Creates a new SpoofSettings with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from a TOML or JSON file, chosen by extension.
    ///
    /// ```rust,no_run
    /// use ki_browser_spoof::config::SpoofSettings;
    ///
    /// let settings = SpoofSettings::from_file("spoof.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "toml" => Ok(toml::from_str(&content)?),
            "json" => Ok(serde_json::from_str(&content)?),
            ext => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    /// Saves settings to a TOML or JSON file, chosen by extension.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let content = match extension.as_str() {
            "toml" => toml::to_string_pretty(self)?,
            "json" => serde_json::to_string_pretty(self)?,
            ext => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
        };

        fs::write(path, content)?;
        Ok(())
    }

    /// Loads settings from `KI_SPOOF_*` environment variables:
    /// - `KI_SPOOF_ENABLED`
    /// - `KI_SPOOF_HOST_OS`
    /// - `KI_SPOOF_HOST_DPR`
    /// - `KI_SPOOF_INTERCEPT_WORKERS`, `KI_SPOOF_INTERCEPT_IFRAMES`, `KI_SPOOF_INTERCEPT_BLOBS`
    /// - `KI_SPOOF_WORKER_FALLBACK`
    /// - `KI_SPOOF_SHADER_NOISE`, `KI_SPOOF_SHADER_EMULATE`, `KI_SPOOF_SHADER_BANNER`
    pub fn from_env() -> Self {
        Self::default().merge_with_env()
    }

    /// Applies environment variable overrides to current settings.
    pub fn merge_with_env(self) -> Self {
        self.merge_with_lookup(|name| env::var(name).ok())
    }

    /// Applies overrides read through `lookup`, using the environment
    /// variable names of [`SpoofSettings::from_env`]. Unparseable values
    /// are ignored.
    pub fn merge_with_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("KI_SPOOF_ENABLED") {
            self.enabled = parse_bool(&val);
        }

        if let Some(val) = lookup("KI_SPOOF_HOST_OS") {
            if let Ok(os) = val.parse() {
                self.host_os = Some(os);
            }
        }

        if let Some(val) = lookup("KI_SPOOF_HOST_DPR") {
            if let Ok(dpr) = val.parse() {
                self.host_device_pixel_ratio = Some(dpr);
            }
        }

        if let Some(val) = lookup("KI_SPOOF_INTERCEPT_WORKERS") {
            self.intercept_workers = parse_bool(&val);
        }

        if let Some(val) = lookup("KI_SPOOF_INTERCEPT_IFRAMES") {
            self.intercept_iframes = parse_bool(&val);
        }

        if let Some(val) = lookup("KI_SPOOF_INTERCEPT_BLOBS") {
            self.intercept_blobs = parse_bool(&val);
        }

        if let Some(val) = lookup("KI_SPOOF_WORKER_FALLBACK") {
            if let Ok(fallback) = val.parse() {
                self.worker_fallback = fallback;
            }
        }

        // Shader toggles
        if let Some(val) = lookup("KI_SPOOF_SHADER_NOISE") {
            self.shader.noise_injection = parse_bool(&val);
        }

        if let Some(val) = lookup("KI_SPOOF_SHADER_EMULATE") {
            self.shader.emulate_precision = parse_bool(&val);
        }

        if let Some(val) = lookup("KI_SPOOF_SHADER_BANNER") {
            self.shader.debug_banner = parse_bool(&val);
        }

        self
    }

    /// Merges settings with CLI arguments.
    ///
    /// ```rust
    /// use ki_browser_spoof::config::{CliArgs, SpoofSettings};
    ///
    /// let args = CliArgs {
    ///     intercept_iframes: Some(false),
    ///     ..Default::default()
    /// };
    ///
    /// let settings = SpoofSettings::default().merge_with_args(&args);
    /// assert!(!settings.intercept_iframes);
    /// ```
    pub fn merge_with_args(mut self, args: &CliArgs) -> Self {
        if let Some(enabled) = args.enabled {
            self.enabled = enabled;
        }
        if let Some(ref host_os) = args.host_os {
            if let Ok(os) = host_os.parse() {
                self.host_os = Some(os);
            }
        }
        if let Some(dpr) = args.host_dpr {
            self.host_device_pixel_ratio = Some(dpr);
        }
        if let Some(workers) = args.intercept_workers {
            self.intercept_workers = workers;
        }
        if let Some(iframes) = args.intercept_iframes {
            self.intercept_iframes = iframes;
        }
        if let Some(blobs) = args.intercept_blobs {
            self.intercept_blobs = blobs;
        }
        if let Some(ref fallback) = args.worker_fallback {
            if let Ok(fallback) = fallback.parse() {
                self.worker_fallback = fallback;
            }
        }
        if let Some(noise) = args.shader_noise {
            self.shader.noise_injection = noise;
        }
        if let Some(banner) = args.shader_banner {
            self.shader.debug_banner = banner;
        }

        self
    }

    /// Validates all settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(dpr) = self.host_device_pixel_ratio {
            if !(dpr.is_finite() && dpr > 0.0 && dpr <= 8.0) {
                return Err(ConfigError::ValidationError(format!(
                    "Host device pixel ratio must be in (0, 8], got {}",
                    dpr
                )));
            }
        }

        let amplitude = self.shader.noise_amplitude;
        if !(amplitude.is_finite() && (0.0..=1.0).contains(&amplitude)) {
            return Err(ConfigError::ValidationError(format!(
                "Shader noise amplitude must be in [0, 1], got {}",
                amplitude
            )));
        }

        Ok(())
    }

    // Builder-style methods

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_host_os(mut self, host_os: TargetOs) -> Self {
        self.host_os = Some(host_os);
        self
    }

    pub fn with_host_device_pixel_ratio(mut self, dpr: f64) -> Self {
        self.host_device_pixel_ratio = Some(dpr);
        self
    }

    /// Sets all three interceptor toggles.
    pub fn with_interceptors(mut self, workers: bool, iframes: bool, blobs: bool) -> Self {
        self.intercept_workers = workers;
        self.intercept_iframes = iframes;
        self.intercept_blobs = blobs;
        self
    }

    pub fn with_worker_fallback(mut self, fallback: WorkerFallback) -> Self {
        self.worker_fallback = fallback;
        self
    }

    pub fn with_shader(mut self, shader: ShaderSettings) -> Self {
        self.shader = shader;
        self
    }

    /// Host OS for font exclusion: the configured one, else the build target.
    pub fn effective_host_os(&self) -> Option<TargetOs> {
        self.host_os.or_else(TargetOs::host)
    }
}

/// CLI argument structure; every field is an optional override.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    pub enabled: Option<bool>,
    pub host_os: Option<String>,
    pub host_dpr: Option<f64>,
    pub intercept_workers: Option<bool>,
    pub intercept_iframes: Option<bool>,
    pub intercept_blobs: Option<bool>,
    /// `random_profile` or `unpatched`.
    pub worker_fallback: Option<String>,
    pub shader_noise: Option<bool>,
    pub shader_banner: Option<bool>,
    /// Configuration file path.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    /// Creates an empty CliArgs instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the final settings: defaults or file, then environment, then
    /// these arguments, then validation.
    ///
    /// ```rust,no_run
    /// use ki_browser_spoof::config::CliArgs;
    ///
    /// let args = CliArgs {
    ///     config_file: Some("spoof.toml".into()),
    ///     shader_noise: Some(true),
    ///     ..Default::default()
    /// };
    ///
    /// let settings = args.load_settings().unwrap();
    /// ```
    pub fn load_settings(&self) -> Result<SpoofSettings, ConfigError> {
        let mut settings = if let Some(ref config_file) = self.config_file {
            SpoofSettings::from_file(config_file)?
        } else {
            SpoofSettings::default()
        };

        settings = settings.merge_with_env();
        settings = settings.merge_with_args(self);
        settings.validate()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_settings() {
        let settings = SpoofSettings::default();
        assert!(settings.enabled);
        assert!(settings.intercept_workers);
        assert!(settings.intercept_iframes);
        assert!(settings.intercept_blobs);
        assert_eq!(settings.worker_fallback, WorkerFallback::RandomProfile);
        assert!(settings.host_os.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_shader_defaults_match_translator() {
        let options = ShaderSettings::default().translation_options(0);
        assert_eq!(options, TranslationOptions::default());
        assert_eq!(ShaderSettings::default().translation_options(42).noise_seed, 42);
    }

    #[test]
    fn test_builder_methods() {
        let settings = SpoofSettings::default()
            .with_enabled(false)
            .with_host_os(TargetOs::Linux)
            .with_host_device_pixel_ratio(1.5)
            .with_interceptors(true, false, true)
            .with_worker_fallback(WorkerFallback::Unpatched);

        assert!(!settings.enabled);
        assert_eq!(settings.host_os, Some(TargetOs::Linux));
        assert_eq!(settings.effective_host_os(), Some(TargetOs::Linux));
        assert_eq!(settings.host_device_pixel_ratio, Some(1.5));
        assert!(!settings.intercept_iframes);
        assert_eq!(settings.worker_fallback, WorkerFallback::Unpatched);
    }

    #[test]
    fn test_validation_invalid_dpr() {
        assert!(SpoofSettings::default()
            .with_host_device_pixel_ratio(0.0)
            .validate()
            .is_err());
        assert!(SpoofSettings::default()
            .with_host_device_pixel_ratio(f64::INFINITY)
            .validate()
            .is_err());
    }

    #[test]
    fn test_validation_invalid_amplitude() {
        let mut settings = SpoofSettings::default();
        settings.shader.noise_amplitude = 2.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_worker_fallback_parsing() {
        assert_eq!(
            "random-profile".parse::<WorkerFallback>().unwrap(),
            WorkerFallback::RandomProfile
        );
        assert_eq!("unpatched".parse::<WorkerFallback>().unwrap(), WorkerFallback::Unpatched);
        assert!("sometimes".parse::<WorkerFallback>().is_err());
        assert_eq!(WorkerFallback::Unpatched.to_string(), "unpatched");
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KI_SPOOF_ENABLED", "0"),
            ("KI_SPOOF_HOST_OS", "macos"),
            ("KI_SPOOF_HOST_DPR", "2"),
            ("KI_SPOOF_WORKER_FALLBACK", "unpatched"),
            ("KI_SPOOF_SHADER_NOISE", "true"),
            ("KI_SPOOF_INTERCEPT_BLOBS", "garbage"),
        ]
        .into_iter()
        .collect();

        let settings =
            SpoofSettings::default().merge_with_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!settings.enabled);
        assert_eq!(settings.host_os, Some(TargetOs::MacOs));
        assert_eq!(settings.host_device_pixel_ratio, Some(2.0));
        assert_eq!(settings.worker_fallback, WorkerFallback::Unpatched);
        assert!(settings.shader.noise_injection);
        assert!(!settings.intercept_blobs);
    }

    #[test]
    fn test_cli_args_merge() {
        let args = CliArgs {
            host_os: Some("windows".into()),
            shader_banner: Some(true),
            worker_fallback: Some("bogus".into()),
            ..Default::default()
        };

        let settings = SpoofSettings::default().merge_with_args(&args);
        assert_eq!(settings.host_os, Some(TargetOs::Windows));
        assert!(settings.shader.debug_banner);
        assert_eq!(settings.worker_fallback, WorkerFallback::RandomProfile); // Unchanged
    }

    #[test]
    fn test_toml_serialization() {
        let settings = SpoofSettings::default().with_host_os(TargetOs::MacOs);
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        let parsed: SpoofSettings = toml::from_str(&toml_str).unwrap();
        assert_eq!(settings, parsed);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: SpoofSettings =
            serde_json::from_str(r#"{"intercept_iframes": false, "shader": {"noise_injection": true}}"#)
                .unwrap();
        assert!(!parsed.intercept_iframes);
        assert!(parsed.intercept_workers);
        assert!(parsed.shader.noise_injection);
        assert!(parsed.shader.extension_filtering);
    }
}
