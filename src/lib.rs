//! # KI-Browser Spoof
//!
//! Fingerprint spoofing core for the KI-Browser, written in Rust.
//!
//! Makes a browser instance present one coherent hardware and software
//! identity to every execution context a page creates: the main frame,
//! same-origin iframes, dedicated, shared and service workers, worklets and
//! workers spawned from workers.
//!
//! ## Features
//!
//! - **Seed Registry**: deterministic per-context noise seeds and hash strings, with a C ABI
//! - **Layered Injection**: guarded scripts per context type, worker/iframe/Blob URL interceptors
//! - **GLSL Translation**: precision, quirk, extension and noise rewriting of WebGL shaders
//! - **Font Identity**: target-OS font lists, host font exclusion, DPR-corrected metrics
//! - **Flexible Configuration**: TOML/JSON files, environment variables, CLI arguments
//!
//! ## Quick Start
//!
//! ```rust
//! use ki_browser_spoof::{
//!     config::SpoofSettings,
//!     profile::VmProfile,
//!     seeds::SeedRegistry,
//!     stealth::SpoofManager,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(SeedRegistry::default());
//! let manager = SpoofManager::with_registry(SpoofSettings::default(), registry.clone());
//!
//! let profile = VmProfile::consistent("session-seed");
//! registry.register_with_profile(1, "tab-1", &profile);
//!
//! // inject before any page script runs
//! let script = manager.generate_injection_bundle(true, &profile, "tab-1");
//! assert!(!script.is_empty());
//! ```
//!
//! ## Module Overview
//!
//! - [`profile`]: VM profiles, presets and profile sources
//! - [`seeds`]: Seed Registry, derivation and the C accessor table
//! - [`shader`]: GLSL tokenizer, translator and validator
//! - [`stealth`]: script generators, Font Spoofer, Spoof Manager and Worker Patchers
//! - [`config`]: Configuration loading and management
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        KI-Browser Spoof                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌──────────────────┐    │
//! │  │ Profile │─▶│  Seed   │─▶│  Spoof  │─▶│  Worker Patchers │    │
//! │  │  Model  │  │Registry │  │ Manager │  └──────────────────┘    │
//! │  └─────────┘  └─────────┘  └────┬────┘                          │
//! │                                 │                               │
//! │                      ┌──────────┴──────────┐                    │
//! │                ┌─────┴─────┐         ┌─────┴─────┐              │
//! │                │   Font    │         │  Shader   │              │
//! │                │  Spoofer  │         │Translator │              │
//! │                └───────────┘         └───────────┘              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//!
//! Configuration follows a precedence chain:
//! 1. Default values
//! 2. Configuration file (TOML/JSON)
//! 3. Environment variables (`KI_SPOOF_*`)
//! 4. CLI arguments
//!
//! See [`config::SpoofSettings`] for all available options.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Full version string with name
pub const FULL_VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Module Exports
// ============================================================================

/// Configuration management for loading settings from files, env, and CLI.
pub mod config;

/// VM profiles: the identities presented to web content.
pub mod profile;

/// Per-context seed derivation, storage and the C accessor table.
pub mod seeds;

/// GLSL translation against a target GPU profile.
pub mod shader;

/// Script generation for every execution context type.
pub mod stealth;

// ============================================================================
// Re-exports for Convenience
// ============================================================================

// Config types
pub use config::{CliArgs, ConfigError, ShaderSettings, SpoofSettings, WorkerFallback};

// Profile types
pub use profile::{
    FontPolicy, GpuCapabilities, PrecisionMode, ProfileError, ProfileSource, ProfileStore,
    TargetOs, VmProfile,
};

// Seed types
pub use seeds::{HashKind, RegistryError, SeedBundle, SeedCategory, SeedRegistry, SeedSnapshot};

// Shader types
pub use shader::{
    validate_shader, GpuProfile, ShaderStage, ShaderTranslator, ShaderViolation,
    TranslationOptions, TranslationResult,
};

// Stealth types
pub use stealth::{
    ExecutionContextType, FontSpoofer, LayerConfig, SpoofManager, WorkerPatcher,
};

// ============================================================================
// Prelude Module
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```rust
/// use ki_browser_spoof::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CliArgs, SpoofSettings};
    pub use crate::profile::VmProfile;
    pub use crate::seeds::SeedRegistry;
    pub use crate::shader::{ShaderStage, ShaderTranslator};
    pub use crate::stealth::{
        DedicatedWorkerPatcher, ExecutionContextType, ServiceWorkerPatcher, SharedWorkerPatcher,
        SpoofManager, WorkerPatcher,
    };
    pub use crate::{FULL_VERSION, NAME, VERSION};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert!(!VERSION.is_empty());
        assert!(!NAME.is_empty());
        assert!(FULL_VERSION.contains(VERSION));
        assert!(FULL_VERSION.contains(NAME));
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let _ = VERSION;
        let _ = NAME;
        let _ = ExecutionContextType::MainFrame;
    }
}
