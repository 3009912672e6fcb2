//! Stealth and Anti-Detection Module
//!
//! Generates the JavaScript that makes every execution context of a page
//! report one coherent identity, and the interceptors that carry that
//! identity into contexts the page creates later.
//!
//! # Modules
//!
//! - `layers` - execution context types and their capability tables
//! - `runtime` - guard prelude, hooking helpers, worker envelope
//! - `navigator`, `screen`, `timezone`, `canvas`, `webgl`, `audio`, `rects` - per-API generators
//! - `fonts` - font list restriction and metric rescaling
//! - `interceptors` - worker, iframe and Blob URL interceptors, context detector
//! - `manager` - [`SpoofManager`], which composes all of the above
//! - `workers` - [`WorkerPatcher`] strategies for intercepted worker source
//!
//! # Security Considerations
//!
//! `navigator.webdriver` is reported as `false` in every realm that gets a
//! navigator layer, and generated scripts never leave enumerable globals
//! behind.
//!
//! # Example
//!
//! ```rust
//! use ki_browser_spoof::config::SpoofSettings;
//! use ki_browser_spoof::profile::VmProfile;
//! use ki_browser_spoof::stealth::SpoofManager;
//!
//! let manager = SpoofManager::new(SpoofSettings::default());
//! let profile = VmProfile::consistent("session-seed");
//! let script = manager.generate_injection_bundle(true, &profile, "tab-1");
//! assert!(!script.is_empty());
//! ```

pub mod audio;
pub mod canvas;
pub mod fonts;
pub mod interceptors;
pub mod layers;
pub mod manager;
pub mod navigator;
pub mod rects;
pub mod runtime;
pub mod screen;
pub mod timezone;
pub mod webgl;
pub mod workers;

use serde::Serialize;

// Re-export commonly used types for convenience
pub use fonts::{macos_exclusive_fonts, resolve_allowed_fonts, target_os_fonts, FontSpoofer};
pub use layers::{ExecutionContextType, LayerConfig};
pub use manager::SpoofManager;
pub use navigator::NavigatorOverrides;
pub use webgl::WebGlOverrides;
pub use workers::{
    classify_worker_url, is_es_module, DedicatedWorkerPatcher, ServiceWorkerPatcher,
    SharedWorkerPatcher, WorkerPatcher,
};

/// Serializes `value` as a JavaScript literal that is also safe inside an
/// HTML `<script>` element.
pub fn js_json<T: Serialize + ?Sized>(value: &T) -> String {
    // only fails for maps with non-string keys
    serde_json::to_string(value)
        .unwrap_or_else(|_| "null".to_string())
        .replace("</", "<\\/")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Quotes `s` as a JavaScript string literal.
pub fn js_string(s: &str) -> String {
    js_json(s)
}
