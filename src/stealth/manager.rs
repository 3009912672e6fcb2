//! Spoof Manager
//!
//! Composes the per-API generators into complete scripts for each
//! execution context type, and builds the interceptors that carry the same
//! identity into iframes, workers and Blob URL workers.
//!
//! Every script embeds the context's [`SeedBundle`] snapshot, so a child
//! realm reconstructs its spoof state from the text it was handed and never
//! needs to reach back into the registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::audio::AudioOverrides;
use super::canvas::CanvasNoise;
use super::fonts::FontSpoofer;
use super::interceptors::{self, PayloadSource, IS_MAIN_FRAME_EXPR};
use super::js_json;
use super::layers::{ExecutionContextType, LayerConfig};
use super::navigator::NavigatorOverrides;
use super::rects::ClientRectNoise;
use super::runtime::{capability, envelope, guarded_function, GLOBAL_EXPR};
use super::screen::ScreenOverrides;
use super::timezone::TimezoneOverrides;
use super::webgl::WebGlOverrides;
use crate::config::{SpoofSettings, WorkerFallback};
use crate::profile::VmProfile;
use crate::seeds::{global_registry, SeedBundle, SeedCategory, SeedRegistry};
use crate::shader::{GpuProfile, ShaderStage, ShaderTranslator, TranslationResult};

/// Produces every script the hosting engine injects.
///
/// Generation is pure apart from the sticky fallback profiles; one manager
/// can serve all threads.
pub struct SpoofManager {
    settings: SpoofSettings,
    translator: ShaderTranslator,
    registry: Arc<SeedRegistry>,
    fallback_profiles: Mutex<HashMap<i32, Arc<VmProfile>>>,
}

impl std::fmt::Debug for SpoofManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoofManager")
            .field("settings", &self.settings)
            .field("registry", &self.registry)
            .field("fallback_profiles", &self.fallback_profiles.lock().len())
            .finish()
    }
}

impl SpoofManager {
    /// Manager over the process-wide registry.
    pub fn new(settings: SpoofSettings) -> Self {
        Self::with_registry(settings, global_registry())
    }

    pub fn with_registry(settings: SpoofSettings, registry: Arc<SeedRegistry>) -> Self {
        Self {
            settings,
            translator: ShaderTranslator::new(),
            registry,
            fallback_profiles: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &SpoofSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<SeedRegistry> {
        &self.registry
    }

    pub fn translator(&self) -> &ShaderTranslator {
        &self.translator
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    // ==================== Frame and worker scripts ====================

    /// Guarded script for a main frame or iframe.
    ///
    /// Running it twice in one window is a no-op the second time.
    pub fn generate_frame_script(
        &self,
        is_main_frame: bool,
        profile: &VmProfile,
        context_id: &str,
    ) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        let bundle = SeedBundle::for_profile(profile, context_id);
        let script = self.boot_script(
            &bundle,
            profile,
            ExecutionContextType::MainFrame.layer(),
            "(isMainFrame ? 'main_frame' : 'iframe')",
            if is_main_frame { "true" } else { "false" },
        );
        trace!(
            "Generated {} script for {}: {} bytes",
            if is_main_frame { "main frame" } else { "iframe" },
            context_id,
            script.len()
        );
        script
    }

    /// Enveloped script for a worker or worklet realm.
    ///
    /// Frame types delegate to [`SpoofManager::generate_frame_script`].
    /// Dedicated and shared workers also carry the worker and Blob URL
    /// interceptors, rebuilt from the envelope, so their own nested
    /// workers boot with the same payload.
    pub fn generate_worker_script(
        &self,
        profile: &VmProfile,
        worker_type: ExecutionContextType,
        context_id: &str,
    ) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        if worker_type.is_frame() {
            return self.generate_frame_script(
                worker_type == ExecutionContextType::MainFrame,
                profile,
                context_id,
            );
        }

        let bundle = SeedBundle::for_profile(profile, context_id);
        let mut payload = self.boot_script(
            &bundle,
            profile,
            worker_type.layer(),
            &js_json(worker_type.as_str()),
            "false",
        );

        if can_spawn_workers(worker_type) {
            let key = bundle.namespace_key();
            if self.settings.intercept_workers {
                payload.push_str(&interceptors::worker_interceptor(key, PayloadSource::Inherited));
            }
            if self.settings.intercept_blobs {
                payload.push_str(&interceptors::blob_url_interceptor(key, PayloadSource::Inherited));
            }
        }

        let script = envelope(&payload);
        trace!(
            "Generated {} script for {}: {} bytes",
            worker_type,
            context_id,
            script.len()
        );
        script
    }

    fn boot_script(
        &self,
        bundle: &SeedBundle,
        profile: &VmProfile,
        layer: LayerConfig,
        layer_expr: &str,
        is_main_frame: &str,
    ) -> String {
        let name = format!("{}_boot", bundle.namespace_key());
        let capabilities = self.capabilities(layer, profile, bundle);
        format!(
            "(function () {{\n{}\n{}({}, {});\n}})();\n",
            guarded_function(&name, bundle, layer_expr, &capabilities),
            name,
            GLOBAL_EXPR,
            is_main_frame
        )
    }

    fn capabilities(&self, layer: LayerConfig, profile: &VmProfile, bundle: &SeedBundle) -> String {
        let mut out = String::new();
        for name in layer.enabled() {
            let body = match name {
                "navigator" => NavigatorOverrides::from_profile(profile).script(),
                "screen" => ScreenOverrides::from_profile(profile).script(),
                "timezone" => TimezoneOverrides::from_profile(profile).script(),
                "canvas" => CanvasNoise::from_profile(profile).script(),
                "offscreen_canvas" => CanvasNoise::from_profile(profile).offscreen_script(),
                "webgl" => WebGlOverrides::from_profile(profile).script(),
                "audio" => AudioOverrides::from_profile(profile).script(),
                "fonts" => self.font_spoofer(profile, bundle).patch_body(),
                "dom_rects" => ClientRectNoise::default().script(),
                _ => continue,
            };
            out.push_str(&capability(name, &body));
        }
        out
    }

    /// Font spoofer configured with this manager's host settings.
    pub fn font_spoofer(&self, profile: &VmProfile, bundle: &SeedBundle) -> FontSpoofer {
        let actual_dpr = self
            .settings
            .host_device_pixel_ratio
            .unwrap_or(profile.screen.device_pixel_ratio);
        FontSpoofer::new(profile, bundle.script_key(SeedCategory::Fonts))
            .with_host(self.settings.effective_host_os())
            .with_actual_dpr(actual_dpr)
    }

    // ==================== Interceptors ====================

    /// Hooks `Worker` and `SharedWorker` in an already patched frame.
    pub fn generate_worker_interceptor(&self, profile: &VmProfile, context_id: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        let bundle = SeedBundle::for_profile(profile, context_id);
        let dedicated =
            self.generate_worker_script(profile, ExecutionContextType::DedicatedWorker, context_id);
        let shared =
            self.generate_worker_script(profile, ExecutionContextType::SharedWorker, context_id);
        interceptors::worker_interceptor(
            bundle.namespace_key(),
            PayloadSource::Embedded {
                dedicated: &dedicated,
                shared: &shared,
            },
        )
    }

    /// Boots same-origin child windows before the page can reach them.
    pub fn generate_iframe_interceptor(&self, profile: &VmProfile, context_id: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        let bundle = SeedBundle::for_profile(profile, context_id);
        interceptors::iframe_interceptor(bundle.namespace_key())
    }

    /// Wraps worker-looking Blobs so their object URLs boot patched.
    pub fn generate_blob_url_interceptor(&self, profile: &VmProfile, context_id: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        let bundle = SeedBundle::for_profile(profile, context_id);
        let dedicated =
            self.generate_worker_script(profile, ExecutionContextType::DedicatedWorker, context_id);
        let shared =
            self.generate_worker_script(profile, ExecutionContextType::SharedWorker, context_id);
        interceptors::blob_url_interceptor(
            bundle.namespace_key(),
            PayloadSource::Embedded {
                dedicated: &dedicated,
                shared: &shared,
            },
        )
    }

    /// Self-contained Blob interceptor; must be the first script a frame
    /// evaluates.
    pub fn generate_early_blob_interceptor(&self, profile: &VmProfile, context_id: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        let bundle = SeedBundle::for_profile(profile, context_id);
        let dedicated =
            self.generate_worker_script(profile, ExecutionContextType::DedicatedWorker, context_id);
        interceptors::early_blob_interceptor(bundle.namespace_key(), &dedicated)
    }

    /// First static import for a module script. The imported module picks
    /// the worker payload or the frame bundle depending on the realm.
    pub fn generate_es_module_early_patch(&self, profile: &VmProfile, context_id: &str) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        let worker =
            self.generate_worker_script(profile, ExecutionContextType::DedicatedWorker, context_id);
        let frame = self.injection_bundle(IS_MAIN_FRAME_EXPR, profile, context_id);
        interceptors::es_module_import(&format!(
            "if (typeof document === 'undefined') {{\n{}}} else {{\n{}}}\n",
            worker, frame
        ))
    }

    /// Expression that evaluates to the current realm's context label, see
    /// [`ExecutionContextType::from_detector`].
    pub fn generate_context_detector(&self) -> String {
        interceptors::context_detector()
    }

    /// Everything a frame needs, in injection order: early Blob
    /// interceptor, frame script, then the worker, iframe and Blob URL
    /// interceptors enabled in the settings.
    pub fn generate_injection_bundle(
        &self,
        is_main_frame: bool,
        profile: &VmProfile,
        context_id: &str,
    ) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        self.injection_bundle(if is_main_frame { "true" } else { "false" }, profile, context_id)
    }

    fn injection_bundle(&self, is_main_frame: &str, profile: &VmProfile, context_id: &str) -> String {
        let bundle = SeedBundle::for_profile(profile, context_id);
        let mut script = String::new();

        if self.settings.intercept_blobs {
            script.push_str("// === EARLY BLOB INTERCEPTOR ===\n");
            script.push_str(&self.generate_early_blob_interceptor(profile, context_id));
        }

        script.push_str("// === FRAME ===\n");
        script.push_str(&self.boot_script(
            &bundle,
            profile,
            ExecutionContextType::MainFrame.layer(),
            "(isMainFrame ? 'main_frame' : 'iframe')",
            is_main_frame,
        ));

        if self.settings.intercept_workers {
            script.push_str("// === WORKER INTERCEPTOR ===\n");
            script.push_str(&self.generate_worker_interceptor(profile, context_id));
        }

        if self.settings.intercept_iframes {
            script.push_str("// === IFRAME INTERCEPTOR ===\n");
            script.push_str(&self.generate_iframe_interceptor(profile, context_id));
        }

        if self.settings.intercept_blobs {
            script.push_str("// === BLOB URL INTERCEPTOR ===\n");
            script.push_str(&self.generate_blob_url_interceptor(profile, context_id));
        }

        debug!(
            "Built injection bundle for {} ({} bytes)",
            context_id,
            script.len()
        );
        script
    }

    // ==================== Shaders ====================

    /// Translates a shader for `profile`, keyed by the current context's
    /// WebGL seed (zero when nothing is bound).
    pub fn translate_shader(
        &self,
        source: &str,
        stage: ShaderStage,
        profile: &VmProfile,
    ) -> TranslationResult {
        if !self.is_enabled() {
            return TranslationResult::unchanged(source);
        }
        let options = self
            .settings
            .shader
            .translation_options(self.registry.get_webgl());
        self.translator
            .translate(source, stage, &GpuProfile::from_profile(profile), &options)
    }

    // ==================== Worker contexts ====================

    /// Profile for a worker's context handle, honouring the configured
    /// fallback when the registry knows none.
    pub fn resolve_profile(&self, handle: i32) -> Option<Arc<VmProfile>> {
        if let Some(profile) = self.registry.profile_for(handle) {
            return Some(profile);
        }
        match self.settings.worker_fallback {
            WorkerFallback::RandomProfile => Some(self.fallback_profile(handle)),
            WorkerFallback::Unpatched => {
                warn!("No profile for context {}; leaving worker unpatched", handle);
                None
            }
        }
    }

    /// Random profile drawn once per handle and reused afterwards.
    pub fn fallback_profile(&self, handle: i32) -> Arc<VmProfile> {
        self.fallback_profiles
            .lock()
            .entry(handle)
            .or_insert_with(|| {
                warn!(
                    "No profile for context {}; substituting a random profile",
                    handle
                );
                Arc::new(VmProfile::random())
            })
            .clone()
    }

    /// Forgets the fallback profile of a destroyed context.
    pub fn release_fallback(&self, handle: i32) -> bool {
        self.fallback_profiles.lock().remove(&handle).is_some()
    }

    /// String id a handle was registered with, or a synthetic one.
    pub fn context_id_for(&self, handle: i32) -> String {
        self.registry
            .bundle_for(handle)
            .map(|bundle| bundle.context_id.clone())
            .unwrap_or_else(|| format!("worker-{}", handle))
    }
}

fn can_spawn_workers(worker_type: ExecutionContextType) -> bool {
    matches!(
        worker_type,
        ExecutionContextType::DedicatedWorker | ExecutionContextType::SharedWorker
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ProfileStore;
    use crate::stealth::runtime::ENVELOPE_MARKER;

    fn manager(settings: SpoofSettings) -> SpoofManager {
        let registry = Arc::new(SeedRegistry::new(Arc::new(ProfileStore::new())));
        SpoofManager::with_registry(settings, registry)
    }

    #[test]
    fn test_frame_script_is_guarded() {
        let profile = VmProfile::consistent("manager");
        let script = manager(SpoofSettings::default()).generate_frame_script(true, &profile, "ctx");
        let bundle = SeedBundle::for_profile(&profile, "ctx");
        assert!(script.contains(bundle.namespace_key()));
        assert!(script.contains("hasOwnProperty.call(G, KEY)"));
        assert!(script.contains("apply(\"screen\""));
        assert!(script.contains("apply(\"fonts\""));
    }

    #[test]
    fn test_worker_script_follows_layer() {
        let profile = VmProfile::consistent("manager");
        let m = manager(SpoofSettings::default());

        let dedicated = m.generate_worker_script(&profile, ExecutionContextType::DedicatedWorker, "ctx");
        assert!(dedicated.contains(ENVELOPE_MARKER));
        assert!(dedicated.contains("\"dedicated_worker\""));
        assert!(!dedicated.contains("apply(\"screen\""));
        assert!(dedicated.contains("apply(\"offscreen_canvas\""));

        let service = m.generate_worker_script(&profile, ExecutionContextType::ServiceWorker, "ctx");
        assert!(!service.contains("apply(\"webgl\""));
        assert!(!service.contains("workerHooked"));
        assert!(dedicated.contains("workerHooked"));
    }

    #[test]
    fn test_frame_type_delegates() {
        let profile = VmProfile::consistent("manager");
        let m = manager(SpoofSettings::default());
        assert_eq!(
            m.generate_worker_script(&profile, ExecutionContextType::Iframe, "ctx"),
            m.generate_frame_script(false, &profile, "ctx")
        );
    }

    #[test]
    fn test_disabled_generates_nothing() {
        let profile = VmProfile::consistent("manager");
        let m = manager(SpoofSettings::default().with_enabled(false));
        assert!(m.generate_injection_bundle(true, &profile, "ctx").is_empty());
        assert!(m.generate_worker_interceptor(&profile, "ctx").is_empty());
        assert!(m.generate_es_module_early_patch(&profile, "ctx").is_empty());
        let result = m.translate_shader("void main(){}", ShaderStage::Fragment, &profile);
        assert!(result.success);
        assert_eq!(result.translated_source, "void main(){}");
    }

    #[test]
    fn test_bundle_respects_toggles() {
        let profile = VmProfile::consistent("manager");
        let full = manager(SpoofSettings::default()).generate_injection_bundle(true, &profile, "ctx");
        assert!(full.contains("EARLY BLOB INTERCEPTOR"));
        assert!(full.contains("IFRAME INTERCEPTOR"));

        let bare = manager(SpoofSettings::default().with_interceptors(false, false, false))
            .generate_injection_bundle(true, &profile, "ctx");
        assert!(bare.contains("=== FRAME ==="));
        assert!(!bare.contains("INTERCEPTOR"));
    }

    #[test]
    fn test_es_module_patch_is_import() {
        let profile = VmProfile::consistent("manager");
        let patch = manager(SpoofSettings::default()).generate_es_module_early_patch(&profile, "ctx");
        assert!(patch.starts_with("import \"data:text/javascript;base64,"));
        assert!(patch.ends_with("\";\n"));
    }

    #[test]
    fn test_fallback_is_sticky() {
        let m = manager(SpoofSettings::default());
        let first = m.resolve_profile(7).unwrap();
        let second = m.resolve_profile(7).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(m.release_fallback(7));
        assert!(!m.release_fallback(7));
    }

    #[test]
    fn test_unpatched_fallback() {
        let m = manager(SpoofSettings::default().with_worker_fallback(WorkerFallback::Unpatched));
        assert!(m.resolve_profile(7).is_none());
        assert_eq!(m.context_id_for(7), "worker-7");
    }

    #[test]
    fn test_registered_profile_wins() {
        let store = Arc::new(ProfileStore::new());
        let profile = VmProfile::consistent("registered");
        store.insert(3, Arc::new(profile.clone()));
        let registry = Arc::new(SeedRegistry::new(store));
        let m = SpoofManager::with_registry(SpoofSettings::default(), registry);
        m.registry().register(3, "tab-3").unwrap();
        assert_eq!(*m.resolve_profile(3).unwrap(), profile);
        assert_eq!(m.context_id_for(3), "tab-3");
    }
}
