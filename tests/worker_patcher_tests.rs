//! Integration tests for the Worker Patchers
//!
//! URL classification, script prefixing, module detection and the
//! fallback used when a worker's context has no registered profile.

use std::sync::Arc;

use boa_engine::{Context, Source};

use ki_browser_spoof::config::{SpoofSettings, WorkerFallback};
use ki_browser_spoof::profile::{ProfileStore, VmProfile};
use ki_browser_spoof::seeds::SeedRegistry;
use ki_browser_spoof::stealth::workers::{all_patchers, patcher_for_url};
use ki_browser_spoof::stealth::{
    classify_worker_url, is_es_module, DedicatedWorkerPatcher, ExecutionContextType,
    ServiceWorkerPatcher, SharedWorkerPatcher, SpoofManager, WorkerPatcher,
};

const HANDLE: i32 = 11;

fn setup(fallback: WorkerFallback) -> (Arc<SpoofManager>, Arc<ProfileStore>) {
    let store = Arc::new(ProfileStore::new());
    let registry = Arc::new(SeedRegistry::new(store.clone()));
    let settings = SpoofSettings::default().with_worker_fallback(fallback);
    (Arc::new(SpoofManager::with_registry(settings, registry)), store)
}

fn registered_manager() -> Arc<SpoofManager> {
    let (manager, store) = setup(WorkerFallback::RandomProfile);
    store.insert(HANDLE, Arc::new(VmProfile::consistent("workers")));
    manager.registry().register(HANDLE, "tab-11").unwrap();
    manager
}

// ============================================================================
// Classification Tests
// ============================================================================

#[test]
fn test_classify_urls() {
    use ExecutionContextType::*;
    let cases = [
        ("https://a.test/sw.js", Some(ServiceWorker)),
        ("https://a.test/firebase-messaging-sw.js?v=3", Some(ServiceWorker)),
        ("https://a.test/static/shared-worker.js", Some(SharedWorker)),
        ("https://a.test/js/worker.bundle.mjs", Some(DedicatedWorker)),
        ("blob:https://a.test/0b9e", Some(DedicatedWorker)),
        ("https://a.test/app.js", None),
    ];
    for (url, expected) in cases {
        assert_eq!(classify_worker_url(url), expected, "{}", url);
    }
}

#[test]
fn test_patcher_for_url() {
    let patchers = all_patchers(registered_manager());
    assert_eq!(
        patcher_for_url(&patchers, "/sw.js").map(|p| p.worker_type()),
        Some(ExecutionContextType::ServiceWorker)
    );
    assert_eq!(
        patcher_for_url(&patchers, "/worker.js").map(|p| p.worker_type()),
        Some(ExecutionContextType::DedicatedWorker)
    );
    assert!(patcher_for_url(&patchers, "/main.js").is_none());
}

#[test]
fn test_module_detection_ignores_comments() {
    assert!(is_es_module("import { a } from './a.js';\nself.onmessage = a;"));
    assert!(is_es_module("const u = import.meta.url;"));
    assert!(is_es_module("export default 1;"));
    assert!(!is_es_module("// import x from 'y'\nimportScripts('a.js');"));
    assert!(!is_es_module("/* export default 1 */ postMessage(1);"));

    let late = format!("{}\nimport x from 'y';", " ".repeat(5_000));
    assert!(!is_es_module(&late));
}

// ============================================================================
// Patching Tests
// ============================================================================

#[test]
fn test_classic_script_prefixed() {
    let patcher = DedicatedWorkerPatcher::new(registered_manager());
    let content = "self.onmessage = function (e) { postMessage(e.data); };";
    let patched = patcher.patch_script(content, "/worker.js", HANDLE);

    assert!(patched.ends_with(content));
    assert!(patched.starts_with(&patcher.get_patch_code(HANDLE)));

    let mut context = Context::default();
    if let Err(e) = context.eval(Source::from_bytes(&patched)) {
        panic!("patched worker failed: {}", e);
    }
}

#[test]
fn test_use_strict_stays_first() {
    let patcher = SharedWorkerPatcher::new(registered_manager());
    let patched = patcher.patch_script("'use strict';\nonconnect = null;", "/shared-worker.js", HANDLE);
    assert!(patched.starts_with("'use strict';\n(function () { var __ksPayload"));
    assert!(patched.ends_with("\nonconnect = null;"));
}

#[test]
fn test_use_strict_after_license_comment() {
    let patcher = DedicatedWorkerPatcher::new(registered_manager());
    let content = "/*! worker.js | MIT */\n\"use strict\"\nvar strict = (function () { return this === undefined; })();";
    let patched = patcher.patch_script(content, "/worker.js", HANDLE);
    assert!(patched.starts_with("/*! worker.js | MIT */\n\"use strict\";\n(function () { var __ksPayload"));

    let mut context = Context::default();
    if let Err(e) = context.eval(Source::from_bytes(&patched)) {
        panic!("patched worker failed: {}", e);
    }
    let strict = context.eval(Source::from_bytes("strict")).unwrap();
    assert_eq!(strict.as_boolean(), Some(true));
}

#[test]
fn test_module_script_gets_import() {
    let patcher = DedicatedWorkerPatcher::new(registered_manager());
    let content = "import { run } from './run.js';\nrun();";
    let patched = patcher.patch_script(content, "/worker.mjs", HANDLE);
    assert!(patched.starts_with("import \"data:text/javascript;base64,"));
    assert!(patched.ends_with(content));
}

#[test]
fn test_already_patched_untouched() {
    let patcher = DedicatedWorkerPatcher::new(registered_manager());
    let once = patcher.patch_script("postMessage(1);", "/worker.js", HANDLE);
    assert_eq!(patcher.patch_script(&once, "/worker.js", HANDLE), once);
}

#[test]
fn test_service_worker_payload_has_no_nested_hooks() {
    let manager = registered_manager();
    let service = ServiceWorkerPatcher::new(manager.clone()).get_patch_code(HANDLE);
    let dedicated = DedicatedWorkerPatcher::new(manager).get_patch_code(HANDLE);
    assert!(!service.contains("workerHooked"));
    assert!(dedicated.contains("workerHooked"));
    assert!(dedicated.contains("blobHooked"));
}

#[test]
fn test_payload_uses_registered_context() {
    let manager = registered_manager();
    let code = DedicatedWorkerPatcher::new(manager.clone()).get_patch_code(HANDLE);
    assert!(code.contains("\"tab-11\""));
    assert_eq!(manager.context_id_for(HANDLE), "tab-11");
}

// ============================================================================
// Fallback Tests
// ============================================================================

#[test]
fn test_unpatched_fallback_leaves_script() {
    let (manager, _store) = setup(WorkerFallback::Unpatched);
    let patcher = DedicatedWorkerPatcher::new(manager);
    assert!(patcher.get_patch_code(404).is_empty());
    assert_eq!(patcher.patch_script("postMessage(1);", "/worker.js", 404), "postMessage(1);");
}

#[test]
fn test_random_fallback_is_sticky() {
    let (manager, _store) = setup(WorkerFallback::RandomProfile);
    let patcher = DedicatedWorkerPatcher::new(manager.clone());

    let first = patcher.get_patch_code(404);
    assert!(!first.is_empty());
    assert!(first.contains("\"worker-404\""));
    assert_eq!(patcher.get_patch_code(404), first);

    assert!(manager.release_fallback(404));
    assert!(!manager.release_fallback(404));
}
