//! Integration tests for the Seed Registry
//!
//! Determinism, independence of categories across contexts, no stale
//! values after unregister, and per-thread current bindings.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use ki_browser_spoof::profile::{ProfileStore, VmProfile};
use ki_browser_spoof::seeds::{HashKind, SeedBundle, SeedRegistry};

fn fresh_registry() -> Arc<SeedRegistry> {
    Arc::new(SeedRegistry::new(Arc::new(ProfileStore::new())))
}

// ============================================================================
// Determinism Tests
// ============================================================================

#[test]
fn test_same_context_same_bundle() {
    let profile = VmProfile::consistent("determinism");

    let a = fresh_registry();
    let b = fresh_registry();
    a.register_with_profile(1, "ctx_a", &profile);
    b.register_with_profile(99, "ctx_a", &profile);

    assert_eq!(*a.bundle_for(1).unwrap(), *b.bundle_for(99).unwrap());
    assert_eq!(
        *a.bundle_for(1).unwrap(),
        SeedBundle::for_profile(&profile, "ctx_a")
    );
}

#[test]
fn test_accessors_repeat_exactly() {
    let registry = fresh_registry();
    let profile = VmProfile::consistent("determinism");
    registry.register_with_profile(1, "ctx_a", &profile);
    assert!(registry.set_current(1));

    let first = registry.get_all();
    for _ in 0..3 {
        assert_eq!(registry.get_all(), first);
        assert_eq!(registry.get_canvas(), first.canvas);
        assert_eq!(
            registry.get_hash(HashKind::Fonts).as_deref(),
            Some(first.hash_str(HashKind::Fonts))
        );
    }
    registry.clear_current();
}

#[test]
fn test_hash_strings_are_lowercase_hex() {
    let bundle = SeedBundle::for_profile(&VmProfile::consistent("hashes"), "ctx");
    for kind in HashKind::ALL {
        let hash = bundle.hash(kind);
        assert_eq!(hash.len(), 32, "{:?}", kind);
        assert!(hash.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
    }
}

// ============================================================================
// Independence Tests
// ============================================================================

fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

#[test]
fn test_ten_thousand_contexts_are_independent() {
    let profile = VmProfile::consistent("independence");
    let mut canvas_seeds = HashSet::new();
    let mut canvas = Vec::new();
    let mut audio = Vec::new();

    for i in 0..10_000 {
        let bundle = SeedBundle::for_profile(&profile, &format!("context-{}", i));
        assert!(canvas_seeds.insert(bundle.canvas), "canvas seed collision at {}", i);
        canvas.push(bundle.canvas as f64 / u64::MAX as f64);
        audio.push(bundle.audio as f64 / u64::MAX as f64);
    }

    let r = correlation(&canvas, &audio);
    assert!(r.abs() < 0.05, "canvas/audio correlation {}", r);
}

// ============================================================================
// Stale Leakage Tests
// ============================================================================

#[test]
fn test_no_stale_values_after_unregister() {
    let registry = fresh_registry();
    let profile = VmProfile::consistent("stale");

    registry.register_with_profile(1, "ctx_a", &profile);
    assert!(registry.set_current(1));
    let s1 = registry.get_canvas();
    assert_ne!(s1, 0);

    assert!(registry.unregister(1));
    assert_eq!(registry.get_canvas(), 0);
    assert!(registry.get_hash(HashKind::CanvasGeometry).is_none());
    assert!(!registry.get_all().valid);

    registry.register_with_profile(1, "ctx_b", &profile);
    assert_eq!(registry.get_canvas(), 0, "nothing bound after unregister");
    assert!(registry.set_current(1));
    let s2 = registry.get_canvas();
    assert_ne!(s1, s2);
    registry.clear_current();
}

#[test]
fn test_reregister_replaces_bundle() {
    let registry = fresh_registry();
    let profile = VmProfile::consistent("replace");
    registry.register_with_profile(5, "first", &profile);
    registry.register_with_profile(5, "second", &profile);

    assert_eq!(registry.registered_count(), 1);
    assert_eq!(registry.bundle_for(5).unwrap().context_id, "second");
}

#[test]
fn test_failed_set_current_keeps_binding() {
    let registry = fresh_registry();
    let profile = VmProfile::consistent("binding");
    registry.register_with_profile(1, "ctx", &profile);
    assert!(registry.set_current(1));
    let before = registry.get_webgl();

    assert!(!registry.set_current(404));
    assert_eq!(registry.current_handle(), Some(1));
    assert_eq!(registry.get_webgl(), before);
    registry.clear_current();
    assert_eq!(registry.current_handle(), None);
}

// ============================================================================
// Thread Isolation Tests
// ============================================================================

#[test]
fn test_threads_never_see_each_other() {
    let registry = fresh_registry();
    let profile = VmProfile::consistent("threads");
    for handle in 0..8 {
        registry.register_with_profile(handle, &format!("tab-{}", handle), &profile);
    }

    let workers: Vec<_> = (0..8)
        .map(|handle| {
            let registry = registry.clone();
            thread::spawn(move || {
                assert!(registry.set_current(handle));
                let expected = registry.bundle_for(handle).unwrap().canvas;
                for _ in 0..1_000 {
                    assert_eq!(registry.get_canvas(), expected);
                }
                registry.clear_current();
                expected
            })
        })
        .collect();

    let seeds: HashSet<u64> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(seeds.len(), 8);
    // the spawning thread never bound anything
    assert_eq!(registry.get_canvas(), 0);
}

#[test]
fn test_concurrent_register_unregister() {
    let registry = fresh_registry();
    let profile = Arc::new(VmProfile::consistent("churn"));

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let registry = registry.clone();
            let profile = profile.clone();
            thread::spawn(move || {
                for i in 0..250 {
                    let handle = t * 1_000 + i;
                    registry.register_with_profile(handle, &format!("c-{}", handle), &profile);
                    if i % 2 == 0 {
                        assert!(registry.unregister(handle));
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(registry.registered_count(), 4 * 125);
    assert_eq!(registry.derivation_count(), 1_000);
}

#[test]
fn test_bind_guard_scopes_generation_pass() {
    let registry = fresh_registry();
    let profile = VmProfile::consistent("guard");
    registry.register_with_profile(1, "outer", &profile);
    registry.register_with_profile(2, "inner", &profile);

    assert!(registry.set_current(1));
    {
        let guard = registry.bind(2).unwrap();
        assert_eq!(guard.bundle().unwrap().context_id, "inner");
        assert_eq!(registry.current_handle(), Some(2));
    }
    assert_eq!(registry.current_handle(), Some(1));
    registry.clear_current();
}
