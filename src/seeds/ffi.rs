//! C accessor table over the process-wide registry.
//!
//! Native rendering code calls these from whatever thread it runs on; the
//! "current" context is per thread, so the embedder calls
//! `ki_seeds_set_current` before rendering on behalf of a context.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tracing::warn;

use super::bundle::{HashKind, SeedSnapshot};
use super::registry::SeedRegistry;
use crate::profile::global_profiles;

static GLOBAL_REGISTRY: Lazy<Arc<SeedRegistry>> =
    Lazy::new(|| Arc::new(SeedRegistry::new(global_profiles())));

/// The process-wide registry behind the C accessors.
pub fn global_registry() -> Arc<SeedRegistry> {
    GLOBAL_REGISTRY.clone()
}

thread_local! {
    // one buffer per kind; a returned pointer stays valid until the same
    // kind is read again on this thread
    static HASH_BUFFERS: RefCell<Vec<CString>> =
        RefCell::new(vec![CString::default(); HashKind::COUNT]);
}

fn hash_ptr(kind: HashKind) -> *const c_char {
    let Some(hash) = GLOBAL_REGISTRY.get_hash(kind) else {
        return ptr::null();
    };
    let Ok(hash) = CString::new(hash) else {
        return ptr::null();
    };
    HASH_BUFFERS.with(|buffers| {
        let mut buffers = buffers.borrow_mut();
        buffers[kind as usize] = hash;
        buffers[kind as usize].as_ptr()
    })
}

/// Registers a context with the global registry.
///
/// # Safety
///
/// `context_id` must be NULL or point to a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn ki_seeds_register(handle: i32, context_id: *const c_char) -> bool {
    if context_id.is_null() {
        return false;
    }
    // SAFETY: non-null and NUL-terminated per the contract above
    let context_id = unsafe { CStr::from_ptr(context_id) }.to_string_lossy();
    match GLOBAL_REGISTRY.register(handle, &context_id) {
        Ok(()) => true,
        Err(e) => {
            warn!("ki_seeds_register failed: {}", e);
            false
        }
    }
}

#[no_mangle]
pub extern "C" fn ki_seeds_unregister(handle: i32) -> bool {
    GLOBAL_REGISTRY.unregister(handle)
}

#[no_mangle]
pub extern "C" fn ki_seeds_set_current(handle: i32) -> bool {
    GLOBAL_REGISTRY.set_current(handle)
}

#[no_mangle]
pub extern "C" fn ki_seeds_clear_current() {
    GLOBAL_REGISTRY.clear_current()
}

#[no_mangle]
pub extern "C" fn ki_seeds_is_enabled() -> bool {
    GLOBAL_REGISTRY.is_enabled()
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_canvas() -> u64 {
    GLOBAL_REGISTRY.get_canvas()
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_webgl() -> u64 {
    GLOBAL_REGISTRY.get_webgl()
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_audio() -> u64 {
    GLOBAL_REGISTRY.get_audio()
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_fonts() -> u64 {
    GLOBAL_REGISTRY.get_fonts()
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_client_rects() -> u64 {
    GLOBAL_REGISTRY.get_client_rects()
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_audio_fingerprint() -> f64 {
    GLOBAL_REGISTRY.get_audio_fingerprint()
}

/// Hash string for a raw kind, or NULL when the kind is unknown or nothing
/// is bound. The pointer is owned by the library.
#[no_mangle]
pub extern "C" fn ki_seeds_get_hash(kind: i32) -> *const c_char {
    match HashKind::from_raw(kind) {
        Some(kind) => hash_ptr(kind),
        None => ptr::null(),
    }
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_canvas_hash() -> *const c_char {
    hash_ptr(HashKind::CanvasGeometry)
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_webgl_hash() -> *const c_char {
    hash_ptr(HashKind::WebglParams)
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_fonts_hash() -> *const c_char {
    hash_ptr(HashKind::Fonts)
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_plugins_hash() -> *const c_char {
    hash_ptr(HashKind::Plugins)
}

#[no_mangle]
pub extern "C" fn ki_seeds_get_shader_precision_hash() -> *const c_char {
    hash_ptr(HashKind::ShaderPrecisions)
}

/// Fills `out` with the current snapshot. Returns whether a context was
/// bound; `out` is zeroed otherwise.
///
/// # Safety
///
/// `out` must be NULL or valid for writing one [`SeedSnapshot`].
#[no_mangle]
pub unsafe extern "C" fn ki_seeds_get_all(out: *mut SeedSnapshot) -> bool {
    if out.is_null() {
        return false;
    }
    let snapshot = GLOBAL_REGISTRY.get_all();
    // SAFETY: non-null and writable per the contract above
    unsafe { out.write(snapshot) };
    snapshot.valid
}

#[no_mangle]
pub extern "C" fn ki_seeds_registered_count() -> u32 {
    GLOBAL_REGISTRY.registered_count() as u32
}

#[no_mangle]
pub extern "C" fn ki_seeds_derivation_count() -> u64 {
    GLOBAL_REGISTRY.derivation_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::VmProfile;

    // handles in the 9_000 range stay clear of the integration tests
    #[test]
    fn test_c_surface_round_trip() {
        global_profiles().insert(9_001, Arc::new(VmProfile::consistent("ffi")));
        let ctx = CString::new("ffi-ctx").unwrap();
        assert!(unsafe { ki_seeds_register(9_001, ctx.as_ptr()) });
        assert!(ki_seeds_set_current(9_001));
        assert!(ki_seeds_is_enabled());
        assert_ne!(ki_seeds_get_canvas(), 0);

        let hash = ki_seeds_get_hash(HashKind::Fonts as i32);
        assert!(!hash.is_null());
        let hash = unsafe { CStr::from_ptr(hash) }.to_str().unwrap().to_string();
        assert_eq!(hash.len(), 32);

        let fonts_hash = unsafe { CStr::from_ptr(ki_seeds_get_fonts_hash()) };
        assert_eq!(fonts_hash.to_str().unwrap(), hash);
        assert!(ki_seeds_get_hash(17).is_null());

        let mut snapshot = SeedSnapshot::zeroed();
        assert!(unsafe { ki_seeds_get_all(&mut snapshot) });
        assert_eq!(snapshot.hash_str(HashKind::Fonts), hash);

        assert!(ki_seeds_unregister(9_001));
        assert!(!ki_seeds_is_enabled());
        assert!(ki_seeds_get_canvas_hash().is_null());
        global_profiles().remove(9_001);
    }

    #[test]
    fn test_null_arguments() {
        assert!(!unsafe { ki_seeds_register(9_002, ptr::null()) });
        assert!(!unsafe { ki_seeds_get_all(ptr::null_mut()) });
    }
}
