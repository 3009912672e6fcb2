//! Per-context seed registry with a thread-local "current" binding.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace, warn};

use super::bundle::{HashKind, SeedBundle, SeedSnapshot};
use crate::profile::{ProfileSource, ProfileStore, VmProfile};

/// Errors raised while registering a context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No profile available for context handle {0}")]
    ProfileUnavailable(i32),
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // registry instance id -> bound handle
    static CURRENT: RefCell<HashMap<u64, i32>> = RefCell::new(HashMap::new());
}

fn current_of(instance: u64) -> Option<i32> {
    CURRENT.with(|current| current.borrow().get(&instance).copied())
}

fn bind_current(instance: u64, handle: Option<i32>) {
    CURRENT.with(|current| {
        let mut current = current.borrow_mut();
        match handle {
            Some(handle) => {
                current.insert(instance, handle);
            }
            None => {
                current.remove(&instance);
            }
        }
    });
}

/// Owns one [`SeedBundle`] per registered context handle.
///
/// Mutations take a write lock, reads a read lock. The "current" context is
/// tracked per thread and per registry instance; it stores only the handle,
/// so a context unregistered on another thread is never served stale.
pub struct SeedRegistry {
    instance: u64,
    contexts: RwLock<HashMap<i32, Arc<SeedBundle>>>,
    profiles: Arc<dyn ProfileSource>,
    enabled: AtomicBool,
    derivations: AtomicU64,
}

impl fmt::Debug for SeedRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeedRegistry")
            .field("instance", &self.instance)
            .field("registered", &self.registered_count())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for SeedRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ProfileStore::new()))
    }
}

impl SeedRegistry {
    /// Creates a registry resolving profiles through `profiles`.
    pub fn new(profiles: Arc<dyn ProfileSource>) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            contexts: RwLock::new(HashMap::new()),
            profiles,
            enabled: AtomicBool::new(true),
            derivations: AtomicU64::new(0),
        }
    }

    /// Registers a context, deriving its bundle from the profile the
    /// [`ProfileSource`] assigns to `handle`. Re-registering replaces the
    /// previous bundle.
    pub fn register(&self, handle: i32, context_id: &str) -> Result<(), RegistryError> {
        let Some(profile) = self.profiles.profile_for(handle) else {
            warn!("No profile for context {}", handle);
            return Err(RegistryError::ProfileUnavailable(handle));
        };
        self.register_with_profile(handle, context_id, &profile);
        Ok(())
    }

    /// Registers a context against an explicit profile.
    pub fn register_with_profile(&self, handle: i32, context_id: &str, profile: &VmProfile) {
        // derive outside the lock
        let bundle = Arc::new(SeedBundle::for_profile(profile, context_id));
        self.derivations.fetch_add(1, Ordering::Relaxed);

        let replaced = self.contexts.write().insert(handle, bundle).is_some();
        debug!(
            "Registered context {} ({}) for profile {}{}",
            handle,
            context_id,
            profile.id,
            if replaced { ", replacing previous bundle" } else { "" }
        );
    }

    /// Removes a context. Clears this thread's binding when it pointed at
    /// the removed handle. Returns whether the handle was registered.
    pub fn unregister(&self, handle: i32) -> bool {
        let removed = self.contexts.write().remove(&handle).is_some();
        if current_of(self.instance) == Some(handle) {
            bind_current(self.instance, None);
        }
        if removed {
            debug!("Unregistered context {}", handle);
        }
        removed
    }

    /// Binds `handle` as this thread's current context.
    ///
    /// Fails for unknown handles and leaves the previous binding untouched.
    pub fn set_current(&self, handle: i32) -> bool {
        if !self.contexts.read().contains_key(&handle) {
            trace!("set_current on unknown context {}", handle);
            return false;
        }
        bind_current(self.instance, Some(handle));
        true
    }

    /// Clears this thread's binding.
    pub fn clear_current(&self) {
        bind_current(self.instance, None);
    }

    /// Handle bound on this thread, if any.
    pub fn current_handle(&self) -> Option<i32> {
        current_of(self.instance)
    }

    /// Binds `handle` for the lifetime of the returned guard, restoring the
    /// previous binding on drop. `None` when the handle is unknown.
    pub fn bind(&self, handle: i32) -> Option<CurrentGuard<'_>> {
        let previous = self.current_handle();
        if !self.set_current(handle) {
            return None;
        }
        Some(CurrentGuard {
            registry: self,
            previous,
            _not_send: PhantomData,
        })
    }

    /// Global on/off switch. While disabled every accessor reports "no
    /// context".
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// True when spoofing is enabled and this thread has a bound context.
    pub fn is_enabled(&self) -> bool {
        self.current_bundle().is_some()
    }

    /// Bundle for a specific handle regardless of thread binding.
    pub fn bundle_for(&self, handle: i32) -> Option<Arc<SeedBundle>> {
        self.contexts.read().get(&handle).cloned()
    }

    /// Profile the registry's source assigns to `handle`.
    pub fn profile_for(&self, handle: i32) -> Option<Arc<VmProfile>> {
        self.profiles.profile_for(handle)
    }

    /// Bundle bound on this thread.
    pub fn current_bundle(&self) -> Option<Arc<SeedBundle>> {
        if !self.enabled.load(Ordering::Acquire) {
            return None;
        }
        self.current_handle().and_then(|handle| self.bundle_for(handle))
    }

    fn read_current<T>(&self, default: T, f: impl FnOnce(&SeedBundle) -> T) -> T {
        self.current_bundle()
            .map(|bundle| f(&bundle))
            .unwrap_or(default)
    }

    // Seed accessors return 0 when nothing is bound.

    pub fn get_canvas(&self) -> u64 {
        self.read_current(0, |b| b.canvas)
    }

    pub fn get_webgl(&self) -> u64 {
        self.read_current(0, |b| b.webgl)
    }

    pub fn get_audio(&self) -> u64 {
        self.read_current(0, |b| b.audio)
    }

    pub fn get_fonts(&self) -> u64 {
        self.read_current(0, |b| b.fonts)
    }

    pub fn get_client_rects(&self) -> u64 {
        self.read_current(0, |b| b.client_rects)
    }

    pub fn get_audio_fingerprint(&self) -> f64 {
        self.read_current(0.0, |b| b.audio_fingerprint)
    }

    /// Hash string of the current context.
    pub fn get_hash(&self, kind: HashKind) -> Option<String> {
        self.read_current(None, |b| Some(b.hash(kind).to_string()))
    }

    /// Hash lookup by raw C-side kind; unknown kinds yield `None`.
    pub fn get_hash_raw(&self, kind: i32) -> Option<String> {
        HashKind::from_raw(kind).and_then(|kind| self.get_hash(kind))
    }

    /// All values of the current context in one read.
    pub fn get_all(&self) -> SeedSnapshot {
        self.read_current(SeedSnapshot::zeroed(), SeedSnapshot::from_bundle)
    }

    pub fn registered_count(&self) -> usize {
        self.contexts.read().len()
    }

    /// Number of bundle derivations performed so far.
    pub fn derivation_count(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }
}

impl Drop for SeedRegistry {
    fn drop(&mut self) {
        bind_current(self.instance, None);
    }
}

/// Scoped binding returned by [`SeedRegistry::bind`]. Not `Send`: the
/// binding belongs to the thread that created it.
pub struct CurrentGuard<'a> {
    registry: &'a SeedRegistry,
    previous: Option<i32>,
    _not_send: PhantomData<*const ()>,
}

impl CurrentGuard<'_> {
    pub fn bundle(&self) -> Option<Arc<SeedBundle>> {
        self.registry.current_bundle()
    }
}

impl Drop for CurrentGuard<'_> {
    fn drop(&mut self) {
        bind_current(self.registry.instance, self.previous);
    }
}
