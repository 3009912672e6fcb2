//! Seed Registry
//!
//! Derives per-context noise seeds and hash strings from a profile's raw
//! seeds and serves them to native code through a thread-local "current"
//! context and a C accessor table.

mod bundle;
pub mod ffi;
mod registry;

pub use bundle::{derive_hash, derive_seed, HashKind, SeedBundle, SeedCategory, SeedSnapshot};
pub use ffi::global_registry;
pub use registry::{CurrentGuard, RegistryError, SeedRegistry};
