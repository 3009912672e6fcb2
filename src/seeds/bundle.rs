//! Seed derivation
//!
//! Every value in a [`SeedBundle`] is a pure function of the profile's raw
//! seeds and the context string id. Each sub-fingerprint category hashes its
//! own label into the digest, so canvas noise reveals nothing about audio
//! noise even when two contexts share one profile.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::profile::{RawSeeds, VmProfile};

const DOMAIN: &[u8] = b"ki-spoof/v1";

/// Width of the audio fingerprint jitter around the profile's base value.
const AUDIO_FINGERPRINT_SPREAD: f64 = 1e-4;

/// Sub-fingerprint categories with an independent 64-bit noise seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeedCategory {
    Canvas,
    Webgl,
    Audio,
    Fonts,
    ClientRects,
}

impl SeedCategory {
    pub const ALL: [SeedCategory; 5] = [
        SeedCategory::Canvas,
        SeedCategory::Webgl,
        SeedCategory::Audio,
        SeedCategory::Fonts,
        SeedCategory::ClientRects,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SeedCategory::Canvas => "canvas",
            SeedCategory::Webgl => "webgl",
            SeedCategory::Audio => "audio",
            SeedCategory::Fonts => "fonts",
            SeedCategory::ClientRects => "client-rects",
        }
    }

    fn raw_seed(&self, seeds: &RawSeeds) -> u64 {
        match self {
            SeedCategory::Canvas | SeedCategory::Fonts | SeedCategory::ClientRects => {
                seeds.canvas.value()
            }
            SeedCategory::Webgl => seeds.gpu_renderer.value(),
            SeedCategory::Audio => seeds.audio.value(),
        }
    }
}

/// The nine precomputed hash strings.
///
/// The discriminants are part of the C accessor surface.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashKind {
    CanvasGeometry = 0,
    CanvasText = 1,
    WebglParams = 2,
    WebglExtensions = 3,
    WebglContext = 4,
    WebglExtParams = 5,
    ShaderPrecisions = 6,
    Fonts = 7,
    Plugins = 8,
}

impl HashKind {
    pub const COUNT: usize = 9;

    pub const ALL: [HashKind; HashKind::COUNT] = [
        HashKind::CanvasGeometry,
        HashKind::CanvasText,
        HashKind::WebglParams,
        HashKind::WebglExtensions,
        HashKind::WebglContext,
        HashKind::WebglExtParams,
        HashKind::ShaderPrecisions,
        HashKind::Fonts,
        HashKind::Plugins,
    ];

    /// Maps a C-side constant to a kind; unknown constants yield `None`.
    pub fn from_raw(raw: i32) -> Option<HashKind> {
        usize::try_from(raw)
            .ok()
            .and_then(|index| HashKind::ALL.get(index).copied())
    }

    pub fn label(&self) -> &'static str {
        match self {
            HashKind::CanvasGeometry => "canvas_geometry",
            HashKind::CanvasText => "canvas_text",
            HashKind::WebglParams => "webgl_params",
            HashKind::WebglExtensions => "webgl_extensions",
            HashKind::WebglContext => "webgl_context",
            HashKind::WebglExtParams => "webgl_ext_params",
            HashKind::ShaderPrecisions => "shader_precisions",
            HashKind::Fonts => "fonts",
            HashKind::Plugins => "plugins",
        }
    }

    fn raw_seed(&self, seeds: &RawSeeds) -> u64 {
        match self {
            HashKind::CanvasGeometry | HashKind::CanvasText | HashKind::Fonts => {
                seeds.canvas.value()
            }
            HashKind::WebglParams
            | HashKind::WebglExtensions
            | HashKind::WebglContext
            | HashKind::WebglExtParams
            | HashKind::ShaderPrecisions => seeds.gpu_renderer.value(),
            HashKind::Plugins => seeds.audio.value(),
        }
    }
}

fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    for part in parts {
        // length prefix keeps ("ab","c") and ("a","bc") apart
        hasher.update((part.len() as u32).to_le_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn first_u64(bytes: &[u8; 32]) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(word)
}

/// SplitMix64 finalizer.
fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Derives the noise seed for one category. Never returns 0, which the
/// accessor surface reserves for "no context".
pub fn derive_seed(raw: u64, category: SeedCategory, context_id: &str) -> u64 {
    let d = digest(&[
        b"seed",
        category.label().as_bytes(),
        context_id.as_bytes(),
        &raw.to_le_bytes(),
    ]);
    match mix64(first_u64(&d) ^ raw) {
        0 => 0x9e37_79b9_7f4a_7c15,
        value => value,
    }
}

/// Derives one 32-hex-character hash string.
pub fn derive_hash(raw: u64, kind: HashKind, context_id: &str) -> String {
    let d = digest(&[
        b"hash",
        kind.label().as_bytes(),
        context_id.as_bytes(),
        &raw.to_le_bytes(),
    ]);
    hex::encode(&d[..16])
}

fn derive_audio_fingerprint(raw: u64, base: f64, context_id: &str) -> f64 {
    let d = digest(&[b"audio-fingerprint", context_id.as_bytes(), &raw.to_le_bytes()]);
    let unit = (first_u64(&d) >> 11) as f64 / (1u64 << 53) as f64;
    base + (unit - 0.5) * AUDIO_FINGERPRINT_SPREAD
}

/// Per-context derived seeds and hashes. Immutable after derivation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedBundle {
    pub context_id: String,
    pub canvas: u64,
    pub webgl: u64,
    pub audio: u64,
    pub fonts: u64,
    pub client_rects: u64,
    pub audio_fingerprint: f64,
    #[serde(serialize_with = "serialize_hashes")]
    hashes: [String; HashKind::COUNT],
    namespace_key: String,
}

fn serialize_hashes<S: Serializer>(
    hashes: &[String; HashKind::COUNT],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(HashKind::COUNT))?;
    for kind in HashKind::ALL {
        map.serialize_entry(kind.label(), &hashes[kind as usize])?;
    }
    map.end()
}

impl SeedBundle {
    /// Derives the bundle for `context_id` from raw seeds.
    pub fn derive(seeds: &RawSeeds, audio_fingerprint_base: f64, context_id: &str) -> SeedBundle {
        let seed = |category: SeedCategory| {
            derive_seed(category.raw_seed(seeds), category, context_id)
        };
        let hashes = HashKind::ALL.map(|kind| derive_hash(kind.raw_seed(seeds), kind, context_id));
        let canvas = seed(SeedCategory::Canvas);
        let ns = digest(&[b"namespace", context_id.as_bytes(), &canvas.to_le_bytes()]);

        SeedBundle {
            context_id: context_id.to_string(),
            canvas,
            webgl: seed(SeedCategory::Webgl),
            audio: seed(SeedCategory::Audio),
            fonts: seed(SeedCategory::Fonts),
            client_rects: seed(SeedCategory::ClientRects),
            audio_fingerprint: derive_audio_fingerprint(
                seeds.audio.value(),
                audio_fingerprint_base,
                context_id,
            ),
            hashes,
            namespace_key: format!("__ks{}", hex::encode(&ns[..6])),
        }
    }

    /// Derives the bundle for `context_id` from a profile.
    pub fn for_profile(profile: &VmProfile, context_id: &str) -> SeedBundle {
        SeedBundle::derive(&profile.seeds, profile.audio.fingerprint_base, context_id)
    }

    /// Seed for one category.
    pub fn seed(&self, category: SeedCategory) -> u64 {
        match category {
            SeedCategory::Canvas => self.canvas,
            SeedCategory::Webgl => self.webgl,
            SeedCategory::Audio => self.audio,
            SeedCategory::Fonts => self.fonts,
            SeedCategory::ClientRects => self.client_rects,
        }
    }

    /// Hash string for one kind.
    pub fn hash(&self, kind: HashKind) -> &str {
        &self.hashes[kind as usize]
    }

    /// Global property holding the in-page spoof namespace and guard flag.
    pub fn namespace_key(&self) -> &str {
        &self.namespace_key
    }

    /// 32-bit key fed to in-page noise generators for one category.
    pub fn script_key(&self, category: SeedCategory) -> u32 {
        let seed = self.seed(category);
        ((seed >> 32) ^ seed) as u32
    }
}

/// Batch read of the current bundle, laid out for C callers.
///
/// `hashes` holds nine NUL-terminated 32-character strings indexed by
/// [`HashKind`]. All fields are zero when `valid` is false.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedSnapshot {
    pub valid: bool,
    pub canvas: u64,
    pub webgl: u64,
    pub audio: u64,
    pub fonts: u64,
    pub client_rects: u64,
    pub audio_fingerprint: f64,
    pub hashes: [[u8; 33]; HashKind::COUNT],
}

impl SeedSnapshot {
    /// The "no context bound" snapshot.
    pub fn zeroed() -> SeedSnapshot {
        SeedSnapshot {
            valid: false,
            canvas: 0,
            webgl: 0,
            audio: 0,
            fonts: 0,
            client_rects: 0,
            audio_fingerprint: 0.0,
            hashes: [[0u8; 33]; HashKind::COUNT],
        }
    }

    pub fn from_bundle(bundle: &SeedBundle) -> SeedSnapshot {
        let mut snapshot = SeedSnapshot {
            valid: true,
            canvas: bundle.canvas,
            webgl: bundle.webgl,
            audio: bundle.audio,
            fonts: bundle.fonts,
            client_rects: bundle.client_rects,
            audio_fingerprint: bundle.audio_fingerprint,
            hashes: [[0u8; 33]; HashKind::COUNT],
        };
        for kind in HashKind::ALL {
            let bytes = bundle.hash(kind).as_bytes();
            let len = bytes.len().min(32);
            snapshot.hashes[kind as usize][..len].copy_from_slice(&bytes[..len]);
        }
        snapshot
    }

    /// Hash string for one kind, up to the NUL terminator.
    pub fn hash_str(&self, kind: HashKind) -> &str {
        let raw = &self.hashes[kind as usize];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..end]).unwrap_or("")
    }
}
