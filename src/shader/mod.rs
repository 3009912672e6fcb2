//! GLSL Translator
//!
//! Rewrites WebGL shader source so its numeric behavior matches the GPU a
//! profile claims to be. The pipeline runs over a lossless token stream:
//!
//! 1. precision normalization (rewrite, downgrade, default insertion)
//! 2. optional `ks_emulate` quantization helpers
//! 3. vendor and architecture quirks from a [`QuirkRegistry`]
//! 4. `#extension` filtering against the profile's extension list
//! 5. seeded output noise
//! 6. optional debug banner
//!
//! Every stage is toggled by [`TranslationOptions`]. [`ShaderTranslator::translate`]
//! never fails outright: on any internal error, panics included, the
//! original source comes back with `success == false`.

pub mod gpu;
mod passes;
pub mod quirks;
pub mod tokenizer;
mod validate;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{trace, warn};

pub use gpu::{GpuArchitecture, GpuProfile, GpuVendor, RuntimePlan};
pub use quirks::{Quirk, QuirkFn, QuirkKey, QuirkRegistry};
pub use tokenizer::{rebuild, tokenize, Token, TokenKind, TokenizeError};
pub use validate::{delimiter_counts, validate_shader, DelimiterCounts, ShaderViolation};

/// Returned as `translated_source` for empty input.
pub const EMPTY_SOURCE_PLACEHOLDER: &str = "/* empty shader source */";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Maps `gl.VERTEX_SHADER` / `gl.FRAGMENT_SHADER`.
    pub fn from_gl_enum(value: u32) -> Option<Self> {
        match value {
            35633 => Some(ShaderStage::Vertex),
            35632 => Some(ShaderStage::Fragment),
            _ => None,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

impl std::str::FromStr for ShaderStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vertex" | "vert" | "vs" => Ok(ShaderStage::Vertex),
            "fragment" | "frag" | "fs" => Ok(ShaderStage::Fragment),
            other => Err(format!("unknown shader stage: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOptions {
    pub precision_normalization: bool,
    pub emulate_precision: bool,
    pub downgrade_qualifiers: bool,
    pub vendor_quirks: bool,
    pub extension_filtering: bool,
    pub noise_injection: bool,
    pub noise_seed: u64,
    /// Peak color offset, in normalized units.
    pub noise_amplitude: f32,
    pub debug_banner: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            precision_normalization: true,
            emulate_precision: false,
            downgrade_qualifiers: true,
            vendor_quirks: true,
            extension_filtering: true,
            noise_injection: false,
            noise_seed: 0,
            noise_amplitude: 1.0 / 255.0,
            debug_banner: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounters {
    pub precision_rewrites: usize,
    pub qualifier_downgrades: usize,
    pub precision_insertions: usize,
    pub emulation_helpers: usize,
    pub quirk_edits: usize,
    pub extensions_disabled: usize,
    pub noise_insertions: usize,
    pub banners: usize,
}

impl ChangeCounters {
    pub fn total(&self) -> usize {
        self.precision_rewrites
            + self.qualifier_downgrades
            + self.precision_insertions
            + self.emulation_helpers
            + self.quirk_edits
            + self.extensions_disabled
            + self.noise_insertions
            + self.banners
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationResult {
    pub original_source: String,
    pub translated_source: String,
    pub changes: ChangeCounters,
    pub applied_quirks: Vec<String>,
    pub success: bool,
    pub error: Option<String>,
}

impl TranslationResult {
    /// Successful no-op result.
    pub fn unchanged(source: &str) -> Self {
        Self {
            original_source: source.to_string(),
            translated_source: source.to_string(),
            changes: ChangeCounters::default(),
            applied_quirks: Vec::new(),
            success: true,
            error: None,
        }
    }

    fn failed(source: &str, error: String) -> Self {
        let translated_source = if source.is_empty() {
            EMPTY_SOURCE_PLACEHOLDER.to_string()
        } else {
            source.to_string()
        };
        Self {
            original_source: source.to_string(),
            translated_source,
            changes: ChangeCounters::default(),
            applied_quirks: Vec::new(),
            success: false,
            error: Some(error),
        }
    }
}

/// Identifiers whose results depend on float precision.
const PRECISION_SENSITIVE: &[&str] = &[
    "highp", "mediump", "lowp", "pow", "exp", "exp2", "log", "log2", "sqrt", "inversesqrt",
    "sin", "cos", "tan", "asin", "acos", "atan", "fract", "mod", "dFdx", "dFdy", "fwidth",
];

/// Cheap pre-check: does this shader contain anything a translation could
/// change? Sources that fail to tokenize report `true` so the translator
/// can surface the error.
pub fn needs_translation(source: &str, gpu: &GpuProfile<'_>) -> bool {
    let Ok(tokens) = tokenize(source) else {
        return true;
    };
    let mut saw_precision = false;
    for token in &tokens {
        match token.kind {
            TokenKind::Directive if token.text.contains("extension") => return true,
            TokenKind::Identifier if token.text == "precision" => {
                saw_precision = true;
            }
            TokenKind::Identifier if PRECISION_SENSITIVE.contains(&token.text.as_str()) => {
                return true;
            }
            _ => {}
        }
    }
    saw_precision || gpu.capabilities.fragment_precision != crate::profile::PrecisionMode::Highp
}

struct Translated {
    source: String,
    changes: ChangeCounters,
    quirks: Vec<&'static str>,
}

/// Stateless apart from its quirk table; one instance can serve every
/// thread.
#[derive(Debug, Clone)]
pub struct ShaderTranslator {
    quirks: QuirkRegistry,
}

impl Default for ShaderTranslator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderTranslator {
    pub fn new() -> Self {
        Self::with_quirks(QuirkRegistry::with_builtins())
    }

    pub fn with_quirks(quirks: QuirkRegistry) -> Self {
        Self { quirks }
    }

    pub fn quirks(&self) -> &QuirkRegistry {
        &self.quirks
    }

    /// Translates one shader. See the module docs for the failure contract.
    pub fn translate(
        &self,
        source: &str,
        stage: ShaderStage,
        gpu: &GpuProfile<'_>,
        options: &TranslationOptions,
    ) -> TranslationResult {
        if source.trim().is_empty() {
            return TranslationResult::failed(source, "empty shader source".to_string());
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(source, stage, gpu, options)
        }));

        match outcome {
            Ok(Ok(translated)) => {
                trace!(
                    "Translated {} shader: {} changes, {} -> {} bytes",
                    stage,
                    translated.changes.total(),
                    source.len(),
                    translated.source.len()
                );
                TranslationResult {
                    original_source: source.to_string(),
                    translated_source: translated.source,
                    changes: translated.changes,
                    applied_quirks: translated.quirks.into_iter().map(String::from).collect(),
                    success: true,
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!("Shader translation failed: {}", e);
                TranslationResult::failed(source, e.to_string())
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "translator panicked".to_string());
                warn!("Shader translation panicked: {}", message);
                TranslationResult::failed(source, message)
            }
        }
    }

    fn run(
        &self,
        source: &str,
        stage: ShaderStage,
        gpu: &GpuProfile<'_>,
        options: &TranslationOptions,
    ) -> Result<Translated, TokenizeError> {
        let mut tokens = tokenize(source)?;
        let mut changes = ChangeCounters::default();
        let mut applied = Vec::new();
        let target = gpu.precision_for(stage);

        if options.precision_normalization {
            changes.precision_rewrites = passes::normalize_precision(&mut tokens, target);
            if options.downgrade_qualifiers {
                changes.qualifier_downgrades = passes::downgrade_qualifiers(&mut tokens, target);
            }
            changes.precision_insertions =
                passes::insert_default_precision(&mut tokens, stage, target);
        }
        if options.emulate_precision {
            changes.emulation_helpers = passes::emit_emulation_helpers(&mut tokens, target);
        }
        if options.vendor_quirks {
            let (edits, names) = self.quirks.apply(gpu.vendor, gpu.architecture, &mut tokens);
            changes.quirk_edits = edits;
            applied = names;
        }
        if options.extension_filtering {
            changes.extensions_disabled = passes::filter_extensions(&mut tokens, gpu);
        }
        if options.noise_injection {
            changes.noise_insertions = passes::inject_noise(
                &mut tokens,
                stage,
                options.noise_seed,
                options.noise_amplitude,
            );
        }
        if options.debug_banner {
            changes.banners = passes::insert_banner(&mut tokens, stage, gpu);
        }

        Ok(Translated {
            source: rebuild(&tokens),
            changes,
            quirks: applied,
        })
    }
}
