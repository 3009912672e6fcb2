//! Vendor and architecture quirk table.
//!
//! A quirk is a named pure transform over the token stream returning the
//! number of edits it made. The built-in quirks are identity transforms that
//! mark where a vendor's numeric behavior would be emulated.

use std::collections::HashMap;

use super::gpu::{GpuArchitecture, GpuVendor};
use super::tokenizer::Token;

pub type QuirkFn = fn(&mut Vec<Token>) -> usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuirkKey {
    Vendor(GpuVendor),
    Architecture(GpuArchitecture),
}

#[derive(Debug, Clone, Copy)]
pub struct Quirk {
    pub name: &'static str,
    pub apply: QuirkFn,
}

fn identity(_tokens: &mut Vec<Token>) -> usize {
    0
}

const BUILTIN: &[(QuirkKey, &str)] = &[
    (QuirkKey::Vendor(GpuVendor::Nvidia), "nvidia_fma_contraction"),
    (QuirkKey::Vendor(GpuVendor::Amd), "amd_denormal_flush"),
    (QuirkKey::Vendor(GpuVendor::Intel), "intel_loop_unroll"),
    (QuirkKey::Vendor(GpuVendor::Apple), "apple_half_float_rounding"),
    (QuirkKey::Vendor(GpuVendor::Software), "swiftshader_derivatives"),
    (QuirkKey::Architecture(GpuArchitecture::IntelGen9), "gen9_pow_precision"),
    (QuirkKey::Architecture(GpuArchitecture::AmdGcn), "gcn_trig_range_reduction"),
    (QuirkKey::Architecture(GpuArchitecture::AppleSilicon), "apple_tile_memory"),
];

#[derive(Debug, Clone, Default)]
pub struct QuirkRegistry {
    quirks: HashMap<QuirkKey, Vec<Quirk>>,
}

impl QuirkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the built-in hook points.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (key, name) in BUILTIN {
            registry.register(*key, name, identity);
        }
        registry
    }

    pub fn register(&mut self, key: QuirkKey, name: &'static str, apply: QuirkFn) {
        self.quirks.entry(key).or_default().push(Quirk { name, apply });
    }

    /// Vendor quirks first, then architecture quirks, each in
    /// registration order.
    pub fn quirks_for(
        &self,
        vendor: GpuVendor,
        architecture: GpuArchitecture,
    ) -> impl Iterator<Item = &Quirk> {
        let vendor = self.quirks.get(&QuirkKey::Vendor(vendor));
        let arch = self.quirks.get(&QuirkKey::Architecture(architecture));
        vendor
            .into_iter()
            .flatten()
            .chain(arch.into_iter().flatten())
    }

    /// Runs every matching quirk. Returns the edit count and the names of
    /// the quirks that ran.
    pub fn apply(
        &self,
        vendor: GpuVendor,
        architecture: GpuArchitecture,
        tokens: &mut Vec<Token>,
    ) -> (usize, Vec<&'static str>) {
        let mut edits = 0;
        let mut names = Vec::new();
        for quirk in self.quirks_for(vendor, architecture) {
            edits += (quirk.apply)(tokens);
            names.push(quirk.name);
        }
        (edits, names)
    }

    pub fn len(&self) -> usize {
        self.quirks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::tokenizer::{rebuild, tokenize};

    #[test]
    fn test_builtins_are_identity() {
        let registry = QuirkRegistry::with_builtins();
        let source = "void main(){ gl_FragColor = vec4(1.0); }";
        for (key, _) in BUILTIN {
            let mut tokens = tokenize(source).unwrap();
            let (vendor, arch) = match key {
                QuirkKey::Vendor(v) => (*v, GpuArchitecture::Unknown),
                QuirkKey::Architecture(a) => (GpuVendor::Unknown, *a),
            };
            let (edits, names) = registry.apply(vendor, arch, &mut tokens);
            assert_eq!(edits, 0);
            assert_eq!(names.len(), 1);
            assert_eq!(rebuild(&tokens), source);
        }
    }

    #[test]
    fn test_lookup_order() {
        let registry = QuirkRegistry::with_builtins();
        let names: Vec<&str> = registry
            .quirks_for(GpuVendor::Apple, GpuArchitecture::AppleSilicon)
            .map(|q| q.name)
            .collect();
        assert_eq!(names, vec!["apple_half_float_rounding", "apple_tile_memory"]);
        assert_eq!(
            registry
                .quirks_for(GpuVendor::Unknown, GpuArchitecture::Unknown)
                .count(),
            0
        );
    }

    #[test]
    fn test_custom_quirk() {
        fn strip_comments(tokens: &mut Vec<Token>) -> usize {
            let before = tokens.len();
            tokens.retain(|t| t.kind != crate::shader::tokenizer::TokenKind::LineComment);
            before - tokens.len()
        }
        let mut registry = QuirkRegistry::new();
        registry.register(QuirkKey::Vendor(GpuVendor::Intel), "strip", strip_comments);
        let mut tokens = tokenize("// a\nvoid main(){}").unwrap();
        let (edits, _) = registry.apply(GpuVendor::Intel, GpuArchitecture::Unknown, &mut tokens);
        assert_eq!(edits, 1);
        assert_eq!(rebuild(&tokens), "\nvoid main(){}");
    }
}
