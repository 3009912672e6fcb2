//! Integration tests for the GLSL translator
//!
//! Precision insertion, extension filtering, validation and the
//! never-destructive failure contract.

use ki_browser_spoof::profile::{PrecisionMode, VmProfile};
use ki_browser_spoof::shader::{
    delimiter_counts, needs_translation, validate_shader, GpuProfile, ShaderStage,
    ShaderTranslator, TranslationOptions, EMPTY_SOURCE_PLACEHOLDER,
};

fn profile_with(fragment: PrecisionMode, extensions: Vec<String>) -> VmProfile {
    let mut profile = VmProfile::consistent("shader-tests");
    profile.gpu.fragment_precision = fragment;
    profile.gpu.extensions = extensions;
    profile
}

fn translate(source: &str, stage: ShaderStage, profile: &VmProfile) -> ki_browser_spoof::TranslationResult {
    ShaderTranslator::new().translate(
        source,
        stage,
        &GpuProfile::from_profile(profile),
        &TranslationOptions::default(),
    )
}

// ============================================================================
// Precision Tests
// ============================================================================

#[test]
fn test_precision_inserted_after_version() {
    let profile = profile_with(PrecisionMode::Mediump, Vec::new());
    let source = "#version 300 es\nvoid main(){}";
    assert!(validate_shader(source).is_empty());

    let result = translate(source, ShaderStage::Fragment, &profile);
    assert!(result.success, "{:?}", result.error);
    assert!(result
        .translated_source
        .starts_with("#version 300 es\nprecision mediump float;"));
    assert_eq!(result.changes.precision_insertions, 1);
    assert!(validate_shader(&result.translated_source).is_empty());
}

#[test]
fn test_precision_inserted_at_start_without_version() {
    let profile = profile_with(PrecisionMode::Lowp, Vec::new());
    let result = translate("void main(){}", ShaderStage::Fragment, &profile);
    assert!(result.success);
    assert!(result.translated_source.starts_with("precision lowp float;"));
}

#[test]
fn test_vertex_shader_gets_no_default_precision() {
    let profile = profile_with(PrecisionMode::Mediump, Vec::new());
    let result = translate("void main(){ gl_Position = vec4(0.0); }", ShaderStage::Vertex, &profile);
    assert!(result.success);
    assert_eq!(result.changes.precision_insertions, 0);
    assert!(!result.translated_source.contains("precision mediump float;"));
}

#[test]
fn test_existing_declaration_rewritten() {
    let profile = profile_with(PrecisionMode::Mediump, Vec::new());
    let result = translate(
        "precision highp float;\nvoid main(){ highp float x = 1.0; }",
        ShaderStage::Fragment,
        &profile,
    );
    assert!(result.success);
    assert!(result.translated_source.contains("precision mediump float;"));
    assert!(!result.translated_source.contains("highp"));
}

#[test]
fn test_emulation_helpers_optional() {
    let profile = profile_with(PrecisionMode::Mediump, Vec::new());
    let options = TranslationOptions {
        emulate_precision: true,
        ..TranslationOptions::default()
    };
    let result = ShaderTranslator::new().translate(
        "void main(){}",
        ShaderStage::Fragment,
        &GpuProfile::from_profile(&profile),
        &options,
    );
    assert!(result.success);
    assert!(result.translated_source.contains("ks_emulate"));
    assert!(validate_shader(&result.translated_source).is_empty());
}

// ============================================================================
// Extension Filtering Tests
// ============================================================================

#[test]
fn test_unsupported_extension_commented_out() {
    let profile = profile_with(PrecisionMode::Highp, Vec::new());
    let source = "#extension GL_OES_standard_derivatives : enable\nvoid main(){}";

    let result = translate(source, ShaderStage::Fragment, &profile);
    assert!(result.success);
    assert!(result
        .translated_source
        .contains("// #extension GL_OES_standard_derivatives : enable"));
    assert_eq!(result.changes.extensions_disabled, 1);
    assert!(validate_shader(&result.translated_source).is_empty());
    assert_eq!(
        delimiter_counts(source),
        delimiter_counts(&result.translated_source)
    );
}

#[test]
fn test_supported_extension_kept() {
    let profile = profile_with(
        PrecisionMode::Highp,
        vec!["OES_standard_derivatives".to_string()],
    );
    let source = "#extension GL_OES_standard_derivatives : enable\nvoid main(){}";
    let result = translate(source, ShaderStage::Fragment, &profile);
    assert!(result.success);
    assert!(result
        .translated_source
        .starts_with("#extension GL_OES_standard_derivatives : enable"));
    assert_eq!(result.changes.extensions_disabled, 0);
}

// ============================================================================
// Noise and Banner Tests
// ============================================================================

#[test]
fn test_noise_depends_on_seed() {
    let profile = profile_with(PrecisionMode::Highp, Vec::new());
    let gpu = GpuProfile::from_profile(&profile);
    let source = "void main(){ gl_FragColor = vec4(1.0); }";
    let with_seed = |seed| {
        let options = TranslationOptions {
            noise_injection: true,
            noise_seed: seed,
            ..TranslationOptions::default()
        };
        ShaderTranslator::new().translate(source, ShaderStage::Fragment, &gpu, &options)
    };

    let a = with_seed(1);
    let b = with_seed(0xdead_beef_cafe);
    assert!(a.success && b.success);
    assert!(a.translated_source.contains("ks_noise"));
    assert_eq!(a.translated_source, with_seed(1).translated_source);
    assert_ne!(a.translated_source, b.translated_source);
    assert!(validate_shader(&a.translated_source).is_empty());
}

#[test]
fn test_debug_banner() {
    let profile = profile_with(PrecisionMode::Highp, Vec::new());
    let options = TranslationOptions {
        debug_banner: true,
        ..TranslationOptions::default()
    };
    let result = ShaderTranslator::new().translate(
        "#version 300 es\nvoid main(){}",
        ShaderStage::Vertex,
        &GpuProfile::from_profile(&profile),
        &options,
    );
    assert!(result.success);
    assert_eq!(result.changes.banners, 1);
    assert!(result.translated_source.starts_with("#version 300 es\n"));
}

// ============================================================================
// Failure Contract Tests
// ============================================================================

#[test]
fn test_translation_never_destructive() {
    let profile = profile_with(PrecisionMode::Mediump, Vec::new());
    let inputs = [
        "",
        "   \n",
        "void main() {",
        "}}} ((( ]]]",
        "void main(){} /* never closed",
        "#extension\n#version",
        "\u{0}\u{7f}é漢字",
    ];

    for input in inputs {
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let result = translate(input, stage, &profile);
            assert!(!result.translated_source.is_empty(), "{:?}", input);
            assert_eq!(result.success, result.error.is_none(), "{:?}", input);
            if !result.success && !input.is_empty() {
                assert_eq!(result.translated_source, input);
            }
        }
    }
}

#[test]
fn test_empty_input_placeholder() {
    let profile = profile_with(PrecisionMode::Highp, Vec::new());
    let result = translate("", ShaderStage::Fragment, &profile);
    assert!(!result.success);
    assert_eq!(result.translated_source, EMPTY_SOURCE_PLACEHOLDER);
}

#[test]
fn test_validate_reports_violations() {
    let violations = validate_shader("void helper() { (");
    assert!(violations.len() >= 2, "{:?}", violations);
    let text: Vec<String> = violations.iter().map(|v| v.to_string()).collect();
    assert!(text.iter().any(|t| t.contains("main")));
}

#[test]
fn test_needs_translation_precheck() {
    let highp = profile_with(PrecisionMode::Highp, Vec::new());
    let gpu = GpuProfile::from_profile(&highp);
    assert!(!needs_translation("void main(){ gl_Position = vec4(1.0); }", &gpu));
    assert!(needs_translation("precision mediump float; void main(){}", &gpu));
    assert!(needs_translation("void main(){ float y = pow(2.0, 3.0); }", &gpu));
}
