//! Integration tests for the Font Spoofer
//!
//! Target OS font lists, host font exclusion and the standalone script
//! filtering CSS font families.

use boa_engine::{Context, Source};

use ki_browser_spoof::profile::{TargetOs, VmProfile};
use ki_browser_spoof::stealth::fonts::{
    exclusive_fonts, hidden_fonts, macos_exclusive_fonts, resolve_allowed_fonts, target_os_fonts,
    FontSpoofer,
};

fn profile_for(os: TargetOs) -> VmProfile {
    let mut profile = VmProfile::consistent("font-tests");
    profile.os.name = os;
    profile
}

// ============================================================================
// Font List Tests
// ============================================================================

#[test]
fn test_windows_list_has_no_macos_fonts() {
    let windows = target_os_fonts(TargetOs::Windows);
    for font in macos_exclusive_fonts() {
        assert!(!windows.contains(&font), "{} leaked into Windows list", font);
    }
}

#[test]
fn test_macos_list_has_apple_fonts() {
    let macos = target_os_fonts(TargetOs::MacOs);
    for font in ["Apple Color Emoji", "Avenir", "American Typewriter"] {
        assert!(macos.contains(&font), "{}", font);
    }
    assert!(macos.contains(&"Arial"));
}

#[test]
fn test_host_fonts_hidden_when_host_differs() {
    let mut profile = profile_for(TargetOs::Windows);
    profile.fonts.extra_fonts = vec!["Avenir".to_string(), "Fira Code".to_string()];

    let allowed = resolve_allowed_fonts(TargetOs::Windows, &profile.fonts, Some(TargetOs::MacOs));
    assert!(!allowed.iter().any(|f| f == "Avenir"));
    assert!(allowed.iter().any(|f| f == "Fira Code"));

    let hidden = hidden_fonts(TargetOs::Windows, &profile.fonts, Some(TargetOs::MacOs));
    assert_eq!(hidden.len(), exclusive_fonts(TargetOs::MacOs).len());
}

#[test]
fn test_same_host_and_target_hides_nothing() {
    let profile = profile_for(TargetOs::Linux);
    assert!(hidden_fonts(TargetOs::Linux, &profile.fonts, Some(TargetOs::Linux)).is_empty());
    assert_eq!(
        resolve_allowed_fonts(TargetOs::Linux, &profile.fonts, Some(TargetOs::Linux)).len(),
        target_os_fonts(TargetOs::Linux).len()
    );
}

#[test]
fn test_blocked_fonts_removed_case_insensitively() {
    let mut profile = profile_for(TargetOs::Windows);
    profile.fonts.blocked_fonts = vec!["arial".to_string()];
    let allowed = resolve_allowed_fonts(TargetOs::Windows, &profile.fonts, None);
    assert!(!allowed.iter().any(|f| f.eq_ignore_ascii_case("Arial")));
    assert!(allowed.iter().any(|f| f == "Arial Black"));
}

// ============================================================================
// Metric Scaling Tests
// ============================================================================

#[test]
fn test_measurement_scale() {
    let mut profile = profile_for(TargetOs::Windows);
    profile.screen.device_pixel_ratio = 1.0;

    let spoofer = FontSpoofer::new(&profile, 1);
    assert_eq!(spoofer.measurement_scale(), 1.0);
    assert_eq!(spoofer.clone().with_actual_dpr(2.0).measurement_scale(), 2.0);
    // unusable ratios fall back to no rescaling
    assert_eq!(spoofer.clone().with_actual_dpr(0.0).measurement_scale(), 1.0);
    assert_eq!(spoofer.with_actual_dpr(f64::NAN).measurement_scale(), 1.0);
}

// ============================================================================
// Script Tests
// ============================================================================

const FAKE_STYLE: &str = r#"
globalThis.CSSStyleDeclaration = function CSSStyleDeclaration() { this.values = {}; };
Object.defineProperty(CSSStyleDeclaration.prototype, 'fontFamily', {
    get: function () { return this.values.fontFamily; },
    set: function (v) { this.values.fontFamily = v; },
    configurable: true
});
CSSStyleDeclaration.prototype.setProperty = function (name, value) { this.values[name] = value; };
globalThis.style = new CSSStyleDeclaration();
"#;

fn eval_string(context: &mut Context, code: &str) -> String {
    let value = context
        .eval(Source::from_bytes(code))
        .unwrap_or_else(|e| panic!("{} failed: {}", code, e));
    value.to_string(context).unwrap().to_std_string_escaped()
}

#[test]
fn test_standalone_script_filters_families() {
    let profile = profile_for(TargetOs::Windows);
    let script = FontSpoofer::new(&profile, 42)
        .with_host(Some(TargetOs::MacOs))
        .generate_script();

    let mut context = Context::default();
    context.eval(Source::from_bytes(FAKE_STYLE)).unwrap();
    context.eval(Source::from_bytes(&script)).unwrap();

    assert_eq!(
        eval_string(&mut context, "style.fontFamily = 'Avenir, Arial, serif'; style.fontFamily"),
        "Arial, serif"
    );
    assert_eq!(
        eval_string(&mut context, "style.fontFamily = 'Apple Color Emoji'; style.fontFamily"),
        "sans-serif"
    );
    assert_eq!(
        eval_string(
            &mut context,
            "style.setProperty('font-family', 'Avenir Next, Georgia'); style.values['font-family']"
        ),
        "Georgia"
    );
}

#[test]
fn test_standalone_script_runs_once() {
    let profile = profile_for(TargetOs::Windows);
    let script = FontSpoofer::new(&profile, 7).generate_script();

    let mut context = Context::default();
    context.eval(Source::from_bytes(FAKE_STYLE)).unwrap();
    context.eval(Source::from_bytes(&script)).unwrap();
    let setter = eval_string(
        &mut context,
        "String(Object.getOwnPropertyDescriptor(CSSStyleDeclaration.prototype, 'fontFamily').set)",
    );
    context.eval(Source::from_bytes(&script)).unwrap();

    assert_eq!(setter, "function set fontFamily() { [native code] }");
    // the second run did not wrap the setter again
    assert_eq!(
        eval_string(&mut context, "style.fontFamily = 'Avenir, Arial'; style.fontFamily"),
        "Arial"
    );
}
