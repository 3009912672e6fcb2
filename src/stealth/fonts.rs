//! Font Identity Spoofing
//!
//! Restricts the fonts a page can observe to the target OS list and hides
//! the host's own OS-exclusive fonts when host and target differ. Every
//! surface that can leak glyph metrics is covered:
//!
//! - CSS `font` / `font-family` (setters and `setProperty`)
//! - canvas `font` and `measureText`
//! - the Font Loading API (`document.fonts.check/load`, `FontFace` with `local()`)
//! - `queryLocalFonts`
//! - `offsetWidth` / `offsetHeight` / `getBoundingClientRect`, rescaled by
//!   the actual-to-spoofed device pixel ratio
//!
//! # Example
//!
//! ```rust
//! use ki_browser_spoof::profile::{TargetOs, VmProfile};
//! use ki_browser_spoof::stealth::fonts::{macos_exclusive_fonts, target_os_fonts, FontSpoofer};
//!
//! let windows = target_os_fonts(TargetOs::Windows);
//! assert!(macos_exclusive_fonts().iter().all(|f| !windows.contains(f)));
//!
//! let profile = VmProfile::consistent("fonts");
//! let script = FontSpoofer::new(&profile, 7).with_actual_dpr(2.0).generate_script();
//! assert!(script.contains("measureText"));
//! ```

use serde::Serialize;

use super::js_json;
use super::runtime::{GLOBAL_EXPR, HELPERS};
use crate::profile::{FontPolicy, TargetOs, VmProfile};

/// Present on every supported OS family.
pub const COMMON_FONTS: &[&str] = &[
    "Arial",
    "Arial Black",
    "Comic Sans MS",
    "Courier New",
    "Georgia",
    "Impact",
    "Tahoma",
    "Times New Roman",
    "Trebuchet MS",
    "Verdana",
    "Webdings",
];

pub const MACOS_EXCLUSIVE_FONTS: &[&str] = &[
    "American Typewriter",
    "Apple Chancery",
    "Apple Color Emoji",
    "Apple SD Gothic Neo",
    "Avenir",
    "Avenir Next",
    "Baskerville",
    "Big Caslon",
    "Chalkboard",
    "Charter",
    "Copperplate",
    "Didot",
    "Futura",
    "Geneva",
    "Gill Sans",
    "Helvetica",
    "Helvetica Neue",
    "Hiragino Sans",
    "Hoefler Text",
    "Lucida Grande",
    "Marker Felt",
    "Menlo",
    "Monaco",
    "New York",
    "Noteworthy",
    "Optima",
    "Palatino",
    "Papyrus",
    "PingFang SC",
    "SF Mono",
    "SF Pro",
    "SF Pro Display",
    "SF Pro Text",
    "Skia",
    "Zapfino",
];

pub const WINDOWS_EXCLUSIVE_FONTS: &[&str] = &[
    "Bahnschrift",
    "Calibri",
    "Cambria",
    "Cambria Math",
    "Candara",
    "Consolas",
    "Constantia",
    "Corbel",
    "Ebrima",
    "Franklin Gothic Medium",
    "Gabriola",
    "Gadugi",
    "Ink Free",
    "Javanese Text",
    "Leelawadee UI",
    "Lucida Console",
    "Lucida Sans Unicode",
    "Malgun Gothic",
    "Marlett",
    "Microsoft Himalaya",
    "Microsoft JhengHei",
    "Microsoft YaHei",
    "MS Gothic",
    "MS UI Gothic",
    "MV Boli",
    "Nirmala UI",
    "Palatino Linotype",
    "Segoe MDL2 Assets",
    "Segoe Print",
    "Segoe Script",
    "Segoe UI",
    "Segoe UI Emoji",
    "Segoe UI Symbol",
    "Sitka Text",
    "Sylfaen",
    "Yu Gothic",
];

pub const LINUX_EXCLUSIVE_FONTS: &[&str] = &[
    "Bitstream Vera Sans",
    "C059",
    "Cantarell",
    "DejaVu Sans",
    "DejaVu Sans Mono",
    "DejaVu Serif",
    "Droid Sans",
    "Droid Sans Mono",
    "FreeMono",
    "FreeSans",
    "FreeSerif",
    "Liberation Mono",
    "Liberation Sans",
    "Liberation Serif",
    "Nimbus Mono PS",
    "Nimbus Roman",
    "Nimbus Sans",
    "Noto Color Emoji",
    "Noto Sans",
    "Noto Sans Mono",
    "Noto Serif",
    "P052",
    "URW Bookman",
    "URW Gothic",
    "Ubuntu",
    "Ubuntu Mono",
];

/// CSS generic families and keywords; always allowed.
pub const GENERIC_FAMILIES: &[&str] = &[
    "serif",
    "sans-serif",
    "monospace",
    "cursive",
    "fantasy",
    "system-ui",
    "ui-serif",
    "ui-sans-serif",
    "ui-monospace",
    "ui-rounded",
    "emoji",
    "math",
    "fangsong",
    "inherit",
    "initial",
    "unset",
    "revert",
];

/// System-font aliases that only resolve on macOS.
const MACOS_ALIASES: &[&str] = &["-apple-system", "BlinkMacSystemFont"];

const MISSING_FONT: &str = "__ks_missing_font";

/// Fonts only the given OS ships.
pub fn exclusive_fonts(os: TargetOs) -> &'static [&'static str] {
    match os {
        TargetOs::Windows => WINDOWS_EXCLUSIVE_FONTS,
        TargetOs::MacOs => MACOS_EXCLUSIVE_FONTS,
        TargetOs::Linux => LINUX_EXCLUSIVE_FONTS,
    }
}

pub fn macos_exclusive_fonts() -> Vec<&'static str> {
    MACOS_EXCLUSIVE_FONTS.to_vec()
}

/// The full font list a real machine of `os` reports.
pub fn target_os_fonts(os: TargetOs) -> Vec<&'static str> {
    COMMON_FONTS
        .iter()
        .chain(exclusive_fonts(os))
        .copied()
        .collect()
}

fn contains_ci(list: &[String], name: &str) -> bool {
    list.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Fonts the page may observe for `target` under `policy`.
///
/// Host-exclusive fonts are removed whenever the host differs from the
/// target, even if the policy lists them as extras.
pub fn resolve_allowed_fonts(
    target: TargetOs,
    policy: &FontPolicy,
    host: Option<TargetOs>,
) -> Vec<String> {
    let mut fonts: Vec<String> = Vec::new();
    let candidates = target_os_fonts(target)
        .into_iter()
        .map(str::to_string)
        .chain(policy.extra_fonts.iter().cloned());
    for font in candidates {
        let font = font.trim().to_string();
        if font.is_empty() || contains_ci(&fonts, &font) {
            continue;
        }
        fonts.push(font);
    }

    let hidden = hidden_fonts(target, policy, host);
    fonts.retain(|f| !contains_ci(&hidden, f));
    fonts
}

/// Fonts that must never be observable: blocked names plus host
/// exclusives when the host differs from the target.
pub fn hidden_fonts(target: TargetOs, policy: &FontPolicy, host: Option<TargetOs>) -> Vec<String> {
    let mut hidden: Vec<String> = policy.blocked_fonts.iter().map(|f| f.trim().to_string()).collect();
    if let Some(host) = host.filter(|h| *h != target) {
        hidden.extend(exclusive_fonts(host).iter().map(|f| f.to_string()));
    }
    hidden.retain(|f| !f.is_empty());
    hidden
}

#[derive(Debug, Clone, Serialize)]
struct FontScriptConfig {
    allowed: Vec<String>,
    blocked: Vec<String>,
    generic: Vec<&'static str>,
    restrict: bool,
    fallback: &'static str,
    missing: &'static str,
    scale: f64,
    jitter: f64,
}

/// Builds the font script for one target identity.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpoofer {
    target: TargetOs,
    host: Option<TargetOs>,
    policy: FontPolicy,
    spoofed_dpr: f64,
    actual_dpr: f64,
    key: u32,
}

impl FontSpoofer {
    /// `key` is the fonts script key that drives `measureText` jitter.
    pub fn new(profile: &VmProfile, key: u32) -> Self {
        Self {
            target: profile.os.name,
            host: TargetOs::host(),
            policy: profile.fonts.clone(),
            spoofed_dpr: profile.screen.device_pixel_ratio,
            actual_dpr: profile.screen.device_pixel_ratio,
            key,
        }
    }

    pub fn with_host(mut self, host: Option<TargetOs>) -> Self {
        self.host = host;
        self
    }

    /// Device pixel ratio of the real display.
    pub fn with_actual_dpr(mut self, dpr: f64) -> Self {
        self.actual_dpr = dpr;
        self
    }

    pub fn target(&self) -> TargetOs {
        self.target
    }

    pub fn allowed_fonts(&self) -> Vec<String> {
        resolve_allowed_fonts(self.target, &self.policy, self.host)
    }

    pub fn hidden_fonts(&self) -> Vec<String> {
        hidden_fonts(self.target, &self.policy, self.host)
    }

    /// Factor applied to integer layout measurements.
    pub fn measurement_scale(&self) -> f64 {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if valid(self.actual_dpr) && valid(self.spoofed_dpr) {
            self.actual_dpr / self.spoofed_dpr
        } else {
            1.0
        }
    }

    fn config(&self) -> FontScriptConfig {
        let mut generic = GENERIC_FAMILIES.to_vec();
        if self.target == TargetOs::MacOs {
            generic.extend_from_slice(MACOS_ALIASES);
        }
        FontScriptConfig {
            allowed: self.allowed_fonts(),
            blocked: self.hidden_fonts(),
            generic,
            restrict: self.policy.restrict_to_target_os,
            fallback: "sans-serif",
            missing: MISSING_FONT,
            scale: self.measurement_scale(),
            jitter: 0.001,
        }
    }

    /// Capability body for the guarded frame prelude.
    pub fn patch_body(&self) -> String {
        format!("var C = {};\n{}", js_json(&self.config()), FONTS_BODY.trim())
    }

    /// Standalone script; installs its own helpers and runs once per realm.
    pub fn generate_script(&self) -> String {
        format!(
            r#"(function (G) {{
'use strict';
if (!G) return;
var FLAG = {flag};
if (Object.prototype.hasOwnProperty.call(G, FLAG)) return;
try {{ Object.defineProperty(G, FLAG, {{ value: true, enumerable: false }}); }} catch (e) {{ return; }}
var S = {{ keys: {{ fonts: {key} }} }};
{helpers}
try {{
(function () {{
{body}
}})();
}} catch (e) {{}}
}})({global});
"#,
            flag = js_json(&format!("__ks_fonts_{:08x}", self.key)),
            key = self.key,
            helpers = HELPERS.trim(),
            body = self.patch_body(),
            global = GLOBAL_EXPR,
        )
    }
}

const FONTS_BODY: &str = r#"
var key = S.keys.fonts;
function table(list) {
    var t = {};
    list.forEach(function (f) { t[String(f).toLowerCase()] = true; });
    return t;
}
var allowed = table(C.allowed);
var blocked = table(C.blocked);
var generic = table(C.generic);
function clean(name) { return String(name).trim().replace(/^['"]+|['"]+$/g, '').trim(); }
function permitted(name) {
    var n = clean(name).toLowerCase();
    if (!n) return false;
    if (generic[n]) return true;
    if (blocked[n]) return false;
    return C.restrict ? !!allowed[n] : true;
}
function filterFamilies(value) {
    var parts = String(value).split(',');
    var kept = parts.filter(permitted);
    if (kept.length === parts.length) return value;
    return kept.length ? kept.map(function (p) { return p.trim(); }).join(', ') : C.fallback;
}
var SHORTHAND = /^(.*?[\d.]+(?:px|pt|pc|em|rem|ex|ch|%|vw|vh|vmin|vmax|mm|cm|in|q)(?:\s*\/\s*\S+)?\s+)(.+)$/i;
function filterShorthand(value) {
    var m = SHORTHAND.exec(String(value));
    if (!m) return value;
    var fam = filterFamilies(m[2]);
    return fam === m[2] ? value : m[1] + fam;
}
function familiesOf(spec) {
    var m = SHORTHAND.exec(String(spec));
    return (m ? m[2] : String(spec)).split(',');
}
function specPermitted(spec) { return familiesOf(spec).every(permitted); }

[G.CSSStyleDeclaration, G.CSS2Properties].forEach(function (Ctor) {
    var proto = Ctor && Ctor.prototype;
    if (!proto) return;
    hookSetter(proto, 'fontFamily', function (orig) {
        return function (v) { return orig.call(this, filterFamilies(v)); };
    });
    hookSetter(proto, 'font', function (orig) {
        return function (v) { return orig.call(this, filterShorthand(v)); };
    });
    hook(proto, 'setProperty', function (orig) {
        return function setProperty(name, value) {
            var args = Array.prototype.slice.call(arguments);
            var n = String(name).toLowerCase();
            if (n === 'font-family') args[1] = filterFamilies(value);
            else if (n === 'font') args[1] = filterShorthand(value);
            return orig.apply(this, args);
        };
    });
});

var scale = C.scale;
function jitter(text) {
    return ((mix(key, hashStr(key, text)) & 0xffff) / 0xffff - 0.5) * C.jitter;
}
[G.CanvasRenderingContext2D, G.OffscreenCanvasRenderingContext2D].forEach(function (Ctor) {
    var proto = Ctor && Ctor.prototype;
    if (!proto) return;
    hookSetter(proto, 'font', function (orig) {
        return function (v) { return orig.call(this, filterShorthand(v)); };
    });
    hook(proto, 'measureText', function (orig) {
        return function measureText(text) {
            var r = orig.apply(this, arguments);
            try {
                var w = r.width * scale + jitter(String(this.font) + '|' + String(text));
                Object.defineProperty(r, 'width', { value: w, configurable: true, enumerable: true });
            } catch (e) {}
            return r;
        };
    });
});

var FFS = G.FontFaceSet && G.FontFaceSet.prototype;
if (FFS) {
    hook(FFS, 'check', function (orig) {
        return function check(spec) {
            if (!specPermitted(spec)) return false;
            return orig.apply(this, arguments);
        };
    });
    hook(FFS, 'load', function (orig) {
        return function load(spec) {
            if (!specPermitted(spec)) return Promise.resolve([]);
            return orig.apply(this, arguments);
        };
    });
}

if (typeof G.FontFace === 'function') {
    var NativeFontFace = G.FontFace;
    var LOCAL = /local\(\s*(['"]?)([^'")]+)\1\s*\)/gi;
    var FontFace = function FontFace(family, source, descriptors) {
        var src = source;
        if (typeof src === 'string') {
            src = src.replace(LOCAL, function (all, q, name) {
                return permitted(name) ? all : 'local("' + C.missing + '")';
            });
        }
        var args = [family, src];
        if (arguments.length > 2) args.push(descriptors);
        return Reflect.construct(NativeFontFace, args, new.target || FontFace);
    };
    FontFace.prototype = NativeFontFace.prototype;
    try { Object.setPrototypeOf(FontFace, NativeFontFace); } catch (e) {}
    try { Object.defineProperty(NativeFontFace.prototype, 'constructor', { value: FontFace, writable: true, configurable: true, enumerable: false }); } catch (e) {}
    try { Object.defineProperty(G, 'FontFace', { value: mask(FontFace, 'FontFace'), writable: true, configurable: true, enumerable: false }); } catch (e) {}
}

if (typeof G.queryLocalFonts === 'function') {
    hook(G, 'queryLocalFonts', function (orig) {
        return function queryLocalFonts() {
            return orig.apply(this, arguments).then(function (list) {
                return list.filter(function (f) { return permitted(f.family); });
            });
        };
    });
}

if (scale !== 1 && G.HTMLElement) {
    var HE = G.HTMLElement.prototype;
    ['offsetWidth', 'offsetHeight'].forEach(function (prop) {
        hookGetter(HE, prop, function (orig) {
            return function () { return Math.round(orig.call(this) * scale); };
        });
    });
    if (G.Element && G.DOMRect) {
        hook(G.Element.prototype, 'getBoundingClientRect', function (orig) {
            return function getBoundingClientRect() {
                var r = orig.apply(this, arguments);
                try { return new G.DOMRect(r.x * scale, r.y * scale, r.width * scale, r.height * scale); } catch (e) { return r; }
            };
        });
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(list: &[&str]) -> Vec<String> {
        list.iter().map(|f| f.to_lowercase()).collect()
    }

    #[test]
    fn test_exclusive_lists_are_disjoint() {
        let lists = [
            lower(COMMON_FONTS),
            lower(MACOS_EXCLUSIVE_FONTS),
            lower(WINDOWS_EXCLUSIVE_FONTS),
            lower(LINUX_EXCLUSIVE_FONTS),
        ];
        for (i, a) in lists.iter().enumerate() {
            for b in lists.iter().skip(i + 1) {
                assert!(a.iter().all(|f| !b.contains(f)), "overlap between font lists");
            }
        }
    }

    #[test]
    fn test_host_exclusives_hidden() {
        let policy = FontPolicy {
            extra_fonts: vec!["Segoe UI".into(), "Fira Code".into()],
            ..FontPolicy::default()
        };
        let fonts = resolve_allowed_fonts(TargetOs::MacOs, &policy, Some(TargetOs::Windows));
        assert!(fonts.iter().any(|f| f == "Helvetica Neue"));
        assert!(fonts.iter().any(|f| f == "Fira Code"));
        assert!(!fonts.iter().any(|f| f == "Segoe UI"));
    }

    #[test]
    fn test_same_host_keeps_extras() {
        let policy = FontPolicy {
            extra_fonts: vec!["segoe ui".into(), "Arial".into()],
            blocked_fonts: vec!["Impact".into()],
            ..FontPolicy::default()
        };
        let fonts = resolve_allowed_fonts(TargetOs::Windows, &policy, Some(TargetOs::Windows));
        assert_eq!(fonts.iter().filter(|f| f.eq_ignore_ascii_case("arial")).count(), 1);
        assert_eq!(fonts.iter().filter(|f| f.eq_ignore_ascii_case("segoe ui")).count(), 1);
        assert!(!fonts.iter().any(|f| f == "Impact"));
    }

    #[test]
    fn test_measurement_scale() {
        let mut profile = VmProfile::consistent("fonts");
        profile.screen.device_pixel_ratio = 1.0;
        let spoofer = FontSpoofer::new(&profile, 1);
        assert_eq!(spoofer.measurement_scale(), 1.0);
        assert_eq!(spoofer.clone().with_actual_dpr(2.0).measurement_scale(), 2.0);
        assert_eq!(spoofer.with_actual_dpr(f64::NAN).measurement_scale(), 1.0);
    }

    #[test]
    fn test_macos_aliases_only_for_macos() {
        let mut profile = VmProfile::consistent("fonts");
        profile.os.name = TargetOs::Windows;
        assert!(!FontSpoofer::new(&profile, 1).patch_body().contains("-apple-system"));
        profile.os.name = TargetOs::MacOs;
        assert!(FontSpoofer::new(&profile, 1).patch_body().contains("-apple-system"));
    }
}
