//! WebGL Fingerprint Spoofing
//!
//! Reports the profile's GPU through `getParameter`, the extension
//! queries and `getShaderPrecisionFormat`, adds canvas-keyed noise to
//! `readPixels`, and rewrites shader source on `shaderSource` the same way
//! the GLSL translator does (unsupported `#extension` lines commented out,
//! default fragment precision inserted after the header block).
//!
//! # Example
//!
//! ```rust,no_run
//! use ki_browser_spoof::profile::VmProfile;
//! use ki_browser_spoof::stealth::webgl::WebGlOverrides;
//!
//! let profile = VmProfile::consistent("session-seed");
//! let js = WebGlOverrides::from_profile(&profile).script();
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::canvas::noise_threshold;
use super::js_json;
use crate::profile::{PrecisionMode, VmProfile};
use crate::shader::{GpuProfile, RuntimePlan};

/// `getParameter` enums.
pub mod params {
    /// `gl.VENDOR`, always the masked vendor string.
    pub const VENDOR: u32 = 7936;
    /// `gl.RENDERER`, the masked renderer string.
    pub const RENDERER: u32 = 7937;
    pub const VERSION: u32 = 7938;
    pub const SHADING_LANGUAGE_VERSION: u32 = 35724;
    /// `WEBGL_debug_renderer_info.UNMASKED_VENDOR_WEBGL`.
    pub const UNMASKED_VENDOR_WEBGL: u32 = 37445;
    /// `WEBGL_debug_renderer_info.UNMASKED_RENDERER_WEBGL`. The value
    /// fingerprinters read first.
    pub const UNMASKED_RENDERER_WEBGL: u32 = 37446;

    // limits
    pub const MAX_TEXTURE_SIZE: u32 = 3379;
    pub const MAX_VIEWPORT_DIMS: u32 = 3386;
    pub const MAX_RENDERBUFFER_SIZE: u32 = 34024;
    pub const MAX_VERTEX_ATTRIBS: u32 = 34921;
    pub const MAX_VARYING_VECTORS: u32 = 36348;
    pub const MAX_VERTEX_UNIFORM_VECTORS: u32 = 36347;
    pub const MAX_FRAGMENT_UNIFORM_VECTORS: u32 = 36349;
    pub const MAX_TEXTURE_IMAGE_UNITS: u32 = 34930;
    pub const MAX_COMBINED_TEXTURE_IMAGE_UNITS: u32 = 35661;
    pub const ALIASED_LINE_WIDTH_RANGE: u32 = 33902;
    pub const ALIASED_POINT_SIZE_RANGE: u32 = 33901;

    // getShaderPrecisionFormat stages and precision types

    pub const VERTEX_SHADER: u32 = 35633;
    pub const FRAGMENT_SHADER: u32 = 35632;
    pub const LOW_FLOAT: u32 = 36336;
    pub const MEDIUM_FLOAT: u32 = 36337;
    pub const HIGH_FLOAT: u32 = 36338;
    pub const LOW_INT: u32 = 36339;
    pub const MEDIUM_INT: u32 = 36340;
    pub const HIGH_INT: u32 = 36341;
}

/// `[rangeMin, rangeMax, precision]` as `getShaderPrecisionFormat` reports.
///
/// The reported precision never exceeds what the stage supports, so a
/// `highp` query against a `mediump` fragment stage answers with the
/// `mediump` triple. Integer formats carry a precision of 0.
pub fn precision_format(requested: PrecisionMode, supported: PrecisionMode, int: bool) -> [u32; 3] {
    match (requested.min(supported), int) {
        (PrecisionMode::Highp, false) => [127, 127, 23],
        (PrecisionMode::Mediump, false) => [15, 15, 10],
        (PrecisionMode::Lowp, false) => [8, 8, 8],
        (PrecisionMode::Highp, true) => [31, 30, 0],
        (PrecisionMode::Mediump, true) => [15, 14, 0],
        (PrecisionMode::Lowp, true) => [8, 7, 0],
    }
}

fn stage_formats(supported: PrecisionMode) -> BTreeMap<u32, [u32; 3]> {
    use params::*;
    [
        (LOW_FLOAT, PrecisionMode::Lowp, false),
        (MEDIUM_FLOAT, PrecisionMode::Mediump, false),
        (HIGH_FLOAT, PrecisionMode::Highp, false),
        (LOW_INT, PrecisionMode::Lowp, true),
        (MEDIUM_INT, PrecisionMode::Mediump, true),
        (HIGH_INT, PrecisionMode::Highp, true),
    ]
    .into_iter()
    .map(|(code, requested, int)| (code, precision_format(requested, supported, int)))
    .collect()
}

/// Everything the WebGL body reports, serialized as the script's `C`.
#[derive(Debug, Clone, Serialize)]
pub struct WebGlOverrides {
    /// `getParameter` code to reported value.
    pub params: BTreeMap<u32, Value>,
    /// `getSupportedExtensions` result, plus the debug renderer info
    /// extension. `getExtension` returns `null` for anything else.
    pub extensions: Vec<String>,
    /// `"vertex"` / `"fragment"` to precision type to format triple.
    pub precision: BTreeMap<&'static str, BTreeMap<u32, [u32; 3]>>,
    /// Shader rewriting the page-side `shaderSource` hook applies.
    pub plan: RuntimePlan,
    /// `readPixels` noise threshold, see [`noise_threshold`].
    pub threshold: u32,
}

impl WebGlOverrides {
    /// Collects the GPU section of `profile`.
    pub fn from_profile(profile: &VmProfile) -> Self {
        use params::*;
        let gpu = &profile.gpu;
        let params: BTreeMap<u32, Value> = [
            (VENDOR, json!(gpu.vendor)),
            (RENDERER, json!(gpu.renderer)),
            (VERSION, json!(gpu.webgl_version)),
            (SHADING_LANGUAGE_VERSION, json!(gpu.shading_language_version)),
            (UNMASKED_VENDOR_WEBGL, json!(gpu.unmasked_vendor)),
            (UNMASKED_RENDERER_WEBGL, json!(gpu.unmasked_renderer)),
            (MAX_TEXTURE_SIZE, json!(gpu.max_texture_size)),
            (MAX_VIEWPORT_DIMS, json!(gpu.max_viewport_dims)),
            (MAX_RENDERBUFFER_SIZE, json!(gpu.max_renderbuffer_size)),
            (MAX_VERTEX_ATTRIBS, json!(gpu.max_vertex_attribs)),
            (MAX_VARYING_VECTORS, json!(gpu.max_varying_vectors)),
            (MAX_VERTEX_UNIFORM_VECTORS, json!(gpu.max_vertex_uniform_vectors)),
            (MAX_FRAGMENT_UNIFORM_VECTORS, json!(gpu.max_fragment_uniform_vectors)),
            (MAX_TEXTURE_IMAGE_UNITS, json!(gpu.max_texture_image_units)),
            (MAX_COMBINED_TEXTURE_IMAGE_UNITS, json!(gpu.max_combined_texture_image_units)),
            (ALIASED_LINE_WIDTH_RANGE, json!(gpu.aliased_line_width_range)),
            (ALIASED_POINT_SIZE_RANGE, json!(gpu.aliased_point_size_range)),
        ]
        .into_iter()
        .collect();

        let precision = [
            ("vertex", stage_formats(gpu.vertex_precision)),
            ("fragment", stage_formats(gpu.fragment_precision)),
        ]
        .into_iter()
        .collect();

        Self {
            params,
            extensions: gpu.extensions.clone(),
            precision,
            plan: GpuProfile::new(gpu).runtime_plan(),
            threshold: noise_threshold(profile.canvas.noise_intensity),
        }
    }

    /// Capability body; runs inside the guarded prelude.
    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), WEBGL_BODY.trim())
    }
}

const WEBGL_BODY: &str = r#"
var key = S.keys.webgl;
var ARRAYS = { 3386: 'int', 33901: 'float', 33902: 'float' };
var DEBUG_EXT = 'WEBGL_debug_renderer_info';
function listed(name) { return name === DEBUG_EXT || C.extensions.indexOf(name) >= 0; }
function glslSupported(name) {
    if (name === 'all') return true;
    var bare = name.indexOf('GL_') === 0 ? name.slice(3) : name;
    return C.plan.extensions.indexOf(name) >= 0 || C.plan.extensions.indexOf(bare) >= 0 ||
        (bare === 'EXT_draw_buffers' && C.plan.extensions.indexOf('WEBGL_draw_buffers') >= 0);
}
function rewriteShader(src, fragment) {
    var lines = src.split('\n');
    var header = -1;
    var leading = true;
    var hasPrecision = /precision\s+(lowp|mediump|highp)\s+float\s*;/.test(src);
    for (var i = 0; i < lines.length; i++) {
        var line = lines[i].trim();
        var m = /^#\s*extension\s+([A-Za-z0-9_]+)\s*:/.exec(line);
        if (m && !glslSupported(m[1])) lines[i] = '// ' + lines[i];
        if (!leading) continue;
        if (line === '' || line.indexOf('//') === 0) continue;
        if (/^#\s*(version|extension|pragma)\b/.test(line)) { header = i; continue; }
        leading = false;
    }
    if (fragment && !hasPrecision) {
        var decl = 'precision ' + C.plan.fragment_precision + ' float;';
        if (header >= 0) lines.splice(header + 1, 0, decl);
        else lines.unshift(decl);
    }
    return lines.join('\n');
}
[G.WebGLRenderingContext, G.WebGL2RenderingContext].forEach(function (Ctor) {
    if (!Ctor || !Ctor.prototype) return;
    var proto = Ctor.prototype;
    hook(proto, 'getParameter', function (orig) {
        return function getParameter(pname) {
            if (Object.prototype.hasOwnProperty.call(C.params, pname)) {
                var v = C.params[pname];
                if (ARRAYS[pname] === 'int') return new Int32Array(v);
                if (ARRAYS[pname] === 'float') return new Float32Array(v);
                return v;
            }
            return orig.apply(this, arguments);
        };
    });
    hook(proto, 'getSupportedExtensions', function (orig) {
        return function getSupportedExtensions() {
            var real = orig.apply(this, arguments);
            if (!real) return real;
            var out = real.filter(function (e) { return C.extensions.indexOf(e) >= 0; });
            if (out.indexOf(DEBUG_EXT) < 0) out.push(DEBUG_EXT);
            return out;
        };
    });
    hook(proto, 'getExtension', function (orig) {
        return function getExtension(name) {
            if (!listed(String(name))) return null;
            return orig.apply(this, arguments);
        };
    });
    hook(proto, 'getShaderPrecisionFormat', function (orig) {
        return function getShaderPrecisionFormat(shaderType, precisionType) {
            var r = orig.apply(this, arguments);
            var table = shaderType === 35633 ? C.precision.vertex : C.precision.fragment;
            var f = table && table[precisionType];
            if (!r || !f) return r;
            var fake = Object.create(Object.getPrototypeOf(r));
            Object.defineProperties(fake, {
                rangeMin: { value: f[0], enumerable: true },
                rangeMax: { value: f[1], enumerable: true },
                precision: { value: f[2], enumerable: true }
            });
            return fake;
        };
    });
    hook(proto, 'readPixels', function (orig) {
        return function readPixels() {
            var r = orig.apply(this, arguments);
            try {
                var pixels = arguments[6];
                if (pixels && typeof pixels.length === 'number' && (pixels instanceof Uint8Array || pixels instanceof Uint8ClampedArray)) {
                    pixelNoise(pixels, key, C.threshold);
                }
            } catch (e) {}
            return r;
        };
    });
    hook(proto, 'shaderSource', function (orig) {
        return function shaderSource(shader, source) {
            var src = source;
            try {
                var fragment = this.getShaderParameter(shader, 35663) === 35632;
                src = rewriteShader(String(source), fragment);
            } catch (e) { src = source; }
            return orig.call(this, shader, src);
        };
    });
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_cover_identity() {
        let profile = VmProfile::consistent("webgl");
        let overrides = WebGlOverrides::from_profile(&profile);
        assert_eq!(overrides.params.len(), 17);
        assert_eq!(
            overrides.params[&params::UNMASKED_RENDERER_WEBGL],
            json!(profile.gpu.unmasked_renderer)
        );
        assert_eq!(overrides.params[&params::MAX_VIEWPORT_DIMS], json!(profile.gpu.max_viewport_dims));
    }

    #[test]
    fn test_precision_formats() {
        assert_eq!(precision_format(PrecisionMode::Highp, PrecisionMode::Highp, false), [127, 127, 23]);
        assert_eq!(precision_format(PrecisionMode::Highp, PrecisionMode::Mediump, false), [15, 15, 10]);
        assert_eq!(precision_format(PrecisionMode::Lowp, PrecisionMode::Highp, true), [8, 7, 0]);
        assert_eq!(precision_format(PrecisionMode::Highp, PrecisionMode::Highp, true), [31, 30, 0]);
    }

    #[test]
    fn test_fragment_table_follows_profile() {
        let mut profile = VmProfile::consistent("webgl");
        profile.gpu.fragment_precision = PrecisionMode::Mediump;
        let overrides = WebGlOverrides::from_profile(&profile);
        assert_eq!(overrides.precision["fragment"][&params::HIGH_FLOAT], [15, 15, 10]);
        assert_eq!(overrides.precision["vertex"][&params::HIGH_FLOAT], [127, 127, 23]);
        assert_eq!(overrides.plan.fragment_precision, "mediump");
    }

    #[test]
    fn test_script_json_is_valid() {
        let overrides = WebGlOverrides::from_profile(&VmProfile::consistent("webgl"));
        let script = overrides.script();
        let json_line = script.lines().next().unwrap();
        let body = json_line.trim_start_matches("var C = ").trim_end_matches(';');
        let value: Value = serde_json::from_str(body).unwrap();
        assert!(value["params"]["37446"].is_string());
    }
}
