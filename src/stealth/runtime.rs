//! In-page runtime shared by every generated script: the guard and
//! namespace prelude, hooking helpers and the embedded seed snapshot.

use std::collections::BTreeMap;

use serde::Serialize;

use super::js_json;
use crate::seeds::{HashKind, SeedBundle, SeedCategory};

/// Evaluates to the realm's global object in windows, workers and worklets.
pub const GLOBAL_EXPR: &str =
    "(typeof globalThis !== 'undefined' ? globalThis : (typeof self !== 'undefined' ? self : this))";

/// Hooking helpers. Expects `G` in scope; defines `mask`, `own`,
/// `defineGetter`, `hook`, `hookGetter`, `hookSetter`, `mix`, `hashStr`
/// and `pixelNoise`.
pub const HELPERS: &str = r#"
var FP = (G.Function && G.Function.prototype) || Function.prototype;
var nativeToString = FP.toString;
var masks = typeof WeakMap === 'function' ? new WeakMap() : null;
function mask(fn, name) {
    if (masks) {
        try { masks.set(fn, 'function ' + name + '() { [native code] }'); } catch (e) {}
    }
    return fn;
}
if (masks) {
    var maskedToString = function toString() {
        if (masks.has(this)) return masks.get(this);
        return nativeToString.call(this);
    };
    mask(maskedToString, 'toString');
    try {
        Object.defineProperty(FP, 'toString', { value: maskedToString, writable: true, configurable: true, enumerable: false });
    } catch (e) {}
}
function own(obj, prop) {
    try { return obj ? Object.getOwnPropertyDescriptor(obj, prop) : undefined; } catch (e) { return undefined; }
}
function defineGetter(obj, prop, getter) {
    if (!obj) return false;
    var d = own(obj, prop);
    if (d && d.configurable === false) return false;
    try {
        Object.defineProperty(obj, prop, {
            get: mask(function () { return getter.call(this); }, 'get ' + prop),
            set: d ? d.set : undefined,
            configurable: true,
            enumerable: d ? d.enumerable : true
        });
        return true;
    } catch (e) { return false; }
}
function hook(obj, prop, make) {
    var d = own(obj, prop);
    if (!d || typeof d.value !== 'function') return false;
    try {
        Object.defineProperty(obj, prop, { value: mask(make(d.value), prop), writable: d.writable !== false, configurable: true, enumerable: d.enumerable });
        return true;
    } catch (e) { return false; }
}
function hookGetter(obj, prop, make) {
    var d = own(obj, prop);
    if (!d || typeof d.get !== 'function') return false;
    try {
        Object.defineProperty(obj, prop, { get: mask(make(d.get), 'get ' + prop), set: d.set, configurable: true, enumerable: d.enumerable });
        return true;
    } catch (e) { return false; }
}
function hookSetter(obj, prop, make) {
    var d = own(obj, prop);
    if (!d || typeof d.set !== 'function') return false;
    try {
        Object.defineProperty(obj, prop, { get: d.get, set: mask(make(d.set), 'set ' + prop), configurable: true, enumerable: d.enumerable });
        return true;
    } catch (e) { return false; }
}
function mix(seed, n) {
    var h = Math.imul((seed ^ n) >>> 0, 0x9e3779b1) >>> 0;
    h = Math.imul(h ^ (h >>> 16), 0x85ebca6b) >>> 0;
    h = Math.imul(h ^ (h >>> 13), 0xc2b2ae35) >>> 0;
    return (h ^ (h >>> 16)) >>> 0;
}
function hashStr(seed, s) {
    var h = (seed ^ 0x811c9dc5) >>> 0;
    s = String(s);
    for (var i = 0; i < s.length; i++) { h = Math.imul(h ^ s.charCodeAt(i), 0x01000193) >>> 0; }
    return mix(h, s.length);
}
function pixelNoise(data, seed, threshold) {
    if (!data || !data.length) return;
    for (var i = 0, n = data.length >> 2; i < n; i++) {
        var h = mix(seed, i);
        if ((h & 0xff) < threshold) { data[(i << 2) + ((h >>> 8) % 3)] ^= 1; }
    }
}
"#;

/// The per-context values a script carries into the realm it patches.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptSnapshot {
    pub context: String,
    pub keys: BTreeMap<&'static str, u32>,
    pub audio_fingerprint: f64,
    pub hashes: BTreeMap<&'static str, String>,
}

impl ScriptSnapshot {
    pub fn from_bundle(bundle: &SeedBundle) -> Self {
        Self {
            context: bundle.context_id.clone(),
            keys: SeedCategory::ALL
                .iter()
                .map(|c| (c.label(), bundle.script_key(*c)))
                .collect(),
            audio_fingerprint: bundle.audio_fingerprint,
            hashes: HashKind::ALL
                .iter()
                .map(|k| (k.label(), bundle.hash(*k).to_string()))
                .collect(),
        }
    }
}

/// Global holding the early blob interceptor's state for a namespace.
pub fn early_key(namespace_key: &str) -> String {
    format!("{}_early", namespace_key)
}

/// `apply("name", function () { body });`
pub fn capability(name: &str, body: &str) -> String {
    format!(
        "apply({}, function () {{\n{}\n}});\n",
        js_json(&name),
        body.trim_matches('\n')
    )
}

/// A named guard function `function <name>(G, isMainFrame) { ... }`.
///
/// `layer_expr` is a JS expression for the namespace's layer name. The
/// function returns without side effects if `G` already carries the
/// namespace.
pub fn guarded_function(
    name: &str,
    bundle: &SeedBundle,
    layer_expr: &str,
    capabilities: &str,
) -> String {
    let key = bundle.namespace_key();
    format!(
        r#"function {name}(G, isMainFrame) {{
'use strict';
var KEY = {key};
if (!G || Object.prototype.hasOwnProperty.call(G, KEY)) return;
var EARLY = {early};
var early = G[EARLY];
var ns = {{
    key: KEY,
    layer: {layer_expr},
    applied: [],
    snapshot: {snapshot},
    boot: {name},
    interceptors: [],
    patchedBlobUrls: (early && early.urls) || {{}},
    NativeBlob: (early && early.NativeBlob) || G.Blob
}};
try {{
    Object.defineProperty(G, KEY, {{ value: ns, enumerable: false, configurable: false, writable: false }});
}} catch (e) {{ return; }}
var S = ns.snapshot;
{helpers}
ns.h = {{ mask: mask, own: own, defineGetter: defineGetter, hook: hook, hookGetter: hookGetter, hookSetter: hookSetter, mix: mix, hashStr: hashStr }};
if (early && early.masks) early.masks.forEach(function (m) {{ mask(m[0], m[1]); }});
function apply(name, fn) {{
    try {{ fn(); }} catch (e) {{}}
    ns.applied.push(name);
}}
{capabilities}}}"#,
        name = name,
        key = js_json(&key),
        early = js_json(&early_key(key)),
        layer_expr = layer_expr,
        snapshot = js_json(&ScriptSnapshot::from_bundle(bundle)),
        helpers = HELPERS.trim(),
        capabilities = capabilities,
    )
}

/// Wraps a worker payload so nested workers can re-inject it:
/// `__ksPayload` holds the payload's own source.
pub fn envelope(payload: &str) -> String {
    format!(
        "(function () {{ var __ksPayload = {};\n{}\n}})();\n",
        js_json(&payload),
        payload
    )
}

/// Marker present in every enveloped script.
pub const ENVELOPE_MARKER: &str = "__ksPayload";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::VmProfile;

    #[test]
    fn test_snapshot_keys() {
        let bundle = SeedBundle::for_profile(&VmProfile::consistent("rt"), "ctx");
        let snapshot = ScriptSnapshot::from_bundle(&bundle);
        assert_eq!(snapshot.keys["canvas"], bundle.script_key(SeedCategory::Canvas));
        assert_eq!(snapshot.keys.len(), 5);
        assert_eq!(snapshot.hashes.len(), HashKind::COUNT);
    }

    #[test]
    fn test_envelope_embeds_itself() {
        let wrapped = envelope("self.x = 1;");
        assert!(wrapped.contains(ENVELOPE_MARKER));
        assert!(wrapped.contains("\"self.x = 1;\""));
    }

    #[test]
    fn test_capability_wrapper() {
        assert_eq!(
            capability("screen", "\nvar a = 1;\n"),
            "apply(\"screen\", function () {\nvar a = 1;\n});\n"
        );
    }
}
