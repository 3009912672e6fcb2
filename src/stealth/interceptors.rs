//! Interceptors: scripts that patch contexts a page creates later.
//!
//! Every interceptor except the early blob one expects the frame (or worker)
//! namespace to exist already. It installs itself into that namespace's
//! `interceptors` list, so the iframe interceptor can replay the whole set
//! on same-origin child windows and their children in turn.
//!
//! Worker payloads travel as enveloped source (see [`envelope`]): inside a
//! worker the payload is available as `__ksPayload`, which is how a nested
//! worker gets the exact script its parent ran.
//!
//! [`envelope`]: super::runtime::envelope

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::js_json;
use super::runtime::{early_key, ENVELOPE_MARKER, GLOBAL_EXPR};

/// Where an interceptor finds the worker payloads it injects.
#[derive(Debug, Clone, Copy)]
pub enum PayloadSource<'a> {
    /// Frame side: enveloped payloads embedded as string literals.
    Embedded { dedicated: &'a str, shared: &'a str },
    /// Worker side: rebuilt from the enclosing envelope's `__ksPayload`.
    Inherited,
}

impl PayloadSource<'_> {
    fn expr(&self) -> String {
        match self {
            PayloadSource::Embedded { dedicated, shared } => format!(
                "{{ dedicated: {}, shared: {} }}",
                js_json(dedicated),
                js_json(shared)
            ),
            PayloadSource::Inherited => INHERITED_PAYLOADS.to_string(),
        }
    }
}

const INHERITED_PAYLOADS: &str = "(typeof __ksPayload === 'string' \
    ? { dedicated: '(function () { var __ksPayload = ' + JSON.stringify(__ksPayload) + ';\\n' + __ksPayload + '\\n})();\\n' } \
    : {})";

/// Wraps `body` in an installer bound to the namespace at `key`. In the
/// body, `G` is the realm, `ns` its namespace and `h` its helpers.
fn installer(key: &str, flag: &str, prelude: &str, body: &str) -> String {
    format!(
        r#"(function (G0) {{
'use strict';
var KEY = {key};
var EARLY = {early};
{prelude}
function install(G) {{
    var ns;
    try {{ ns = G && G[KEY]; }} catch (e) {{ return; }}
    if (!ns || ns.{flag}) return;
    ns.{flag} = true;
    ns.interceptors.push(install);
    var h = ns.h;
{body}
}}
install(G0);
}})({global});
"#,
        key = js_json(&key),
        early = js_json(&early_key(key)),
        prelude = prelude.trim(),
        flag = flag,
        body = body.trim_matches('\n'),
        global = GLOBAL_EXPR,
    )
}

/// Hooks `Worker` and `SharedWorker` so workers boot through a bootstrap
/// blob that runs the payload before the original script.
///
/// Shared workers are bootstrapped only for `blob:` scripts: their identity
/// is keyed by script URL, so http(s) shared workers keep their URL and are
/// left to the engine-level [`SharedWorkerPatcher`]. Inside a bootstrapped
/// http(s) worker, relative URLs resolve against the original script and
/// `location` reports it.
///
/// [`SharedWorkerPatcher`]: super::workers::SharedWorkerPatcher
pub fn worker_interceptor(key: &str, payloads: PayloadSource<'_>) -> String {
    installer(
        key,
        "workerHooked",
        &format!(
            "var PAYLOADS = {};\nvar REBASE = {};",
            payloads.expr(),
            js_json(REBASE_FN.trim())
        ),
        WORKER_BODY,
    )
}

const WORKER_BODY: &str = r#"
    var NativeBlob = ns.NativeBlob || G.Blob;
    var U = G.URL;
    var cache = {};
    function bootstrap(kind, url, module) {
        var env = PAYLOADS[kind] || PAYLOADS.dedicated;
        if (!env || typeof NativeBlob !== 'function' || !U || typeof U.createObjectURL !== 'function') return null;
        var abs;
        try { abs = new U(String(url), G.location && G.location.href).href; } catch (e) { return null; }
        if (ns.patchedBlobUrls[abs] || /^data:/i.test(abs)) return null;
        var blob = /^blob:/i.test(abs);
        if (kind === 'shared' && !blob) return null;
        var ck = kind + '|' + (module ? 'module' : 'classic') + '|' + abs;
        if (cache[ck]) return cache[ck];
        var rebase = blob ? '' : '(' + REBASE + ')(globalThis, ' + JSON.stringify(KEY) + ', ' + JSON.stringify(abs) + ');\n';
        var src = module
            ? 'import "data:text/javascript,' + encodeURIComponent(env) + '";\n'
                + (rebase ? 'import "data:text/javascript,' + encodeURIComponent(rebase) + '";\n' : '')
                + 'import ' + JSON.stringify(abs) + ';\n'
            : env + '\n' + rebase + 'importScripts(' + JSON.stringify(abs) + ');\n';
        var u = U.createObjectURL(new NativeBlob([src], { type: 'text/javascript' }));
        ns.patchedBlobUrls[u] = true;
        cache[ck] = u;
        return u;
    }
    function wrap(name, kind) {
        var Native = G[name];
        if (typeof Native !== 'function') return;
        var Wrapped = function () {
            var args = Array.prototype.slice.call(arguments);
            if (!new.target) return Native.apply(this, args);
            try {
                var opts = args[1];
                var module = !!(opts && typeof opts === 'object' && opts.type === 'module');
                var u = bootstrap(kind, args[0], module);
                if (u) args[0] = u;
            } catch (e) {}
            return Reflect.construct(Native, args, new.target);
        };
        Wrapped.prototype = Native.prototype;
        try { Object.setPrototypeOf(Wrapped, Object.getPrototypeOf(Native)); } catch (e) {}
        try { Object.defineProperty(Wrapped, 'length', { value: Native.length }); } catch (e) {}
        try { Object.defineProperty(Native.prototype, 'constructor', { value: Wrapped, writable: true, configurable: true, enumerable: false }); } catch (e) {}
        try { Object.defineProperty(G, name, { value: h.mask(Wrapped, name), writable: true, configurable: true, enumerable: false }); } catch (e) {}
    }
    wrap('Worker', 'dedicated');
    wrap('SharedWorker', 'shared');
"#;

/// Runs inside a bootstrapped worker as `(REBASE)(G, KEY, BASE)`: relative
/// URLs given to `importScripts`, `fetch`, `XMLHttpRequest#open` and the
/// `Worker`, `SharedWorker`, `Request` and `EventSource` constructors
/// resolve against `BASE`, and `WorkerLocation` reports `BASE`.
/// `WebAssembly.instantiateStreaming` takes a `Response`, so rebasing
/// `fetch` covers it.
const REBASE_FN: &str = r#"
function (G, KEY, BASE) {
    'use strict';
    var ns = G && G[KEY];
    var h = ns && ns.h;
    var U = G && G.URL;
    if (!h || typeof U !== 'function') return;
    var base;
    try { base = new U(BASE); } catch (e) { return; }
    function rebase(u) {
        var s = typeof u === 'string' ? u : (u instanceof U ? u.href : null);
        if (s === null) return u;
        try { return new U(s, BASE).href; } catch (e) { return u; }
    }
    function rebaseArgs(fn, index) {
        return function () {
            var args = Array.prototype.slice.call(arguments);
            if (index < 0) args = args.map(rebase);
            else if (args.length > index) args[index] = rebase(args[index]);
            return fn.apply(this, args);
        };
    }
    function hookGlobal(name, index) {
        var orig = G[name];
        if (typeof orig !== 'function') return;
        if (h.hook(G, name, function (fn) { return rebaseArgs(fn, index); })) return;
        try { Object.defineProperty(G, name, { value: h.mask(rebaseArgs(orig, index), name), writable: true, configurable: true, enumerable: true }); } catch (e) {}
    }
    hookGlobal('importScripts', -1);
    hookGlobal('fetch', 0);
    var XP = G.XMLHttpRequest && G.XMLHttpRequest.prototype;
    if (XP) h.hook(XP, 'open', function (fn) { return rebaseArgs(fn, 1); });
    ['Worker', 'SharedWorker', 'Request', 'EventSource'].forEach(function (name) {
        var Native = G[name];
        if (typeof Native !== 'function') return;
        var Wrapped = function () {
            var args = Array.prototype.slice.call(arguments);
            if (args.length) args[0] = rebase(args[0]);
            if (!new.target) return Native.apply(this, args);
            return Reflect.construct(Native, args, new.target);
        };
        Wrapped.prototype = Native.prototype;
        try { Object.setPrototypeOf(Wrapped, Object.getPrototypeOf(Native)); } catch (e) {}
        try { Object.defineProperty(Wrapped, 'length', { value: Native.length }); } catch (e) {}
        try { Object.defineProperty(Native.prototype, 'constructor', { value: Wrapped, writable: true, configurable: true, enumerable: false }); } catch (e) {}
        try { Object.defineProperty(G, name, { value: h.mask(Wrapped, name), writable: true, configurable: true, enumerable: false }); } catch (e) {}
    });
    var LP = G.WorkerLocation && G.WorkerLocation.prototype;
    if (LP) {
        ['href', 'origin', 'protocol', 'host', 'hostname', 'port', 'pathname', 'search', 'hash'].forEach(function (prop) {
            h.hookGetter(LP, prop, function (orig) {
                return function () {
                    var v = base[prop];
                    return typeof v === 'string' ? v : orig.call(this);
                };
            });
        });
        h.hook(LP, 'toString', function () { return function toString() { return base.href; }; });
    }
}
"#;

/// Patches same-origin child windows as soon as the page can reach them.
/// Cross-origin windows throw on access and are left to the host engine.
pub fn iframe_interceptor(key: &str) -> String {
    installer(key, "iframeHooked", "", IFRAME_BODY)
}

const IFRAME_BODY: &str = r#"
    function patchWindow(win) {
        if (!win || win === G) return;
        try {
            void win.document;
            if (Object.prototype.hasOwnProperty.call(win, KEY)) return;
        } catch (e) { return; }
        try { ns.boot(win, false); } catch (e) { return; }
        ns.interceptors.slice().forEach(function (fn) {
            try { fn(win); } catch (e) {}
        });
    }
    var getters = [];
    [G.HTMLIFrameElement, G.HTMLFrameElement].forEach(function (Ctor) {
        var proto = Ctor && Ctor.prototype;
        if (!proto) return;
        var d = h.own(proto, 'contentWindow');
        if (d && d.get) getters.push(d.get);
        h.hookGetter(proto, 'contentWindow', function (orig) {
            return function () {
                var w = orig.call(this);
                patchWindow(w);
                return w;
            };
        });
        h.hookGetter(proto, 'contentDocument', function (orig) {
            return function () {
                var doc = orig.call(this);
                if (doc) patchWindow(doc.defaultView);
                return doc;
            };
        });
    });
    function patchFrame(el) {
        for (var i = 0; i < getters.length; i++) {
            try { patchWindow(getters[i].call(el)); return; } catch (e) {}
        }
    }
    function framesIn(node) {
        var out = [];
        try {
            if (!node || typeof node !== 'object') return out;
            if (node.tagName === 'IFRAME' || node.tagName === 'FRAME') out.push(node);
            if (node.querySelectorAll) {
                var list = node.querySelectorAll('iframe,frame');
                for (var i = 0; i < list.length; i++) out.push(list[i]);
            }
        } catch (e) {}
        return out;
    }
    function inserting(orig) {
        return function () {
            var frames = [];
            for (var i = 0; i < arguments.length; i++) frames = frames.concat(framesIn(arguments[i]));
            var r = orig.apply(this, arguments);
            frames.forEach(patchFrame);
            return r;
        };
    }
    var NP = G.Node && G.Node.prototype;
    if (NP) ['appendChild', 'insertBefore', 'replaceChild'].forEach(function (name) { h.hook(NP, name, inserting); });
    [G.Element, G.Document, G.DocumentFragment].forEach(function (Ctor) {
        var proto = Ctor && Ctor.prototype;
        if (!proto) return;
        ['append', 'prepend', 'after', 'before', 'replaceWith', 'replaceChildren'].forEach(function (name) { h.hook(proto, name, inserting); });
    });
    var DP = G.Document && G.Document.prototype;
    if (DP) {
        h.hook(DP, 'createElement', function (orig) {
            return function createElement(tag) {
                var el = orig.apply(this, arguments);
                try {
                    if (/^i?frame$/i.test(String(tag))) el.addEventListener('load', function () { patchFrame(el); });
                } catch (e) {}
                return el;
            };
        });
    }
    if (G.document) {
        framesIn(G.document).forEach(patchFrame);
        if (typeof G.MutationObserver === 'function') {
            try {
                new G.MutationObserver(function (records) {
                    records.forEach(function (r) {
                        for (var i = 0; i < r.addedNodes.length; i++) framesIn(r.addedNodes[i]).forEach(patchFrame);
                    });
                }).observe(G.document, { childList: true, subtree: true });
            } catch (e) {}
        }
    }
"#;

/// Classifies Blob parts and rewrites them. Expects `MARKER`.
const BLOB_CLASSIFY: &str = r#"
var JS_TYPE = /^(?:(?:text|application)\/(?:x-)?(?:javascript|ecmascript)|module)$/i;
var ESM = /(?:^|[;\n}])\s*(?:import\s*[\w{*'"]|export\s+[\w{*])/;
function textOf(parts) {
    var s = '';
    for (var i = 0; i < parts.length && s.length < 4096; i++) {
        if (typeof parts[i] === 'string') s += parts[i];
    }
    return s;
}
function classify(parts, options) {
    if (!parts || typeof parts === 'string' || typeof parts.length !== 'number') return null;
    var type = options && options.type ? String(options.type).split(';')[0].trim() : '';
    var text = textOf(parts);
    if (!text || text.indexOf(MARKER) >= 0) return null;
    if (!JS_TYPE.test(type)) return null;
    var stripped = text.replace(/\/\*[\s\S]*?\*\//g, '').replace(/(^|[^:\\])\/\/.*$/gm, '$1');
    return ESM.test(stripped) ? 'module' : 'classic';
}
function patchedParts(parts, mode, env) {
    var rest = Array.prototype.slice.call(parts);
    if (mode === 'module') return ['import "data:text/javascript,' + encodeURIComponent(env) + '";\n'].concat(rest);
    var first = rest[0];
    if (typeof first === 'string') {
        var m = /^(?:\s|\/\*[\s\S]*?\*\/|\/\/[^\n]*)*(['"])use strict\1[ \t]*;?/.exec(first);
        if (m) {
            var head = /;$/.test(m[0]) ? m[0] : m[0] + ';';
            return [head + '\n' + env + '\n' + first.slice(m[0].length)].concat(rest.slice(1));
        }
    }
    return [env + '\n'].concat(rest);
}
"#;

/// Wraps `Blob` and the object-URL functions. Expects `G`, `NativeBlob`,
/// `ENV`, `patched` (WeakSet), `urls` and `remember(fn, name)`.
const BLOB_WRAP: &str = r#"
var Blob = function Blob(parts, options) {
    if (!new.target) return NativeBlob.apply(this, arguments);
    var args = Array.prototype.slice.call(arguments);
    var mode = null;
    try {
        mode = classify(parts, options);
        if (mode) args[0] = patchedParts(parts, mode, ENV);
    } catch (e) { mode = null; }
    var b = Reflect.construct(NativeBlob, args, new.target);
    if (mode) patched.add(b);
    return b;
};
Blob.prototype = NativeBlob.prototype;
try { Object.defineProperty(Blob, 'length', { value: NativeBlob.length }); } catch (e) {}
try { Object.defineProperty(NativeBlob.prototype, 'constructor', { value: Blob, writable: true, configurable: true, enumerable: false }); } catch (e) {}
try { Object.defineProperty(G, 'Blob', { value: remember(Blob, 'Blob'), writable: true, configurable: true, enumerable: false }); } catch (e) {}
var U = G.URL;
if (U && typeof U.createObjectURL === 'function') {
    var nativeCreate = U.createObjectURL;
    var nativeRevoke = U.revokeObjectURL;
    var createObjectURL = function createObjectURL(obj) {
        var u = nativeCreate.apply(this, arguments);
        try { if (obj && patched.has(obj)) urls[u] = true; } catch (e) {}
        return u;
    };
    try { Object.defineProperty(U, 'createObjectURL', { value: remember(createObjectURL, 'createObjectURL'), writable: true, configurable: true, enumerable: true }); } catch (e) {}
    if (typeof nativeRevoke === 'function') {
        var revokeObjectURL = function revokeObjectURL(u) {
            try { delete urls[String(u)]; } catch (e) {}
            return nativeRevoke.apply(this, arguments);
        };
        try { Object.defineProperty(U, 'revokeObjectURL', { value: remember(revokeObjectURL, 'revokeObjectURL'), writable: true, configurable: true, enumerable: true }); } catch (e) {}
    }
}
"#;

/// Prepends the dedicated payload to Blobs with a JavaScript MIME type.
/// Untyped Blobs are never rewritten; a worker built from one is
/// bootstrapped by the worker interceptor instead. A no-op in realms where
/// the early blob interceptor already ran.
pub fn blob_url_interceptor(key: &str, payloads: PayloadSource<'_>) -> String {
    let body = format!(
        r#"
    if (G[EARLY]) return;
    var ENV = PAYLOADS.dedicated;
    var NativeBlob = G.Blob;
    if (!ENV || typeof NativeBlob !== 'function' || typeof WeakSet !== 'function') return;
    var patched = new WeakSet();
    var urls = ns.patchedBlobUrls;
    var remember = h.mask;
    {wrap}
"#,
        wrap = BLOB_WRAP.trim()
    );
    installer(
        key,
        "blobHooked",
        &format!(
            "var PAYLOADS = {};\nvar MARKER = {};\n{}",
            payloads.expr(),
            js_json(&ENVELOPE_MARKER),
            BLOB_CLASSIFY.trim()
        ),
        &body,
    )
}

/// Self-contained Blob interceptor that must run before any page script.
///
/// It owns `G[<key>_early]`, which the frame namespace later adopts: the
/// native `Blob`, the set of patched Blob URLs and the functions to mask.
/// The state object is created even where `Blob` does not exist.
pub fn early_blob_interceptor(key: &str, dedicated_envelope: &str) -> String {
    format!(
        r#"(function (G) {{
'use strict';
if (!G) return;
var EARLY = {early};
if (Object.prototype.hasOwnProperty.call(G, EARLY)) return;
var NativeBlob = G.Blob;
var state = {{ NativeBlob: NativeBlob, urls: {{}}, masks: [] }};
try {{ Object.defineProperty(G, EARLY, {{ value: state, enumerable: false, configurable: false, writable: false }}); }} catch (e) {{ return; }}
if (typeof NativeBlob !== 'function' || typeof WeakSet !== 'function') return;
var ENV = {env};
var MARKER = {marker};
var patched = new WeakSet();
var urls = state.urls;
function remember(fn, name) {{ state.masks.push([fn, name]); return fn; }}
{classify}
{wrap}
}})({global});
"#,
        early = js_json(&early_key(key)),
        env = js_json(&dedicated_envelope),
        marker = js_json(&ENVELOPE_MARKER),
        classify = BLOB_CLASSIFY.trim(),
        wrap = BLOB_WRAP.trim(),
        global = GLOBAL_EXPR,
    )
}

/// `import "data:text/javascript;base64,...";` for `module_source`.
pub fn es_module_import(module_source: &str) -> String {
    format!(
        "import \"data:text/javascript;base64,{}\";\n",
        STANDARD.encode(module_source.as_bytes())
    )
}

/// Expression evaluating to the detector label of the current realm.
pub fn context_detector() -> String {
    format!(
        r#"(function (G) {{
'use strict';
function is(name) {{
    try {{ return typeof G[name] === 'function' && G instanceof G[name]; }} catch (e) {{ return false; }}
}}
if (!G) return 'unknown';
if (is('ServiceWorkerGlobalScope')) return 'service_worker';
if (is('SharedWorkerGlobalScope')) return 'shared_worker';
if (is('DedicatedWorkerGlobalScope')) return 'dedicated_worker';
if (is('AudioWorkletGlobalScope') || typeof G.registerProcessor === 'function') return 'audio_worklet';
if (is('PaintWorkletGlobalScope') || typeof G.registerPaint === 'function') return 'paint_worklet';
try {{
    if (G.window === G && typeof G.document !== 'undefined') {{
        try {{ return G.top === G ? 'main_frame' : 'iframe'; }} catch (e) {{ return 'iframe'; }}
    }}
}} catch (e) {{}}
return 'unknown';
}})({global})"#,
        global = GLOBAL_EXPR
    )
}

/// Runtime main-frame check for scripts generated without knowing it.
pub const IS_MAIN_FRAME_EXPR: &str =
    "(function () { try { return typeof window !== 'undefined' && window.top === window.self; } catch (e) { return false; } })()";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_payloads_are_quoted() {
        let script = worker_interceptor(
            "__ks0123456789ab",
            PayloadSource::Embedded {
                dedicated: "self.a = \"</script>\";",
                shared: "self.b = 2;",
            },
        );
        assert!(script.contains("var PAYLOADS = { dedicated: \"self.a"));
        assert!(!script.contains("</script>"));
        assert!(script.contains("ns.workerHooked"));
    }

    #[test]
    fn test_inherited_payloads_use_envelope_variable() {
        let script = blob_url_interceptor("__ks0123456789ab", PayloadSource::Inherited);
        assert!(script.contains("typeof __ksPayload === 'string'"));
        assert!(script.contains("if (G[EARLY]) return;"));
    }

    #[test]
    fn test_rebase_hook_travels_as_string() {
        let script = worker_interceptor("__ks0123456789ab", PayloadSource::Inherited);
        assert!(script.contains("var REBASE = \"function (G, KEY, BASE) {"));
        assert!(script.contains("if (kind === 'shared' && !blob) return null;"));
    }

    #[test]
    fn test_es_module_import_is_base64() {
        let import = es_module_import("self.x = 1;");
        assert_eq!(import, "import \"data:text/javascript;base64,c2VsZi54ID0gMTs=\";\n");
    }

    #[test]
    fn test_early_uses_early_key() {
        let script = early_blob_interceptor("__ks0123456789ab", "void 0;");
        assert!(script.contains("\"__ks0123456789ab_early\""));
    }
}
