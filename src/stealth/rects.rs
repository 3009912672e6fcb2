//! Client-rect noise.
//!
//! `getBoundingClientRect` and `getClientRects` results are shifted by a
//! sub-pixel offset derived from the client-rects key and the rect's own
//! integer geometry, so the same layout measures the same way on every
//! call within a context.

use serde::Serialize;

use super::js_json;

/// Largest offset applied to any coordinate, in CSS pixels.
pub const MAX_OFFSET: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientRectNoise {
    pub amplitude: f64,
}

impl Default for ClientRectNoise {
    fn default() -> Self {
        Self {
            amplitude: MAX_OFFSET,
        }
    }
}

impl ClientRectNoise {
    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), RECTS_BODY.trim())
    }
}

const RECTS_BODY: &str = r#"
var key = S.keys['client-rects'];
var DR = G.DOMRect;
if (!DR || !G.Element) return;
function offset(a, b, salt) {
    var h = mix(mix(key, salt), ((a * 64) | 0) ^ (((b * 64) | 0) << 11));
    return ((h & 0xffff) / 0xffff - 0.5) * 2 * C.amplitude;
}
function shift(r) {
    if (!r) return r;
    var dx = offset(r.x, r.width, 1);
    var dy = offset(r.y, r.height, 2);
    return new DR(r.x + dx, r.y + dy, r.width + dx, r.height + dy);
}
[G.Element.prototype, G.Range && G.Range.prototype].forEach(function (proto) {
    if (!proto) return;
    hook(proto, 'getBoundingClientRect', function (orig) {
        return function getBoundingClientRect() {
            var r = orig.apply(this, arguments);
            try { return shift(r); } catch (e) { return r; }
        };
    });
    hook(proto, 'getClientRects', function (orig) {
        return function getClientRects() {
            var list = orig.apply(this, arguments);
            try {
                var out = [];
                for (var i = 0; i < list.length; i++) out.push(shift(list[i]));
                out.item = mask(function item(i) { return out[i] || null; }, 'item');
                return out;
            } catch (e) { return list; }
        };
    });
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_hyphenated_key() {
        let script = ClientRectNoise::default().script();
        assert!(script.contains("S.keys['client-rects']"));
        assert!(script.contains("\"amplitude\":0.001"));
    }
}
