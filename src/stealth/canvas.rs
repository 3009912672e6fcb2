//! Canvas readback noise.
//!
//! A pixel is perturbed when the low byte of `mix(key, index)` falls below
//! the threshold; its selected RGB channel gets the low bit flipped. The
//! pattern depends only on the canvas key and pixel index, so the same
//! drawing always reads back the same way within a context. Noise is
//! applied to copies (`ImageData` results, scratch canvases), never to the
//! canvas the page drew on.

use serde::Serialize;

use super::js_json;
use crate::profile::VmProfile;

/// Per-256 pixel threshold for a profile noise intensity (fraction of
/// pixels touched, scaled by 2560). At least one.
pub fn noise_threshold(intensity: f64) -> u32 {
    let scaled = (intensity * 2560.0).round();
    if !scaled.is_finite() || scaled < 1.0 {
        1
    } else {
        scaled.min(255.0) as u32
    }
}

/// Readback noise for 2D and offscreen canvases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasNoise {
    /// Out of 256, see [`noise_threshold`].
    pub threshold: u32,
}

impl CanvasNoise {
    pub fn from_profile(profile: &VmProfile) -> Self {
        Self {
            threshold: noise_threshold(profile.canvas.noise_intensity),
        }
    }

    /// `HTMLCanvasElement` / `CanvasRenderingContext2D` body.
    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), CANVAS_BODY.trim())
    }

    /// `OffscreenCanvas` body, usable in windows and workers.
    pub fn offscreen_script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), OFFSCREEN_BODY.trim())
    }
}

const CANVAS_BODY: &str = r#"
var key = S.keys.canvas;
var Canvas = G.HTMLCanvasElement && G.HTMLCanvasElement.prototype;
var Ctx = G.CanvasRenderingContext2D && G.CanvasRenderingContext2D.prototype;
if (!Canvas || !Ctx || !G.document) return;
var nativeGetImageData = Ctx.getImageData;
function noisyCopy(canvas) {
    var w = canvas.width, h = canvas.height;
    if (!w || !h) return null;
    var scratch = G.document.createElement('canvas');
    scratch.width = w;
    scratch.height = h;
    var sctx = scratch.getContext('2d');
    sctx.drawImage(canvas, 0, 0);
    var img = nativeGetImageData.call(sctx, 0, 0, w, h);
    pixelNoise(img.data, key, C.threshold);
    sctx.putImageData(img, 0, 0);
    return scratch;
}
hook(Ctx, 'getImageData', function (orig) {
    return function getImageData() {
        var img = orig.apply(this, arguments);
        try { pixelNoise(img.data, key, C.threshold); } catch (e) {}
        return img;
    };
});
['toDataURL', 'toBlob'].forEach(function (name) {
    hook(Canvas, name, function (orig) {
        return function () {
            try {
                var copy = noisyCopy(this);
                if (copy) return orig.apply(copy, arguments);
            } catch (e) {}
            return orig.apply(this, arguments);
        };
    });
});
"#;

const OFFSCREEN_BODY: &str = r#"
var key = S.keys.canvas;
var OC = G.OffscreenCanvas;
var OCtx = G.OffscreenCanvasRenderingContext2D && G.OffscreenCanvasRenderingContext2D.prototype;
if (!OC || !OCtx) return;
var nativeGetImageData = OCtx.getImageData;
hook(OCtx, 'getImageData', function (orig) {
    return function getImageData() {
        var img = orig.apply(this, arguments);
        try { pixelNoise(img.data, key, C.threshold); } catch (e) {}
        return img;
    };
});
hook(OC.prototype, 'convertToBlob', function (orig) {
    return function convertToBlob() {
        try {
            var w = this.width, h = this.height;
            if (w && h) {
                var copy = new OC(w, h);
                var cctx = copy.getContext('2d');
                cctx.drawImage(this, 0, 0);
                var img = nativeGetImageData.call(cctx, 0, 0, w, h);
                pixelNoise(img.data, key, C.threshold);
                cctx.putImageData(img, 0, 0);
                return orig.apply(copy, arguments);
            }
        } catch (e) {}
        return orig.apply(this, arguments);
    };
});
"#;
