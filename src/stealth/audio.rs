//! Web Audio spoofing.
//!
//! Sample buffers get sparse, audio-keyed noise on `getChannelData` and
//! `copyFromChannel`; analyser output gets the same treatment. Offline
//! rendering is calibrated so the classic oscillator + compressor probe
//! (sum of `|sample|` over samples 4500..5000) lands on the bundle's audio
//! fingerprint value.

use serde::Serialize;

use super::js_json;
use crate::profile::VmProfile;

/// Amplitude added to roughly one in eight samples.
pub const SAMPLE_NOISE: f64 = 1e-7;

/// Sample range `[start, end)` the offline calibration sums over.
pub const PROBE_WINDOW: (u32, u32) = (4500, 5000);

/// Values the audio body reports, serialized as the script's `C`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOverrides {
    /// Realtime contexts only. An `OfflineAudioContext` keeps the rate it
    /// was constructed with.
    pub sample_rate: u32,
    /// `AudioDestinationNode#maxChannelCount`.
    pub max_channel_count: u32,
    /// Seconds.
    pub base_latency: f64,
    /// Always [`SAMPLE_NOISE`].
    pub noise: f64,
    pub probe_start: u32,
    pub probe_end: u32,
}

impl AudioOverrides {
    pub fn from_profile(profile: &VmProfile) -> Self {
        Self {
            sample_rate: profile.audio.sample_rate,
            max_channel_count: profile.audio.max_channel_count,
            base_latency: profile.audio.base_latency,
            noise: SAMPLE_NOISE,
            probe_start: PROBE_WINDOW.0,
            probe_end: PROBE_WINDOW.1,
        }
    }

    /// Capability body; runs inside the guarded prelude.
    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), AUDIO_BODY.trim())
    }
}

const AUDIO_BODY: &str = r#"
var key = S.keys.audio;
var target = S.audio_fingerprint;
var touched = typeof WeakMap === 'function' ? new WeakMap() : null;
var calibrated = typeof WeakSet === 'function' ? new WeakSet() : null;
function perturb(buffer, channel, data) {
    if (!data || !touched) return data;
    var seen = touched.get(buffer);
    if (!seen) { seen = {}; touched.set(buffer, seen); }
    if (seen[channel]) return data;
    seen[channel] = true;
    var base = mix(key, channel + 1);
    for (var i = 0; i < data.length; i++) {
        var h = mix(base, i);
        if ((h & 7) === 0) data[i] += ((h >>> 3) & 1 ? 1 : -1) * C.noise;
    }
    return data;
}
function calibrate(buffer) {
    if (!calibrated || calibrated.has(buffer) || typeof target !== 'number') return;
    calibrated.add(buffer);
    try {
        if (buffer.length < C.probeEnd) return;
        var data = nativeGetChannelData.call(buffer, 0);
        var sum = 0;
        for (var i = C.probeStart; i < C.probeEnd; i++) sum += Math.abs(data[i]);
        if (!sum) return;
        var factor = target / sum;
        if (Math.abs(factor - 1) > 0.01) return;
        for (var j = C.probeStart; j < C.probeEnd; j++) data[j] *= factor;
        if (touched) {
            var seen = touched.get(buffer) || {};
            seen[0] = true;
            touched.set(buffer, seen);
        }
    } catch (e) {}
}
var AB = G.AudioBuffer && G.AudioBuffer.prototype;
var nativeGetChannelData = AB && AB.getChannelData;
if (AB && nativeGetChannelData) {
    hook(AB, 'getChannelData', function (orig) {
        return function getChannelData(channel) {
            return perturb(this, channel, orig.apply(this, arguments));
        };
    });
    hook(AB, 'copyFromChannel', function (orig) {
        return function copyFromChannel(destination, channel) {
            try { perturb(this, channel, nativeGetChannelData.call(this, channel)); } catch (e) {}
            return orig.apply(this, arguments);
        };
    });
}
var AN = G.AnalyserNode && G.AnalyserNode.prototype;
if (AN) {
    hook(AN, 'getFloatFrequencyData', function (orig) {
        return function getFloatFrequencyData(array) {
            var r = orig.apply(this, arguments);
            try {
                for (var i = 0; i < array.length; i++) {
                    var h = mix(key ^ 0x5bd1e995, i);
                    if ((h & 7) === 0) array[i] += ((h >>> 3) & 1 ? 1 : -1) * C.noise * 1000;
                }
            } catch (e) {}
            return r;
        };
    });
}
var OAC = G.OfflineAudioContext && G.OfflineAudioContext.prototype;
if (OAC) {
    hook(OAC, 'startRendering', function (orig) {
        return function startRendering() {
            var p = orig.apply(this, arguments);
            if (!p || typeof p.then !== 'function') return p;
            return p.then(function (buffer) { calibrate(buffer); return buffer; });
        };
    });
}
var BAC = G.BaseAudioContext && G.BaseAudioContext.prototype;
if (BAC) {
    hookGetter(BAC, 'sampleRate', function (orig) {
        return function () {
            if (G.OfflineAudioContext && this instanceof G.OfflineAudioContext) return orig.call(this);
            return C.sampleRate;
        };
    });
}
var ADN = G.AudioDestinationNode && G.AudioDestinationNode.prototype;
if (ADN) defineGetter(ADN, 'maxChannelCount', function () { return C.maxChannelCount; });
var AC = G.AudioContext && G.AudioContext.prototype;
if (AC) defineGetter(AC, 'baseLatency', function () { return C.baseLatency; });
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_from_profile() {
        let mut profile = VmProfile::consistent("audio");
        profile.audio.sample_rate = 44100;
        let overrides = AudioOverrides::from_profile(&profile);
        assert_eq!(overrides.sample_rate, 44100);
        assert_eq!(overrides.probe_start, 4500);
        let script = overrides.script();
        assert!(script.contains("\"sampleRate\":44100"));
        assert!(script.contains("S.audio_fingerprint"));
    }
}
