//! Timezone: `Date#getTimezoneOffset` and the default `Intl` zone.

use serde::Serialize;

use super::js_json;
use crate::profile::VmProfile;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimezoneOverrides {
    #[serde(rename = "timeZone")]
    pub time_zone: String,
    /// `getTimezoneOffset()` value: minutes *behind* UTC.
    pub offset: i32,
}

impl TimezoneOverrides {
    pub fn from_profile(profile: &VmProfile) -> Self {
        Self {
            time_zone: profile.browser.timezone.clone(),
            offset: -profile.browser.timezone_offset_minutes,
        }
    }

    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), TIMEZONE_BODY.trim())
    }
}

const TIMEZONE_BODY: &str = r#"
if (G.Date && G.Date.prototype) {
    hook(G.Date.prototype, 'getTimezoneOffset', function (orig) {
        return function getTimezoneOffset() {
            if (isNaN(this.getTime())) return orig.apply(this, arguments);
            return C.offset;
        };
    });
}
if (G.Intl && G.Intl.DateTimeFormat && G.Intl.DateTimeFormat.prototype) {
    var DTF = G.Intl.DateTimeFormat;
    var explicit = typeof WeakSet === 'function' ? new WeakSet() : null;
    var Wrapped = function DateTimeFormat(locales, options) {
        var args = Array.prototype.slice.call(arguments);
        var instance = new.target ? Reflect.construct(DTF, args, new.target) : DTF.apply(this, args);
        if (explicit && options && options.timeZone) explicit.add(instance);
        return instance;
    };
    Wrapped.prototype = DTF.prototype;
    try { Object.setPrototypeOf(Wrapped, DTF); } catch (e) {}
    try { Object.defineProperty(DTF.prototype, 'constructor', { value: Wrapped, writable: true, configurable: true, enumerable: false }); } catch (e) {}
    try { Object.defineProperty(G.Intl, 'DateTimeFormat', { value: mask(Wrapped, 'DateTimeFormat'), writable: true, configurable: true, enumerable: false }); } catch (e) {}
    hook(DTF.prototype, 'resolvedOptions', function (orig) {
        return function resolvedOptions() {
            var r = orig.apply(this, arguments);
            if (!(explicit && explicit.has(this))) {
                try { r.timeZone = C.timeZone; } catch (e) {}
            }
            return r;
        };
    });
}
"#;
