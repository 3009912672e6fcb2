//! Screen geometry and `devicePixelRatio`.

use serde::Serialize;

use super::js_json;
use crate::profile::VmProfile;

/// `Screen` getters plus the window-level size values derived from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenOverrides {
    pub width: u32,
    pub height: u32,
    /// Also reported as `outerWidth`.
    pub avail_width: u32,
    /// Also reported as `outerHeight`.
    pub avail_height: u32,
    pub color_depth: u32,
    pub pixel_depth: u32,
    pub device_pixel_ratio: f64,
}

impl ScreenOverrides {
    pub fn from_profile(profile: &VmProfile) -> Self {
        let s = &profile.screen;
        Self {
            width: s.width,
            height: s.height,
            avail_width: s.avail_width,
            avail_height: s.avail_height,
            color_depth: s.color_depth,
            pixel_depth: s.pixel_depth,
            device_pixel_ratio: s.device_pixel_ratio,
        }
    }

    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), SCREEN_BODY.trim())
    }
}

const SCREEN_BODY: &str = r#"
if (!G.Screen || !G.screen) return;
var proto = G.Screen.prototype;
['width', 'height', 'availWidth', 'availHeight', 'colorDepth', 'pixelDepth'].forEach(function (k) {
    defineGetter(proto, k, function () { return C[k]; });
});
defineGetter(proto, 'availLeft', function () { return 0; });
defineGetter(proto, 'availTop', function () { return 0; });
defineGetter(G, 'devicePixelRatio', function () { return C.devicePixelRatio; });
defineGetter(G, 'outerWidth', function () { return C.availWidth; });
defineGetter(G, 'outerHeight', function () { return C.availHeight; });
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_values_embedded() {
        let profile = VmProfile::consistent("screen");
        let script = ScreenOverrides::from_profile(&profile).script();
        assert!(script.contains(&format!("\"width\":{}", profile.screen.width)));
        assert!(script.contains("devicePixelRatio"));
    }
}
