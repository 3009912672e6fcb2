//! Navigator Property Overrides
//!
//! Redefines the navigator surface on `Navigator.prototype` (or
//! `WorkerNavigator.prototype` inside workers) so every realm reports the
//! profile's browser identity. `navigator.webdriver` is always `false`.
//!
//! Plugins and MIME types are only rebuilt where `PluginArray` exists, and
//! automation markers are only scrubbed in realms with a `document`.

use serde::Serialize;

use super::js_json;
use crate::profile::{PluginInfo, VmProfile};

/// Values the navigator script reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatorOverrides {
    pub user_agent: String,
    /// `userAgent` without the leading `Mozilla/` unless the profile sets
    /// one explicitly.
    pub app_version: String,
    /// `navigator.platform`, e.g. `Win32` or `MacIntel`.
    pub platform: String,
    pub vendor: String,
    pub product_sub: String,
    /// `languages`; `language` is the first entry.
    pub languages: Vec<String>,
    pub hardware_concurrency: u32,
    /// GiB, as Chrome reports it.
    pub device_memory: u32,
    pub max_touch_points: u32,
    /// `None` reports `null`.
    pub do_not_track: Option<String>,
    /// True whenever the profile lists any plugin.
    pub pdf_viewer_enabled: bool,
    pub plugins: Vec<PluginData>,
}

/// One `navigator.plugins` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginData {
    pub name: String,
    pub description: String,
    pub filename: String,
    #[serde(rename = "mimeTypes")]
    pub mime_types: Vec<MimeTypeData>,
}

/// One `navigator.mimeTypes` entry, linked back to its plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MimeTypeData {
    /// Serialized as `type`.
    #[serde(rename = "type")]
    pub mime_type: String,
    pub description: String,
    /// Comma separated, without dots.
    pub suffixes: String,
}

impl From<&PluginInfo> for PluginData {
    fn from(plugin: &PluginInfo) -> Self {
        Self {
            name: plugin.name.clone(),
            description: plugin.description.clone(),
            filename: plugin.filename.clone(),
            mime_types: plugin
                .mime_types
                .iter()
                .map(|m| MimeTypeData {
                    mime_type: m.mime_type.clone(),
                    description: m.description.clone(),
                    suffixes: m.suffixes.clone(),
                })
                .collect(),
        }
    }
}

impl NavigatorOverrides {
    /// Browser, OS and hardware sections of `profile`.
    pub fn from_profile(profile: &VmProfile) -> Self {
        let browser = &profile.browser;
        Self {
            user_agent: browser.user_agent.clone(),
            app_version: browser.effective_app_version(),
            platform: profile.os.platform.clone(),
            vendor: browser.vendor.clone(),
            product_sub: browser.product_sub.clone(),
            languages: browser.languages.clone(),
            hardware_concurrency: profile.hardware.hardware_concurrency,
            device_memory: profile.hardware.device_memory,
            max_touch_points: profile.hardware.max_touch_points,
            do_not_track: browser.do_not_track.clone(),
            pdf_viewer_enabled: !browser.plugins.is_empty(),
            plugins: browser.plugins.iter().map(PluginData::from).collect(),
        }
    }

    /// Capability body; runs inside the guarded prelude.
    pub fn script(&self) -> String {
        format!("var C = {};\n{}", js_json(self), NAVIGATOR_BODY.trim())
    }
}

const NAVIGATOR_BODY: &str = r#"
var N = G.Navigator || G.WorkerNavigator;
var proto = N && N.prototype;
if (!proto) return;
var langs = Object.freeze(C.languages.slice());
var values = {
    userAgent: C.userAgent,
    appVersion: C.appVersion,
    platform: C.platform,
    vendor: C.vendor,
    productSub: C.productSub,
    language: langs[0],
    hardwareConcurrency: C.hardwareConcurrency,
    deviceMemory: C.deviceMemory,
    webdriver: false
};
Object.keys(values).forEach(function (k) {
    defineGetter(proto, k, function () { return values[k]; });
});
defineGetter(proto, 'languages', function () { return langs; });

if (G.Navigator) {
    defineGetter(proto, 'maxTouchPoints', function () { return C.maxTouchPoints; });
    defineGetter(proto, 'doNotTrack', function () { return C.doNotTrack; });
    defineGetter(proto, 'pdfViewerEnabled', function () { return C.pdfViewerEnabled; });
}

if (typeof G.PluginArray === 'function' && G.Plugin && G.MimeType && G.MimeTypeArray) {
    var plugins = [];
    var mimeTypes = [];
    C.plugins.forEach(function (p) {
        var plugin = Object.create(G.Plugin.prototype);
        var entries = [];
        p.mimeTypes.forEach(function (mt) {
            var mimeType = Object.create(G.MimeType.prototype);
            Object.defineProperties(mimeType, {
                type: { value: mt.type, enumerable: true },
                description: { value: mt.description, enumerable: true },
                suffixes: { value: mt.suffixes, enumerable: true },
                enabledPlugin: { value: plugin, enumerable: true }
            });
            entries.push(mimeType);
            mimeTypes.push(mimeType);
        });
        Object.defineProperties(plugin, {
            name: { value: p.name, enumerable: true },
            description: { value: p.description, enumerable: true },
            filename: { value: p.filename, enumerable: true },
            length: { value: entries.length, enumerable: true }
        });
        entries.forEach(function (mt, i) { Object.defineProperty(plugin, i, { value: mt, enumerable: true }); });
        plugin.item = mask(function item(i) { return entries[i] || null; }, 'item');
        plugin.namedItem = mask(function namedItem(n) { return entries.filter(function (mt) { return mt.type === n; })[0] || null; }, 'namedItem');
        plugins.push(plugin);
    });

    var pluginArray = Object.create(G.PluginArray.prototype);
    plugins.forEach(function (plugin, i) {
        Object.defineProperty(pluginArray, i, { value: plugin, enumerable: true });
        Object.defineProperty(pluginArray, plugin.name, { value: plugin, enumerable: false });
    });
    Object.defineProperty(pluginArray, 'length', { value: plugins.length, enumerable: true });
    pluginArray.item = mask(function item(i) { return plugins[i] || null; }, 'item');
    pluginArray.namedItem = mask(function namedItem(n) { return plugins.filter(function (p) { return p.name === n; })[0] || null; }, 'namedItem');
    pluginArray.refresh = mask(function refresh() {}, 'refresh');
    defineGetter(proto, 'plugins', function () { return pluginArray; });

    var mimeTypeArray = Object.create(G.MimeTypeArray.prototype);
    mimeTypes.forEach(function (mt, i) {
        Object.defineProperty(mimeTypeArray, i, { value: mt, enumerable: true });
        Object.defineProperty(mimeTypeArray, mt.type, { value: mt, enumerable: false });
    });
    Object.defineProperty(mimeTypeArray, 'length', { value: mimeTypes.length, enumerable: true });
    mimeTypeArray.item = mask(function item(i) { return mimeTypes[i] || null; }, 'item');
    mimeTypeArray.namedItem = mask(function namedItem(n) { return mimeTypes.filter(function (mt) { return mt.type === n; })[0] || null; }, 'namedItem');
    defineGetter(proto, 'mimeTypes', function () { return mimeTypeArray; });
}

if (G.document) {
    var markers = /^cdc_|^\$cdc_|^__webdriver|^__selenium|^__driver|^\$chrome_|^_phantom|^callPhantom|^__nightmare|^domAutomation/;
    Object.getOwnPropertyNames(G).forEach(function (prop) {
        if (markers.test(prop)) {
            try { delete G[prop]; } catch (e) {}
        }
    });
}
"#;
