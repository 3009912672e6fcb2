//! Execution-context types and the capabilities worth spoofing in each.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One kind of JavaScript realm a page can spawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionContextType {
    /// Top-level document.
    MainFrame,
    /// Same-origin child document.
    Iframe,
    /// `new Worker(..)`, one per owner.
    DedicatedWorker,
    /// `new SharedWorker(..)`, shared by every same-origin document that
    /// names it.
    SharedWorker,
    /// Registered service worker. Outlives the pages it serves.
    ServiceWorker,
    AudioWorklet,
    PaintWorklet,
}

impl ExecutionContextType {
    /// Every variant, in detector order.
    pub fn all() -> [ExecutionContextType; 7] {
        [
            ExecutionContextType::MainFrame,
            ExecutionContextType::Iframe,
            ExecutionContextType::DedicatedWorker,
            ExecutionContextType::SharedWorker,
            ExecutionContextType::ServiceWorker,
            ExecutionContextType::AudioWorklet,
            ExecutionContextType::PaintWorklet,
        ]
    }

    /// The string the context detector script reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionContextType::MainFrame => "main_frame",
            ExecutionContextType::Iframe => "iframe",
            ExecutionContextType::DedicatedWorker => "dedicated_worker",
            ExecutionContextType::SharedWorker => "shared_worker",
            ExecutionContextType::ServiceWorker => "service_worker",
            ExecutionContextType::AudioWorklet => "audio_worklet",
            ExecutionContextType::PaintWorklet => "paint_worklet",
        }
    }

    /// Parses a detector result. `"unknown"` and anything unrecognized map
    /// to `None`.
    pub fn from_detector(value: &str) -> Option<Self> {
        value.parse().ok()
    }

    /// Dedicated, shared and service workers. Worklets are not workers.
    pub fn is_worker(&self) -> bool {
        matches!(
            self,
            ExecutionContextType::DedicatedWorker
                | ExecutionContextType::SharedWorker
                | ExecutionContextType::ServiceWorker
        )
    }

    pub fn is_frame(&self) -> bool {
        matches!(self, ExecutionContextType::MainFrame | ExecutionContextType::Iframe)
    }

    /// Shorthand for [`LayerConfig::for_context`].
    pub fn layer(&self) -> LayerConfig {
        LayerConfig::for_context(*self)
    }
}

impl fmt::Display for ExecutionContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionContextType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExecutionContextType::all()
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown execution context type: {}", s))
    }
}

/// Capability toggles for one [`ExecutionContextType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerConfig {
    /// `Navigator` / `WorkerNavigator` getters, plugins and mime types.
    pub navigator: bool,
    /// `screen` and `devicePixelRatio`.
    pub screen: bool,
    /// `HTMLCanvasElement` and the 2D context.
    pub canvas: bool,
    pub offscreen_canvas: bool,
    /// WebGL and WebGL2 contexts, including shader source rewriting.
    pub webgl: bool,
    /// `AudioContext`, `OfflineAudioContext` and `AnalyserNode`.
    pub audio: bool,
    /// `Date#getTimezoneOffset` and the default `Intl` zone.
    pub timezone: bool,
    /// CSS font family filtering and text metric rescaling.
    pub fonts: bool,
    /// `getBoundingClientRect` / `getClientRects` noise.
    pub dom_rects: bool,
}

impl LayerConfig {
    const NONE: LayerConfig = LayerConfig {
        navigator: false,
        screen: false,
        canvas: false,
        offscreen_canvas: false,
        webgl: false,
        audio: false,
        timezone: false,
        fonts: false,
        dom_rects: false,
    };

    /// The capabilities a realm of kind `context` exposes. Anything the
    /// realm has no API for stays off.
    pub fn for_context(context: ExecutionContextType) -> Self {
        match context {
            ExecutionContextType::MainFrame | ExecutionContextType::Iframe => LayerConfig {
                navigator: true,
                screen: true,
                canvas: true,
                offscreen_canvas: true,
                webgl: true,
                audio: true,
                timezone: true,
                fonts: true,
                dom_rects: true,
            },
            // no DOM, canvas only through OffscreenCanvas
            ExecutionContextType::DedicatedWorker | ExecutionContextType::SharedWorker => {
                LayerConfig {
                    navigator: true,
                    offscreen_canvas: true,
                    webgl: true,
                    audio: true,
                    timezone: true,
                    ..Self::NONE
                }
            }
            ExecutionContextType::ServiceWorker => LayerConfig {
                navigator: true,
                offscreen_canvas: true,
                audio: true,
                timezone: true,
                ..Self::NONE
            },
            ExecutionContextType::AudioWorklet => LayerConfig {
                audio: true,
                ..Self::NONE
            },
            ExecutionContextType::PaintWorklet => Self::NONE,
        }
    }

    /// Names of the enabled capabilities, in injection order.
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.navigator, "navigator"),
            (self.screen, "screen"),
            (self.timezone, "timezone"),
            (self.canvas, "canvas"),
            (self.offscreen_canvas, "offscreen_canvas"),
            (self.webgl, "webgl"),
            (self.audio, "audio"),
            (self.fonts, "fonts"),
            (self.dom_rects, "dom_rects"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_enable_everything() {
        for context in [ExecutionContextType::MainFrame, ExecutionContextType::Iframe] {
            assert_eq!(context.layer().enabled().len(), 9);
        }
    }

    #[test]
    fn test_workers_have_no_dom() {
        for context in ExecutionContextType::all().into_iter().filter(|c| c.is_worker()) {
            let layer = context.layer();
            assert!(!layer.screen);
            assert!(!layer.canvas);
            assert!(!layer.fonts);
            assert!(!layer.dom_rects);
            assert!(layer.offscreen_canvas);
        }
        assert!(!ExecutionContextType::ServiceWorker.layer().webgl);
    }

    #[test]
    fn test_worklets() {
        assert_eq!(ExecutionContextType::AudioWorklet.layer().enabled(), vec!["audio"]);
        assert!(ExecutionContextType::PaintWorklet.layer().enabled().is_empty());
    }

    #[test]
    fn test_detector_strings() {
        for context in ExecutionContextType::all() {
            assert_eq!(ExecutionContextType::from_detector(context.as_str()), Some(context));
        }
        assert_eq!(ExecutionContextType::from_detector("unknown"), None);
    }
}
