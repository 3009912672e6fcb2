//! GPU classification and per-stage precision view over a profile.

use std::fmt;

use serde::Serialize;

use super::ShaderStage;
use crate::profile::{GpuCapabilities, PrecisionMode, VmProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Qualcomm,
    Arm,
    Software,
    Unknown,
}

impl GpuVendor {
    /// Classifies a vendor from the unmasked vendor and renderer strings.
    pub fn classify(vendor: &str, renderer: &str) -> Self {
        let haystack = format!("{} {}", vendor, renderer).to_lowercase();
        if haystack.contains("swiftshader") || haystack.contains("llvmpipe") {
            GpuVendor::Software
        } else if haystack.contains("nvidia") || haystack.contains("geforce") {
            GpuVendor::Nvidia
        } else if haystack.contains("amd") || haystack.contains("radeon") || haystack.contains("ati ") {
            GpuVendor::Amd
        } else if haystack.contains("intel") {
            GpuVendor::Intel
        } else if haystack.contains("apple") {
            GpuVendor::Apple
        } else if haystack.contains("qualcomm") || haystack.contains("adreno") {
            GpuVendor::Qualcomm
        } else if haystack.contains("mali") || haystack.contains("arm") {
            GpuVendor::Arm
        } else {
            GpuVendor::Unknown
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuVendor::Nvidia => "nvidia",
            GpuVendor::Amd => "amd",
            GpuVendor::Intel => "intel",
            GpuVendor::Apple => "apple",
            GpuVendor::Qualcomm => "qualcomm",
            GpuVendor::Arm => "arm",
            GpuVendor::Software => "software",
            GpuVendor::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuArchitecture {
    NvidiaPascal,
    NvidiaTuring,
    NvidiaAmpere,
    NvidiaAda,
    AmdGcn,
    AmdRdna,
    IntelGen9,
    IntelXe,
    AppleSilicon,
    Software,
    Unknown,
}

impl GpuArchitecture {
    pub fn classify(renderer: &str) -> Self {
        let r = renderer.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| r.contains(n));

        if any(&["swiftshader", "llvmpipe"]) {
            GpuArchitecture::Software
        } else if any(&["rtx 40"]) {
            GpuArchitecture::NvidiaAda
        } else if any(&["rtx 30"]) {
            GpuArchitecture::NvidiaAmpere
        } else if any(&["rtx 20", "gtx 16"]) {
            GpuArchitecture::NvidiaTuring
        } else if any(&["gtx 10"]) {
            GpuArchitecture::NvidiaPascal
        } else if any(&["rx 5700", "rx 6", "rx 7"]) {
            GpuArchitecture::AmdRdna
        } else if any(&["rx 4", "rx 5", "vega"]) {
            GpuArchitecture::AmdGcn
        } else if any(&["iris xe", "xe graphics", "intel arc", "arc a"]) {
            GpuArchitecture::IntelXe
        } else if any(&["uhd", "hd graphics"]) {
            GpuArchitecture::IntelGen9
        } else if any(&["apple m", "apple gpu"]) {
            GpuArchitecture::AppleSilicon
        } else {
            GpuArchitecture::Unknown
        }
    }
}

impl fmt::Display for GpuArchitecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuArchitecture::NvidiaPascal => "nvidia_pascal",
            GpuArchitecture::NvidiaTuring => "nvidia_turing",
            GpuArchitecture::NvidiaAmpere => "nvidia_ampere",
            GpuArchitecture::NvidiaAda => "nvidia_ada",
            GpuArchitecture::AmdGcn => "amd_gcn",
            GpuArchitecture::AmdRdna => "amd_rdna",
            GpuArchitecture::IntelGen9 => "intel_gen9",
            GpuArchitecture::IntelXe => "intel_xe",
            GpuArchitecture::AppleSilicon => "apple_silicon",
            GpuArchitecture::Software => "software",
            GpuArchitecture::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Read view over a profile's GPU fields with vendor and architecture
/// classification.
#[derive(Debug, Clone, Copy)]
pub struct GpuProfile<'a> {
    pub capabilities: &'a GpuCapabilities,
    pub vendor: GpuVendor,
    pub architecture: GpuArchitecture,
}

/// What the in-page `shaderSource` hook needs to mirror the translator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimePlan {
    pub extensions: Vec<String>,
    pub vertex_precision: &'static str,
    pub fragment_precision: &'static str,
}

impl<'a> GpuProfile<'a> {
    pub fn new(capabilities: &'a GpuCapabilities) -> Self {
        Self {
            capabilities,
            vendor: GpuVendor::classify(
                &capabilities.unmasked_vendor,
                &capabilities.unmasked_renderer,
            ),
            architecture: GpuArchitecture::classify(&capabilities.unmasked_renderer),
        }
    }

    pub fn from_profile(profile: &'a VmProfile) -> Self {
        Self::new(&profile.gpu)
    }

    pub fn precision_for(&self, stage: ShaderStage) -> PrecisionMode {
        match stage {
            ShaderStage::Vertex => self.capabilities.vertex_precision,
            ShaderStage::Fragment => self.capabilities.fragment_precision,
        }
    }

    /// Whether a GLSL `#extension` name is backed by the profile's WebGL
    /// extension list. `all` is always kept.
    pub fn supports_extension(&self, name: &str) -> bool {
        if name == "all" {
            return true;
        }
        let list = &self.capabilities.extensions;
        let has = |candidate: &str| list.iter().any(|e| e == candidate);
        let bare = name.strip_prefix("GL_").unwrap_or(name);

        has(name)
            || has(bare)
            || (bare == "EXT_draw_buffers" && has("WEBGL_draw_buffers"))
    }

    pub fn runtime_plan(&self) -> RuntimePlan {
        RuntimePlan {
            extensions: self.capabilities.extensions.clone(),
            vertex_precision: self.capabilities.vertex_precision.as_glsl(),
            fragment_precision: self.capabilities.fragment_precision.as_glsl(),
        }
    }
}
