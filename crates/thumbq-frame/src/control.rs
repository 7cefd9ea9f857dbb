//! Control records carried in the first part of every request and response.

use serde::{Deserialize, Serialize};

/// Default maximum width/height of a result, in pixels.
pub const DEFAULT_SCALE: u32 = 256;

/// How the source is cropped before scaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crop {
    /// Keep the whole picture.
    #[default]
    NoCrop,
    /// Keep the largest square anchored at the top (portrait) or centred
    /// horizontally (landscape).
    TopSquare,
}

/// Parameters the transform receives alongside the payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    /// Maximum width and height of the result.
    pub scale: u32,
    /// Crop applied before scaling.
    pub crop: Crop,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            scale: DEFAULT_SCALE,
            crop: Crop::NoCrop,
        }
    }
}

/// Control record of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    /// Byte length of the attached payload part.
    pub length: u64,
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub crop: Crop,
}

fn default_scale() -> u32 {
    DEFAULT_SCALE
}

impl RequestHeader {
    /// Header for a payload of `length` bytes with default parameters.
    pub fn new(length: u64) -> Self {
        Self {
            length,
            scale: DEFAULT_SCALE,
            crop: Crop::NoCrop,
        }
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_crop(mut self, crop: Crop) -> Self {
        self.crop = crop;
        self
    }

    /// The transform parameters carried by this header.
    pub fn params(&self) -> TransformParams {
        TransformParams {
            scale: self.scale,
            crop: self.crop,
        }
    }
}

/// Control record of a response.
///
/// The default value describes an empty result and is what callers receive
/// when their request was not handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    /// Format tag of the decoded source, e.g. `"JPEG"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_format: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// Byte length of the attached result part.
    #[serde(default)]
    pub length: u64,
}

impl ResponseHeader {
    /// True when this header describes no result at all.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}
