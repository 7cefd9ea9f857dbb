use std::fmt;
use std::str::FromStr;

use image::ImageFormat;

/// Media types the service knows how to thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Bmp,
    Gif,
    Jpeg,
    Png,
}

impl MediaType {
    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Bmp => "image/bmp",
            MediaType::Gif => "image/gif",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
        }
    }

    /// Format tag reported back to callers as `original_format`.
    pub fn tag(self) -> &'static str {
        match self {
            MediaType::Bmp => "BMP",
            MediaType::Gif => "GIF",
            MediaType::Jpeg => "JPEG",
            MediaType::Png => "PNG",
        }
    }

    pub(crate) fn image_format(self) -> ImageFormat {
        match self {
            MediaType::Bmp => ImageFormat::Bmp,
            MediaType::Gif => ImageFormat::Gif,
            MediaType::Jpeg => ImageFormat::Jpeg,
            MediaType::Png => ImageFormat::Png,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image/bmp" => Ok(MediaType::Bmp),
            "image/gif" => Ok(MediaType::Gif),
            "image/jpeg" => Ok(MediaType::Jpeg),
            "image/png" => Ok(MediaType::Png),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// Sniff the content type from the leading magic bytes.
///
/// Returns `None` for anything that is not one of the supported types,
/// including formats `image` recognises but this service does not accept.
pub fn classify(bytes: &[u8]) -> Option<MediaType> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Bmp => Some(MediaType::Bmp),
        ImageFormat::Gif => Some(MediaType::Gif),
        ImageFormat::Jpeg => Some(MediaType::Jpeg),
        ImageFormat::Png => Some(MediaType::Png),
        _ => None,
    }
}
