use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader};
use thumbq_frame::{Crop, TransformParams};
use tracing::debug;

use crate::classify::{classify, MediaType};
use crate::error::{Result, TransformError};
use crate::transform::{Transform, TransformOutput};

/// JPEG quality used for results.
pub const DEFAULT_QUALITY: u8 = 85;

/// Decode an image, fix its orientation, crop, downscale and re-encode it
/// as a metadata-free JPEG.
#[derive(Debug, Clone, Copy)]
pub struct Thumbnail {
    quality: u8,
}

impl Default for Thumbnail {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
        }
    }
}

impl Thumbnail {
    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    fn decode(&self, payload: &[u8], media: MediaType) -> Result<DynamicImage> {
        let reader = ImageReader::with_format(Cursor::new(payload), media.image_format());
        let mut decoder = reader.into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        Ok(image)
    }

    fn encode(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, self.quality);
        DynamicImage::ImageRgb8(image.to_rgb8()).write_with_encoder(encoder)?;
        Ok(out)
    }
}

impl Transform for Thumbnail {
    fn name(&self) -> &'static str {
        "thumbnail"
    }

    fn transform(&self, payload: &[u8], params: &TransformParams) -> Result<TransformOutput> {
        if params.scale == 0 {
            return Err(TransformError::InvalidParams("scale must be positive".into()));
        }
        let media = classify(payload).ok_or(TransformError::Unsupported(None))?;

        let image = self.decode(payload, media)?;
        debug!(
            format = media.tag(),
            width = image.width(),
            height = image.height(),
            "decoded source"
        );

        let image = resize(crop(image, params.crop), params.scale);
        let bytes = self.encode(&image)?;
        Ok(TransformOutput::new(
            bytes,
            Some(media.tag()),
            image.width(),
            image.height(),
        ))
    }
}

fn crop(image: DynamicImage, crop: Crop) -> DynamicImage {
    match crop {
        Crop::NoCrop => image,
        Crop::TopSquare => {
            let (width, height) = (image.width(), image.height());
            if width < height {
                image.crop_imm(0, 0, width, width)
            } else {
                image.crop_imm((width - height) / 2, 0, height, height)
            }
        }
    }
}

fn resize(image: DynamicImage, scale: u32) -> DynamicImage {
    if image.width() > scale || image.height() > scale {
        image.thumbnail(scale, scale)
    } else {
        image
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageFormat, Rgb, RgbImage};

    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn params(scale: u32, crop: Crop) -> TransformParams {
        TransformParams { scale, crop }
    }

    #[test]
    fn downscales_to_fit() {
        let out = Thumbnail::default()
            .transform(&png(400, 200), &params(100, Crop::NoCrop))
            .unwrap();
        assert_eq!((out.metadata.width, out.metadata.height), (100, 50));
        assert_eq!(out.metadata.original_format.as_deref(), Some("PNG"));
        assert_eq!(out.metadata.length, out.bytes.len() as u64);
        assert_eq!(classify(&out.bytes), Some(MediaType::Jpeg));
    }

    #[test]
    fn small_images_keep_their_size() {
        let out = Thumbnail::default()
            .transform(&png(20, 10), &params(256, Crop::NoCrop))
            .unwrap();
        assert_eq!((out.metadata.width, out.metadata.height), (20, 10));
    }

    #[test]
    fn top_square_crop() {
        let thumb = Thumbnail::default();

        let portrait = thumb
            .transform(&png(30, 60), &params(256, Crop::TopSquare))
            .unwrap();
        assert_eq!((portrait.metadata.width, portrait.metadata.height), (30, 30));

        let landscape = thumb
            .transform(&png(90, 40), &params(20, Crop::TopSquare))
            .unwrap();
        assert_eq!(
            (landscape.metadata.width, landscape.metadata.height),
            (20, 20)
        );
    }

    #[test]
    fn unsupported_content_rejected() {
        let err = Thumbnail::default()
            .transform(b"plain text is not a picture", &TransformParams::default())
            .unwrap_err();
        assert!(matches!(err, TransformError::Unsupported(None)));
    }

    #[test]
    fn corrupt_image_fails_to_decode() {
        let mut bytes = png(16, 16);
        bytes.truncate(40);
        let err = Thumbnail::default()
            .transform(&bytes, &TransformParams::default())
            .unwrap_err();
        assert!(matches!(err, TransformError::Decode(_)));
    }

    #[test]
    fn zero_scale_rejected() {
        let err = Thumbnail::default()
            .transform(&png(4, 4), &params(0, Crop::NoCrop))
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParams(_)));
    }
}
