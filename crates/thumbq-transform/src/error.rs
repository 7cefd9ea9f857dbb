use crate::classify::MediaType;

/// Why a transform produced no result.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// The payload is not a media type this transform accepts.
    #[error("unsupported content ({})", .0.map_or("unknown", MediaType::mime))]
    Unsupported(Option<MediaType>),

    /// The request parameters cannot be honoured.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The payload claims a supported type but fails to decode.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The result could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

impl From<image::ImageError> for TransformError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(_) => TransformError::Unsupported(None),
            image::ImageError::Encoding(e) => TransformError::Encode(e.to_string()),
            image::ImageError::Parameter(e) => TransformError::InvalidParams(e.to_string()),
            other => TransformError::Decode(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransformError>;
