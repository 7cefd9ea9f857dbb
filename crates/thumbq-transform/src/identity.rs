use thumbq_frame::TransformParams;

use crate::classify::classify;
use crate::error::Result;
use crate::transform::{Transform, TransformOutput};

/// Returns the payload unchanged; the format tag is sniffed when possible.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn transform(&self, payload: &[u8], _params: &TransformParams) -> Result<TransformOutput> {
        let format = classify(payload).map(|media| media.tag());
        Ok(TransformOutput::new(payload.to_vec(), format, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_payload() {
        let out = Identity
            .transform(b"opaque bytes", &TransformParams::default())
            .unwrap();
        assert_eq!(out.bytes, b"opaque bytes");
        assert_eq!(out.metadata.length, 12);
        assert!(out.metadata.original_format.is_none());
    }
}
