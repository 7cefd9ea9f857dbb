use std::fmt;
use std::str::FromStr;

use thumbq_frame::{ResponseHeader, TransformParams};

use crate::error::Result;
use crate::identity::Identity;
use crate::thumbnail::Thumbnail;

/// Result bytes plus the metadata describing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    /// Response control record; `length` always equals `bytes.len()`.
    pub metadata: ResponseHeader,
}

impl TransformOutput {
    pub fn new(bytes: Vec<u8>, original_format: Option<&str>, width: u32, height: u32) -> Self {
        let metadata = ResponseHeader {
            original_format: original_format.map(str::to_string),
            width,
            height,
            length: bytes.len() as u64,
        };
        Self { bytes, metadata }
    }
}

/// An opaque `bytes + params -> bytes` step over untrusted input.
///
/// Implementations must not keep per-call state: the same value serves
/// every request, in process or inside a sandboxed worker.
pub trait Transform: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn transform(&self, payload: &[u8], params: &TransformParams) -> Result<TransformOutput>;
}

impl<T: Transform + ?Sized> Transform for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn transform(&self, payload: &[u8], params: &TransformParams) -> Result<TransformOutput> {
        (**self).transform(payload, params)
    }
}

/// Built-in transforms, selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransformKind {
    #[default]
    Thumbnail,
    Identity,
}

impl TransformKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransformKind::Thumbnail => "thumbnail",
            TransformKind::Identity => "identity",
        }
    }

    /// Instantiate the transform.
    pub fn build(self) -> Box<dyn Transform> {
        match self {
            TransformKind::Thumbnail => Box::new(Thumbnail::default()),
            TransformKind::Identity => Box::new(Identity),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "thumbnail" => Ok(TransformKind::Thumbnail),
            "identity" => Ok(TransformKind::Identity),
            other => Err(format!("unknown transform: {other}")),
        }
    }
}
