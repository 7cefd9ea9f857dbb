//! Transforms run by the thumbq service over untrusted payloads.
//!
//! A [`Transform`] turns payload bytes plus [`TransformParams`] into result
//! bytes and a [`ResponseHeader`](thumbq_frame::ResponseHeader). The service
//! never looks inside the payload itself; it only hands it to a transform,
//! usually inside a sandboxed worker process.

pub mod classify;
pub mod error;
pub mod identity;
pub mod thumbnail;
pub mod transform;

pub use classify::{classify, MediaType};
pub use error::{Result, TransformError};
pub use identity::Identity;
pub use thumbnail::Thumbnail;
pub use thumbq_frame::TransformParams;
pub use transform::{Transform, TransformKind, TransformOutput};
