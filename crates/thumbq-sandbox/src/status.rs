//! Exit codes of the worker process.
//!
//! Every way a worker can turn down a request has its own code so the
//! parent can log precisely what happened. Callers only ever see the empty
//! response either way.

use thumbq_frame::HeaderError;
use thumbq_transform::TransformError;

pub const SUCCESS: i32 = 0;
/// The syscall filter (or another confinement step) could not be installed.
pub const SETUP_FAILED: i32 = 1;
/// Input shorter than the header length prefix.
pub const TOO_SHORT: i32 = 2;
/// Header length is zero or not below the ceiling.
pub const BAD_HEADER_LENGTH: i32 = 3;
/// Header length runs past the end of the input.
pub const HEADER_OVERRUN: i32 = 4;
pub const DECODE_FAILED: i32 = 5;
/// Declared payload length differs from the attached payload.
pub const LENGTH_MISMATCH: i32 = 6;
/// Content type or parameters not accepted by the transform.
pub const TRANSFORM_REJECTED: i32 = 7;
/// The transform accepted the input but failed to produce a result.
pub const TRANSFORM_FAILED: i32 = 8;
/// The worker panicked or could not write its result.
pub const INTERNAL: i32 = 99;

/// True for codes that mean "this input was refused", as opposed to a
/// worker that never got as far as looking at it.
pub fn is_rejection(code: i32) -> bool {
    matches!(code, TOO_SHORT..=TRANSFORM_FAILED)
}

/// Short description of a worker exit code, for logs.
pub fn describe(code: i32) -> &'static str {
    match code {
        SUCCESS => "success",
        SETUP_FAILED => "sandbox setup failed",
        TOO_SHORT => "input too short",
        BAD_HEADER_LENGTH => "bad header length",
        HEADER_OVERRUN => "header overruns input",
        DECODE_FAILED => "header decode failed",
        LENGTH_MISMATCH => "payload length mismatch",
        TRANSFORM_REJECTED => "transform rejected input",
        TRANSFORM_FAILED => "transform failed",
        INTERNAL => "internal worker error",
        _ => "unknown",
    }
}

pub(crate) fn header_status(err: &HeaderError) -> i32 {
    match err {
        HeaderError::TooShort { .. } => TOO_SHORT,
        HeaderError::InvalidLength(_) => BAD_HEADER_LENGTH,
        HeaderError::Overrun { .. } => HEADER_OVERRUN,
        HeaderError::Malformed(_) => DECODE_FAILED,
        HeaderError::LengthMismatch { .. } => LENGTH_MISMATCH,
        HeaderError::Encode(_) => INTERNAL,
    }
}

pub(crate) fn transform_status(err: &TransformError) -> i32 {
    match err {
        TransformError::Unsupported(_) | TransformError::InvalidParams(_) => TRANSFORM_REJECTED,
        TransformError::Decode(_) | TransformError::Encode(_) => TRANSFORM_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_range() {
        assert!(!is_rejection(SUCCESS));
        assert!(!is_rejection(SETUP_FAILED));
        for code in TOO_SHORT..=TRANSFORM_FAILED {
            assert!(is_rejection(code), "code {code}");
            assert_ne!(describe(code), "unknown");
        }
        assert!(!is_rejection(INTERNAL));
        assert!(!is_rejection(42));
        assert_eq!(describe(42), "unknown");
    }
}
