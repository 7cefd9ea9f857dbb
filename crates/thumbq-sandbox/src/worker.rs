//! The worker side of the sandbox, plus the request/response encoding that
//! in-process execution shares with it.
//!
//! A worker reads one single-message request (header prefix followed by the
//! payload) from its input, runs the transform and writes the response
//! header followed by the result bytes to its output. Its exit code says
//! how it went; see [`status`](crate::status).

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};

use thumbq_frame::{
    check_payload_length, decode_header, encode_header, join_single, split_single,
    RequestHeader,
};
use thumbq_transform::Transform;

use crate::policy;
use crate::scrub::ScrubBuffer;
use crate::status;

/// Worker entry point: confine the process, then serve one request from
/// stdin to stdout. Returns the process exit code.
pub fn run<T: Transform + ?Sized>(transform: &T) -> i32 {
    if let Err(err) = policy::confine() {
        // Nothing has been read yet; stderr still works.
        let _ = writeln!(std::io::stderr(), "thumbq worker: {err}");
        return status::SETUP_FAILED;
    }
    serve(transform, std::io::stdin().lock(), std::io::stdout().lock())
}

/// Serve one request from `input` to `output` without any confinement.
pub fn serve<T, R, W>(transform: &T, mut input: R, mut output: W) -> i32
where
    T: Transform + ?Sized,
    R: Read,
    W: Write,
{
    let mut request = ScrubBuffer::unbounded();
    if request.read_from(&mut input).is_err() {
        return status::INTERNAL;
    }

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        respond_single(request.as_slice(), transform)
    }));
    let response = match result {
        Ok(Ok(response)) => response,
        Ok(Err(code)) => return code,
        Err(_) => return status::INTERNAL,
    };

    match output.write_all(&response).and_then(|()| output.flush()) {
        Ok(()) => status::SUCCESS,
        Err(_) => status::INTERNAL,
    }
}

/// Handle a request split into its control header part and payload part.
///
/// Returns the encoded response (header prefix followed by the result) or
/// the worker exit code describing why there is none.
pub fn respond<T: Transform + ?Sized>(
    header: &[u8],
    payload: &[u8],
    transform: &T,
) -> Result<Vec<u8>, i32> {
    let (request, _) =
        decode_header::<RequestHeader>(header).map_err(|err| status::header_status(&err))?;
    process(&request, payload, transform)
}

/// Handle a single-message request: header prefix and payload in one buffer.
pub fn respond_single<T: Transform + ?Sized>(input: &[u8], transform: &T) -> Result<Vec<u8>, i32> {
    let (request, payload) =
        split_single::<RequestHeader>(input).map_err(|err| status::header_status(&err))?;
    process(&request, payload, transform)
}

fn process<T: Transform + ?Sized>(
    request: &RequestHeader,
    payload: &[u8],
    transform: &T,
) -> Result<Vec<u8>, i32> {
    check_payload_length(request, payload.len()).map_err(|err| status::header_status(&err))?;

    let output = transform
        .transform(payload, &request.params())
        .map_err(|err| status::transform_status(&err))?;
    let header = encode_header(&output.metadata).map_err(|_| status::INTERNAL)?;
    Ok(join_single(&header, &output.bytes))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use thumbq_frame::{ResponseHeader, TransformParams};
    use thumbq_transform::{Identity, Thumbnail, TransformOutput};

    use super::*;

    fn request(declared: u64, payload: &[u8]) -> Vec<u8> {
        let header = encode_header(&RequestHeader::new(declared)).unwrap();
        join_single(&header, payload)
    }

    fn run_serve<T: Transform>(transform: &T, input: Vec<u8>) -> (i32, Vec<u8>) {
        let mut out = Vec::new();
        let code = serve(transform, Cursor::new(input), &mut out);
        (code, out)
    }

    #[test]
    fn serves_identity() {
        let (code, out) = run_serve(&Identity, request(5, b"hello"));
        assert_eq!(code, status::SUCCESS);

        let (header, result): (ResponseHeader, &[u8]) = split_single(&out).unwrap();
        assert_eq!(header.length, 5);
        assert_eq!(result, b"hello");
    }

    #[test]
    fn framing_failures_have_distinct_codes() {
        let cases: Vec<(Vec<u8>, i32)> = vec![
            (vec![1, 0], status::TOO_SHORT),
            (vec![0, 0, 0, 0, b'x'], status::BAD_HEADER_LENGTH),
            (0xFF_FFFFu32.to_le_bytes().to_vec(), status::BAD_HEADER_LENGTH),
            (vec![50, 0, 0, 0, b'{', b'}'], status::HEADER_OVERRUN),
            (vec![2, 0, 0, 0, b'{', b'['], status::DECODE_FAILED),
            (request(100, &[0u8; 50]), status::LENGTH_MISMATCH),
        ];
        for (input, expected) in cases {
            let (code, out) = run_serve(&Identity, input);
            assert_eq!(code, expected, "{}", status::describe(expected));
            assert!(out.is_empty());
        }
    }

    #[test]
    fn unsupported_content_is_rejected() {
        let (code, out) = run_serve(&Thumbnail::default(), request(4, b"text"));
        assert_eq!(code, status::TRANSFORM_REJECTED);
        assert!(out.is_empty());
    }

    #[test]
    fn panicking_transform_is_internal() {
        struct Boom;
        impl Transform for Boom {
            fn name(&self) -> &'static str {
                "boom"
            }
            fn transform(
                &self,
                _payload: &[u8],
                _params: &TransformParams,
            ) -> thumbq_transform::Result<TransformOutput> {
                panic!("boom");
            }
        }

        let (code, _) = run_serve(&Boom, request(1, b"x"));
        assert_eq!(code, status::INTERNAL);
    }

    #[test]
    fn two_part_and_single_forms_agree() {
        let header = encode_header(&RequestHeader::new(3)).unwrap();
        let split = respond(&header, b"abc", &Identity).unwrap();
        let single = respond_single(&join_single(&header, b"abc"), &Identity).unwrap();
        assert_eq!(split, single);

        assert_eq!(
            respond(&header, b"abcd", &Identity).unwrap_err(),
            status::LENGTH_MISMATCH
        );
    }
}
