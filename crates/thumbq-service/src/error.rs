/// Errors that can occur while serving or calling the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] thumbq_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] thumbq_frame::FrameError),

    /// Control header could not be encoded or decoded.
    #[error("control header error: {0}")]
    Header(#[from] thumbq_frame::HeaderError),

    /// The peer answered with something that is not a response.
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;
