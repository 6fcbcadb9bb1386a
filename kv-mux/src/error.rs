use thiserror::Error;

/// Errors the multiplexer itself can raise, as distinct from transport I/O failures
/// (which are reported via [`crate::stream::FramedStream::latched_error`]).
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("stream closed")]
    StreamClosed,

    #[error("response arrived for unknown sequence {0}")]
    UnknownSequence(u64),

    #[error("request cancelled before a reply was sent")]
    Cancelled,
}

impl MuxError {
    /// A short, stable identifier for this error kind, suitable for inclusion in a
    /// wire-level error response rather than the full Display text.
    pub fn code(&self) -> &'static str {
        match self {
            MuxError::StreamClosed => "stream_closed",
            MuxError::UnknownSequence(_) => "unknown_sequence",
            MuxError::Cancelled => "cancelled",
        }
    }
}
