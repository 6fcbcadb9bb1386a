use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Anything a [`crate::stream::FramedStream`] can read frames from and write bytes
/// to: a TCP socket, a Unix socket, an in-memory `tokio::io::duplex` pair for tests.
pub trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// Decodes exactly one frame of `M` from a reader.
///
/// The wire format is deliberately opaque to `kv-mux`: this crate only knows how to
/// drive the decode loop, not what bytes mean. `kv-protocol` supplies the concrete
/// msgpack implementation.
#[async_trait]
pub trait FrameDecoder<M>: Send {
    async fn decode(
        &mut self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> std::io::Result<M>;
}

/// Encodes one frame of `M` into `out`, appending to whatever is already there.
///
/// Encoding itself is synchronous (msgpack serialization never blocks); only the
/// eventual write to the transport is async, and that's handled by
/// [`crate::stream::FramedStream`]'s send loop.
pub trait FrameEncoder<M>: Send {
    fn encode(&mut self, msg: &M, out: &mut Vec<u8>) -> std::io::Result<()>;
}
