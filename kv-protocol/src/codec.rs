use std::io;
use std::marker::PhantomData;

use async_trait::async_trait;
use kv_mux::{FrameDecoder, FrameEncoder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Length-prefixed msgpack framing shared by requests and responses: a big-endian
/// `u32` byte count followed by that many bytes of `rmp_serde`-encoded payload.
///
/// The original transport (`msgptp.go`) relies on `msgpack.Decoder.DecodeMulti`
/// reading exactly one value's worth of bytes with no explicit length prefix; Rust's
/// `rmp_serde` doesn't expose an equivalent "decode exactly one value and stop"
/// cursor over an async reader, so a length prefix is added here to know how many
/// bytes to buffer before handing them to `rmp_serde::from_slice`.
pub struct MsgpackCodec<M> {
    _marker: PhantomData<fn() -> M>,
}

impl<M> MsgpackCodec<M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<M> Default for MsgpackCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_error(err: rmp_serde::encode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn decode_error(err: rmp_serde::decode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[async_trait]
impl<M> FrameDecoder<M> for MsgpackCodec<M>
where
    M: DeserializeOwned + Send + 'static,
{
    async fn decode(
        &mut self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> io::Result<M> {
        let len = reader.read_u32().await?;
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        rmp_serde::from_slice(&buf).map_err(decode_error)
    }
}

impl<M> FrameEncoder<M> for MsgpackCodec<M>
where
    M: Serialize + Send,
{
    fn encode(&mut self, msg: &M, out: &mut Vec<u8>) -> io::Result<()> {
        let bytes = rmp_serde::to_vec(msg).map_err(encode_error)?;
        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&bytes);
        Ok(())
    }
}
