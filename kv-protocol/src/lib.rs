//! Wire contract for the key-value service: request/response frames, the msgpack
//! framing that puts them on the wire, and the pool/hook wiring `kv-mux` needs to
//! drive a [`kv_mux::FramedStream`] of them.

pub mod codec;
pub mod message;
pub mod pool;

pub use codec::MsgpackCodec;
pub use message::{Command, Request, Response, ResponseCode};
pub use pool::{client_hooks, request_pool, response_pool, server_hooks};
