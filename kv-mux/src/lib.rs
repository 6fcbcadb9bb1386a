//! Stream-multiplexed request/response runtime.
//!
//! A [`stream::FramedStream`] turns any duplex byte stream into a pair of message
//! channels; [`server::serve`] and [`client::Client`] build request/response
//! correlation on top of those channels, one sequence number per in-flight request.

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod pool;
pub mod server;
pub mod signal;
pub mod stream;

pub use client::{Client, PendingRequest};
pub use codec::{Duplex, FrameDecoder, FrameEncoder};
pub use error::MuxError;
pub use message::Message;
pub use pool::Pool;
pub use server::{serve, RequestHandle};
pub use signal::Latch;
pub use stream::{FramedStream, StreamHooks};
