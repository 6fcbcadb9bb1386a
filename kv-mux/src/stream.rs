use std::sync::{Arc, Mutex as StdMutex};

use log::error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{Duplex, FrameDecoder, FrameEncoder};
use crate::message::Message;
use crate::signal::Latch;

/// Channel capacity for `In`/`Out`, matching the `make(chan rpcmux.Message, 64)`
/// buffering used by the original transport layer (`msgptp.go`).
const CHANNEL_CAPACITY: usize = 64;

/// Pool/protocol hooks a [`FramedStream`] needs from its owner.
pub struct StreamHooks<In, Out> {
    /// Recycles an inbound message once its consumer is done with it.
    pub in_release: Arc<dyn Fn(In) + Send + Sync>,
    /// Builds a protocol-level cancel message, if the protocol supports cancellation.
    pub make_cancel: Option<Arc<dyn Fn() -> Out + Send + Sync>>,
    /// Reports whether an inbound message is a cancel message.
    pub is_cancel: Arc<dyn Fn(&In) -> bool + Send + Sync>,
}

/// A framed duplex endpoint: decode loop, encode loop, and the shutdown plumbing that
/// ties them together.
///
/// Mirrors the `Stream` struct from the original `rpcmux.go`: `In`/`Out` are channels
/// rather than a single decode/encode call so that a dispatch loop (the multiplexer)
/// can interleave reads and writes with its own bookkeeping. `Die` fires exactly once,
/// from whichever side fails first, and both loops exit promptly afterward.
pub struct FramedStream<In: Message, Out: Message> {
    pub in_rx: mpsc::Receiver<In>,
    pub out_tx: mpsc::Sender<Out>,
    pub die: Arc<Latch>,
    pub error: Arc<StdMutex<Option<anyhow::Error>>>,
    pub in_release: Arc<dyn Fn(In) + Send + Sync>,
    pub make_cancel: Option<Arc<dyn Fn() -> Out + Send + Sync>>,
    pub is_cancel: Arc<dyn Fn(&In) -> bool + Send + Sync>,
    _recv: JoinHandle<()>,
    _send: JoinHandle<()>,
}

impl<In: Message, Out: Message> FramedStream<In, Out> {
    /// Spawns the receive and send workers over `duplex` and returns the endpoint.
    pub fn spawn<D, Dec, Enc>(
        duplex: D,
        decoder: Dec,
        encoder: Enc,
        hooks: StreamHooks<In, Out>,
    ) -> Self
    where
        D: Duplex + 'static,
        Dec: FrameDecoder<In> + 'static,
        Enc: FrameEncoder<Out> + 'static,
    {
        let (reader, writer) = tokio::io::split(duplex);
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let die = Arc::new(Latch::new());
        let error: Arc<StdMutex<Option<anyhow::Error>>> = Arc::new(StdMutex::new(None));

        let recv = tokio::spawn(recv_loop(reader, decoder, in_tx, die.clone(), error.clone()));
        let send = tokio::spawn(send_loop(writer, encoder, out_rx, die.clone(), error.clone()));

        Self {
            in_rx,
            out_tx,
            die,
            error,
            in_release: hooks.in_release,
            make_cancel: hooks.make_cancel,
            is_cancel: hooks.is_cancel,
            _recv: recv,
            _send: send,
        }
    }

    /// Returns the latched stream error, if one has fired, as a fresh `anyhow::Error`
    /// string (the original error isn't `Clone`, so callers get an equivalent report).
    pub fn latched_error(&self) -> Option<anyhow::Error> {
        self.error
            .lock()
            .unwrap()
            .as_ref()
            .map(|e| anyhow::anyhow!("{e:#}"))
    }
}

async fn recv_loop<In, D, Dec>(
    mut reader: tokio::io::ReadHalf<D>,
    mut decoder: Dec,
    in_tx: mpsc::Sender<In>,
    die: Arc<Latch>,
    error: Arc<StdMutex<Option<anyhow::Error>>>,
) where
    In: Message,
    D: Duplex,
    Dec: FrameDecoder<In>,
{
    loop {
        if die.is_set() {
            return;
        }
        let decoded = tokio::select! {
            _ = die.wait() => return,
            decoded = decoder.decode(&mut reader) => decoded,
        };
        match decoded {
            Ok(msg) => {
                tokio::select! {
                    _ = die.wait() => return,
                    result = in_tx.send(msg) => {
                        if result.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(err) => {
                latch_error(&error, anyhow::Error::new(err));
                die.set();
                return;
            }
        }
    }
}

async fn send_loop<Out, D, Enc>(
    duplex_writer: tokio::io::WriteHalf<D>,
    mut encoder: Enc,
    mut out_rx: mpsc::Receiver<Out>,
    die: Arc<Latch>,
    error: Arc<StdMutex<Option<anyhow::Error>>>,
) where
    Out: Message,
    D: Duplex,
    Enc: FrameEncoder<Out>,
{
    let mut writer = BufWriter::new(duplex_writer);
    loop {
        if die.is_set() {
            return;
        }

        // Phase 1: block for the first message.
        let first = tokio::select! {
            _ = die.wait() => return,
            msg = out_rx.recv() => match msg {
                Some(msg) => msg,
                None => return,
            },
        };

        let mut buf = Vec::new();
        if let Err(err) = encoder.encode(&first, &mut buf) {
            latch_error(&error, anyhow::Error::new(err));
            die.set();
            return;
        }

        // Phase 2: opportunistically drain without blocking.
        while let Ok(msg) = out_rx.try_recv() {
            if let Err(err) = encoder.encode(&msg, &mut buf) {
                latch_error(&error, anyhow::Error::new(err));
                die.set();
                return;
            }
        }

        if let Err(err) = writer.write_all(&buf).await {
            latch_error(&error, anyhow::Error::new(err));
            die.set();
            return;
        }
        if let Err(err) = writer.flush().await {
            latch_error(&error, anyhow::Error::new(err));
            die.set();
            return;
        }
    }
}

fn latch_error(slot: &StdMutex<Option<anyhow::Error>>, err: anyhow::Error) {
    let mut guard = slot.lock().unwrap();
    if guard.is_none() {
        error!("stream failed: {err:#}");
        *guard = Some(err);
    }
}
