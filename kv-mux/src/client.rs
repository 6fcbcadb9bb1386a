use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use ahash::HashMap;
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::error::MuxError;
use crate::message::Message;
use crate::signal::Latch;
use crate::stream::FramedStream;

/// Client-side half of the multiplexer: assigns sequence numbers, tracks one pending
/// request per sequence number, and routes inbound responses back to their caller.
///
/// Grounded on `rpcmux.go`'s `client` struct and its `Request`/`Get` pair. Where the
/// original exposes a blocking `Get()` on a `Reply` value, this uses a `oneshot`
/// channel per request so multiple outstanding calls can be awaited concurrently.
pub struct Client<In: Message, Out: Message> {
    out_tx: mpsc::Sender<Out>,
    die: Arc<Latch>,
    error: Arc<StdMutex<Option<anyhow::Error>>>,
    in_release: Arc<dyn Fn(In) + Send + Sync>,
    make_cancel: Option<Arc<dyn Fn() -> Out + Send + Sync>>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<In>>>>,
    next_seq: AtomicU64,
    _dispatch: tokio::task::JoinHandle<()>,
}

impl<In: Message, Out: Message> Client<In, Out> {
    /// Takes ownership of `stream` and starts the dispatch task that routes inbound
    /// messages to whichever [`PendingRequest`] is waiting for that sequence number.
    pub fn spawn(stream: FramedStream<In, Out>) -> Arc<Self> {
        let FramedStream {
            in_rx,
            out_tx,
            die,
            error,
            in_release,
            make_cancel,
            is_cancel: _,
            ..
        } = stream;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<In>>>> =
            Arc::new(Mutex::new(HashMap::default()));

        let dispatch_pending = pending.clone();
        let dispatch_release = in_release.clone();
        let dispatch_die = die.clone();
        let dispatch = tokio::spawn(dispatch_loop(
            in_rx,
            dispatch_pending,
            dispatch_release,
            dispatch_die,
        ));

        Arc::new(Self {
            out_tx,
            die,
            error,
            in_release,
            make_cancel,
            pending,
            next_seq: AtomicU64::new(1),
            _dispatch: dispatch,
        })
    }

    /// Sends `msg` with a freshly assigned sequence number and returns a handle to
    /// await its response.
    ///
    /// `cancel`, if given, is a caller-side cancellation signal: firing it while the
    /// request is outstanding makes the eventual [`PendingRequest::get`] return early
    /// with [`MuxError::Cancelled`] and sends a cancel frame to the peer, mirroring
    /// `rpcmux.go`'s `Request(msg, ctx)` racing the caller's `ctx.Done()`.
    pub async fn call(
        self: &Arc<Self>,
        mut msg: Out,
        cancel: Option<Arc<Latch>>,
    ) -> anyhow::Result<PendingRequest<In, Out>> {
        if self.die.is_set() {
            return Err(MuxError::StreamClosed.into());
        }

        let (tx, rx) = oneshot::channel();
        let seq = {
            let mut pending = self.pending.lock().await;
            loop {
                let candidate = self.next_seq.fetch_add(1, Ordering::Relaxed);
                if !pending.contains_key(&candidate) {
                    pending.insert(candidate, tx);
                    break candidate;
                }
            }
        };
        msg.set_seq(seq);

        if self.out_tx.send(msg).await.is_err() {
            self.pending.lock().await.remove(&seq);
            return Err(MuxError::StreamClosed.into());
        }

        Ok(PendingRequest {
            client: self.clone(),
            seq,
            rx: Some(rx),
            cancel,
            done: false,
        })
    }

    /// Returns the latched stream error, if the underlying transport has failed.
    pub fn latched_error(&self) -> Option<anyhow::Error> {
        self.error
            .lock()
            .unwrap()
            .as_ref()
            .map(|e| anyhow::anyhow!("{e:#}"))
    }
}

async fn wait_for_cancel(cancel: Option<&Latch>) {
    match cancel {
        Some(latch) => latch.wait().await,
        None => std::future::pending().await,
    }
}

async fn dispatch_loop<In: Message>(
    mut in_rx: mpsc::Receiver<In>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<In>>>>,
    in_release: Arc<dyn Fn(In) + Send + Sync>,
    die: Arc<Latch>,
) {
    loop {
        tokio::select! {
            _ = die.wait() => return,
            received = in_rx.recv() => {
                let Some(msg) = received else {
                    return;
                };
                let seq = msg.seq();
                let sender = pending.lock().await.remove(&seq);
                match sender {
                    Some(tx) => {
                        // Receiver may already be gone if the caller dropped the
                        // PendingRequest after the cancel race; nothing to do.
                        let _ = tx.send(msg);
                    }
                    None => in_release(msg),
                }
            }
        }
    }
}

/// A single outstanding request awaiting its response.
///
/// Dropping this without calling [`PendingRequest::get`] sends a cancel message to
/// the peer (if the protocol supports one) and frees the pending-request slot,
/// mirroring `rpcmux.go`'s `Reply.Release` behavior.
pub struct PendingRequest<In: Message, Out: Message> {
    client: Arc<Client<In, Out>>,
    seq: u64,
    rx: Option<oneshot::Receiver<In>>,
    cancel: Option<Arc<Latch>>,
    done: bool,
}

impl<In: Message, Out: Message> PendingRequest<In, Out> {
    /// Awaits the response, racing it against stream death and the caller's
    /// cancellation signal, consuming this handle.
    ///
    /// Mirrors `rpcmux.go`'s `Response.Get()`, which selects over the completion
    /// signal, `cli.ctx.Done()` (stream death), and `r.lctx.Done()` (caller context).
    pub async fn get(mut self) -> anyhow::Result<In> {
        let mut rx = self.rx.take().expect("PendingRequest::get called more than once");
        self.done = true;

        tokio::select! {
            received = &mut rx => {
                received.map_err(|_| anyhow::anyhow!(MuxError::StreamClosed))
            }
            _ = self.client.die.wait() => {
                self.client.pending.lock().await.remove(&self.seq);
                Err(self.client.latched_error().unwrap_or_else(|| anyhow::anyhow!(MuxError::StreamClosed)))
            }
            _ = wait_for_cancel(self.cancel.as_deref()) => {
                self.client.pending.lock().await.remove(&self.seq);
                if let Some(make_cancel) = &self.client.make_cancel {
                    let mut cancel_msg = make_cancel();
                    cancel_msg.set_seq(self.seq);
                    let _ = self.client.out_tx.send(cancel_msg).await;
                }
                Err(anyhow::anyhow!(MuxError::Cancelled))
            }
        }
    }
}

impl<In: Message, Out: Message> Drop for PendingRequest<In, Out> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let client = self.client.clone();
        let seq = self.seq;
        tokio::spawn(async move {
            client.pending.lock().await.remove(&seq);
            if let Some(make_cancel) = &client.make_cancel {
                let mut cancel_msg = make_cancel();
                cancel_msg.set_seq(seq);
                let _ = client.out_tx.send(cancel_msg).await;
            }
        });
    }
}
