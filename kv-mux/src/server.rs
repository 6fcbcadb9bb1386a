use std::sync::Arc;

use ahash::HashMap;
use tokio::sync::{mpsc, Mutex};

use crate::message::Message;
use crate::signal::Latch;
use crate::stream::FramedStream;

type PendingMap = Arc<Mutex<HashMap<u64, Arc<Latch>>>>;

/// A single in-flight request, handed to application code in place of the raw
/// inbound message.
///
/// Grounded on `rpcmux.go`'s `Request`: the application receives a handle rather than
/// the message itself so it can reply (possibly never, if the client cancels first)
/// without the multiplexer's dispatch loop blocking on it.
pub struct RequestHandle<In: Message, Out: Message> {
    pub message: In,
    seq: u64,
    out_tx: mpsc::Sender<Out>,
    cancel: Arc<Latch>,
    pending: PendingMap,
    released: bool,
}

impl<In: Message, Out: Message> RequestHandle<In, Out> {
    /// Sends `response` back to the caller, stamping it with this request's sequence
    /// number, then releases the handle. Returns whether the send succeeded.
    ///
    /// `Reply` and `Release` are two separate steps in the original multiplexer, but
    /// every call site in this codebase performs them back to back, so this combines
    /// them: there is no way to forget the release half.
    pub async fn reply(mut self, mut response: Out) -> bool {
        response.set_seq(self.seq);
        let sent = self.out_tx.send(response).await.is_ok();
        self.release().await;
        sent
    }

    /// Reports whether the client has asked to cancel this request.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_set()
    }

    /// Resolves once the client cancels this request, or is pending forever if it
    /// never does. Intended for use in a `tokio::select!` alongside request
    /// processing so long-running handlers can bail out early.
    pub async fn cancelled(&self) {
        self.cancel.wait().await
    }

    async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut guard = self.pending.lock().await;
        if matches!(guard.get(&self.seq), Some(live) if Arc::ptr_eq(live, &self.cancel)) {
            guard.remove(&self.seq);
        }
    }
}

impl<In: Message, Out: Message> Drop for RequestHandle<In, Out> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let pending = self.pending.clone();
        let seq = self.seq;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            let mut guard = pending.lock().await;
            if matches!(guard.get(&seq), Some(live) if Arc::ptr_eq(live, &cancel)) {
                guard.remove(&seq);
            }
        });
    }
}

/// Runs the server-side dispatch loop over `stream` and returns a channel of request
/// handles, one per inbound non-cancel message.
///
/// Mirrors `rpcmux.go`'s server `Serve()`: the loop owns the `seq -> cancel signal`
/// map. A message reusing a still-live sequence fires that handle's cancel signal
/// before anything else; a cancel message is then dropped rather than turned into a
/// handle, and every other message becomes a freshly bound handle delivered
/// downstream. The caller drives its own pace by how fast it drains the channel.
pub fn serve<In, Out>(mut stream: FramedStream<In, Out>) -> mpsc::Receiver<RequestHandle<In, Out>>
where
    In: Message,
    Out: Message,
{
    let (handle_tx, handle_rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::default()));

        loop {
            tokio::select! {
                _ = stream.die.wait() => break,
                received = stream.in_rx.recv() => {
                    let Some(msg) = received else {
                        break;
                    };
                    let seq = msg.seq();

                    if let Some(latch) = pending.lock().await.remove(&seq) {
                        latch.set();
                    }

                    if (stream.is_cancel)(&msg) {
                        (stream.in_release)(msg);
                        continue;
                    }

                    let cancel = Arc::new(Latch::new());
                    pending.lock().await.insert(seq, cancel.clone());

                    let handle = RequestHandle {
                        message: msg,
                        seq,
                        out_tx: stream.out_tx.clone(),
                        cancel,
                        pending: pending.clone(),
                        released: false,
                    };

                    if handle_tx.send(handle).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    handle_rx
}
