use std::sync::Arc;

use arc_swap::ArcSwap;
use kv_mux::{Latch, Pool, RequestHandle};
use kv_protocol::{Command, Request, Response};
use log::warn;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{Duration, Instant};

use crate::disk::DiskSpace;
use crate::engine::{EngineError, EntryTag, KvEngine, StoredEntry, WriteTxn};
use crate::redirect::{RedirectOutcome, RedirectWriter};
use crate::responses::{error_response, ok_response};

/// Batch capacity, matching `lsm2.go`'s `bj.hasSpace(32)`.
pub const BATCH_CAPACITY: usize = 32;
/// In-flight commit throttle depth, matching `y.NewThrottle(16)`.
pub const THROTTLE_DEPTH: usize = 16;
/// Commit coalescing window, matching `time.After(time.Millisecond*10)`.
const COALESCE_WINDOW: Duration = Duration::from_millis(10);

struct BatchJob {
    requests: Vec<RequestHandle<Request, Response>>,
}

impl BatchJob {
    fn new() -> Self {
        Self {
            requests: Vec::with_capacity(BATCH_CAPACITY),
        }
    }

    fn has_space(&self, max: usize) -> bool {
        self.requests.len() < max
    }

    fn add(&mut self, req: RequestHandle<Request, Response>) {
        self.requests.push(req);
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(instant) => tokio::time::sleep_until(instant).await,
        None => std::future::pending().await,
    }
}

/// Runs the single write-pipeline worker described in spec §4.5: coalesces `Put`s
/// into transactional batches, drives commits through a bounded throttle, forwards
/// reads to `read_tx`, and replies to unsupported commands directly.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    mut source_rx: mpsc::Receiver<RequestHandle<Request, Response>>,
    read_tx: mpsc::Sender<RequestHandle<Request, Response>>,
    engine: Arc<dyn KvEngine>,
    disk: Arc<dyn DiskSpace>,
    redirect_writer: Option<Arc<dyn RedirectWriter>>,
    sync: Arc<ArcSwap<Latch>>,
    die: Arc<Latch>,
    responses: Arc<Pool<Response>>,
) {
    let throttle = Arc::new(Semaphore::new(THROTTLE_DEPTH));
    let mut tx = engine.begin_write();
    let mut batch = BatchJob::new();
    let mut deadline: Option<Instant> = None;

    loop {
        let req = match source_rx.try_recv() {
            Ok(req) => Some(req),
            Err(TryRecvError::Disconnected) => {
                tx.discard();
                return;
            }
            Err(TryRecvError::Empty) => {
                tokio::select! {
                    _ = die.wait() => {
                        tx.discard();
                        return;
                    }
                    received = source_rx.recv() => {
                        match received {
                            Some(req) => Some(req),
                            None => {
                                tx.discard();
                                return;
                            }
                        }
                    }
                    _ = wait_for_deadline(deadline) => None,
                }
            }
        };

        if req.is_none() || !batch.has_space(BATCH_CAPACITY) {
            flush(&mut tx, &mut batch, &throttle, &sync, &responses, engine.as_ref()).await;
            deadline = None;
        }

        let Some(mut handle) = req else {
            continue;
        };

        match handle.message.cmd {
            Command::Put | Command::PutNoRedirect => {
                let key = handle.message.key.clone();
                let val = handle.message.val.clone();
                let expires_at = handle.message.expires_at;
                let is_redirectable_put = handle.message.cmd == Command::Put;

                if !disk.has_enough_disk_space(&key, &val) {
                    if is_redirectable_put {
                        if let Some(writer) = &redirect_writer {
                            handle.message.cmd = Command::PutNoRedirect;
                            match writer.redirect_write(handle).await {
                                RedirectOutcome::Forwarded { target } => {
                                    let entry = StoredEntry {
                                        value: target.into_bytes(),
                                        tag: EntryTag::Redirect,
                                        expires_at,
                                    };
                                    match set_with_retry(
                                        &mut tx, &mut batch, &throttle, &sync, &responses,
                                        engine.as_ref(), &mut deadline, &key, entry,
                                    )
                                    .await
                                    {
                                        Ok(()) => {
                                            // No handle rides along in the batch for a redirect
                                            // marker (the request was already handed to the
                                            // redirect writer), so nothing else will ever flush
                                            // this commit. Flush it now rather than leaving it
                                            // stranded until an unrelated request arrives.
                                            flush(
                                                &mut tx, &mut batch, &throttle, &sync,
                                                &responses, engine.as_ref(),
                                            )
                                            .await;
                                            deadline = None;
                                        }
                                        Err(e) => {
                                            warn!("failed to record redirect marker: {e}");
                                        }
                                    }
                                    continue;
                                }
                                RedirectOutcome::Declined { req } => {
                                    req.reply(error_response(
                                        &responses,
                                        "Disk full and no redirection",
                                    ))
                                    .await;
                                    continue;
                                }
                            }
                        }
                    }
                    handle
                        .reply(error_response(&responses, "Disk full and no redirection"))
                        .await;
                    continue;
                }

                let entry = StoredEntry {
                    value: val.clone(),
                    tag: EntryTag::Data,
                    expires_at,
                };
                match set_with_retry(
                    &mut tx, &mut batch, &throttle, &sync, &responses, engine.as_ref(),
                    &mut deadline, &key, entry,
                )
                .await
                {
                    Ok(()) => {
                        disk.account_for_disk_space(&key, &val);
                        if deadline.is_none() {
                            deadline = Some(Instant::now() + COALESCE_WINDOW);
                        }
                        batch.add(handle);
                    }
                    Err(e) => {
                        handle.reply(error_response(&responses, &e.to_string())).await;
                    }
                }
            }
            Command::Get | Command::GetNoRedirect | Command::Touch | Command::Trace => {
                if read_tx.send(handle).await.is_err() {
                    return;
                }
            }
            Command::Cancel => {
                // The multiplexer intercepts `Cancel` frames before they ever become a
                // `RequestHandle` (see `is_cancel` in the server hooks); a `Cancel`
                // reaching here would only happen for a stray frame whose sequence
                // matched no pending request.
                handle
                    .reply(error_response(&responses, "Command Unsupported"))
                    .await;
            }
        }
    }
}

async fn set_with_retry(
    tx: &mut Box<dyn WriteTxn>,
    batch: &mut BatchJob,
    throttle: &Arc<Semaphore>,
    sync: &Arc<ArcSwap<Latch>>,
    responses: &Arc<Pool<Response>>,
    engine: &dyn KvEngine,
    deadline: &mut Option<Instant>,
    key: &[u8],
    entry: StoredEntry,
) -> Result<(), EngineError> {
    match tx.set(key, entry.clone()) {
        Ok(()) => Ok(()),
        Err(EngineError::TooBig) => {
            flush(tx, batch, throttle, sync, responses, engine).await;
            *deadline = None;
            tx.set(key, entry)
        }
        Err(e) => Err(e),
    }
}

async fn flush(
    tx: &mut Box<dyn WriteTxn>,
    batch: &mut BatchJob,
    throttle: &Arc<Semaphore>,
    sync: &Arc<ArcSwap<Latch>>,
    responses: &Arc<Pool<Response>>,
    engine: &dyn KvEngine,
) {
    let permit = throttle
        .clone()
        .acquire_owned()
        .await
        .expect("throttle semaphore is never closed");
    let committed_tx = std::mem::replace(tx, engine.begin_write());
    let committed_batch = std::mem::replace(batch, BatchJob::new());
    let sync = sync.clone();
    let responses = responses.clone();

    tokio::spawn(async move {
        let result = committed_tx.commit().await;
        batch_done(committed_batch, result, &sync, &responses).await;
        drop(permit);
    });
}

async fn batch_done(
    batch: BatchJob,
    result: Result<(), EngineError>,
    sync: &Arc<ArcSwap<Latch>>,
    responses: &Arc<Pool<Response>>,
) {
    let old_sync = sync.swap(Arc::new(Latch::new()));
    old_sync.set();

    match result {
        Ok(()) => {
            for handle in batch.requests {
                handle.reply(ok_response(responses)).await;
            }
        }
        Err(e) => {
            let message = e.to_string();
            for handle in batch.requests {
                handle.reply(error_response(responses, &message)).await;
            }
        }
    }
}
