use std::sync::Arc;

use arc_swap::ArcSwap;
use kv_mux::{Latch, Pool, RequestHandle};
use kv_protocol::{Command, Request, Response};
use tokio::sync::{mpsc, Mutex};

use crate::engine::{EntryTag, KvEngine};
use crate::redirect::RedirectReader;
use crate::responses::{error_response, hit_response, miss_response, not_found_response};

/// Runs one read-pipeline worker described in spec §4.6. Several of these run
/// concurrently against the single shared `read_rx`, each holding its own snapshot
/// transaction refreshed whenever the writer's `sync` signal fires.
pub async fn run(
    read_rx: Arc<Mutex<mpsc::Receiver<RequestHandle<Request, Response>>>>,
    engine: Arc<dyn KvEngine>,
    redirect_reader: Option<Arc<dyn RedirectReader>>,
    sync: Arc<ArcSwap<Latch>>,
    die: Arc<Latch>,
    responses: Arc<Pool<Response>>,
) {
    let mut tx = engine.begin_read();
    let mut captured_sync = sync.load_full();

    loop {
        let handle = {
            let mut rx = read_rx.lock().await;
            tokio::select! {
                _ = die.wait() => return,
                received = rx.recv() => match received {
                    Some(handle) => handle,
                    None => return,
                },
            }
        };

        if captured_sync.is_set() {
            tx = engine.begin_read();
            captured_sync = sync.load_full();
        }

        let cmd = handle.message.cmd;
        let key = handle.message.key.clone();

        match tx.get(&key).await {
            Ok(Some(entry)) => {
                if entry.tag == EntryTag::Redirect && cmd != Command::GetNoRedirect {
                    if let Some(reader) = &redirect_reader {
                        if let Ok(target) = String::from_utf8(entry.value.clone()) {
                            reader.redirect_read(&target, handle).await;
                            continue;
                        }
                    }
                }

                if matches!(entry.tag, EntryTag::Unknown(_)) {
                    handle.reply(not_found_response(&responses)).await;
                    continue;
                }

                handle.reply(hit_response(&responses, cmd, &entry)).await;
            }
            Ok(None) => {
                handle.reply(miss_response(&responses, cmd)).await;
            }
            Err(e) => {
                handle.reply(error_response(&responses, &e.to_string())).await;
            }
        }
    }
}
