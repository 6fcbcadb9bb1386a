use std::sync::Arc;

use arc_swap::ArcSwap;
use kv_mux::{Latch, RequestHandle};
use kv_protocol::{response_pool, Request, Response};
use tokio::sync::{mpsc, Mutex};

use crate::disk::{DiskSpace, InfiniteDiskSpace};
use crate::engine::KvEngine;
use crate::redirect::{RedirectReader, RedirectWriter};
use crate::{reader, writer};

/// Depth of the channel feeding `Source` into the writer, and of the channel the
/// writer in turn uses to hand reads off to the reader pool.
const QUEUE_DEPTH: usize = 64;

/// Default number of concurrent snapshot readers when a deployment doesn't override
/// it.
pub const DEFAULT_READERS: usize = 4;

/// Configuration for a [`StorageEndpoint`], mirroring the knobs `storage2.EndPoint`
/// exposes: the engine to read and write through, the disk-space oracle, and the
/// optional redirect hooks.
pub struct StorageEndpointConfig {
    pub engine: Arc<dyn KvEngine>,
    pub disk: Arc<dyn DiskSpace>,
    pub redirect_reader: Option<Arc<dyn RedirectReader>>,
    pub redirect_writer: Option<Arc<dyn RedirectWriter>>,
    pub readers: usize,
}

impl StorageEndpointConfig {
    /// A config with no redirection and unlimited disk space, useful for tests and
    /// single-node deployments.
    pub fn new(engine: Arc<dyn KvEngine>) -> Self {
        Self {
            engine,
            disk: Arc::new(InfiniteDiskSpace),
            redirect_reader: None,
            redirect_writer: None,
            readers: DEFAULT_READERS,
        }
    }
}

/// The running storage endpoint: a single write-pipeline worker and a pool of
/// snapshot-read workers, all wired together by the `Source` queue and the shared
/// `sync` signal described in spec §4.5/§4.6.
pub struct StorageEndpoint {
    source_tx: mpsc::Sender<RequestHandle<Request, Response>>,
    die: Arc<Latch>,
}

impl StorageEndpoint {
    pub fn spawn(config: StorageEndpointConfig) -> Self {
        let StorageEndpointConfig {
            engine,
            disk,
            redirect_reader,
            redirect_writer,
            readers,
        } = config;

        let (source_tx, source_rx) = mpsc::channel(QUEUE_DEPTH);
        let (read_tx, read_rx) = mpsc::channel(QUEUE_DEPTH);
        let read_rx = Arc::new(Mutex::new(read_rx));

        let die = Arc::new(Latch::new());
        let sync: Arc<ArcSwap<Latch>> = Arc::new(ArcSwap::from_pointee(Latch::new()));
        let responses = Arc::new(response_pool());

        tokio::spawn(writer::run(
            source_rx,
            read_tx,
            engine.clone(),
            disk,
            redirect_writer,
            sync.clone(),
            die.clone(),
            responses.clone(),
        ));

        for _ in 0..readers.max(1) {
            tokio::spawn(reader::run(
                read_rx.clone(),
                engine.clone(),
                redirect_reader.clone(),
                sync.clone(),
                die.clone(),
                responses.clone(),
            ));
        }

        Self { source_tx, die }
    }

    /// Feeds one dispatched request handle into the endpoint. Mirrors handing a
    /// request off to `db.Source <- req` in the original.
    pub async fn submit(&self, req: RequestHandle<Request, Response>) -> bool {
        self.source_tx.send(req).await.is_ok()
    }

    /// Signals the writer and every reader to discard their transaction and return,
    /// waking anything blocked on `Die`.
    pub fn shutdown(&self) {
        self.die.set();
    }
}
