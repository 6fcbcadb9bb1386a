use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use kv_mux::{server, Client, FramedStream, RequestHandle};
use kv_protocol::{
    client_hooks, request_pool, response_pool, server_hooks, Command, MsgpackCodec, Request,
    Response, ResponseCode,
};
use kv_storage::{
    DiskSpace, EngineError, EntryTag, KvEngine, ReadTxn, RedirectOutcome, RedirectReader,
    RedirectWriter, StorageEndpoint, StorageEndpointConfig, StoredEntry, WriteTxn,
};
use tokio::sync::mpsc;

/// A simple in-process engine for exercising the write/read pipelines end to end.
/// `max_entries_per_txn` lets a test force the `too-big` split-and-retry path without
/// needing a real storage engine's size accounting.
struct MemEngine {
    data: Arc<StdMutex<BTreeMap<Vec<u8>, StoredEntry>>>,
    max_entries_per_txn: usize,
}

impl MemEngine {
    fn new() -> Arc<Self> {
        Self::with_max_entries(usize::MAX)
    }

    fn with_max_entries(max_entries_per_txn: usize) -> Arc<Self> {
        Arc::new(Self {
            data: Arc::new(StdMutex::new(BTreeMap::new())),
            max_entries_per_txn,
        })
    }
}

impl KvEngine for MemEngine {
    fn begin_read(&self) -> Box<dyn ReadTxn> {
        Box::new(MemReadTxn {
            snapshot: self.data.lock().unwrap().clone(),
        })
    }

    fn begin_write(&self) -> Box<dyn WriteTxn> {
        Box::new(MemWriteTxn {
            data: self.data.clone(),
            staged: BTreeMap::new(),
            max_entries: self.max_entries_per_txn,
        })
    }
}

struct MemReadTxn {
    snapshot: BTreeMap<Vec<u8>, StoredEntry>,
}

#[async_trait]
impl ReadTxn for MemReadTxn {
    async fn get(&mut self, key: &[u8]) -> Result<Option<StoredEntry>, EngineError> {
        Ok(self.snapshot.get(key).cloned())
    }
}

struct MemWriteTxn {
    data: Arc<StdMutex<BTreeMap<Vec<u8>, StoredEntry>>>,
    staged: BTreeMap<Vec<u8>, StoredEntry>,
    max_entries: usize,
}

#[async_trait]
impl WriteTxn for MemWriteTxn {
    fn set(&mut self, key: &[u8], entry: StoredEntry) -> Result<(), EngineError> {
        if self.staged.len() >= self.max_entries && !self.staged.contains_key(key) {
            return Err(EngineError::TooBig);
        }
        self.staged.insert(key.to_vec(), entry);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        let mut data = self.data.lock().unwrap();
        for (key, entry) in self.staged {
            data.insert(key, entry);
        }
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}

struct SelectiveDiskSpace {
    reject_key: Vec<u8>,
}

impl DiskSpace for SelectiveDiskSpace {
    fn has_enough_disk_space(&self, key: &[u8], _val: &[u8]) -> bool {
        key != self.reject_key.as_slice()
    }

    fn account_for_disk_space(&self, _key: &[u8], _val: &[u8]) {}
}

struct StubRedirectWriter {
    target: String,
    calls: Arc<StdMutex<u32>>,
}

#[async_trait]
impl RedirectWriter for StubRedirectWriter {
    async fn redirect_write(&self, req: RequestHandle<Request, Response>) -> RedirectOutcome {
        *self.calls.lock().unwrap() += 1;
        req.reply(Response {
            seq: 0,
            code: ResponseCode::None,
            expires_at: 0,
            val: Vec::new(),
        })
        .await;
        RedirectOutcome::Forwarded {
            target: self.target.clone(),
        }
    }
}

struct RecordingRedirectReader {
    calls: Arc<StdMutex<Vec<(String, Vec<u8>)>>>,
}

#[async_trait]
impl RedirectReader for RecordingRedirectReader {
    async fn redirect_read(&self, target: &str, req: RequestHandle<Request, Response>) {
        self.calls
            .lock()
            .unwrap()
            .push((target.to_string(), req.message.key.clone()));
        req.reply(Response {
            seq: 0,
            code: ResponseCode::Value,
            expires_at: 0,
            val: b"forwarded".to_vec(),
        })
        .await;
    }
}

/// Wires a client/server mux pair over an in-memory duplex and returns the client
/// plus the server's raw handle stream, for a test to relay into a
/// [`StorageEndpoint`] of its choosing.
fn build_pair() -> (
    Arc<Client<Response, Request>>,
    mpsc::Receiver<RequestHandle<Request, Response>>,
) {
    let (client_io, server_io) = tokio::io::duplex(1 << 16);
    let requests_pool = Arc::new(request_pool());
    let responses_pool = Arc::new(response_pool());

    let server_stream = FramedStream::spawn(
        server_io,
        MsgpackCodec::<Request>::new(),
        MsgpackCodec::<Response>::new(),
        server_hooks(requests_pool.clone()),
    );
    let client_stream = FramedStream::spawn(
        client_io,
        MsgpackCodec::<Response>::new(),
        MsgpackCodec::<Request>::new(),
        client_hooks(requests_pool, responses_pool),
    );

    let handles = server::serve(server_stream);
    let client = Client::spawn(client_stream);
    (client, handles)
}

fn relay(mut handles: mpsc::Receiver<RequestHandle<Request, Response>>, endpoint: Arc<StorageEndpoint>) {
    tokio::spawn(async move {
        while let Some(handle) = handles.recv().await {
            if !endpoint.submit(handle).await {
                break;
            }
        }
    });
}

async fn call(
    client: &Arc<Client<Response, Request>>,
    cmd: Command,
    key: &[u8],
    val: &[u8],
    expires_at: u64,
) -> Response {
    let request = Request {
        seq: 0,
        cmd,
        expires_at,
        key: key.to_vec(),
        val: val.to_vec(),
    };
    client.call(request, None).await.unwrap().get().await.unwrap()
}

#[tokio::test]
async fn put_then_get_round_trip() {
    let (client, handles) = build_pair();
    let endpoint = Arc::new(StorageEndpoint::spawn(StorageEndpointConfig::new(MemEngine::new())));
    relay(handles, endpoint);

    let put = call(&client, Command::Put, b"k", b"v", 0).await;
    assert_eq!(put.code, ResponseCode::None);

    let get = call(&client, Command::Get, b"k", b"", 0).await;
    assert_eq!(get.code, ResponseCode::Value);
    assert_eq!(get.val, b"v".to_vec());
}

#[tokio::test]
async fn get_missing_key_returns_not_found() {
    let (client, handles) = build_pair();
    let endpoint = Arc::new(StorageEndpoint::spawn(StorageEndpointConfig::new(MemEngine::new())));
    relay(handles, endpoint);

    let get = call(&client, Command::Get, b"nope", b"", 0).await;
    assert_eq!(get.code, ResponseCode::NotFound);
    assert_eq!(get.val, Vec::<u8>::new());
}

#[tokio::test]
async fn touch_and_trace_report_presence() {
    let (client, handles) = build_pair();
    let endpoint = Arc::new(StorageEndpoint::spawn(StorageEndpointConfig::new(MemEngine::new())));
    relay(handles, endpoint);

    let put = call(&client, Command::Put, b"x", b"y", 0).await;
    assert_eq!(put.code, ResponseCode::None);

    let touch_hit = call(&client, Command::Touch, b"x", b"", 0).await;
    assert_eq!(touch_hit.val, b"ok".to_vec());

    let touch_miss = call(&client, Command::Touch, b"z", b"", 0).await;
    assert_eq!(touch_miss.val, b"not_found".to_vec());

    let trace_hit = call(&client, Command::Trace, b"x", b"", 0).await;
    assert_eq!(trace_hit.val, b"\n--ok".to_vec());

    let trace_miss = call(&client, Command::Trace, b"z", b"", 0).await;
    assert_eq!(trace_miss.val, b"\n--not_found".to_vec());
}

#[tokio::test]
async fn disk_full_with_redirect_forwards_write_and_later_read() {
    let (client, handles) = build_pair();
    let write_calls = Arc::new(StdMutex::new(0));
    let read_calls = Arc::new(StdMutex::new(Vec::new()));

    let mut config = StorageEndpointConfig::new(MemEngine::new());
    config.disk = Arc::new(SelectiveDiskSpace {
        reject_key: b"big".to_vec(),
    });
    config.redirect_writer = Some(Arc::new(StubRedirectWriter {
        target: "node7".to_string(),
        calls: write_calls.clone(),
    }));
    config.redirect_reader = Some(Arc::new(RecordingRedirectReader {
        calls: read_calls.clone(),
    }));

    let endpoint = Arc::new(StorageEndpoint::spawn(config));
    relay(handles, endpoint);

    let put = call(&client, Command::Put, b"big", b"anything", 0).await;
    assert_eq!(put.code, ResponseCode::None);
    assert_eq!(*write_calls.lock().unwrap(), 1);

    // Give the writer's background commit a moment to land the redirect marker.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let get = call(&client, Command::Get, b"big", b"", 0).await;
    assert_eq!(get.code, ResponseCode::Value);
    assert_eq!(get.val, b"forwarded".to_vec());
    assert_eq!(read_calls.lock().unwrap().as_slice(), &[("node7".to_string(), b"big".to_vec())]);
}

#[tokio::test]
async fn disk_full_without_redirect_replies_error() {
    let (client, handles) = build_pair();

    let mut config = StorageEndpointConfig::new(MemEngine::new());
    config.disk = Arc::new(SelectiveDiskSpace {
        reject_key: b"big".to_vec(),
    });

    let endpoint = Arc::new(StorageEndpoint::spawn(config));
    relay(handles, endpoint);

    let put = call(&client, Command::Put, b"big", b"anything", 0).await;
    assert_eq!(put.code, ResponseCode::Error);
    assert_eq!(put.val, b"Disk full and no redirection".to_vec());
}

#[tokio::test]
async fn too_big_retry_still_lands_both_entries() {
    let (client, handles) = build_pair();
    // Cap the engine's per-transaction capacity at one entry so a second `Put` in the
    // same batch forces the writer's mid-batch flush-and-retry path.
    let endpoint = Arc::new(StorageEndpoint::spawn(StorageEndpointConfig::new(
        MemEngine::with_max_entries(1),
    )));
    relay(handles, endpoint);

    let first = call(&client, Command::Put, b"a", b"1", 0).await;
    let second = call(&client, Command::Put, b"b", b"2", 0).await;
    assert_eq!(first.code, ResponseCode::None);
    assert_eq!(second.code, ResponseCode::None);

    let get_a = call(&client, Command::Get, b"a", b"", 0).await;
    let get_b = call(&client, Command::Get, b"b", b"", 0).await;
    assert_eq!(get_a.val, b"1".to_vec());
    assert_eq!(get_b.val, b"2".to_vec());
}

#[allow(dead_code)]
fn assert_entry_tag_roundtrips(tag: EntryTag) -> EntryTag {
    tag
}
