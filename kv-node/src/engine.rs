use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kv_storage::{EngineError, KvEngine, ReadTxn, StoredEntry, WriteTxn};

/// Transactions larger than this are rejected with [`EngineError::TooBig`], forcing
/// the write pipeline's mid-batch commit-and-retry path. A real embedded engine (sled,
/// redb) enforces a similar limit based on its own memtable/transaction budget; this
/// demo engine picks a small number so the split path is easy to exercise.
const MAX_ENTRIES_PER_TXN: usize = 4096;

/// In-process `BTreeMap`-backed [`KvEngine`], standing in for a real embedded engine
/// in the demo binary. A read transaction is a point-in-time clone of the map; a
/// write transaction stages entries and swaps them into the shared map on commit.
pub struct MemoryEngine {
    data: Arc<Mutex<BTreeMap<Vec<u8>, StoredEntry>>>,
}

impl MemoryEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }
}

impl KvEngine for MemoryEngine {
    fn begin_read(&self) -> Box<dyn ReadTxn> {
        Box::new(MemoryReadTxn {
            snapshot: self.data.lock().expect("engine mutex poisoned").clone(),
        })
    }

    fn begin_write(&self) -> Box<dyn WriteTxn> {
        Box::new(MemoryWriteTxn {
            data: self.data.clone(),
            staged: BTreeMap::new(),
        })
    }
}

struct MemoryReadTxn {
    snapshot: BTreeMap<Vec<u8>, StoredEntry>,
}

#[async_trait]
impl ReadTxn for MemoryReadTxn {
    async fn get(&mut self, key: &[u8]) -> Result<Option<StoredEntry>, EngineError> {
        Ok(self.snapshot.get(key).cloned())
    }
}

struct MemoryWriteTxn {
    data: Arc<Mutex<BTreeMap<Vec<u8>, StoredEntry>>>,
    staged: BTreeMap<Vec<u8>, StoredEntry>,
}

#[async_trait]
impl WriteTxn for MemoryWriteTxn {
    fn set(&mut self, key: &[u8], entry: StoredEntry) -> Result<(), EngineError> {
        if self.staged.len() >= MAX_ENTRIES_PER_TXN && !self.staged.contains_key(key) {
            return Err(EngineError::TooBig);
        }
        self.staged.insert(key.to_vec(), entry);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        let mut data = self.data.lock().expect("engine mutex poisoned");
        data.extend(self.staged);
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use kv_storage::EntryTag;

    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let engine = MemoryEngine::new();
        let mut write = engine.begin_write();
        write
            .set(
                b"k",
                StoredEntry {
                    value: b"v".to_vec(),
                    tag: EntryTag::Data,
                    expires_at: 0,
                },
            )
            .unwrap();
        write.commit().await.unwrap();

        let mut read = engine.begin_read();
        let found = read.get(b"k").await.unwrap().unwrap();
        assert_eq!(found.value, b"v");
    }

    #[tokio::test]
    async fn too_many_distinct_keys_in_one_txn_errors() {
        let engine = MemoryEngine::new();
        let mut write = engine.begin_write();
        for i in 0..MAX_ENTRIES_PER_TXN {
            write
                .set(
                    &i.to_le_bytes(),
                    StoredEntry {
                        value: Vec::new(),
                        tag: EntryTag::Data,
                        expires_at: 0,
                    },
                )
                .unwrap();
        }
        let err = write
            .set(
                &(MAX_ENTRIES_PER_TXN as u64).to_le_bytes(),
                StoredEntry {
                    value: Vec::new(),
                    tag: EntryTag::Data,
                    expires_at: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::TooBig));
    }
}
