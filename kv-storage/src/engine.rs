use async_trait::async_trait;
use thiserror::Error;

/// Errors the underlying ordered key-value engine can raise.
///
/// `TooBig` is a distinguished variant rather than a string: the writer matches on
/// it specifically to trigger a mid-batch commit-and-retry rather than failing the
/// request, exactly as `badger.ErrTxnTooBig` is matched in the original.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transaction too large")]
    TooBig,
    #[error("key not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

/// Discriminates a stored value from a redirect marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTag {
    Data,
    /// `value` holds the UTF-8 name of the node reads for this key must be forwarded
    /// to.
    Redirect,
    /// A tag byte the engine couldn't map to `Data` or `Redirect`, carried through
    /// rather than rejected at read time. The reader treats a hit with this tag as a
    /// miss.
    Unknown(u8),
}

/// One stored value as the engine returns or accepts it.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub value: Vec<u8>,
    pub tag: EntryTag,
    pub expires_at: u64,
}

/// A snapshot read-only transaction.
#[async_trait]
pub trait ReadTxn: Send {
    async fn get(&mut self, key: &[u8]) -> Result<Option<StoredEntry>, EngineError>;
}

/// A read-write transaction accumulating entries until committed.
#[async_trait]
pub trait WriteTxn: Send {
    /// Stages `entry` under `key`. Returns [`EngineError::TooBig`] if the transaction
    /// has grown past the engine's internal limit; the caller is expected to commit
    /// what it has and retry this single entry in a fresh transaction.
    fn set(&mut self, key: &[u8], entry: StoredEntry) -> Result<(), EngineError>;

    /// Commits all staged entries. Consumes the transaction: there is no reuse after
    /// commit, mirroring the engine always opening a fresh transaction per batch.
    async fn commit(self: Box<Self>) -> Result<(), EngineError>;

    /// Discards the transaction without committing, used on shutdown.
    fn discard(self: Box<Self>);
}

/// The ordered key-value store the write and read pipelines are built over.
///
/// Object-safe by design: `kv-node` plugs in a concrete engine (a demo in-process one
/// for the binary and tests; a real deployment substitutes an embedded engine such as
/// `sled` or `redb`) behind this one trait, and nothing in `kv-storage` depends on
/// which.
pub trait KvEngine: Send + Sync {
    fn begin_read(&self) -> Box<dyn ReadTxn>;
    fn begin_write(&self) -> Box<dyn WriteTxn>;
}
