pub mod disk;
pub mod endpoint;
pub mod engine;
pub mod reader;
pub mod redirect;
mod responses;
pub mod writer;

pub use disk::{DiskSpace, InfiniteDiskSpace};
pub use endpoint::{StorageEndpoint, StorageEndpointConfig, DEFAULT_READERS};
pub use engine::{EngineError, EntryTag, KvEngine, ReadTxn, StoredEntry, WriteTxn};
pub use redirect::{RedirectOutcome, RedirectReader, RedirectWriter};
