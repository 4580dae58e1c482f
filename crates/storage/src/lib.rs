pub mod error;
pub mod identity;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use identity::{Identity, IdentityStore, USER_ID_KEY, USER_NAME_KEY};
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore};
