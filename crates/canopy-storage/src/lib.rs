pub mod memory;
pub mod traits;

pub use memory::{InMemoryLockSession, InMemoryStore, InMemoryStoreFactory};
pub use traits::{NodeLockSession, NodeStore, StorageError, StoreFactory};
