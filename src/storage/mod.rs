pub mod cache;
pub mod case_store;
pub mod database;

pub use cache::{CacheStats, SnapshotCache};
pub use case_store::LocalCaseStore;
pub use database::{
    CaseRecord, Database, MessageAuthor, MessageMeta, MessagePage, ModerationMeta, NewMessage,
    PoolConfig, SessionRecord, SharedDatabase, StoredMessage,
};
