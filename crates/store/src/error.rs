use thiserror::Error;

use crate::schema::TopicStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("opening knowledge store: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("store transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("store table unavailable: {0}")]
    Table(#[from] redb::TableError),

    #[error("store read/write failed: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("store commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("decoding stored record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("topic {id} not found")]
    TopicNotFound { id: u64 },

    #[error("session {id} not found")]
    SessionNotFound { id: u64 },

    #[error("topic {id} is {found} (expected in_progress)")]
    InvalidTransition { id: u64, found: TopicStatus },
}

impl StoreError {
    /// Contention-style failures worth a bounded retry; schema and
    /// not-found errors are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            StoreError::Transaction(_) | StoreError::Storage(_) | StoreError::Commit(_)
        )
    }
}
