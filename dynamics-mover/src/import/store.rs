//! Remote record store capability used by the import engine and the exporter

use async_trait::async_trait;
use uuid::Uuid;

use crate::api::query::Query;
use crate::records::Record;

/// Outcome of an upsert-by-identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
        }
    }
}

/// Outcome of a many-to-many association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociateOutcome {
    Associated,
    /// The link already existed; counts as success
    AlreadyAssociated,
}

/// Error returned by a store operation
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The store rejected the request
    Rejected {
        status: u16,
        /// Service fault code (e.g. "0x80040217")
        code: Option<String>,
        message: String,
    },
    /// The request never got an answer
    Transport(String),
    /// Metadata needed to address the record is missing
    Schema(String),
    /// The response could not be decoded
    Decode(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Rejected {
                status,
                code: Some(code),
                message,
            } => write!(f, "HTTP {} ({}): {}", status, code, message),
            StoreError::Rejected { status, message, .. } => write!(f, "HTTP {}: {}", status, message),
            StoreError::Transport(message) => write!(f, "Request failed: {}", message),
            StoreError::Schema(message) => write!(f, "Schema error: {}", message),
            StoreError::Decode(message) => write!(f, "Invalid response: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

/// Record store the engine commits into
///
/// Calls are awaited one at a time by the engine; implementations do not need
/// to be safe for interleaved writes on the same record.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create or update the record by its id
    async fn upsert(&self, record: &Record) -> Result<UpsertOutcome, StoreError>;

    /// Update an existing record; fails when it does not exist
    async fn update(&self, record: &Record) -> Result<(), StoreError>;

    /// Link two records through a many-to-many relationship
    async fn associate(
        &self,
        entity1: &str,
        id1: Uuid,
        relationship: &str,
        entity2: &str,
        id2: Uuid,
    ) -> Result<AssociateOutcome, StoreError>;

    /// Retrieve every record matching the query
    async fn query(&self, query: &Query) -> Result<Vec<Record>, StoreError>;

    async fn delete(&self, entity_type: &str, id: Uuid) -> Result<(), StoreError>;
}
