//! Document store: addressing, snapshots, and the transaction seam.
//!
//! This module is split into two submodules:
//! - the types below: document references, snapshots, and the write/stamp
//!   vocabulary shared by every store backend.
//! - `sqlite`: the sqlx-backed SQLite implementation used locally and in tests.
//!
//! External modules should import from `seesturm_sync::store` — we re-export
//! the SQLite backend's API for convenience.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

pub mod sqlite;

pub use sqlite::{init_pool, run_migrations, Pool, SqliteDocumentStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("document {0} holds invalid JSON: {1}")]
    Corrupt(String, #[source] serde_json::Error),
    #[error("transaction aborted: {0}")]
    Aborted(anyhow::Error),
}

/// Addressable slot in the store: a collection name plus a document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    pub collection: String,
    pub id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// New reference with a store-style auto-assigned id.
    pub fn new_in(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: Uuid::new_v4().to_string(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

/// Instruction for a store-managed timestamp slot on write.
///
/// `ServerSet` is the "let the store assign its own clock value" sentinel;
/// callers never supply a concrete timestamp of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    /// Leave the slot empty.
    Clear,
    /// Preserve whatever the stored document currently carries.
    Keep,
    /// Assign the store's clock value at commit time.
    ServerSet,
}

/// Point-in-time view of a stored document, read inside a transaction.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub target: DocumentRef,
    pub fields: Map<String, Value>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Decode the domain fields as a concrete record type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.fields.clone()))
            .map_err(|err| StoreError::Corrupt(self.target.path(), err))
    }
}

/// Pending write produced by a transaction body.
#[derive(Debug, Clone)]
pub struct DocumentWrite {
    pub fields: Map<String, Value>,
    /// With merge, only the fields present in the payload are touched;
    /// fields the stored document already carries are left in place.
    pub merge: bool,
    pub created: Stamp,
    pub modified: Stamp,
}

/// Outcome of a transaction body: write the document, or commit nothing.
#[derive(Debug, Clone)]
pub enum TxnDecision {
    Write(DocumentWrite),
    Skip,
}

/// Read-decide-write body run against the current snapshot. Returning an
/// error aborts the transaction; nothing is committed.
pub type TxnBody<'a> =
    Box<dyn FnOnce(Option<&Snapshot>) -> anyhow::Result<TxnDecision> + Send + 'a>;

/// Remote-document-store seam. Backends guarantee that `transact` runs its
/// body against a snapshot that cannot be changed by other writers before
/// the decision is committed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, target: &DocumentRef) -> Result<Option<Snapshot>, StoreError>;

    async fn transact(&self, target: &DocumentRef, body: TxnBody<'_>) -> Result<(), StoreError>;

    async fn delete(&self, target: &DocumentRef) -> Result<(), StoreError>;
}
