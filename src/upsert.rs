//! Insert-or-merge writes with content-equality checks and provenance stamps.
//!
//! Every operation here runs as one atomic read-decide-write transaction
//! against the backing [`DocumentStore`]. The store's `created_at` slot is
//! written once, on first insert, and preserved by every later write;
//! `modified_at` is re-stamped only when a write actually changes content.

use crate::store::{
    DocumentRef, DocumentStore, DocumentWrite, Stamp, TxnBody, TxnDecision,
};
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, instrument};

/// Equality over a record's domain fields only. Implementations must ignore
/// store-managed provenance (document id, created/modified stamps); deriving
/// `PartialEq` on a type that carries them is not a substitute.
pub trait ContentComparable {
    fn content_equals(&self, other: &Self) -> bool;
}

/// Uniform failure for all write operations. Decode failures, transform
/// errors, store conflicts, and connectivity problems all land here; callers
/// get the message but not a machine-readable cause.
#[derive(Debug, Error)]
#[error("document write failed: {0}")]
pub struct WriteError(anyhow::Error);

impl From<anyhow::Error> for WriteError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

/// What an [`upsert`] call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Document did not exist; written fresh.
    Inserted,
    /// Document existed with different content; merged update written.
    Updated,
    /// Document existed with content-equal fields; no write issued.
    Unchanged,
}

fn encode_fields<T: Serialize>(record: &T) -> anyhow::Result<Map<String, Value>> {
    match serde_json::to_value(record).context("record failed to serialize")? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("record must serialize to a JSON object, got {other}"),
    }
}

/// Insert `candidate` at `target`, or merge it over the stored document when
/// content differs, or do nothing when content is equal. The stored
/// document's creation stamp survives every update; the modification stamp
/// is assigned by the store only on real changes.
#[instrument(skip_all, fields(doc = %target.path()))]
pub async fn upsert<T>(
    store: &dyn DocumentStore,
    target: &DocumentRef,
    candidate: &T,
) -> Result<UpsertOutcome, WriteError>
where
    T: Serialize + DeserializeOwned + ContentComparable + Send + Sync,
{
    let payload = encode_fields(candidate)?;
    let mut outcome = UpsertOutcome::Unchanged;
    let body: TxnBody<'_> = Box::new(|snapshot| match snapshot {
        None => {
            outcome = UpsertOutcome::Inserted;
            Ok(TxnDecision::Write(DocumentWrite {
                fields: payload,
                merge: false,
                created: Stamp::ServerSet,
                modified: Stamp::Clear,
            }))
        }
        Some(snapshot) => {
            let existing: T = snapshot.decode()?;
            if existing.content_equals(candidate) {
                Ok(TxnDecision::Skip)
            } else {
                outcome = UpsertOutcome::Updated;
                Ok(TxnDecision::Write(DocumentWrite {
                    fields: payload,
                    merge: true,
                    created: Stamp::Keep,
                    modified: Stamp::ServerSet,
                }))
            }
        }
    });
    store
        .transact(target, body)
        .await
        .context("upsert transaction failed")?;
    debug!(?outcome, "upsert committed");
    Ok(outcome)
}

/// Write `candidate` as a fresh record regardless of what is stored: both
/// provenance stamps are cleared so the store assigns them anew. Used when
/// re-parenting data that must not inherit an earlier document's history.
#[instrument(skip_all, fields(doc = %target.path()))]
pub async fn force_insert<T>(
    store: &dyn DocumentStore,
    target: &DocumentRef,
    candidate: &T,
) -> Result<(), WriteError>
where
    T: Serialize + Send + Sync,
{
    let payload = encode_fields(candidate)?;
    let body: TxnBody<'_> = Box::new(|_| {
        Ok(TxnDecision::Write(DocumentWrite {
            fields: payload,
            merge: false,
            created: Stamp::ServerSet,
            modified: Stamp::Clear,
        }))
    });
    store
        .transact(target, body)
        .await
        .context("forced insert transaction failed")?;
    Ok(())
}

/// Read-modify-write with a caller-supplied pure transform. The provenance
/// rule matches [`upsert`]: creation stamp preserved, modification stamp
/// re-assigned by the store. A missing document, a decode failure, or a
/// transform error aborts the transaction.
#[instrument(skip_all, fields(doc = %target.path()))]
pub async fn update_document<T, F>(
    store: &dyn DocumentStore,
    target: &DocumentRef,
    transform: F,
) -> Result<(), WriteError>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: FnOnce(T) -> T + Send,
{
    let body: TxnBody<'_> = Box::new(|snapshot| {
        let snapshot = snapshot.context("document does not exist")?;
        let existing: T = snapshot.decode()?;
        let updated = transform(existing);
        Ok(TxnDecision::Write(DocumentWrite {
            fields: encode_fields(&updated)?,
            merge: true,
            created: Stamp::Keep,
            modified: Stamp::ServerSet,
        }))
    });
    store
        .transact(target, body)
        .await
        .context("update transaction failed")?;
    Ok(())
}
