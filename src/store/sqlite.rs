use super::{
    DocumentRef, DocumentStore, DocumentWrite, Snapshot, Stamp, StoreError, TxnBody, TxnDecision,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    // Strip prefix and optional //
    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    // Separate query string if any
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        // nothing to normalize
        return url.to_string();
    }

    // Expand leading ~/ to HOME
    let expanded_path = if let Some(rest) = path_part.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            path_part.to_string()
        }
    } else {
        path_part.to_string()
    };

    // Ensure parent directory exists if any
    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// SQLite-backed document store. Each document is one row; the store alone
/// writes the `created_at`/`modified_at` columns, so `Stamp::ServerSet`
/// resolves to this process's clock at commit time.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: Pool,
}

impl SqliteDocumentStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn snapshot_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        target: &DocumentRef,
    ) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT fields, created_at, modified_at FROM documents WHERE path = ?",
        )
        .bind(target.path())
        .fetch_optional(&mut **tx)
        .await?;
        row.map(|row| row_to_snapshot(target, &row)).transpose()
    }
}

fn row_to_snapshot(
    target: &DocumentRef,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<Snapshot, StoreError> {
    let raw: String = row.get("fields");
    let fields: Map<String, Value> = serde_json::from_str(&raw)
        .map_err(|err| StoreError::Corrupt(target.path(), err))?;
    Ok(Snapshot {
        target: target.clone(),
        fields,
        created: row.try_get::<Option<DateTime<Utc>>, _>("created_at").ok().flatten(),
        modified: row.try_get::<Option<DateTime<Utc>>, _>("modified_at").ok().flatten(),
    })
}

fn resolve_stamp(stamp: Stamp, current: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match stamp {
        Stamp::Clear => None,
        Stamp::Keep => current,
        Stamp::ServerSet => Some(now),
    }
}

fn resolve_fields(write: &DocumentWrite, existing: Option<&Snapshot>) -> Map<String, Value> {
    match existing {
        Some(snap) if write.merge => {
            let mut merged = snap.fields.clone();
            for (key, value) in &write.fields {
                merged.insert(key.clone(), value.clone());
            }
            merged
        }
        _ => write.fields.clone(),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip_all, fields(doc = %target.path()))]
    async fn get(&self, target: &DocumentRef) -> Result<Option<Snapshot>, StoreError> {
        let row = sqlx::query(
            "SELECT fields, created_at, modified_at FROM documents WHERE path = ?",
        )
        .bind(target.path())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| row_to_snapshot(target, &row)).transpose()
    }

    #[instrument(skip_all, fields(doc = %target.path()))]
    async fn transact(&self, target: &DocumentRef, body: TxnBody<'_>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let snapshot = Self::snapshot_in_tx(&mut tx, target).await?;

        // Body errors abort: the transaction is dropped uncommitted.
        let decision = body(snapshot.as_ref()).map_err(StoreError::Aborted)?;

        match decision {
            TxnDecision::Skip => {}
            TxnDecision::Write(write) => {
                let now = Utc::now();
                let fields = resolve_fields(&write, snapshot.as_ref());
                let created = resolve_stamp(
                    write.created,
                    snapshot.as_ref().and_then(|s| s.created),
                    now,
                );
                let modified = resolve_stamp(
                    write.modified,
                    snapshot.as_ref().and_then(|s| s.modified),
                    now,
                );
                let raw = serde_json::to_string(&Value::Object(fields))
                    .map_err(|err| StoreError::Corrupt(target.path(), err))?;
                sqlx::query(
                    "INSERT INTO documents (path, collection, fields, created_at, modified_at) \
                     VALUES (?, ?, ?, ?, ?) \
                     ON CONFLICT(path) DO UPDATE SET \
                       fields = excluded.fields, \
                       created_at = excluded.created_at, \
                       modified_at = excluded.modified_at",
                )
                .bind(target.path())
                .bind(&target.collection)
                .bind(raw)
                .bind(created)
                .bind(modified)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip_all, fields(doc = %target.path()))]
    async fn delete(&self, target: &DocumentRef) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE path = ?")
            .bind(target.path())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
