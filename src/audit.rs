//! Append-only audit trail of alert events
//!
//! Audit writes never fail the operation that triggered them. Inside a
//! transaction the entry goes through a savepoint, so a failed insert is
//! rolled back on its own and the surrounding transaction carries on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::store::Store;
use crate::types::{from_millis, to_millis};

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    AlertCreated,
    LocationUpdated,
    AlertCancelled,
    NotificationFailed,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::AlertCreated => "alert_created",
            AuditKind::LocationUpdated => "location_updated",
            AuditKind::AlertCancelled => "alert_cancelled",
            AuditKind::NotificationFailed => "notification_failed",
        }
    }
}

/// One audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub subject_identity: Option<String>,
    pub description: String,
    pub origin_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        kind: AuditKind,
        subject_identity: Option<&str>,
        description: impl Into<String>,
        origin_ip: Option<&str>,
    ) -> Self {
        Self {
            kind,
            subject_identity: subject_identity.filter(|s| !s.is_empty()).map(str::to_string),
            description: description.into(),
            origin_ip: origin_ip.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    /// Pin the entry timestamp
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Destination for audit records outside a core transaction
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<()>;
}

/// Record to a sink, logging instead of failing
pub async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let kind = entry.kind;
    if let Err(e) = sink.record(entry).await {
        tracing::warn!(kind = kind.as_str(), error = %e, "Failed to write audit entry");
    }
}

async fn insert(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_log (kind, subject_identity, description, origin_ip, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(entry.kind.as_str())
    .bind(entry.subject_identity.as_deref())
    .bind(&entry.description)
    .bind(entry.origin_ip.as_deref())
    .bind(to_millis(entry.created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_in_savepoint(conn: &mut SqliteConnection, entry: &AuditEntry) -> Result<()> {
    let mut savepoint = conn.begin().await?;
    insert(&mut savepoint, entry).await?;
    savepoint.commit().await?;
    Ok(())
}

/// Append inside an open transaction without risking it
pub async fn append_best_effort(conn: &mut SqliteConnection, entry: &AuditEntry) {
    if let Err(e) = insert_in_savepoint(conn, entry).await {
        tracing::warn!(
            kind = entry.kind.as_str(),
            error = %e,
            "Failed to write audit entry; continuing"
        );
    }
}

#[async_trait]
impl AuditSink for Store {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, &entry).await
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    kind: String,
    subject_identity: Option<String>,
    description: String,
    origin_ip: Option<String>,
    created_at: i64,
}

impl Store {
    /// Most recent audit entries, newest first
    pub async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            "SELECT kind, subject_identity, description, origin_ip, created_at \
             FROM audit_log ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        let entries = rows
            .into_iter()
            .filter_map(|row| {
                let kind = serde_json::from_value(serde_json::Value::String(row.kind)).ok()?;
                Some(AuditEntry {
                    kind,
                    subject_identity: row.subject_identity,
                    description: row.description,
                    origin_ip: row.origin_ip,
                    created_at: from_millis(row.created_at),
                })
            })
            .collect();
        Ok(entries)
    }
}

/// In-memory audit sink for development and testing
///
/// Keeps at most `max_entries`, dropping the oldest.
pub struct MemoryAuditLog {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
    max_entries: usize,
}

impl MemoryAuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            max_entries,
        }
    }

    /// Recorded entries, oldest first
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }
}

impl Default for MemoryAuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl AuditSink for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.push(entry);

        if self.max_entries > 0 && entries.len() > self.max_entries {
            let drain_count = entries.len() - self.max_entries;
            entries.drain(..drain_count);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_drops_empty_identity() {
        let entry = AuditEntry::new(AuditKind::AlertCreated, Some(""), "x", None);
        assert!(entry.subject_identity.is_none());
        let entry = AuditEntry::new(AuditKind::AlertCreated, Some("abc"), "x", Some("10.0.0.1"));
        assert_eq!(entry.subject_identity.as_deref(), Some("abc"));
        assert_eq!(entry.origin_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_kind_strings_match_serde() {
        for kind in [
            AuditKind::AlertCreated,
            AuditKind::LocationUpdated,
            AuditKind::AlertCancelled,
            AuditKind::NotificationFailed,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[tokio::test]
    async fn test_store_sink_roundtrip() {
        let store = Store::in_memory().await.unwrap();
        store
            .record(AuditEntry::new(
                AuditKind::AlertCancelled,
                Some("abc"),
                "Alert 1 cancelled",
                Some("10.0.0.1"),
            ))
            .await
            .unwrap();

        let entries = store.recent_audit(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, AuditKind::AlertCancelled);
        assert_eq!(entries[0].description, "Alert 1 cancelled");
    }

    #[tokio::test]
    async fn test_audit_log_is_append_only() {
        let store = Store::in_memory().await.unwrap();
        store
            .record(AuditEntry::new(AuditKind::AlertCreated, None, "x", None))
            .await
            .unwrap();

        assert!(sqlx::query("UPDATE audit_log SET description = 'y'")
            .execute(store.pool())
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM audit_log")
            .execute(store.pool())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failed_append_keeps_transaction() {
        let store = Store::in_memory().await.unwrap();
        let mut tx = store.begin().await.unwrap();

        sqlx::query("DROP TABLE audit_log")
            .execute(&mut *tx)
            .await
            .unwrap();
        append_best_effort(
            &mut tx,
            &AuditEntry::new(AuditKind::AlertCreated, None, "lost", None),
        )
        .await;

        // The outer transaction is still usable after the failed savepoint
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&mut *tx)
            .await
            .unwrap();
        assert_eq!(one, 1);
        tx.rollback().await.unwrap();

        // Rolled back, so the table is back
        assert!(store.recent_audit(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_audit_capacity() {
        let log = MemoryAuditLog::new(2);
        for i in 0..3 {
            log.record(AuditEntry::new(
                AuditKind::LocationUpdated,
                None,
                format!("entry {}", i),
                None,
            ))
            .await
            .unwrap();
        }
        let entries = log.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].description, "entry 1");
    }
}
