/// Append-only audit trail
///
/// Every access decision and every mutating governance action lands here as
/// one immutable row. Entries are never updated; the only write paths are
/// `record` (insert) and `purge` (age-based retention).
use crate::error::{PlatformError, PlatformResult};
use crate::governance::permissions::{Capability, Decision};
use crate::metrics;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// A not-yet-persisted audit entry
#[derive(Debug, Clone, Default)]
pub struct AuditEntry {
    /// None for anonymous requests
    pub actor_id: Option<String>,
    /// Route or governance action, e.g. "post.approve"
    pub action: String,
    pub capability: Option<Capability>,
    pub granted: bool,
    pub denial_reason: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    /// Human-supplied justification; required for rejections and role changes
    pub reason: Option<String>,
}

impl AuditEntry {
    /// Entry for a permission decision, granted or denied
    pub fn decision(
        actor_id: Option<&str>,
        action: &str,
        capability: Capability,
        decision: &Decision,
    ) -> Self {
        Self {
            actor_id: actor_id.map(str::to_string),
            action: action.to_string(),
            capability: Some(capability),
            granted: decision.granted,
            denial_reason: if decision.granted {
                None
            } else {
                Some(decision.reason.to_string())
            },
            ..Self::default()
        }
    }

    pub fn with_change(
        mut self,
        old_values: serde_json::Value,
        new_values: serde_json::Value,
    ) -> Self {
        self.old_values = Some(old_values);
        self.new_values = Some(new_values);
        self
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

/// A persisted audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub actor_id: Option<String>,
    pub action: String,
    pub capability: Option<String>,
    pub granted: bool,
    pub denial_reason: Option<String>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Filter for audit queries
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub granted: Option<bool>,
    pub action_prefix: Option<String>,
}

/// Aggregate view over a recent window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total: i64,
    pub denied: i64,
    pub denial_rate: f64,
    pub top_denied_actions: Vec<DeniedAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeniedAction {
    pub action: String,
    pub count: i64,
}

/// Audit log store
#[derive(Clone)]
pub struct AuditLog {
    db: SqlitePool,
}

impl AuditLog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append one entry. Storage failures propagate; most callers should go
    /// through `record_best_effort` instead.
    pub async fn record(&self, entry: &AuditEntry) -> PlatformResult<()> {
        let mut conn = self.db.acquire().await?;
        Self::insert(&mut conn, entry).await
    }

    /// Append one entry inside an existing transaction. Used by the role
    /// change coordinator, where the audit row and the mutation are one
    /// atomic unit.
    pub async fn record_in_tx(
        conn: &mut SqliteConnection,
        entry: &AuditEntry,
    ) -> PlatformResult<()> {
        Self::insert(conn, entry).await
    }

    /// Append one entry without failing the caller. The triggering action
    /// has already committed; a lost audit row is surfaced through the
    /// failure counter and a warning, not as the primary error.
    pub async fn record_best_effort(&self, entry: &AuditEntry) {
        if let Err(e) = self.record(entry).await {
            metrics::AUDIT_WRITE_FAILURES_TOTAL.inc();
            tracing::warn!(action = %entry.action, error = %e, "audit write failed");
        }
    }

    async fn insert(conn: &mut SqliteConnection, entry: &AuditEntry) -> PlatformResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO audit_log
            (actor_id, action, capability, granted, denial_reason, old_values, new_values, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.actor_id)
        .bind(&entry.action)
        .bind(entry.capability.map(|c| c.action_name()))
        .bind(entry.granted)
        .bind(&entry.denial_reason)
        .bind(entry.old_values.as_ref().map(|v| v.to_string()))
        .bind(entry.new_values.as_ref().map(|v| v.to_string()))
        .bind(&entry.reason)
        .bind(now.to_rfc3339())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Most recent entries matching the filter, newest first
    pub async fn recent(&self, filter: &AuditFilter, limit: i64) -> PlatformResult<Vec<AuditRecord>> {
        let mut sql = String::from(
            "SELECT id, actor_id, action, capability, granted, denial_reason,
                    old_values, new_values, reason, created_at
             FROM audit_log WHERE 1 = 1",
        );
        if filter.actor_id.is_some() {
            sql.push_str(" AND actor_id = ?");
        }
        if filter.granted.is_some() {
            sql.push_str(" AND granted = ?");
        }
        if filter.action_prefix.is_some() {
            sql.push_str(" AND action LIKE ?");
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");

        let mut query = sqlx::query(&sql);
        if let Some(actor_id) = &filter.actor_id {
            query = query.bind(actor_id);
        }
        if let Some(granted) = filter.granted {
            query = query.bind(granted);
        }
        if let Some(prefix) = &filter.action_prefix {
            query = query.bind(format!("{}%", prefix));
        }
        let rows = query.bind(limit.clamp(1, 500)).fetch_all(&self.db).await?;

        rows.into_iter().map(Self::parse_record).collect()
    }

    /// Aggregate statistics over the last `window_days` days
    pub async fn statistics(&self, window_days: i64) -> PlatformResult<AuditStatistics> {
        let cutoff = (Utc::now() - Duration::days(window_days)).to_rfc3339();

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN granted = 0 THEN 1 ELSE 0 END), 0) AS denied
            FROM audit_log
            WHERE created_at >= ?
            "#,
        )
        .bind(&cutoff)
        .fetch_one(&self.db)
        .await?;

        let total: i64 = row.get("total");
        let denied: i64 = row.get("denied");

        let top_rows = sqlx::query(
            r#"
            SELECT action, COUNT(*) AS count
            FROM audit_log
            WHERE granted = 0 AND created_at >= ?
            GROUP BY action
            ORDER BY count DESC
            LIMIT 5
            "#,
        )
        .bind(&cutoff)
        .fetch_all(&self.db)
        .await?;

        let top_denied_actions = top_rows
            .into_iter()
            .map(|row| DeniedAction {
                action: row.get("action"),
                count: row.get("count"),
            })
            .collect();

        Ok(AuditStatistics {
            total,
            denied,
            denial_rate: if total > 0 {
                denied as f64 / total as f64
            } else {
                0.0
            },
            top_denied_actions,
        })
    }

    /// Delete entries older than the retention window. Irreversible; meant
    /// for the periodic retention job, not user-triggered calls.
    pub async fn purge(&self, older_than_days: i64) -> PlatformResult<u64> {
        let cutoff = (Utc::now() - Duration::days(older_than_days)).to_rfc3339();

        let result = sqlx::query("DELETE FROM audit_log WHERE created_at < ?")
            .bind(&cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    fn parse_record(row: sqlx::sqlite::SqliteRow) -> PlatformResult<AuditRecord> {
        let created_at_str: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
            .with_timezone(&Utc);

        let old_values = row
            .try_get::<String, _>("old_values")
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok());
        let new_values = row
            .try_get::<String, _>("new_values")
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok());

        Ok(AuditRecord {
            id: row.get("id"),
            actor_id: row.get("actor_id"),
            action: row.get("action"),
            capability: row.get("capability"),
            granted: row.get("granted"),
            denial_reason: row.get("denial_reason"),
            old_values,
            new_values,
            reason: row.get("reason"),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::test_support::setup_pool;

    fn denied_entry(actor: &str, action: &str) -> AuditEntry {
        AuditEntry {
            actor_id: Some(actor.to_string()),
            action: action.to_string(),
            capability: Some(Capability::PublishPost),
            granted: false,
            denial_reason: Some("insufficient_role".to_string()),
            ..AuditEntry::default()
        }
    }

    #[tokio::test]
    async fn test_record_and_recent() {
        let db = setup_pool().await;
        let audit = AuditLog::new(db);

        audit
            .record(&AuditEntry {
                actor_id: Some("u1".to_string()),
                action: "post.approve".to_string(),
                capability: Some(Capability::PublishPost),
                granted: true,
                ..AuditEntry::default()
            })
            .await
            .unwrap();
        audit.record(&denied_entry("u2", "post.approve")).await.unwrap();

        let all = audit.recent(&AuditFilter::default(), 10).await.unwrap();
        assert_eq!(all.len(), 2);
        // Newest first
        assert_eq!(all[0].actor_id.as_deref(), Some("u2"));

        let denied_only = audit
            .recent(
                &AuditFilter {
                    granted: Some(false),
                    ..AuditFilter::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(denied_only.len(), 1);
        assert_eq!(denied_only[0].denial_reason.as_deref(), Some("insufficient_role"));
    }

    #[tokio::test]
    async fn test_filter_by_actor_and_prefix() {
        let db = setup_pool().await;
        let audit = AuditLog::new(db);

        audit.record(&denied_entry("u1", "post.reject")).await.unwrap();
        audit.record(&denied_entry("u1", "role.change")).await.unwrap();
        audit.record(&denied_entry("u2", "post.reject")).await.unwrap();

        let filtered = audit
            .recent(
                &AuditFilter {
                    actor_id: Some("u1".to_string()),
                    action_prefix: Some("post.".to_string()),
                    ..AuditFilter::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].action, "post.reject");
    }

    #[tokio::test]
    async fn test_statistics() {
        let db = setup_pool().await;
        let audit = AuditLog::new(db);

        audit
            .record(&AuditEntry {
                actor_id: Some("u1".to_string()),
                action: "post.approve".to_string(),
                granted: true,
                ..AuditEntry::default()
            })
            .await
            .unwrap();
        audit.record(&denied_entry("u2", "post.approve")).await.unwrap();
        audit.record(&denied_entry("u3", "post.approve")).await.unwrap();
        audit.record(&denied_entry("u3", "role.change")).await.unwrap();

        let stats = audit.statistics(1).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.denied, 3);
        assert!((stats.denial_rate - 0.75).abs() < f64::EPSILON);
        assert_eq!(stats.top_denied_actions[0].action, "post.approve");
        assert_eq!(stats.top_denied_actions[0].count, 2);
    }

    #[tokio::test]
    async fn test_purge_removes_only_old_entries() {
        let db = setup_pool().await;
        let audit = AuditLog::new(db.clone());

        audit.record(&denied_entry("u1", "post.reject")).await.unwrap();

        // Backdate the entry beyond the retention window
        let old = (Utc::now() - Duration::days(400)).to_rfc3339();
        sqlx::query("UPDATE audit_log SET created_at = ? WHERE actor_id = 'u1'")
            .bind(&old)
            .execute(&db)
            .await
            .unwrap();

        audit.record(&denied_entry("u2", "post.reject")).await.unwrap();

        let purged = audit.purge(365).await.unwrap();
        assert_eq!(purged, 1);

        let remaining = audit.recent(&AuditFilter::default(), 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].actor_id.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_diff() {
        let db = setup_pool().await;
        let audit = AuditLog::new(db);

        let entry = AuditEntry {
            actor_id: Some("s1".to_string()),
            action: "role.change".to_string(),
            capability: Some(Capability::ManageRoles),
            granted: true,
            ..AuditEntry::default()
        }
        .with_change(
            serde_json::json!({"role": "editor"}),
            serde_json::json!({"role": "admin"}),
        )
        .with_reason(Some("promotion".to_string()));

        audit.record(&entry).await.unwrap();

        let records = audit.recent(&AuditFilter::default(), 1).await.unwrap();
        assert_eq!(
            records[0].old_values,
            Some(serde_json::json!({"role": "editor"}))
        );
        assert_eq!(
            records[0].new_values,
            Some(serde_json::json!({"role": "admin"}))
        );
        assert_eq!(records[0].reason.as_deref(), Some("promotion"));
    }
}
