/// Role change coordination
///
/// Role mutations are the most sensitive governance action the platform
/// performs, so they get stricter treatment than content transitions: the
/// user row update, the role change record, and the audit entry commit in
/// one transaction — either all three persist or none do. The coordinator
/// also enforces the two safety invariants: nobody changes their own role,
/// and the system never ends up with zero super-admins.
use crate::db::models::{Actor, User};
use crate::error::{PlatformError, PlatformResult};
use crate::governance::audit::{AuditEntry, AuditLog};
use crate::governance::permissions::{self, Capability};
use crate::governance::roles::Role;
use crate::users;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// One accepted role mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleChangeRecord {
    pub id: i64,
    pub user_id: String,
    pub changed_by: String,
    pub old_role: Role,
    pub new_role: Role,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Role change coordinator
#[derive(Clone)]
pub struct RoleChangeCoordinator {
    db: SqlitePool,
    audit: AuditLog,
}

impl RoleChangeCoordinator {
    pub fn new(db: SqlitePool, audit: AuditLog) -> Self {
        Self { db, audit }
    }

    /// Change `target_id`'s role to `new_role` on behalf of `changed_by`.
    ///
    /// Guards, in order: no self-mutation, super-admin rank required,
    /// last-super-admin protection. Returns the updated user.
    pub async fn change_role(
        &self,
        target_id: &str,
        new_role: Role,
        changed_by: &Actor,
        reason: Option<&str>,
    ) -> PlatformResult<User> {
        let decision = permissions::evaluate(
            Some(changed_by),
            Capability::ManageRoles,
            Some(target_id),
            None,
        );
        if !decision.granted {
            self.audit
                .record_best_effort(&AuditEntry::decision(
                    Some(&changed_by.id),
                    "role.change",
                    Capability::ManageRoles,
                    &decision,
                ))
                .await;
            return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
        }

        let mut tx = self.db.begin().await?;

        let target = {
            let row = sqlx::query(
                "SELECT id, username, email, password_hash, role, is_active, created_at, updated_at
                 FROM users WHERE id = ?",
            )
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("User {} not found", target_id)))?;
            users::parse_user(row)?
        };

        if target.role == new_role {
            return Err(PlatformError::Validation(format!(
                "User already has role {}",
                new_role.as_str()
            )));
        }

        // Demoting a super admin requires at least one other to remain. The
        // count runs inside the transaction so two concurrent demotions
        // cannot both observe a safe count.
        if target.role == Role::SuperAdmin && new_role != Role::SuperAdmin {
            let super_admins: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE role = ? AND is_active = 1",
            )
            .bind(Role::SuperAdmin.as_str())
            .fetch_one(&mut *tx)
            .await?;

            if super_admins <= 1 {
                drop(tx);
                self.audit
                    .record_best_effort(&AuditEntry {
                        actor_id: Some(changed_by.id.clone()),
                        action: "role.change".to_string(),
                        capability: Some(Capability::ManageRoles),
                        granted: false,
                        denial_reason: Some("last_super_admin_violation".to_string()),
                        reason: reason.map(str::to_string),
                        ..AuditEntry::default()
                    })
                    .await;
                return Err(PlatformError::LastSuperAdmin);
            }
        }

        let now = Utc::now();

        sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(new_role.as_str())
            .bind(now.to_rfc3339())
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO role_changes (user_id, changed_by, old_role, new_role, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(target_id)
        .bind(&changed_by.id)
        .bind(target.role.as_str())
        .bind(new_role.as_str())
        .bind(reason)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        // The audit row is part of the same atomic unit for role changes.
        let entry = AuditEntry::decision(
            Some(&changed_by.id),
            "role.change",
            Capability::ManageRoles,
            &decision,
        )
        .with_change(
            serde_json::json!({"user_id": target_id, "role": target.role.as_str()}),
            serde_json::json!({"user_id": target_id, "role": new_role.as_str()}),
        )
        .with_reason(reason.map(str::to_string));
        AuditLog::record_in_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        let mut updated = target;
        updated.role = new_role;
        updated.updated_at = now;
        Ok(updated)
    }

    /// Deactivate a user account. Deletion is a status change, never row
    /// removal: the account stays referenced by its audit history.
    pub async fn deactivate_user(
        &self,
        target_id: &str,
        changed_by: &Actor,
        reason: Option<&str>,
    ) -> PlatformResult<User> {
        let decision = permissions::evaluate(
            Some(changed_by),
            Capability::ManageUsers,
            Some(target_id),
            None,
        );
        if !decision.granted {
            self.audit
                .record_best_effort(&AuditEntry::decision(
                    Some(&changed_by.id),
                    "user.deactivate",
                    Capability::ManageUsers,
                    &decision,
                ))
                .await;
            return Err(PlatformError::PermissionDenied(decision.reason.to_string()));
        }

        let mut tx = self.db.begin().await?;

        let target = {
            let row = sqlx::query(
                "SELECT id, username, email, password_hash, role, is_active, created_at, updated_at
                 FROM users WHERE id = ?",
            )
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("User {} not found", target_id)))?;
            users::parse_user(row)?
        };

        if !target.is_active {
            return Err(PlatformError::Validation(format!(
                "User {} is already deactivated",
                target_id
            )));
        }

        // Deactivating the last super admin would orphan role governance
        // just as surely as demoting them.
        if target.role == Role::SuperAdmin {
            let super_admins: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE role = ? AND is_active = 1",
            )
            .bind(Role::SuperAdmin.as_str())
            .fetch_one(&mut *tx)
            .await?;

            if super_admins <= 1 {
                drop(tx);
                return Err(PlatformError::LastSuperAdmin);
            }
        }

        let now = Utc::now();
        sqlx::query("UPDATE users SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(now.to_rfc3339())
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(target_id)
            .execute(&mut *tx)
            .await?;

        let entry = AuditEntry::decision(
            Some(&changed_by.id),
            "user.deactivate",
            Capability::ManageUsers,
            &decision,
        )
        .with_change(
            serde_json::json!({"user_id": target_id, "is_active": true}),
            serde_json::json!({"user_id": target_id, "is_active": false}),
        )
        .with_reason(reason.map(str::to_string));
        AuditLog::record_in_tx(&mut tx, &entry).await?;

        tx.commit().await?;

        let mut updated = target;
        updated.is_active = false;
        updated.updated_at = now;
        Ok(updated)
    }

    /// Paginated role change history for a user, newest first
    pub async fn history(
        &self,
        user_id: &str,
        page: i64,
        size: i64,
    ) -> PlatformResult<Vec<RoleChangeRecord>> {
        let size = size.clamp(1, 100);
        let offset = page.max(0) * size;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, changed_by, old_role, new_role, reason, created_at
            FROM role_changes
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(size)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let old_role_str: String = row.get("old_role");
                let new_role_str: String = row.get("new_role");
                let created_at_str: String = row.get("created_at");
                let created_at = DateTime::parse_from_rfc3339(&created_at_str)
                    .map_err(|e| PlatformError::Internal(format!("Invalid timestamp: {}", e)))?
                    .with_timezone(&Utc);

                Ok(RoleChangeRecord {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    changed_by: row.get("changed_by"),
                    old_role: Role::from_str(&old_role_str)?,
                    new_role: Role::from_str(&new_role_str)?,
                    reason: row.get("reason"),
                    created_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::test_support::{actor, insert_user, setup_pool};

    fn coordinator(db: &SqlitePool) -> RoleChangeCoordinator {
        RoleChangeCoordinator::new(db.clone(), AuditLog::new(db.clone()))
    }

    #[tokio::test]
    async fn test_change_role_writes_record_and_audit_atomically() {
        let db = setup_pool().await;
        insert_user(&db, "boss", Role::SuperAdmin).await;
        insert_user(&db, "u1", Role::User).await;
        let rc = coordinator(&db);

        let updated = rc
            .change_role("u1", Role::Editor, &actor("boss", Role::SuperAdmin), Some("new hire"))
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Editor);

        let records: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role_changes WHERE user_id = 'u1'")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(records, 1);

        let audit_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE action = 'role.change' AND granted = 1")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(audit_rows, 1);
    }

    #[tokio::test]
    async fn test_self_change_forbidden_at_any_rank() {
        let db = setup_pool().await;
        insert_user(&db, "boss", Role::SuperAdmin).await;
        insert_user(&db, "other", Role::SuperAdmin).await;
        let rc = coordinator(&db);

        let err = rc
            .change_role("boss", Role::Admin, &actor("boss", Role::SuperAdmin), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::PermissionDenied(ref r) if r == "self_action_forbidden"));
    }

    #[tokio::test]
    async fn test_only_super_admin_changes_roles() {
        let db = setup_pool().await;
        insert_user(&db, "admin", Role::Admin).await;
        insert_user(&db, "u1", Role::User).await;
        let rc = coordinator(&db);

        let err = rc
            .change_role("u1", Role::Editor, &actor("admin", Role::Admin), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::PermissionDenied(ref r) if r == "insufficient_role"));

        // Denied decisions still produce exactly one audit row
        let audit_rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE action = 'role.change' AND granted = 0")
                .fetch_one(&db)
                .await
                .unwrap();
        assert_eq!(audit_rows, 1);
    }

    #[tokio::test]
    async fn test_last_super_admin_protected() {
        let db = setup_pool().await;
        // Exactly one stored super admin; the caller is a bootstrap admin
        // elevated at auth time, not counted in the table.
        insert_user(&db, "only", Role::SuperAdmin).await;
        insert_user(&db, "bootstrap", Role::User).await;
        let rc = coordinator(&db);

        let failure = rc
            .change_role("only", Role::Admin, &actor("bootstrap", Role::SuperAdmin), None)
            .await
            .unwrap_err();
        assert!(matches!(failure, PlatformError::LastSuperAdmin));

        // Role unchanged
        let role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = 'only'")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(role, "super_admin");
    }

    #[tokio::test]
    async fn test_demotion_allowed_while_another_super_admin_remains() {
        let db = setup_pool().await;
        insert_user(&db, "s1", Role::SuperAdmin).await;
        insert_user(&db, "s2", Role::SuperAdmin).await;
        insert_user(&db, "s3", Role::SuperAdmin).await;
        let rc = coordinator(&db);

        rc.change_role("s1", Role::Admin, &actor("s3", Role::SuperAdmin), None)
            .await
            .unwrap();
        rc.change_role("s2", Role::Admin, &actor("s3", Role::SuperAdmin), None)
            .await
            .unwrap();

        // s3 is now the last one standing
        let failure = rc
            .change_role("s3", Role::Admin, &actor("s1", Role::SuperAdmin), None)
            .await
            .unwrap_err();
        assert!(matches!(failure, PlatformError::LastSuperAdmin));
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let db = setup_pool().await;
        insert_user(&db, "boss", Role::SuperAdmin).await;
        let rc = coordinator(&db);

        let err = rc
            .change_role("ghost", Role::Editor, &actor("boss", Role::SuperAdmin), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_history_is_paginated_newest_first() {
        let db = setup_pool().await;
        insert_user(&db, "boss", Role::SuperAdmin).await;
        insert_user(&db, "u1", Role::User).await;
        let rc = coordinator(&db);
        let boss = actor("boss", Role::SuperAdmin);

        rc.change_role("u1", Role::Editor, &boss, Some("hire")).await.unwrap();
        rc.change_role("u1", Role::Moderator, &boss, Some("shift")).await.unwrap();
        rc.change_role("u1", Role::Admin, &boss, Some("promote")).await.unwrap();

        let first_page = rc.history("u1", 0, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].new_role, Role::Admin);

        let second_page = rc.history("u1", 1, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].new_role, Role::Editor);
    }

    #[tokio::test]
    async fn test_deactivate_flips_status_and_keeps_row() {
        let db = setup_pool().await;
        insert_user(&db, "admin", Role::Admin).await;
        insert_user(&db, "u1", Role::User).await;
        let rc = coordinator(&db);

        let updated = rc
            .deactivate_user("u1", &actor("admin", Role::Admin), Some("spam account"))
            .await
            .unwrap();
        assert!(!updated.is_active);

        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = 'u1'")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(exists, 1);
    }

    #[tokio::test]
    async fn test_cannot_deactivate_self_or_last_super_admin() {
        let db = setup_pool().await;
        insert_user(&db, "only", Role::SuperAdmin).await;
        insert_user(&db, "admin", Role::Admin).await;
        let rc = coordinator(&db);

        let err = rc
            .deactivate_user("admin", &actor("admin", Role::Admin), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::PermissionDenied(ref r) if r == "self_action_forbidden"));

        let err = rc
            .deactivate_user("only", &actor("admin", Role::Admin), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::LastSuperAdmin));
    }
}
