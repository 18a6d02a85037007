//! SQLite-backed grant store

use super::GrantStore;
use crate::error::Result;
use crate::model::{
    AccessGrant, AccessLevel, BackupUid, ClusterId, ClusterShareRule, GrantOrigin, PrincipalId,
    PrincipalKind,
};
use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS grants (
    object_id      TEXT NOT NULL,
    principal_id   TEXT NOT NULL,
    level          INTEGER NOT NULL,
    granted_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    origin_cluster TEXT,
    PRIMARY KEY (object_id, principal_id)
);
CREATE INDEX IF NOT EXISTS grants_by_principal ON grants (principal_id);

CREATE TABLE IF NOT EXISTS cluster_rules (
    cluster_id     TEXT NOT NULL,
    principal_id   TEXT NOT NULL,
    kind           TEXT NOT NULL,
    level          INTEGER NOT NULL,
    enabled        INTEGER NOT NULL,
    updated_by     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (cluster_id, principal_id)
);
";

const GRANT_COLUMNS: &str =
    "object_id, principal_id, level, granted_by, created_at, origin_cluster";

const RULE_COLUMNS: &str =
    "cluster_id, principal_id, kind, level, enabled, updated_by, updated_at";

impl ToSql for AccessLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for AccessLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        AccessLevel::from_i64(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<AccessGrant> {
    let origin: Option<String> = row.get(5)?;
    Ok(AccessGrant {
        object: BackupUid::new(row.get::<_, String>(0)?),
        principal: PrincipalId::new(row.get::<_, String>(1)?),
        level: row.get(2)?,
        granted_by: PrincipalId::new(row.get::<_, String>(3)?),
        created_at: row.get(4)?,
        origin: match origin {
            Some(cluster) => GrantOrigin::Cluster(ClusterId::new(cluster)),
            None => GrantOrigin::Direct,
        },
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<ClusterShareRule> {
    let kind: String = row.get(2)?;
    let kind = PrincipalKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown principal kind '{}'", kind).into(),
        )
    })?;
    Ok(ClusterShareRule {
        cluster: ClusterId::new(row.get::<_, String>(0)?),
        principal: PrincipalId::new(row.get::<_, String>(1)?),
        kind,
        level: row.get(3)?,
        enabled: row.get(4)?,
        updated_by: PrincipalId::new(row.get::<_, String>(5)?),
        updated_at: row.get(6)?,
    })
}

/// Grant store persisted to a SQLite database file
pub struct SqliteGrantStore {
    conn: Mutex<Connection>,
}

impl SqliteGrantStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening grant store at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    /// Private database that disappears with the store
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteGrantStore {
            conn: Mutex::new(conn),
        })
    }

    fn query_grants(&self, filter: &str, key: &str) -> Result<Vec<AccessGrant>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM grants WHERE {}", GRANT_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![key], grant_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl GrantStore for SqliteGrantStore {
    fn put_grant(&self, grant: AccessGrant) -> Result<Option<AccessGrant>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let previous = tx
            .query_row(
                &format!(
                    "SELECT {} FROM grants WHERE object_id = ?1 AND principal_id = ?2",
                    GRANT_COLUMNS
                ),
                params![grant.object.as_str(), grant.principal.as_str()],
                grant_from_row,
            )
            .optional()?;

        tx.execute(
            "INSERT INTO grants (object_id, principal_id, level, granted_by, created_at, origin_cluster)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (object_id, principal_id) DO UPDATE SET
                level = excluded.level,
                granted_by = excluded.granted_by,
                created_at = excluded.created_at,
                origin_cluster = excluded.origin_cluster",
            params![
                grant.object.as_str(),
                grant.principal.as_str(),
                grant.level,
                grant.granted_by.as_str(),
                grant.created_at,
                grant.origin.cluster().map(|c| c.as_str()),
            ],
        )?;

        tx.commit()?;
        Ok(previous)
    }

    fn put_cluster_grant(&self, grant: AccessGrant) -> Result<bool> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            "INSERT INTO grants (object_id, principal_id, level, granted_by, created_at, origin_cluster)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (object_id, principal_id) DO UPDATE SET
                level = excluded.level,
                granted_by = excluded.granted_by,
                created_at = excluded.created_at,
                origin_cluster = excluded.origin_cluster
             WHERE grants.origin_cluster IS NOT NULL
               AND (grants.level != excluded.level
                    OR grants.origin_cluster != excluded.origin_cluster)",
            params![
                grant.object.as_str(),
                grant.principal.as_str(),
                grant.level,
                grant.granted_by.as_str(),
                grant.created_at,
                grant.origin.cluster().map(|c| c.as_str()),
            ],
        )?;
        Ok(changed > 0)
    }

    fn grant(&self, object: &BackupUid, principal: &PrincipalId) -> Result<Option<AccessGrant>> {
        let conn = self.conn.lock();
        let grant = conn
            .query_row(
                &format!(
                    "SELECT {} FROM grants WHERE object_id = ?1 AND principal_id = ?2",
                    GRANT_COLUMNS
                ),
                params![object.as_str(), principal.as_str()],
                grant_from_row,
            )
            .optional()?;
        Ok(grant)
    }

    fn grants_for_object(&self, object: &BackupUid) -> Result<Vec<AccessGrant>> {
        self.query_grants("object_id = ?1 ORDER BY principal_id", object.as_str())
    }

    fn grants_for_principal(&self, principal: &PrincipalId) -> Result<Vec<AccessGrant>> {
        self.query_grants("principal_id = ?1 ORDER BY object_id", principal.as_str())
    }

    fn remove_grant(&self, object: &BackupUid, principal: &PrincipalId) -> Result<bool> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM grants WHERE object_id = ?1 AND principal_id = ?2",
            params![object.as_str(), principal.as_str()],
        )?;
        Ok(removed > 0)
    }

    fn remove_cluster_grants(&self, cluster: &ClusterId, principal: &PrincipalId) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM grants WHERE origin_cluster = ?1 AND principal_id = ?2",
            params![cluster.as_str(), principal.as_str()],
        )?)
    }

    fn remove_grants_for_object(&self, object: &BackupUid) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM grants WHERE object_id = ?1",
            params![object.as_str()],
        )?)
    }

    fn remove_grants_for_principal(&self, principal: &PrincipalId) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM grants WHERE principal_id = ?1",
            params![principal.as_str()],
        )?)
    }

    fn put_rule(&self, rule: ClusterShareRule) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cluster_rules (cluster_id, principal_id, kind, level, enabled, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (cluster_id, principal_id) DO UPDATE SET
                kind = excluded.kind,
                level = excluded.level,
                enabled = excluded.enabled,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at",
            params![
                rule.cluster.as_str(),
                rule.principal.as_str(),
                rule.kind.as_str(),
                rule.level,
                rule.enabled,
                rule.updated_by.as_str(),
                rule.updated_at,
            ],
        )?;
        Ok(())
    }

    fn rule(&self, cluster: &ClusterId, principal: &PrincipalId) -> Result<Option<ClusterShareRule>> {
        let conn = self.conn.lock();
        let rule = conn
            .query_row(
                &format!(
                    "SELECT {} FROM cluster_rules WHERE cluster_id = ?1 AND principal_id = ?2",
                    RULE_COLUMNS
                ),
                params![cluster.as_str(), principal.as_str()],
                rule_from_row,
            )
            .optional()?;
        Ok(rule)
    }

    fn rules_for_cluster(&self, cluster: &ClusterId) -> Result<Vec<ClusterShareRule>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM cluster_rules WHERE cluster_id = ?1 ORDER BY principal_id",
            RULE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![cluster.as_str()], rule_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn remove_rules_for_principal(&self, principal: &PrincipalId) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM cluster_rules WHERE principal_id = ?1",
            params![principal.as_str()],
        )?)
    }

    fn remove_rules_for_cluster(&self, cluster: &ClusterId) -> Result<usize> {
        let conn = self.conn.lock();
        Ok(conn.execute(
            "DELETE FROM cluster_rules WHERE cluster_id = ?1",
            params![cluster.as_str()],
        )?)
    }

    fn grant_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM grants", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_upsert_returns_previous() {
        let store = SqliteGrantStore::in_memory().unwrap();
        let grant = AccessGrant::direct(
            BackupUid::new("b1"),
            PrincipalId::new("u1"),
            AccessLevel::Restore,
            PrincipalId::admin(),
            Utc::now(),
        );
        assert!(store.put_grant(grant.clone()).unwrap().is_none());

        let previous = store
            .put_grant(AccessGrant {
                level: AccessLevel::Full,
                ..grant.clone()
            })
            .unwrap()
            .unwrap();
        assert_eq!(previous.level, AccessLevel::Restore);
        assert_eq!(store.grant_count().unwrap(), 1);
    }

    #[test]
    fn test_origin_survives_storage() {
        let store = SqliteGrantStore::in_memory().unwrap();
        let cluster = ClusterId::new("c1");
        store
            .put_grant(AccessGrant::from_cluster(
                BackupUid::new("b1"),
                PrincipalId::new("g1"),
                AccessLevel::Full,
                PrincipalId::admin(),
                Utc::now(),
                cluster.clone(),
            ))
            .unwrap();

        let stored = store
            .grant(&BackupUid::new("b1"), &PrincipalId::new("g1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.origin, GrantOrigin::Cluster(cluster));
    }

    #[test]
    fn test_cluster_grant_skips_direct_rows() {
        let store = SqliteGrantStore::in_memory().unwrap();
        let direct = AccessGrant::direct(
            BackupUid::new("b1"),
            PrincipalId::new("u1"),
            AccessLevel::ViewOnly,
            PrincipalId::admin(),
            Utc::now(),
        );
        store.put_grant(direct).unwrap();

        let fanned = AccessGrant::from_cluster(
            BackupUid::new("b1"),
            PrincipalId::new("u1"),
            AccessLevel::Full,
            PrincipalId::admin(),
            Utc::now(),
            ClusterId::new("c1"),
        );
        assert!(!store.put_cluster_grant(fanned.clone()).unwrap());
        let stored = store
            .grant(&BackupUid::new("b1"), &PrincipalId::new("u1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.origin, GrantOrigin::Direct);

        let other = AccessGrant {
            principal: PrincipalId::new("u2"),
            ..fanned.clone()
        };
        assert!(store.put_cluster_grant(other.clone()).unwrap());
        assert!(!store.put_cluster_grant(other.clone()).unwrap());
        assert!(store
            .put_cluster_grant(AccessGrant {
                level: AccessLevel::Restore,
                ..other
            })
            .unwrap());
        assert_eq!(store.grant_count().unwrap(), 2);
    }

    #[test]
    fn test_rejects_corrupt_level() {
        let store = SqliteGrantStore::in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO grants VALUES ('b1', 'u1', 9, 'admin', ?1, NULL)",
                params![Utc::now()],
            )
            .unwrap();
        assert!(store
            .grant(&BackupUid::new("b1"), &PrincipalId::new("u1"))
            .is_err());
    }
}
