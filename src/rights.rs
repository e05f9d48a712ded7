//! Profile Dashboard Rights
//!
//! Per-profile access rights on Grafana dashboards, keyed by dashboard UID.
//! Folders are not access-controlled; only dashboard leaves are.
//!
//! One row per `(profile, dashboard)` pair holding a rights bitmask. Only the
//! `READ` bit is meaningful for embedding. Rows are upserted by the admin
//! action and dropped wholesale on uninstall.

use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Host profile identifier
pub type ProfileId = i64;

/// Rights table name
pub const RIGHTS_TABLE: &str = "grafana_profile_rights";

/// Rights bitmask, using the host's bit layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rights(pub i64);

impl Rights {
    pub const NONE: Rights = Rights(0);
    pub const READ: Rights = Rights(1);
    pub const UPDATE: Rights = Rights(2);
    pub const CREATE: Rights = Rights(4);
    pub const DELETE: Rights = Rights(8);
    pub const PURGE: Rights = Rights(16);

    pub fn contains(self, other: Rights) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn can_read(self) -> bool {
        self.contains(Rights::READ)
    }
}

impl From<i64> for Rights {
    fn from(bits: i64) -> Self {
        Rights(bits)
    }
}

/// Read side of the rights table, as consumed by the dashboard tree filter
pub trait AccessRights {
    /// Rights of `profile` on a dashboard; no stored row means no rights
    fn get_right(&self, profile: ProfileId, dashboard_uid: &str) -> Result<Rights>;

    /// True iff at least one stored right of `profile` has the read bit
    fn can_view_any(&self, profile: ProfileId) -> Result<bool>;

    /// Read bit of `get_right`
    fn can_view(&self, profile: ProfileId, dashboard_uid: &str) -> Result<bool> {
        Ok(self.get_right(profile, dashboard_uid)?.can_read())
    }
}

/// SQLite-backed rights table
pub struct RightsStore {
    conn: Connection,
}

impl RightsStore {
    /// Open the rights database and make sure the table exists
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            conn: Connection::open(path)?,
        };
        store.install()?;

        debug!("Rights store opened: {}", path.display());
        Ok(store)
    }

    /// In-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.install()?;
        Ok(store)
    }

    /// Create the rights table; idempotent
    pub fn install(&self) -> Result<()> {
        self.conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profiles_id INTEGER NOT NULL,
                dashboard_uuid TEXT NOT NULL,
                rights INTEGER NOT NULL,
                UNIQUE (profiles_id, dashboard_uuid)
            );
            "#,
            table = RIGHTS_TABLE
        ))?;

        Ok(())
    }

    /// Drop the whole table (uninstall)
    pub fn drop_table(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", RIGHTS_TABLE))?;

        info!("Dropped rights table {}", RIGHTS_TABLE);
        Ok(())
    }

    /// Upsert the rights of `profile` on one dashboard
    pub fn set_right(&self, profile: ProfileId, dashboard_uid: &str, rights: Rights) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (profiles_id, dashboard_uuid, rights) VALUES (?1, ?2, ?3)
                 ON CONFLICT (profiles_id, dashboard_uuid) DO UPDATE SET rights = excluded.rights",
                RIGHTS_TABLE
            ),
            params![profile, dashboard_uid, rights.0],
        )?;

        debug!("Set rights {} for profile {} on {}", rights.0, profile, dashboard_uid);
        Ok(())
    }

    /// Upsert several rights of `profile` in one transaction
    pub fn set_rights<'a, I>(&mut self, profile: ProfileId, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (&'a str, Rights)>,
    {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (profiles_id, dashboard_uuid, rights) VALUES (?1, ?2, ?3)
                 ON CONFLICT (profiles_id, dashboard_uuid) DO UPDATE SET rights = excluded.rights",
                RIGHTS_TABLE
            ))?;

            for (uid, rights) in entries {
                stmt.execute(params![profile, uid, rights.0])?;
                count += 1;
            }
        }

        tx.commit()?;

        debug!("Updated {} rights for profile {}", count, profile);
        Ok(count)
    }

    /// Upsert the same rights on every listed dashboard, atomically
    pub fn set_rights_for_all<'a, I>(&mut self, profile: ProfileId, dashboard_uids: I, rights: Rights) -> Result<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let count = self.set_rights(profile, dashboard_uids.into_iter().map(|uid| (uid, rights)))?;

        info!("Set rights {} for profile {} on {} dashboards", rights.0, profile, count);
        Ok(count)
    }

    /// All stored rights of a profile, by dashboard UID
    pub fn rights_for_profile(&self, profile: ProfileId) -> Result<HashMap<String, Rights>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT dashboard_uuid, rights FROM {} WHERE profiles_id = ?1",
            RIGHTS_TABLE
        ))?;

        let rows = stmt
            .query_map(params![profile], |row| {
                Ok((row.get::<_, String>(0)?, Rights(row.get(1)?)))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        Ok(rows)
    }
}

impl AccessRights for RightsStore {
    fn get_right(&self, profile: ProfileId, dashboard_uid: &str) -> Result<Rights> {
        let rights: Option<i64> = self
            .conn
            .query_row(
                &format!(
                    "SELECT rights FROM {} WHERE profiles_id = ?1 AND dashboard_uuid = ?2",
                    RIGHTS_TABLE
                ),
                params![profile, dashboard_uid],
                |row| row.get(0),
            )
            .optional()?;

        Ok(rights.map(Rights).unwrap_or(Rights::NONE))
    }

    fn can_view_any(&self, profile: ProfileId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE profiles_id = ?1 AND (rights & ?2) = ?2 LIMIT 1",
                    RIGHTS_TABLE
                ),
                params![profile, Rights::READ.0],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }
}

/// In-memory rights, for callers that already hold them
#[derive(Debug, Clone, Default)]
pub struct StaticRights {
    rights: HashMap<(ProfileId, String), Rights>,
}

impl StaticRights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(mut self, profile: ProfileId, dashboard_uid: &str, rights: Rights) -> Self {
        self.rights.insert((profile, dashboard_uid.to_string()), rights);
        self
    }
}

impl AccessRights for StaticRights {
    fn get_right(&self, profile: ProfileId, dashboard_uid: &str) -> Result<Rights> {
        Ok(self
            .rights
            .get(&(profile, dashboard_uid.to_string()))
            .copied()
            .unwrap_or(Rights::NONE))
    }

    fn can_view_any(&self, profile: ProfileId) -> Result<bool> {
        Ok(self
            .rights
            .iter()
            .any(|((p, _), r)| *p == profile && r.can_read()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_right_is_none() {
        let store = RightsStore::open_in_memory().unwrap();

        assert_eq!(store.get_right(1, "d1").unwrap(), Rights::NONE);
        assert!(!store.can_view(1, "d1").unwrap());
    }

    #[test]
    fn test_set_right_upserts() {
        let store = RightsStore::open_in_memory().unwrap();

        store.set_right(1, "d1", Rights::READ).unwrap();
        assert!(store.can_view(1, "d1").unwrap());

        store.set_right(1, "d1", Rights::NONE).unwrap();
        assert!(!store.can_view(1, "d1").unwrap());

        assert_eq!(store.rights_for_profile(1).unwrap().len(), 1);
    }

    #[test]
    fn test_rights_are_per_profile() {
        let store = RightsStore::open_in_memory().unwrap();
        store.set_right(1, "d1", Rights::READ).unwrap();

        assert!(store.can_view(1, "d1").unwrap());
        assert!(!store.can_view(2, "d1").unwrap());
    }

    #[test]
    fn test_can_view_any() {
        let store = RightsStore::open_in_memory().unwrap();
        assert!(!store.can_view_any(1).unwrap());

        store.set_right(1, "d1", Rights::NONE).unwrap();
        assert!(!store.can_view_any(1).unwrap());

        store.set_right(1, "d2", Rights(Rights::READ.0 | Rights::UPDATE.0)).unwrap();
        assert!(store.can_view_any(1).unwrap());
        assert!(!store.can_view_any(2).unwrap());
    }

    #[test]
    fn test_set_rights_for_all() {
        let mut store = RightsStore::open_in_memory().unwrap();
        store.set_right(1, "d1", Rights::NONE).unwrap();

        let count = store
            .set_rights_for_all(1, ["d1", "d2", "d3"], Rights::READ)
            .unwrap();
        assert_eq!(count, 3);

        let rights = store.rights_for_profile(1).unwrap();
        assert_eq!(rights.len(), 3);
        assert!(rights.values().all(|r| r.can_read()));
    }

    #[test]
    fn test_set_rights_mixed() {
        let mut store = RightsStore::open_in_memory().unwrap();

        let count = store
            .set_rights(2, [("d1", Rights::READ), ("d2", Rights::NONE)])
            .unwrap();
        assert_eq!(count, 2);
        assert!(store.can_view(2, "d1").unwrap());
        assert!(!store.can_view(2, "d2").unwrap());
    }

    #[test]
    fn test_drop_table() {
        let store = RightsStore::open_in_memory().unwrap();
        store.set_right(1, "d1", Rights::READ).unwrap();

        store.drop_table().unwrap();
        assert!(store.get_right(1, "d1").is_err());

        store.install().unwrap();
        assert_eq!(store.get_right(1, "d1").unwrap(), Rights::NONE);
    }

    #[test]
    fn test_rights_bits() {
        assert!(Rights(3).can_read());
        assert!(!Rights(2).can_read());
        assert!(Rights(3).contains(Rights::UPDATE));
    }

    #[test]
    fn test_static_rights() {
        let rights = StaticRights::new().grant(1, "d1", Rights::READ);

        assert!(rights.can_view(1, "d1").unwrap());
        assert!(!rights.can_view(1, "d2").unwrap());
        assert!(rights.can_view_any(1).unwrap());
        assert!(!rights.can_view_any(2).unwrap());
    }
}
