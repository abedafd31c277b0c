//! SQLite summary database for the delegated search path.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::model::flags::MessageFlags;
use crate::model::mail::MessageInfo;
use crate::store::folder::SummaryDatabase;
use crate::store::sql::quote_identifier;

/// Column layout of a folder's summary table. `labels` holds the user flags
/// separated by single spaces; `usertags` holds the user tags as JSON.
const TABLE_COLUMNS: &str = "
    uid TEXT PRIMARY KEY,
    flags INTEGER NOT NULL DEFAULT 0,
    read INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    replied INTEGER NOT NULL DEFAULT 0,
    important INTEGER NOT NULL DEFAULT 0,
    junk INTEGER NOT NULL DEFAULT 0,
    attachment INTEGER NOT NULL DEFAULT 0,
    size INTEGER NOT NULL DEFAULT 0,
    dsent INTEGER NOT NULL DEFAULT 0,
    dreceived INTEGER NOT NULL DEFAULT 0,
    subject TEXT,
    mail_from TEXT,
    mail_to TEXT,
    mail_cc TEXT,
    mlist TEXT,
    labels TEXT,
    usertags TEXT
";

/// A summary database with one table per folder.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| SearchError::Store {
            query: format!("open {}", path.display()),
            message: e.to_string(),
        })?;
        Ok(Self { conn })
    }

    /// A private database that lives as long as the store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| SearchError::Store {
            query: "open :memory:".into(),
            message: e.to_string(),
        })?;
        Ok(Self { conn })
    }

    /// Replace the summary table of `folder` with `infos`, creating it if
    /// needed. Rows keep the iteration order.
    pub fn store_summary<'a>(
        &self,
        folder: &str,
        infos: impl IntoIterator<Item = &'a MessageInfo>,
    ) -> Result<()> {
        let table = quote_identifier(folder);
        let create = format!("CREATE TABLE IF NOT EXISTS {table} ({TABLE_COLUMNS})");
        self.conn
            .execute_batch(&create)
            .map_err(|e| SearchError::from((create.clone(), e)))?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| SearchError::from(("BEGIN".to_string(), e)))?;

        let delete = format!("DELETE FROM {table}");
        tx.execute(&delete, [])
            .map_err(|e| SearchError::from((delete.clone(), e)))?;

        let insert = format!(
            "INSERT INTO {table} (uid, flags, read, deleted, replied, important, junk, \
             attachment, size, dsent, dreceived, subject, mail_from, mail_to, mail_cc, mlist, \
             labels, usertags) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        );
        let mut rows = 0usize;
        {
            let mut stmt = tx
                .prepare(&insert)
                .map_err(|e| SearchError::from((insert.clone(), e)))?;

            for info in infos {
                let flags = info.flags;
                let labels = info
                    .user_flags
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(" ");
                let usertags = serde_json::to_string(&info.user_tags).unwrap_or_default();
                stmt.execute(params![
                    &*info.uid,
                    flags.bits() as i64,
                    flags.contains(MessageFlags::SEEN),
                    flags.contains(MessageFlags::DELETED),
                    flags.contains(MessageFlags::ANSWERED),
                    flags.contains(MessageFlags::FLAGGED),
                    flags.contains(MessageFlags::JUNK),
                    flags.contains(MessageFlags::ATTACHMENTS),
                    info.size as i64,
                    info.date_sent,
                    info.date_received,
                    info.subject,
                    info.from,
                    info.to,
                    info.cc,
                    info.mlist,
                    labels,
                    usertags,
                ])
                .map_err(|e| SearchError::from((insert.clone(), e)))?;
                rows += 1;
            }
        }

        tx.commit()
            .map_err(|e| SearchError::from(("COMMIT".to_string(), e)))?;
        debug!(folder, rows, "Summary table written");
        Ok(())
    }

    /// Drop a folder's summary table if it exists.
    pub fn drop_summary(&self, folder: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_identifier(folder));
        self.conn
            .execute_batch(&sql)
            .map_err(|e| SearchError::from((sql, e)))
    }
}

impl SummaryDatabase for SqliteStore {
    fn select_uids(&self, sql: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SearchError::from((sql.to_string(), e)))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| SearchError::from((sql.to_string(), e)))?;

        let mut uids = Vec::new();
        for row in rows {
            uids.push(row.map_err(|e| SearchError::from((sql.to_string(), e)))?);
        }
        Ok(uids)
    }

    fn count(&self, sql: &str) -> Result<u32> {
        self.conn
            .query_row(sql, [], |row| row.get::<_, i64>(0))
            .map(|n| n.max(0) as u32)
            .map_err(|e| SearchError::from((sql.to_string(), e)))
    }
}
