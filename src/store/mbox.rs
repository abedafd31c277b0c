//! Folder backed by an MBOX file and its persisted summary index.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, SearchError};
use crate::index::builder;
use crate::index::format::MboxEntry;
use crate::model::mail::{MessageInfo, Uid};
use crate::model::message::MimeMessage;
use crate::store::folder::{Folder, SummaryDatabase};
use crate::store::reader::{MboxStore, DEFAULT_CACHE_SIZE};
use crate::store::sqlite::SqliteStore;

/// How an [`MboxFolder`] is opened.
#[derive(Debug, Clone)]
pub struct FolderOptions {
    /// Where the summary index goes when it cannot be written next to the MBOX.
    pub cache_dir: PathBuf,
    /// Size of the parsed-message LRU.
    pub max_cached_messages: usize,
    /// Ignore any persisted index and rescan the file.
    pub force_rebuild: bool,
    /// Never use the summary database, even when one is attached.
    pub in_memory_only: bool,
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("mailsexp"),
            max_cached_messages: DEFAULT_CACHE_SIZE,
            force_rebuild: false,
            in_memory_only: false,
        }
    }
}

/// An MBOX file presented as a searchable folder.
///
/// Uids are the 1-based sequence numbers of the messages in the file.
pub struct MboxFolder {
    name: String,
    path: PathBuf,
    entries: Vec<MboxEntry>,
    infos: Vec<Arc<MessageInfo>>,
    by_uid: HashMap<Uid, usize>,
    store: RefCell<MboxStore>,
    database: Option<SqliteStore>,
    in_memory_only: bool,
    synced: Cell<bool>,
}

impl MboxFolder {
    /// Open an MBOX, loading or building its summary index.
    pub fn open(
        path: impl AsRef<Path>,
        options: &FolderOptions,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries =
            builder::build_index(&path, &options.cache_dir, options.force_rebuild, progress)?;
        let store = MboxStore::open(&path, options.max_cached_messages)?;

        let infos: Vec<Arc<MessageInfo>> =
            entries.iter().map(|e| Arc::new(e.info.clone())).collect();
        let by_uid = infos
            .iter()
            .enumerate()
            .map(|(i, info)| (info.uid.clone(), i))
            .collect();

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mbox".to_string());

        info!(folder = %name, messages = entries.len(), "Opened MBOX folder");

        Ok(Self {
            name,
            path,
            entries,
            infos,
            by_uid,
            store: RefCell::new(store),
            database: None,
            in_memory_only: options.in_memory_only,
            synced: Cell::new(false),
        })
    }

    /// Attach a summary database; the folder's summary is written into it
    /// before the first delegated query.
    pub fn with_database(mut self, database: SqliteStore) -> Self {
        self.database = Some(database);
        self.synced.set(false);
        self
    }

    /// Path of the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of messages in the folder.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Folder for MboxFolder {
    fn full_name(&self) -> &str {
        &self.name
    }

    fn location_uri(&self) -> String {
        format!("mbox://{}", self.path.display())
    }

    fn is_in_memory_only(&self) -> bool {
        self.in_memory_only
    }

    fn summary(&self) -> Vec<Uid> {
        self.infos.iter().map(|i| i.uid.clone()).collect()
    }

    fn message_info(&self, uid: &str) -> Option<Arc<MessageInfo>> {
        self.by_uid.get(uid).map(|&i| self.infos[i].clone())
    }

    fn get_message(&self, uid: &str) -> Result<Arc<MimeMessage>> {
        let index = *self
            .by_uid
            .get(uid)
            .ok_or_else(|| SearchError::MessageUnavailable(uid.to_string()))?;
        let mut store = self
            .store
            .try_borrow_mut()
            .map_err(|_| SearchError::MessageUnavailable(uid.to_string()))?;
        store.get_message(&self.entries[index])
    }

    fn database(&self) -> Option<&dyn SummaryDatabase> {
        self.database.as_ref().map(|db| db as &dyn SummaryDatabase)
    }

    fn sync_summary(&self) -> Result<()> {
        let Some(db) = &self.database else {
            return Ok(());
        };
        if self.synced.get() {
            return Ok(());
        }
        debug!(folder = %self.name, "Writing summary to database");
        db.store_summary(&self.name, self.infos.iter().map(Arc::as_ref))?;
        self.synced.set(true);
        Ok(())
    }
}
