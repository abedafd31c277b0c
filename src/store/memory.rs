//! A folder held entirely in memory, for embedding and tests.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SearchError};
use crate::model::mail::{MessageInfo, Uid};
use crate::model::message::MimeMessage;
use crate::store::folder::{Folder, SummaryDatabase};
use crate::store::sqlite::SqliteStore;

/// An in-memory folder.
#[derive(Default)]
pub struct MemoryFolder {
    name: String,
    infos: Vec<Arc<MessageInfo>>,
    by_uid: HashMap<Uid, usize>,
    messages: HashMap<Uid, Arc<MimeMessage>>,
    database: Option<SqliteStore>,
    in_memory_only: bool,
    aggregate: bool,
    fetches: Cell<usize>,
    prepared: Cell<bool>,
}

impl MemoryFolder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Append a message summary, optionally with its full content.
    ///
    /// A later record with the same uid replaces the earlier one.
    pub fn add(&mut self, info: MessageInfo, message: Option<MimeMessage>) {
        let uid = info.uid.clone();
        if let Some(message) = message {
            self.messages.insert(uid.clone(), Arc::new(message));
        }
        match self.by_uid.get(&uid) {
            Some(&i) => self.infos[i] = Arc::new(info),
            None => {
                self.by_uid.insert(uid, self.infos.len());
                self.infos.push(Arc::new(info));
            }
        }
    }

    pub fn with_database(mut self, database: SqliteStore) -> Self {
        self.database = Some(database);
        self
    }

    pub fn set_in_memory_only(&mut self, in_memory_only: bool) {
        self.in_memory_only = in_memory_only;
    }

    pub fn set_aggregate(&mut self, aggregate: bool) {
        self.aggregate = aggregate;
    }

    /// How many full messages have been fetched so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }

    /// Whether `prepare_fetch_all` has been called.
    pub fn was_prepared(&self) -> bool {
        self.prepared.get()
    }
}

impl Folder for MemoryFolder {
    fn full_name(&self) -> &str {
        &self.name
    }

    fn location_uri(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn is_in_memory_only(&self) -> bool {
        self.in_memory_only
    }

    fn is_aggregate(&self) -> bool {
        self.aggregate
    }

    fn summary(&self) -> Vec<Uid> {
        self.infos.iter().map(|i| i.uid.clone()).collect()
    }

    fn message_info(&self, uid: &str) -> Option<Arc<MessageInfo>> {
        self.by_uid.get(uid).map(|&i| self.infos[i].clone())
    }

    fn prepare_fetch_all(&self) {
        self.prepared.set(true);
    }

    fn get_message(&self, uid: &str) -> Result<Arc<MimeMessage>> {
        self.fetches.set(self.fetches.get() + 1);
        self.messages
            .get(uid)
            .cloned()
            .ok_or_else(|| SearchError::MessageUnavailable(uid.to_string()))
    }

    fn database(&self) -> Option<&dyn SummaryDatabase> {
        self.database.as_ref().map(|db| db as &dyn SummaryDatabase)
    }

    fn sync_summary(&self) -> Result<()> {
        match &self.database {
            Some(db) => db.store_summary(&self.name, self.infos.iter().map(Arc::as_ref)),
            None => Ok(()),
        }
    }
}
