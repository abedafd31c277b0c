//! The folder interface the search engine works against.

use std::sync::Arc;

use crate::error::Result;
use crate::model::mail::{MessageInfo, Uid};
use crate::model::message::MimeMessage;

/// A mail folder: a summary of messages plus on-demand access to each full
/// message.
///
/// Summary records are cheap and always available; full messages may be
/// expensive (disk I/O, MIME parsing) and are fetched only by predicates
/// that need headers outside the summary or the body.
pub trait Folder {
    /// Name of the folder; also the summary database table name.
    fn full_name(&self) -> &str;

    /// URI compared by `message-location`.
    fn location_uri(&self) -> String;

    /// Folders with no persistent summary always use the in-memory path.
    fn is_in_memory_only(&self) -> bool {
        false
    }

    /// Aggregated folders (virtual folders over several stores) get a bulk
    /// pre-fetch before a full scan.
    fn is_aggregate(&self) -> bool {
        false
    }

    /// All message identifiers, in summary order.
    fn summary(&self) -> Vec<Uid>;

    /// The summary record for `uid`, if the message is still present.
    fn message_info(&self, uid: &str) -> Option<Arc<MessageInfo>>;

    /// Hint that every summary record is about to be read.
    fn prepare_fetch_all(&self) {}

    /// Fetch and parse the full message.
    fn get_message(&self, uid: &str) -> Result<Arc<MimeMessage>>;

    /// The relational summary store, when the folder has one.
    fn database(&self) -> Option<&dyn SummaryDatabase> {
        None
    }

    /// Flush pending summary changes to the database before a delegated query.
    fn sync_summary(&self) -> Result<()> {
        Ok(())
    }
}

/// A relational store holding one summary table per folder.
pub trait SummaryDatabase {
    /// Run a `SELECT uid ...` query and return the uid column.
    fn select_uids(&self, sql: &str) -> Result<Vec<String>>;

    /// Run a `SELECT COUNT(*) ...` query.
    fn count(&self, sql: &str) -> Result<u32>;
}
