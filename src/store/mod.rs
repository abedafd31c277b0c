//! Folder backends and the relational summary store.

pub mod folder;
pub mod mbox;
pub mod memory;
pub mod reader;
pub mod sql;
pub mod sqlite;

pub use folder::{Folder, SummaryDatabase};
pub use mbox::{FolderOptions, MboxFolder};
pub use memory::MemoryFolder;
pub use sql::{SexpToSql, SqlTranslator};
pub use sqlite::SqliteStore;
