//! MBOX message reader: random access by offset with an LRU of parsed messages.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::error::{Result, SearchError};
use crate::index::format::MboxEntry;
use crate::model::message::MimeMessage;
use crate::parser::mime;

/// Default number of parsed messages kept in the LRU cache.
pub const DEFAULT_CACHE_SIZE: usize = 50;

/// Reads messages from an MBOX file using index offsets.
///
/// Parsed messages are cached so that several predicates inspecting the same
/// message in one search do not re-read and re-decode it.
pub struct MboxStore {
    path: PathBuf,
    file: File,
    cache: LruCache<u64, Arc<MimeMessage>>,
}

impl MboxStore {
    /// Open an MBOX file for random-access reading.
    pub fn open(path: impl AsRef<Path>, cache_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SearchError::io(&path, e))?;
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            path,
            file,
            cache: LruCache::new(cache_size),
        })
    }

    /// Read and parse a message. Cached results are returned immediately.
    pub fn get_message(&mut self, entry: &MboxEntry) -> Result<Arc<MimeMessage>> {
        if let Some(message) = self.cache.get(&entry.offset) {
            return Ok(message.clone());
        }
        let raw = self.read_raw(entry)?;
        let message = Arc::new(mime::parse_message(&raw)?);
        self.cache.put(entry.offset, message.clone());
        Ok(message)
    }

    /// Number of parsed messages currently cached.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn read_raw(&mut self, entry: &MboxEntry) -> Result<Vec<u8>> {
        debug!(
            offset = entry.offset,
            length = entry.length,
            "Reading message from MBOX"
        );
        self.file
            .seek(SeekFrom::Start(entry.offset))
            .map_err(|e| SearchError::io(&self.path, e))?;
        let mut buf = vec![0u8; entry.length as usize];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| SearchError::io(&self.path, e))?;
        Ok(buf)
    }
}
