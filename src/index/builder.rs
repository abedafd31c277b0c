//! Summary index construction, validation, and persistence.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Result, SearchError};
use crate::index::format::{
    IndexHeader, MboxEntry, MboxStamp, HASH_PREFIX_LEN, HEADER_SIZE, MAGIC, VERSION,
};
use crate::parser::header;
use crate::parser::mbox::MboxParser;

/// Build (or load) the summary index for an MBOX file.
///
/// A valid persisted index is reused unless `force_rebuild` is set;
/// otherwise every message's headers are parsed and the result written
/// next to the MBOX (or into `cache_dir` when that is not writable).
/// Failing to persist is logged and does not fail the build.
pub fn build_index(
    mbox_path: &Path,
    cache_dir: &Path,
    force_rebuild: bool,
    progress: Option<&dyn Fn(u64, u64)>,
) -> Result<Vec<MboxEntry>> {
    if !force_rebuild {
        if let Some(entries) = load_index(mbox_path, cache_dir)? {
            debug!(
                path = %mbox_path.display(),
                count = entries.len(),
                "Loaded existing index"
            );
            return Ok(entries);
        }
    }

    info!(path = %mbox_path.display(), "Building summary index");

    let parser = MboxParser::new(mbox_path)?;
    let mut entries: Vec<MboxEntry> = Vec::new();

    parser.scan_headers(
        &mut |span, header_bytes| {
            let uid = (entries.len() + 1).to_string();
            let info = header::parse_headers_to_info(header_bytes, &uid, span.length);
            entries.push(MboxEntry {
                offset: span.offset,
                length: span.length,
                info,
            });
            true
        },
        progress,
    )?;

    if let Err(e) = write_index(mbox_path, cache_dir, &entries) {
        tracing::warn!(error = %e, "Could not write index file; continuing without persistence");
    }

    Ok(entries)
}

/// Load an existing index. Returns `None` if it is missing or stale.
pub fn load_index(mbox_path: &Path, cache_dir: &Path) -> Result<Option<Vec<MboxEntry>>> {
    for idx_path in [index_path_for(mbox_path), cache_index_path_for(mbox_path, cache_dir)] {
        if idx_path.exists() {
            return load_index_from_file(&idx_path, mbox_path);
        }
    }
    Ok(None)
}

fn load_index_from_file(idx_path: &Path, mbox_path: &Path) -> Result<Option<Vec<MboxEntry>>> {
    let data = std::fs::read(idx_path).map_err(|e| SearchError::io(idx_path, e))?;

    if data.len() < HEADER_SIZE {
        debug!("Index file too small");
        return Ok(None);
    }

    let header: IndexHeader =
        bincode::deserialize(&data[..HEADER_SIZE]).map_err(|e| SearchError::InvalidIndex {
            path: idx_path.to_path_buf(),
            reason: format!("Header deserialization failed: {e}"),
        })?;

    if let Err(reason) = header.validate() {
        debug!(reason = %reason, "Index header invalid");
        return Ok(None);
    }

    if header.stamp != stamp_of(mbox_path)? {
        debug!(path = %mbox_path.display(), "MBOX changed since the index was built");
        return Ok(None);
    }

    let entries: Vec<MboxEntry> =
        bincode::deserialize(&data[HEADER_SIZE..]).map_err(|e| SearchError::InvalidIndex {
            path: idx_path.to_path_buf(),
            reason: format!("Entry deserialization failed: {e}"),
        })?;

    if entries.len() as u64 != header.message_count {
        debug!("Message count mismatch");
        return Ok(None);
    }

    Ok(Some(entries))
}

fn write_index(mbox_path: &Path, cache_dir: &Path, entries: &[MboxEntry]) -> anyhow::Result<()> {
    let header = IndexHeader {
        magic: *MAGIC,
        version: VERSION,
        message_count: entries.len() as u64,
        stamp: stamp_of(mbox_path)?,
    };

    let header_bytes = bincode::serialize(&header)?;
    let entries_bytes = bincode::serialize(entries)?;

    let mut padded_header = vec![0u8; HEADER_SIZE];
    let copy_len = header_bytes.len().min(HEADER_SIZE);
    padded_header[..copy_len].copy_from_slice(&header_bytes[..copy_len]);

    let idx_path = index_path_for(mbox_path);
    match write_index_to_file(&idx_path, &padded_header, &entries_bytes) {
        Ok(()) => {
            info!(path = %idx_path.display(), "Index written");
            return Ok(());
        }
        Err(e) => {
            debug!(error = %e, "Cannot write index next to MBOX, trying cache dir");
        }
    }

    let cache_path = cache_index_path_for(mbox_path, cache_dir);
    if let Some(parent) = cache_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_index_to_file(&cache_path, &padded_header, &entries_bytes)?;
    info!(path = %cache_path.display(), "Index written to cache");
    Ok(())
}

fn write_index_to_file(path: &Path, header: &[u8], entries: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| SearchError::io(path, e))?;
    file.write_all(header).map_err(|e| SearchError::io(path, e))?;
    file.write_all(entries).map_err(|e| SearchError::io(path, e))?;
    file.flush().map_err(|e| SearchError::io(path, e))
}

/// Fingerprint an MBOX file.
pub fn stamp_of(mbox_path: &Path) -> Result<MboxStamp> {
    let meta = std::fs::metadata(mbox_path).map_err(|e| SearchError::io(mbox_path, e))?;
    let modified_time = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let mut file = File::open(mbox_path).map_err(|e| SearchError::io(mbox_path, e))?;
    let mut buf = vec![0u8; HASH_PREFIX_LEN];
    let read = file
        .read(&mut buf)
        .map_err(|e| SearchError::io(mbox_path, e))?;

    Ok(MboxStamp {
        file_size: meta.len(),
        modified_time,
        sha256_first_4kb: Sha256::digest(&buf[..read]).into(),
    })
}

/// Primary index path: hidden file next to the MBOX.
///
/// Example: `/data/mail.mbox` → `/data/.mail.mbox.mailsexp.idx`
pub fn index_path_for(mbox_path: &Path) -> PathBuf {
    let filename = mbox_path.file_name().unwrap_or_default().to_string_lossy();
    mbox_path.with_file_name(format!(".{filename}.mailsexp.idx"))
}

/// Fallback index path inside the cache directory, keyed by a hash of the
/// MBOX path.
pub fn cache_index_path_for(mbox_path: &Path, cache_dir: &Path) -> PathBuf {
    let hash = Sha256::digest(mbox_path.to_string_lossy().as_bytes());
    cache_dir.join(format!("{hash:x}.idx"))
}
