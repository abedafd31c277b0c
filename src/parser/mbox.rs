//! Streaming MBOX scanner.
//!
//! Walks an MBOX file line by line with a large buffer, never loading the
//! whole file. Each message is reported as its byte range plus its header
//! block, which is all the summary builder needs; bodies are read later on
//! demand with [`MboxParser::read_message_at`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, SearchError};

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Progress is reported every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// One message located by the scanner.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSpan {
    /// Byte offset of the `From ` separator line.
    pub offset: u64,
    /// Length of the whole message, separator included.
    pub length: u64,
}

/// Streaming MBOX parser.
///
/// Tolerates mixed `\n`/`\r\n` line endings, separators without a preceding
/// blank line (logged), truncated messages at EOF, and a UTF-8 BOM.
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SearchError::FileNotFound(path.clone())
            } else {
                SearchError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path to the MBOX file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the file, calling `on_message` with the span and raw header bytes
    /// of every message. Returning `false` from the callback stops the scan.
    ///
    /// Returns the number of messages reported.
    pub fn scan_headers(
        &self,
        on_message: &mut dyn FnMut(MessageSpan, &[u8]) -> bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| SearchError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut offset: u64 = 0;
        let mut last_progress: u64 = 0;
        let mut line = Vec::with_capacity(4096);
        let mut headers: Vec<u8> = Vec::with_capacity(16 * 1024);
        let mut in_headers = false;
        let mut prev_blank = true;
        let mut start: Option<u64> = None;

        loop {
            line.clear();
            let len = read_line(&mut reader, &mut line).map_err(|e| SearchError::io(&self.path, e))?;
            if len == 0 {
                break;
            }

            if is_mbox_separator(&line) {
                if !prev_blank && offset > 0 {
                    warn!(offset, "Found 'From ' separator without preceding blank line");
                }
                if let Some(s) = start {
                    let span = MessageSpan {
                        offset: s,
                        length: offset - s,
                    };
                    if !on_message(span, &headers) {
                        return Ok(count);
                    }
                    count += 1;
                }
                start = Some(offset);
                headers.clear();
                headers.extend_from_slice(&line);
                in_headers = true;
            } else if in_headers {
                if is_blank_line(&line) {
                    in_headers = false;
                } else {
                    headers.extend_from_slice(&line);
                }
            }

            prev_blank = is_blank_line(&line);
            offset += len;

            if let Some(cb) = progress {
                if offset - last_progress >= PROGRESS_INTERVAL {
                    cb(offset, self.file_size);
                    last_progress = offset;
                }
            }
        }

        if let Some(s) = start {
            let span = MessageSpan {
                offset: s,
                length: offset - s,
            };
            if on_message(span, &headers) {
                count += 1;
            }
        }

        if let Some(cb) = progress {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }

    /// Read a single message at the given offset and length.
    pub fn read_message_at(path: impl AsRef<Path>, offset: u64, length: u64) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| SearchError::io(path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| SearchError::io(path, e))?;
        let mut buffer = vec![0u8; length as usize];
        file.read_exact(&mut buffer)
            .map_err(|e| SearchError::io(path, e))?;
        Ok(buffer)
    }
}

/// Append one line (newline included) to `line`; returns its length, 0 at EOF.
fn read_line(reader: &mut impl BufRead, line: &mut Vec<u8>) -> std::io::Result<u64> {
    let buf = reader.fill_buf()?;
    if buf.is_empty() {
        return Ok(0);
    }
    let take = buf
        .iter()
        .position(|&b| b == b'\n')
        .map(|pos| pos + 1)
        .unwrap_or(buf.len());
    line.extend_from_slice(&buf[..take]);
    reader.consume(take);
    Ok(take as u64)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    line.strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(line)
        .starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n"));
        assert!(!is_mbox_separator(b">From user@example.com\n"));
        let mut bom = vec![0xEF, 0xBB, 0xBF];
        bom.extend_from_slice(b"From x Thu Jan 01 00:00:00 2024\n");
        assert!(is_mbox_separator(&bom));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_scan_headers_spans() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        let first = "From a@b Thu Jan 01 00:00:00 2024\nSubject: one\n\nbody one\n\n";
        let second = "From c@d Thu Jan 01 00:00:00 2024\nSubject: two\n\nbody two\n";
        write!(file, "{first}{second}").expect("write");

        let parser = MboxParser::new(file.path()).expect("parser");
        let mut seen = Vec::new();
        let count = parser
            .scan_headers(
                &mut |span, headers| {
                    seen.push((span, String::from_utf8_lossy(headers).into_owned()));
                    true
                },
                None,
            )
            .expect("scan");

        assert_eq!(count, 2);
        assert_eq!(seen[0].0.offset, 0);
        assert_eq!(seen[0].0.length, first.len() as u64);
        assert_eq!(seen[1].0.offset, first.len() as u64);
        assert!(seen[1].1.contains("Subject: two"));
        assert!(!seen[1].1.contains("body two"));

        let raw = MboxParser::read_message_at(file.path(), seen[1].0.offset, seen[1].0.length)
            .expect("read");
        assert_eq!(raw, second.as_bytes());
    }

    #[test]
    fn test_missing_file() {
        let err = MboxParser::new("/nonexistent/mail.mbox").err();
        assert!(matches!(err, Some(SearchError::FileNotFound(_))));
    }
}
