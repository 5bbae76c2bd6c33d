use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the log watcher.
///
/// Most read problems are absorbed (missing file, mid-read I/O errors);
/// only a failure to persist the offset propagates, since losing the
/// offset breaks resumability entirely.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to persist offset to {path}: {source}")]
    OffsetWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Resumable tail of a growing log file.
///
/// The last consumed byte position is persisted to a plain-text offset
/// file so restarts continue where the previous run stopped. The offset
/// is committed immediately after the read, before the lines are handed
/// downstream: the same bytes are never re-read, but a crash between the
/// offset commit and downstream processing permanently loses the affected
/// lines. This is at-most-once delivery, not exactly-once.
pub struct LogWatcher {
    log_path: PathBuf,
    offset_path: PathBuf,
}

impl LogWatcher {
    pub fn new(log_path: PathBuf, offset_path: PathBuf) -> Self {
        LogWatcher {
            log_path,
            offset_path,
        }
    }

    /// Read all complete lines appended since the last call.
    ///
    /// A missing log file and mid-read I/O errors are non-fatal: both
    /// return an empty batch, and the latter resets the offset to 0 so
    /// the whole file is eventually re-processed.
    pub fn read_new_lines(&self) -> Result<Vec<String>, WatchError> {
        let offset = self.read_offset();

        if !self.log_path.exists() {
            log::warn!("log file not found at {:?}", self.log_path);
            return Ok(Vec::new());
        }

        match self.read_from(offset) {
            Ok((lines, new_offset)) => {
                self.write_offset(new_offset)?;
                if !lines.is_empty() {
                    log::debug!("read {} new log lines", lines.len());
                }
                Ok(lines)
            }
            Err(e) => {
                log::error!(
                    "error reading {:?}: {}; resetting offset to 0",
                    self.log_path,
                    e
                );
                self.write_offset(0)?;
                Ok(Vec::new())
            }
        }
    }

    /// Current persisted offset; absent or unparsable content counts as 0.
    pub fn read_offset(&self) -> u64 {
        match std::fs::read_to_string(&self.offset_path) {
            Ok(contents) => contents.trim().parse().unwrap_or(0),
            Err(_) => 0,
        }
    }

    fn write_offset(&self, offset: u64) -> Result<(), WatchError> {
        std::fs::write(&self.offset_path, offset.to_string()).map_err(|source| {
            WatchError::OffsetWrite {
                path: self.offset_path.clone(),
                source,
            }
        })
    }

    fn read_from(&self, offset: u64) -> std::io::Result<(Vec<String>, u64)> {
        let mut file = File::open(&self.log_path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut reader = BufReader::new(file);

        let mut lines = Vec::new();
        let mut position = offset;
        loop {
            let mut line = String::new();
            let bytes_read = reader.read_line(&mut line)?;
            if bytes_read == 0 {
                break;
            }
            position += bytes_read as u64;
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            lines.push(line);
        }

        Ok((lines, position))
    }
}
