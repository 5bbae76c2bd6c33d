//! Log ingestion: resumable file tailing and event parsing.

pub mod log_watcher;
pub mod parser;

pub use log_watcher::{LogWatcher, WatchError};
pub use parser::EventParser;
