//! Check Store and Log Sink: the persistence the monitoring engine consumes.
//!
//! The engine only sees the [`CheckStore`] and [`LogSink`] traits; the
//! file-backed implementations here are what the binary wires in.

pub mod checks;
pub mod logs;

pub use checks::{CheckStore, FileCheckStore, StoreError};
pub use logs::{FileLogSink, LogError, LogSink};
