//! # resumable-storage
//!
//! Storage side of the resumable upload protocol: decoding byte-range
//! descriptors, tracking in-progress sessions, appending chunks to
//! temporary files and publishing completed files to their destination.

pub mod chunked;

pub use chunked::{
    ChunkIngestionEngine, ChunkOutcome, ChunkReceipt, ChunkRequest, ContentRange, Finalizer,
    SessionStore, SessionSweeper, SweepReport, UploadSession, UploadStatus,
};
