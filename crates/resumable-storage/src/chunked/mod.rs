//! Chunked upload handling.

pub mod cleanup;
pub mod disposition;
pub mod engine;
pub mod finalizer;
pub mod range;
pub mod session;
pub mod store;

pub use cleanup::{SessionSweeper, SweepReport};
pub use engine::{ChunkIngestionEngine, ChunkOutcome, ChunkReceipt, ChunkRequest};
pub use finalizer::Finalizer;
pub use range::ContentRange;
pub use session::{UploadSession, UploadStatus};
pub use store::SessionStore;
