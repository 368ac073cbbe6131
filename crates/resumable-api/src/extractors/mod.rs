//! Custom Axum extractors.

pub mod chunk;

pub use chunk::ChunkHeaders;
