//! Specific background job implementations.

pub mod listen_ingestion;

pub use listen_ingestion::ListenIngestionJob;
