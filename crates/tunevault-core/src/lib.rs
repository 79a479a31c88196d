//! Tunevault Core Library
//!
//! This crate provides the core functionality for the Tunevault application:
//! - Content fingerprinting of catalog items (via an external analyzer)
//! - Sample and full-content retrieval with bounded retries
//! - A crash-safe, content-keyed track repository with backup recovery
//! - Quality-aware duplicate detection and replace/skip handling
//! - A sync orchestrator driving catalog collections through the pipeline
//!
//! # Error Handling
//!
//! Operations return the crate-wide [`Result`] with typed [`Error`]
//! variants. Per-item failures are downgraded to counters only inside the
//! sync orchestrator; everywhere else errors propagate explicitly.
//!
//! ```rust,ignore
//! use tunevault_core::{Error, Result};
//!
//! fn do_something() -> Result<()> {
//!     // Your code here
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod generator;
pub mod repository;
pub mod retriever;
pub mod sync;
pub mod track;

pub use config::{
    DEFAULT_ANALYZER_COMMAND, DEFAULT_FETCHER_COMMAND, DEFAULT_QUALITY, LibraryConfig,
    default_data_directory,
};
pub use dedup::{
    Deduplicator, DuplicateAction, DuplicateCandidate, DuplicateOutcome, QUALITY_MARGIN,
};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, MIN_SIGNATURE_LENGTH};
pub use generator::{
    CacheStats, CommandBackend, DEFAULT_FINGERPRINT_TTL_SECS, DEFAULT_WINDOW_SECS,
    FingerprintBackend, FingerprintGenerator, FingerprintOptions, RawFingerprint, SignatureFormat,
};
pub use repository::{REPOSITORY_VERSION, TrackRepository};
pub use retriever::{
    CommandFetcher, ContentFetcher, DEFAULT_RETRIES, DEFAULT_SAMPLE_SECS, FetchKind, FetchRequest,
    FullOptions, FullRetriever, MIN_CONTENT_BYTES, MIN_SAMPLE_BYTES, RETRY_BASE_DELAY_MS,
    RetrievedFile, SampleOptions, SampleRetriever, checksum_for,
};
pub use sync::{
    CatalogItem, CollectionRequest, CollectionSyncResult, EventCallback, ItemEvent, ItemOutcome,
    SyncOptions, SyncOrchestrator, SyncReport, SyncStats,
};
pub use track::Track;
