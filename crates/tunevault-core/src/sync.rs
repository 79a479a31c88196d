//! Sync orchestrator for ingesting catalog collections into the library.
//!
//! The orchestrator drives one collection's item list through the pipeline:
//! known-ID fast path, sample retrieval, fingerprinting, duplicate decision,
//! and full-content persistence. Items are processed strictly sequentially
//! (duplicate detection depends on prior items already being committed), and
//! collections are processed sequentially as well.
//!
//! Per-item errors are downgraded here — and only here — to counters and log
//! entries, so one bad item cannot abort a collection sync. The sample file
//! is cleaned up on every exit path, success or not.
//!
//! # Example
//!
//! ```rust,ignore
//! use tunevault_core::config::LibraryConfig;
//! use tunevault_core::sync::SyncOrchestrator;
//!
//! let config = LibraryConfig::load(&config_path);
//! let mut orchestrator = SyncOrchestrator::from_config(&config)?;
//! let report = orchestrator.sync_all(&requests);
//! println!("downloaded {} tracks", report.stats.downloaded);
//! ```

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::LibraryConfig;
use crate::dedup::{Deduplicator, DuplicateAction, DuplicateCandidate};
use crate::error::Result;
use crate::generator::{
    CommandBackend, FingerprintBackend, FingerprintGenerator, FingerprintOptions,
};
use crate::repository::TrackRepository;
use crate::retriever::{
    CommandFetcher, ContentFetcher, FullOptions, FullRetriever, RetrievedFile, SampleOptions,
    SampleRetriever, checksum_for,
};
use crate::track::Track;

// =============================================================================
// Catalog Input
// =============================================================================

/// One item as listed by the external catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItem {
    /// The catalog's stable identifier.
    pub id: String,
    /// Display title (presentation only; identity is content-based).
    pub title: String,
    /// Declared quality in kbps, used to rank duplicate candidates.
    pub quality: u32,
}

impl CatalogItem {
    /// Create a catalog item.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, quality: u32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            quality,
        }
    }
}

/// A named collection and its ordered item list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionRequest {
    /// Collection (playlist) name.
    pub name: String,
    /// Items in catalog order.
    pub items: Vec<CatalogItem>,
}

impl CollectionRequest {
    /// Create a collection request.
    #[must_use]
    pub fn new(name: impl Into<String>, items: Vec<CatalogItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }
}

// =============================================================================
// Presentation Boundary
// =============================================================================

/// Terminal outcome for one processed item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    /// New content fetched and persisted.
    Downloaded,
    /// Content duplicate retained; memberships merged.
    Skipped,
    /// Content duplicate replaced by a higher-quality copy.
    Replaced,
    /// External ID already in the library.
    Exists,
    /// Processing failed; counted, not fatal to the collection.
    Error,
}

impl std::fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Downloaded => write!(f, "downloaded"),
            Self::Skipped => write!(f, "skipped"),
            Self::Replaced => write!(f, "replaced"),
            Self::Exists => write!(f, "exists"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Per-item outcome event emitted to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemEvent {
    /// Collection being synced.
    pub collection: String,
    /// External item ID.
    pub item_id: String,
    /// Item display title.
    pub title: String,
    /// What happened.
    pub outcome: ItemOutcome,
    /// Error text when `outcome` is [`ItemOutcome::Error`].
    pub message: Option<String>,
}

/// Callback consuming per-item outcome events.
pub type EventCallback = Box<dyn Fn(&ItemEvent) + Send>;

// =============================================================================
// Options, Stats, Results
// =============================================================================

/// Configuration for a sync run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Sample fetch options.
    pub sample: SampleOptions,
    /// Full-content fetch options.
    pub full: FullOptions,
    /// Fingerprint generation options.
    pub fingerprint: FingerprintOptions,
}

impl SyncOptions {
    /// Derive run options from a library configuration.
    #[must_use]
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self {
            sample: SampleOptions::default()
                .with_duration_secs(config.sample_duration_secs)
                .with_retries(config.retries),
            full: FullOptions::default()
                .with_quality(config.quality)
                .with_retries(config.retries),
            fingerprint: FingerprintOptions::default()
                .with_window_secs(config.fingerprint_window_secs)
                .with_cache(config.cache_enabled),
        }
    }

    /// Set the sample fetch options.
    #[must_use]
    pub fn with_sample(mut self, sample: SampleOptions) -> Self {
        self.sample = sample;
        self
    }

    /// Set the full-content fetch options.
    #[must_use]
    pub const fn with_full(mut self, full: FullOptions) -> Self {
        self.full = full;
        self
    }

    /// Set the fingerprint generation options.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: FingerprintOptions) -> Self {
        self.fingerprint = fingerprint;
        self
    }
}

/// Aggregate outcome counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Items persisted as new tracks.
    pub downloaded: usize,
    /// Duplicate items skipped (memberships merged).
    pub skipped: usize,
    /// Duplicate items replaced by a quality upgrade.
    pub replaced: usize,
    /// Items whose external ID was already in the library.
    pub exists: usize,
    /// Items that failed.
    pub errors: usize,
}

impl SyncStats {
    /// Bump the counter for an outcome.
    pub const fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Downloaded => self.downloaded += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Replaced => self.replaced += 1,
            ItemOutcome::Exists => self.exists += 1,
            ItemOutcome::Error => self.errors += 1,
        }
    }

    /// Fold another stats block into this one.
    pub const fn merge(&mut self, other: Self) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.replaced += other.replaced;
        self.exists += other.exists;
        self.errors += other.errors;
    }

    /// Total items processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.downloaded + self.skipped + self.replaced + self.exists + self.errors
    }
}

/// Result of syncing one collection: the playlist-writer boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionSyncResult {
    /// Collection name.
    pub collection: String,
    /// Resulting track records, in item order (errors omitted).
    pub tracks: Vec<Track>,
    /// Outcome counters for this collection.
    pub stats: SyncStats,
}

/// Result of a full sync run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncReport {
    /// Per-collection results, in request order.
    pub collections: Vec<CollectionSyncResult>,
    /// Aggregate counters across all collections.
    pub stats: SyncStats,
    /// Wall-clock duration of the run in seconds.
    pub duration_secs: f64,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Drives catalog collections through dedup and persistence.
///
/// All collaborators are explicitly constructed and injected; the
/// orchestrator owns them for the duration of a run.
pub struct SyncOrchestrator<B: FingerprintBackend, F: ContentFetcher> {
    repository: TrackRepository,
    generator: FingerprintGenerator<B>,
    samples: SampleRetriever<F>,
    full: FullRetriever<F>,
    dedup: Deduplicator,
    options: SyncOptions,
    callback: Option<EventCallback>,
}

impl SyncOrchestrator<CommandBackend, CommandFetcher> {
    /// Assemble the default command-backed pipeline from a configuration.
    ///
    /// Every tuning knob of the configuration lands on the collaborator it
    /// belongs to: the analyzer and downloader commands, the cache TTL, the
    /// backoff base delay, and the per-run [`SyncOptions`].
    ///
    /// # Errors
    ///
    /// Returns an error if the repository file exists but cannot be loaded.
    pub fn from_config(config: &LibraryConfig) -> Result<Self> {
        let repository = TrackRepository::initialize(&config.data_file)?;
        let generator = FingerprintGenerator::new(CommandBackend::new(&config.analyzer_command))
            .with_ttl(config.fingerprint_ttl_secs);
        let fetcher = CommandFetcher::new(&config.fetcher_command);
        let samples = SampleRetriever::new(fetcher.clone(), &config.temp_dir)
            .with_base_delay_ms(config.retry_base_delay_ms);
        let full = FullRetriever::new(fetcher, &config.library_dir)
            .with_base_delay_ms(config.retry_base_delay_ms);
        let dedup = Deduplicator::new(&config.library_dir);

        Ok(Self::new(repository, generator, samples, full, dedup)
            .with_options(SyncOptions::from_config(config)))
    }
}

impl<B: FingerprintBackend, F: ContentFetcher> SyncOrchestrator<B, F> {
    /// Assemble an orchestrator from its collaborators.
    #[must_use]
    pub fn new(
        repository: TrackRepository,
        generator: FingerprintGenerator<B>,
        samples: SampleRetriever<F>,
        full: FullRetriever<F>,
        dedup: Deduplicator,
    ) -> Self {
        Self {
            repository,
            generator,
            samples,
            full,
            dedup,
            options: SyncOptions::default(),
            callback: None,
        }
    }

    /// Set the sync options.
    #[must_use]
    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the per-item event callback.
    #[must_use]
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Read access to the underlying repository.
    #[must_use]
    pub const fn repository(&self) -> &TrackRepository {
        &self.repository
    }

    /// Sync every collection, sequentially, then sweep temp files.
    pub fn sync_all(&mut self, requests: &[CollectionRequest]) -> SyncReport {
        let start = Instant::now();
        let mut collections = Vec::with_capacity(requests.len());
        let mut stats = SyncStats::default();

        for request in requests {
            let result = self.sync_collection(request);
            stats.merge(result.stats);
            collections.push(result);
        }

        // Best-effort sweep; a failed removal must not fail the run.
        if let Err(e) = self.samples.cleanup_all() {
            warn!("Sample cleanup failed: {e}");
        }
        if let Err(e) = self.full.cleanup_all() {
            warn!("Partial-download cleanup failed: {e}");
        }

        let duration_secs = start.elapsed().as_secs_f64();
        info!(
            "Sync complete: {} downloaded, {} skipped, {} replaced, {} existing, {} errors in {:.1}s",
            stats.downloaded, stats.skipped, stats.replaced, stats.exists, stats.errors,
            duration_secs
        );

        SyncReport {
            collections,
            stats,
            duration_secs,
        }
    }

    /// Sync one collection's items, strictly in order.
    pub fn sync_collection(&mut self, request: &CollectionRequest) -> CollectionSyncResult {
        info!(
            "Syncing collection '{}' ({} items)",
            request.name,
            request.items.len()
        );

        let mut tracks = Vec::with_capacity(request.items.len());
        let mut stats = SyncStats::default();

        for item in &request.items {
            match self.process_item(&request.name, item) {
                Ok((outcome, track)) => {
                    debug!("Item '{}' -> {}", item.id, outcome);
                    stats.record(outcome);
                    self.emit(ItemEvent {
                        collection: request.name.clone(),
                        item_id: item.id.clone(),
                        title: item.title.clone(),
                        outcome,
                        message: None,
                    });
                    tracks.push(track);
                }
                Err(e) => {
                    error!("Item '{}' failed: {e}", item.id);
                    stats.record(ItemOutcome::Error);
                    self.emit(ItemEvent {
                        collection: request.name.clone(),
                        item_id: item.id.clone(),
                        title: item.title.clone(),
                        outcome: ItemOutcome::Error,
                        message: Some(e.to_string()),
                    });
                }
            }
        }

        info!(
            "Collection '{}' done: {} downloaded, {} skipped, {} replaced, {} existing, {} errors",
            request.name, stats.downloaded, stats.skipped, stats.replaced, stats.exists,
            stats.errors
        );

        CollectionSyncResult {
            collection: request.name.clone(),
            tracks,
            stats,
        }
    }

    /// Per-item state machine. Evaluated in fixed order: known external ID
    /// first, then content-level deduplication.
    fn process_item(&mut self, collection: &str, item: &CatalogItem) -> Result<(ItemOutcome, Track)> {
        // 1. Known external ID: attach the membership, no fetching.
        if let Some(existing) = self.repository.find_by_external_id(&item.id) {
            if existing.is_in_collection(collection) {
                return Ok((ItemOutcome::Exists, existing.clone()));
            }
            let updated = existing.with_collection(collection);
            self.repository.update(&item.id, updated.clone())?;
            return Ok((ItemOutcome::Exists, updated));
        }

        // 2. Fingerprint a sample and decide at the content level. The
        // sample is removed on every exit path below.
        let sample = self.samples.retrieve(&item.id, &self.options.sample)?;
        let result = self.process_sampled_item(collection, item, &sample);
        if let Err(e) = self.samples.cleanup(&sample.path) {
            warn!("Failed to remove sample {}: {e}", sample.path.display());
        }
        result
    }

    /// Dedup decision and persistence for an item whose sample is on disk.
    fn process_sampled_item(
        &mut self,
        collection: &str,
        item: &CatalogItem,
        sample: &RetrievedFile,
    ) -> Result<(ItemOutcome, Track)> {
        let fingerprint = self
            .generator
            .generate(&sample.path, &self.options.fingerprint)?;

        let existing_id = self
            .dedup
            .find_duplicate(&self.repository, &fingerprint)
            .map(|t| t.external_id.clone());

        let Some(existing_id) = existing_id else {
            // New content: fetch in full and persist under this collection.
            self.full.retrieve(&item.id, &self.options.full)?;
            let track = Track::new(
                &item.id,
                fingerprint.clone(),
                checksum_for(&item.id),
                FullRetriever::<F>::stored_filename_for(&item.id),
                item.quality,
                fingerprint.duration_secs(),
                collection,
            )?;
            self.repository.save(track.clone())?;
            return Ok((ItemOutcome::Downloaded, track));
        };

        let candidate = DuplicateCandidate::new(&item.id, item.quality, collection);
        let outcome = self
            .dedup
            .handle_duplicate(&mut self.repository, &candidate, &existing_id)?;

        match outcome.action {
            DuplicateAction::Replace => {
                self.full.retrieve(&item.id, &self.options.full)?;
                let track = Track::new(
                    &item.id,
                    fingerprint.clone(),
                    checksum_for(&item.id),
                    FullRetriever::<F>::stored_filename_for(&item.id),
                    item.quality,
                    fingerprint.duration_secs(),
                    collection,
                )?
                .with_collections(outcome.merged_collections.iter().cloned());
                self.repository.save(track.clone())?;
                Ok((ItemOutcome::Replaced, track))
            }
            DuplicateAction::Skip => Ok((ItemOutcome::Skipped, outcome.track)),
        }
    }

    fn emit(&self, event: ItemEvent) {
        if let Some(callback) = &self.callback {
            callback(&event);
        }
    }
}
