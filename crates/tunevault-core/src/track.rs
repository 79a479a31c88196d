//! Library track entity.
//!
//! A [`Track`] is one record in the local library: the catalog's external
//! identifier, the content [`Fingerprint`], the checksum-derived stored
//! filename, a quality metric, and the set of collections the item belongs
//! to. Tracks are treated as immutable value records; an "update" constructs
//! a new record (see [`Track::with_collection`] and [`Track::with_quality`])
//! which then replaces the repository entry wholesale.

use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;

/// Current Unix epoch time in seconds.
pub(crate) fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// A deduplicated library record, keyed by external item ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// The catalog's stable identifier for this item.
    pub external_id: String,

    /// Content-derived identity used for duplicate detection.
    pub fingerprint: Fingerprint,

    /// Deterministic hash of the external ID, used to name the stored file.
    pub checksum: String,

    /// File name of the stored content within the library directory.
    pub stored_filename: String,

    /// Quality metric (e.g. bitrate in kbps) used to rank duplicates.
    pub quality: u32,

    /// Duration of the stored content in seconds.
    pub duration_secs: f64,

    /// Collections (playlists) this track belongs to.
    pub collections: BTreeSet<String>,

    /// When the record was added (Unix epoch seconds).
    pub added_at: u64,

    /// When the record was last replaced, if ever (Unix epoch seconds).
    #[serde(default)]
    pub updated_at: Option<u64>,
}

impl Track {
    /// Create a validated track with a single collection membership.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if any identity field is empty or the
    /// duration is not positive.
    pub fn new(
        external_id: impl Into<String>,
        fingerprint: Fingerprint,
        checksum: impl Into<String>,
        stored_filename: impl Into<String>,
        quality: u32,
        duration_secs: f64,
        collection: impl Into<String>,
    ) -> Result<Self> {
        let mut collections = BTreeSet::new();
        collections.insert(collection.into());

        let track = Self {
            external_id: external_id.into(),
            fingerprint,
            checksum: checksum.into(),
            stored_filename: stored_filename.into(),
            quality,
            duration_secs,
            collections,
            added_at: now_epoch_secs(),
            updated_at: None,
        };
        track.validate()?;
        Ok(track)
    }

    /// Check the record invariants.
    ///
    /// Also used by the repository loader to skip individually corrupt
    /// records without aborting the whole load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] describing the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.external_id.is_empty() {
            return Err(Error::Validation("track external_id is empty".to_string()));
        }
        if self.checksum.is_empty() {
            return Err(Error::Validation(format!(
                "track '{}' has an empty checksum",
                self.external_id
            )));
        }
        if self.stored_filename.is_empty() {
            return Err(Error::Validation(format!(
                "track '{}' has an empty stored filename",
                self.external_id
            )));
        }
        if self.duration_secs <= 0.0 || !self.duration_secs.is_finite() {
            return Err(Error::Validation(format!(
                "track '{}' duration must be positive, got {}",
                self.external_id, self.duration_secs
            )));
        }
        Ok(())
    }

    /// New record equal to this one with `collection` added to the
    /// membership set.
    #[must_use]
    pub fn with_collection(&self, collection: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.collections.insert(collection.into());
        next
    }

    /// New record equal to this one with all of `collections` merged into
    /// the membership set.
    #[must_use]
    pub fn with_collections<I, S>(&self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.collections.extend(collections.into_iter().map(Into::into));
        next
    }

    /// New record equal to this one with a different quality metric.
    #[must_use]
    pub fn with_quality(&self, quality: u32) -> Self {
        let mut next = self.clone();
        next.quality = quality;
        next
    }

    /// Whether this track belongs to the named collection.
    #[must_use]
    pub fn is_in_collection(&self, collection: &str) -> bool {
        self.collections.contains(collection)
    }
}
