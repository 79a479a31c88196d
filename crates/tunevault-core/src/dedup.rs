//! Content-duplicate decision engine.
//!
//! Given a freshly fingerprinted candidate and the repository, the
//! [`Deduplicator`] decides whether the candidate is new, an exact content
//! duplicate to skip, or a quality upgrade that should replace the stored
//! copy. Duplicate detection is exact signature lookup through the
//! repository's fingerprint index; approximate matching via
//! [`Fingerprint::similarity`] is deliberately not consulted here.
//!
//! The replace test is strict: a candidate replaces the stored copy only
//! when its quality exceeds the stored quality by more than
//! [`QUALITY_MARGIN`]. A tie, or an improvement at or below the margin,
//! skips the candidate and merges its collection memberships into the
//! existing record instead.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::repository::TrackRepository;
use crate::retriever::remove_if_present;
use crate::track::Track;

/// Minimum quality improvement (same unit as the quality metric) required
/// before a duplicate replaces the stored copy.
pub const QUALITY_MARGIN: u32 = 10;

/// A fingerprint-matched incoming item awaiting a replace/skip decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateCandidate {
    /// External catalog ID of the incoming item.
    pub external_id: String,
    /// Declared quality of the incoming item.
    pub quality: u32,
    /// Collections the incoming item was listed under.
    pub collections: BTreeSet<String>,
}

impl DuplicateCandidate {
    /// Create a candidate listed under a single collection.
    #[must_use]
    pub fn new(external_id: impl Into<String>, quality: u32, collection: impl Into<String>) -> Self {
        let mut collections = BTreeSet::new();
        collections.insert(collection.into());
        Self {
            external_id: external_id.into(),
            quality,
            collections,
        }
    }
}

/// Which way the duplicate decision went.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateAction {
    /// Quality upgrade: the stored copy was removed; the caller persists a
    /// new record under the candidate's ID with the merged memberships.
    Replace,
    /// The stored copy is retained; the candidate's memberships were merged
    /// into it.
    Skip,
}

/// Result of handling a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateOutcome {
    /// Replace or skip.
    pub action: DuplicateAction,
    /// On replace: the removed record. On skip: the updated existing record.
    pub track: Track,
    /// Union of the existing and candidate collection memberships.
    pub merged_collections: BTreeSet<String>,
}

/// Pure decision engine over an injected repository.
pub struct Deduplicator {
    library_dir: PathBuf,
}

impl Deduplicator {
    /// Create a deduplicator; `library_dir` locates stored content files for
    /// replace-time deletion.
    #[must_use]
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
        }
    }

    /// Exact-signature duplicate lookup. Absence is `None`.
    #[must_use]
    pub fn find_duplicate<'a>(
        &self,
        repository: &'a TrackRepository,
        fingerprint: &Fingerprint,
    ) -> Option<&'a Track> {
        repository.find_by_fingerprint(fingerprint)
    }

    /// Whether `candidate_quality` justifies replacing `existing`.
    ///
    /// Strict inequality over the margin: equality at `existing.quality +
    /// QUALITY_MARGIN` does not replace. The threshold saturates, so a
    /// stored quality near `u32::MAX` is simply unbeatable.
    #[must_use]
    pub fn should_replace(existing: &Track, candidate_quality: u32) -> bool {
        candidate_quality > existing.quality.saturating_add(QUALITY_MARGIN)
    }

    /// Decide and apply the replace/skip handling for a confirmed duplicate.
    ///
    /// - Replace: deletes the existing stored content file (an already-absent
    ///   file is fine), removes the existing record, and returns the merged
    ///   memberships for the caller to persist under the candidate's ID.
    /// - Skip: merges the candidate's memberships into the existing record in
    ///   place (whole-record replacement through the repository).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if `existing_id` is no longer in the
    /// repository, or a persistence error from the applied mutation.
    pub fn handle_duplicate(
        &self,
        repository: &mut TrackRepository,
        candidate: &DuplicateCandidate,
        existing_id: &str,
    ) -> Result<DuplicateOutcome> {
        let existing = repository
            .find_by_external_id(existing_id)
            .ok_or_else(|| Error::NotFound(existing_id.to_string()))?
            .clone();

        let mut merged_collections = existing.collections.clone();
        merged_collections.extend(candidate.collections.iter().cloned());

        if Self::should_replace(&existing, candidate.quality) {
            info!(
                "Quality upgrade: replacing '{}' ({} kbps) with '{}' ({} kbps)",
                existing.external_id, existing.quality, candidate.external_id, candidate.quality
            );

            let stored_path = self.library_dir.join(&existing.stored_filename);
            remove_if_present(&stored_path)?;
            repository.remove(existing_id)?;

            Ok(DuplicateOutcome {
                action: DuplicateAction::Replace,
                track: existing,
                merged_collections,
            })
        } else {
            info!(
                "Duplicate skipped: '{}' ({} kbps) does not beat '{}' ({} kbps) by more than {}",
                candidate.external_id,
                candidate.quality,
                existing.external_id,
                existing.quality,
                QUALITY_MARGIN
            );

            let updated = existing.with_collections(candidate.collections.iter().cloned());
            repository.update(existing_id, updated.clone())?;

            Ok(DuplicateOutcome {
                action: DuplicateAction::Skip,
                track: updated,
                merged_collections,
            })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fingerprint(tag: &str) -> Fingerprint {
        Fingerprint::new(format!("{tag}-AQAAjFKYJFKYoPkRPXjw"), 212.5).unwrap()
    }

    fn track(id: &str, sig_tag: &str, quality: u32, collection: &str) -> Track {
        Track::new(
            id,
            fingerprint(sig_tag),
            format!("sum-{id}"),
            format!("sum-{id}.mp3"),
            quality,
            212.5,
            collection,
        )
        .unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        library_dir: PathBuf,
        repository: TrackRepository,
        dedup: Deduplicator,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let library_dir = dir.path().join("library");
            fs::create_dir_all(&library_dir).unwrap();
            let repository =
                TrackRepository::initialize(dir.path().join("library.json")).unwrap();
            let dedup = Deduplicator::new(&library_dir);
            Self {
                _dir: dir,
                library_dir,
                repository,
                dedup,
            }
        }
    }

    #[test]
    fn test_find_duplicate_exact_match_only() {
        let mut fx = Fixture::new();
        fx.repository.save(track("yt:a", "F1", 192, "Chill")).unwrap();

        assert!(
            fx.dedup
                .find_duplicate(&fx.repository, &fingerprint("F1"))
                .is_some()
        );
        assert!(
            fx.dedup
                .find_duplicate(&fx.repository, &fingerprint("F2"))
                .is_none()
        );
    }

    #[test]
    fn test_should_replace_strict_margin() {
        let existing = track("yt:a", "F1", 192, "Chill");

        assert!(!Deduplicator::should_replace(&existing, 192));
        assert!(!Deduplicator::should_replace(&existing, 195));
        // Exactly at the margin must NOT replace.
        assert!(!Deduplicator::should_replace(&existing, 202));
        assert!(Deduplicator::should_replace(&existing, 203));
        assert!(Deduplicator::should_replace(&existing, 320));
    }

    #[test]
    fn test_should_replace_saturates_near_max_quality() {
        let existing = track("yt:a", "F1", u32::MAX - 2, "Chill");
        assert!(!Deduplicator::should_replace(&existing, u32::MAX));
    }

    #[test]
    fn test_replace_deletes_file_and_removes_record() {
        let mut fx = Fixture::new();
        fx.repository.save(track("yt:a", "F1", 128, "Chill")).unwrap();
        let stored = fx.library_dir.join("sum-yt:a.mp3");
        fs::write(&stored, b"old content").unwrap();

        let candidate = DuplicateCandidate::new("yt:b", 320, "Workout");
        let outcome = fx
            .dedup
            .handle_duplicate(&mut fx.repository, &candidate, "yt:a")
            .unwrap();

        assert_eq!(outcome.action, DuplicateAction::Replace);
        assert!(!stored.exists());
        assert!(fx.repository.find_by_external_id("yt:a").is_none());
        assert_eq!(
            outcome.merged_collections,
            BTreeSet::from(["Chill".to_string(), "Workout".to_string()])
        );
    }

    #[test]
    fn test_replace_tolerates_missing_stored_file() {
        let mut fx = Fixture::new();
        fx.repository.save(track("yt:a", "F1", 128, "Chill")).unwrap();

        let candidate = DuplicateCandidate::new("yt:b", 320, "Workout");
        let outcome = fx
            .dedup
            .handle_duplicate(&mut fx.repository, &candidate, "yt:a")
            .unwrap();
        assert_eq!(outcome.action, DuplicateAction::Replace);
    }

    #[test]
    fn test_skip_merges_memberships_into_existing() {
        let mut fx = Fixture::new();
        fx.repository.save(track("yt:a", "F1", 192, "Chill")).unwrap();

        let candidate = DuplicateCandidate::new("yt:b", 195, "Workout");
        let outcome = fx
            .dedup
            .handle_duplicate(&mut fx.repository, &candidate, "yt:a")
            .unwrap();

        assert_eq!(outcome.action, DuplicateAction::Skip);
        let stored = fx.repository.find_by_external_id("yt:a").unwrap();
        assert!(stored.is_in_collection("Chill"));
        assert!(stored.is_in_collection("Workout"));
        // The candidate never becomes a record of its own.
        assert!(fx.repository.find_by_external_id("yt:b").is_none());
        assert_eq!(outcome.track.collections, outcome.merged_collections);
    }

    #[test]
    fn test_skip_membership_union_deduplicates() {
        let mut fx = Fixture::new();
        fx.repository.save(track("yt:a", "F1", 192, "Chill")).unwrap();

        let candidate = DuplicateCandidate::new("yt:b", 192, "Chill");
        let outcome = fx
            .dedup
            .handle_duplicate(&mut fx.repository, &candidate, "yt:a")
            .unwrap();

        assert_eq!(outcome.merged_collections.len(), 1);
        assert_eq!(
            fx.repository
                .find_by_external_id("yt:a")
                .unwrap()
                .collections
                .len(),
            1
        );
    }

    #[test]
    fn test_handle_duplicate_missing_existing_is_not_found() {
        let mut fx = Fixture::new();
        let candidate = DuplicateCandidate::new("yt:b", 320, "Workout");
        let err = fx
            .dedup
            .handle_duplicate(&mut fx.repository, &candidate, "yt:gone")
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
