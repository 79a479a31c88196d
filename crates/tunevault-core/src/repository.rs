//! Durable track repository.
//!
//! The repository is the single source of truth for the library: a keyed
//! mapping of external ID to [`Track`], persisted as a versioned JSON
//! document. Two secondary indexes (fingerprint signature and checksum) are
//! derived, rebuildable caches kept in memory for O(1) duplicate lookup.
//!
//! Crash safety:
//! - every successful write first copies the current primary to a sibling
//!   backup, then writes a temp file and atomically renames it over the
//!   primary — the rename is the only irrevocable commit point;
//! - every mutating call mutates the in-memory state first, attempts the
//!   durable write, and rolls the in-memory mutation back on write failure,
//!   so the in-memory state and the durable file never diverge after a
//!   returned success;
//! - on load, a corrupt primary degrades to backup recovery (repairing the
//!   primary), and a corrupt backup degrades to an empty repository. Corrupt
//!   durable state never crashes the process.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::track::{Track, now_epoch_secs};

/// Repository file format version.
pub const REPOSITORY_VERSION: u32 = 1;

/// Durable document shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LibraryFile {
    /// Format version for forward compatibility.
    version: u32,
    /// When the document was last committed (Unix epoch seconds).
    updated_at: u64,
    /// Keyed mapping of external ID to track record.
    tracks: HashMap<String, Track>,
}

/// Durable keyed store of [`Track`] records.
pub struct TrackRepository {
    file_path: PathBuf,
    backup_path: PathBuf,
    tracks: HashMap<String, Track>,
    /// Fingerprint signature -> external ID. Derived cache.
    fingerprint_index: HashMap<String, String>,
    /// Checksum -> external ID. Derived cache.
    checksum_index: HashMap<String, String>,
}

impl TrackRepository {
    /// Load (or create) a repository backed by the given file.
    ///
    /// Load order: primary file, then backup recovery (repairing the primary
    /// on success), then an empty repository. Records that individually fail
    /// validation are skipped and logged rather than aborting the load.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] only if a recovered repository cannot
    /// be re-persisted to repair the primary.
    pub fn initialize(path: impl Into<PathBuf>) -> Result<Self> {
        let file_path = path.into();
        let backup_path = sibling_backup_path(&file_path);

        let mut repo = Self {
            file_path,
            backup_path,
            tracks: HashMap::new(),
            fingerprint_index: HashMap::new(),
            checksum_index: HashMap::new(),
        };

        if !repo.file_path.exists() {
            info!(
                "No repository file at {}, starting empty",
                repo.file_path.display()
            );
            return Ok(repo);
        }

        match load_document(&repo.file_path) {
            Ok(document) => {
                repo.adopt(document);
                info!(
                    "Loaded repository from {} ({} tracks)",
                    repo.file_path.display(),
                    repo.tracks.len()
                );
            }
            Err(primary_err) => {
                warn!(
                    "Repository file {} is unreadable ({}), attempting backup recovery",
                    repo.file_path.display(),
                    primary_err
                );
                match load_document(&repo.backup_path) {
                    Ok(document) => {
                        repo.adopt(document);
                        // Drop the corrupt primary first so the repair write
                        // does not back it up over the good copy.
                        let _ = fs::remove_file(&repo.file_path);
                        repo.write_to_disk()?;
                        info!(
                            "Recovered {} tracks from backup {}",
                            repo.tracks.len(),
                            repo.backup_path.display()
                        );
                    }
                    Err(backup_err) => {
                        warn!(
                            "Backup recovery failed ({}), starting with an empty repository",
                            backup_err
                        );
                    }
                }
            }
        }

        Ok(repo)
    }

    /// Replace in-memory state with a loaded document, skipping records that
    /// fail validation and rebuilding the derived indexes.
    fn adopt(&mut self, document: LibraryFile) {
        self.tracks.clear();
        self.fingerprint_index.clear();
        self.checksum_index.clear();

        for (key, track) in document.tracks {
            if key != track.external_id {
                warn!(
                    "Skipping record keyed '{}' whose external_id is '{}'",
                    key, track.external_id
                );
                continue;
            }
            if let Err(e) = track.validate() {
                warn!("Skipping invalid record '{}': {}", key, e);
                continue;
            }
            self.index_insert(&track);
            self.tracks.insert(key, track);
        }
    }

    /// Path of the primary repository file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Number of tracks in the library.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the library is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Find a track by its external catalog ID. Absence is `None`.
    #[must_use]
    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Track> {
        self.tracks.get(external_id)
    }

    /// Find a track by exact fingerprint signature. Absence is `None`.
    #[must_use]
    pub fn find_by_fingerprint(&self, fingerprint: &Fingerprint) -> Option<&Track> {
        self.fingerprint_index
            .get(fingerprint.signature())
            .and_then(|id| self.tracks.get(id))
    }

    /// Find a track by its stored-file checksum. Absence is `None`.
    #[must_use]
    pub fn find_by_checksum(&self, checksum: &str) -> Option<&Track> {
        self.checksum_index
            .get(checksum)
            .and_then(|id| self.tracks.get(id))
    }

    /// All tracks, in unspecified order.
    #[must_use]
    pub fn find_all(&self) -> Vec<&Track> {
        self.tracks.values().collect()
    }

    /// All tracks belonging to the named collection.
    #[must_use]
    pub fn find_by_collection(&self, collection: &str) -> Vec<&Track> {
        self.tracks
            .values()
            .filter(|t| t.is_in_collection(collection))
            .collect()
    }

    // =========================================================================
    // Mutation (mutate in memory, persist, roll back on failure)
    // =========================================================================

    /// Add a new track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if the external ID is present or the
    /// record's fingerprint or checksum is already indexed under another ID,
    /// or [`Error::Persistence`] if the durable write fails (in which case
    /// the in-memory state is unchanged).
    pub fn save(&mut self, track: Track) -> Result<()> {
        track.validate()?;
        if self.tracks.contains_key(&track.external_id) {
            return Err(Error::AlreadyExists(track.external_id));
        }
        self.check_index_collision(&track)?;

        let id = track.external_id.clone();
        self.index_insert(&track);
        self.tracks.insert(id.clone(), track);

        if let Err(e) = self.write_to_disk() {
            // Roll back so memory and disk stay in agreement.
            if let Some(track) = self.tracks.remove(&id) {
                self.index_remove(&track);
            }
            return Err(e);
        }

        debug!("Saved track '{}'", id);
        Ok(())
    }

    /// Replace the record stored under `external_id` wholesale, stamping
    /// `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the ID is absent,
    /// [`Error::Validation`] if the replacement is keyed differently,
    /// [`Error::AlreadyExists`] if its fingerprint or checksum is indexed
    /// under another ID, or [`Error::Persistence`] on write failure (with
    /// the previous record restored).
    pub fn update(&mut self, external_id: &str, track: Track) -> Result<()> {
        track.validate()?;
        if track.external_id != external_id {
            return Err(Error::Validation(format!(
                "replacement record is keyed '{}', expected '{}'",
                track.external_id, external_id
            )));
        }
        if !self.tracks.contains_key(external_id) {
            return Err(Error::NotFound(external_id.to_string()));
        }
        self.check_index_collision(&track)?;

        let mut track = track;
        track.updated_at = Some(now_epoch_secs());

        // contains_key checked above, so the previous record is always there.
        let Some(previous) = self.tracks.remove(external_id) else {
            return Err(Error::NotFound(external_id.to_string()));
        };
        self.index_remove(&previous);
        self.index_insert(&track);
        self.tracks.insert(external_id.to_string(), track);

        if let Err(e) = self.write_to_disk() {
            if let Some(attempted) = self.tracks.remove(external_id) {
                self.index_remove(&attempted);
            }
            self.index_insert(&previous);
            self.tracks.insert(external_id.to_string(), previous);
            return Err(e);
        }

        debug!("Updated track '{}'", external_id);
        Ok(())
    }

    /// Remove the record stored under `external_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the ID is absent, or
    /// [`Error::Persistence`] on write failure (with the record restored).
    pub fn remove(&mut self, external_id: &str) -> Result<()> {
        let Some(removed) = self.tracks.remove(external_id) else {
            return Err(Error::NotFound(external_id.to_string()));
        };
        self.index_remove(&removed);

        if let Err(e) = self.write_to_disk() {
            self.index_insert(&removed);
            self.tracks.insert(external_id.to_string(), removed);
            return Err(e);
        }

        debug!("Removed track '{}'", external_id);
        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Commit the current in-memory state: backup, temp write, atomic rename.
    fn write_to_disk(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, &e))?;
        }

        // Preserve the previous committed version before touching the primary.
        if self.file_path.exists() {
            fs::copy(&self.file_path, &self.backup_path)
                .map_err(|e| Error::persistence(&self.backup_path, &e))?;
        }

        let document = LibraryFile {
            version: REPOSITORY_VERSION,
            updated_at: now_epoch_secs(),
            tracks: self.tracks.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;

        let temp_path = sibling_temp_path(&self.file_path);
        fs::write(&temp_path, content).map_err(|e| Error::persistence(&temp_path, &e))?;
        fs::rename(&temp_path, &self.file_path)
            .map_err(|e| Error::persistence(&self.file_path, &e))?;

        Ok(())
    }

    /// Reject a record whose fingerprint signature or checksum is already
    /// indexed under a different external ID. The indexes map each value to
    /// exactly one ID, so letting a colliding insert through would re-point
    /// them and strand the other record once either one is removed.
    fn check_index_collision(&self, track: &Track) -> Result<()> {
        if let Some(id) = self.fingerprint_index.get(track.fingerprint.signature())
            && id != &track.external_id
        {
            return Err(Error::AlreadyExists(format!(
                "fingerprint of '{}' is already indexed under '{}'",
                track.external_id, id
            )));
        }
        if let Some(id) = self.checksum_index.get(&track.checksum)
            && id != &track.external_id
        {
            return Err(Error::AlreadyExists(format!(
                "checksum of '{}' is already indexed under '{}'",
                track.external_id, id
            )));
        }
        Ok(())
    }

    fn index_insert(&mut self, track: &Track) {
        self.fingerprint_index.insert(
            track.fingerprint.signature().to_string(),
            track.external_id.clone(),
        );
        self.checksum_index
            .insert(track.checksum.clone(), track.external_id.clone());
    }

    fn index_remove(&mut self, track: &Track) {
        self.fingerprint_index.remove(track.fingerprint.signature());
        self.checksum_index.remove(&track.checksum);
    }
}

/// Read and parse a repository document.
fn load_document(path: &Path) -> Result<LibraryFile> {
    let content = fs::read_to_string(path).map_err(|e| Error::file_access(path, &e))?;
    let document: LibraryFile = serde_json::from_str(&content)?;
    Ok(document)
}

/// Backup path: the primary path with `.bak` appended.
fn sibling_backup_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".bak");
    PathBuf::from(os)
}

/// Temp path for the write-then-rename commit: primary path with `.tmp`.
fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}
