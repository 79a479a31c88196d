//! Content retrieval with bounded retries.
//!
//! Two retrievers share one retry engine:
//! - [`SampleRetriever`] fetches a short preview of an item to a temp path,
//!   used only for fingerprinting.
//! - [`FullRetriever`] fetches the complete content into the library
//!   directory under a deterministic checksum-derived name.
//!
//! The transport itself is an external capability behind the
//! [`ContentFetcher`] trait (a downloader subprocess by default). Every
//! downloaded file is validated (minimum size, and container magic bytes for
//! full content); a file failing validation is deleted and the attempt is
//! retried, not immediately fatal. Cleanup of produced files is idempotent:
//! removing an already-absent file is a success.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default number of fetch attempts per item.
pub const DEFAULT_RETRIES: u32 = 3;

/// Base delay for exponential backoff between attempts, in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Minimum accepted size for a fetched sample (500 KB).
pub const MIN_SAMPLE_BYTES: u64 = 500 * 1024;

/// Minimum accepted size for fetched full content (100 KB).
pub const MIN_CONTENT_BYTES: u64 = 100 * 1024;

/// Default sample length in seconds.
pub const DEFAULT_SAMPLE_SECS: u32 = 30;

/// Suffix for in-flight full-content downloads before the commit rename.
const PARTIAL_SUFFIX: &str = "part";

// =============================================================================
// Fetch Boundary
// =============================================================================

/// What a fetch request asks the transport for.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchKind {
    /// A short preview, for fingerprinting.
    Sample {
        /// Preview length in seconds.
        duration_secs: u32,
        /// Offset into the content, in seconds.
        start_offset_secs: u32,
    },
    /// The complete content.
    Full {
        /// Requested quality in kbps.
        quality: u32,
    },
}

/// A single request handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FetchRequest {
    /// External item identifier.
    pub item_id: String,
    /// Sample or full-content fetch.
    pub kind: FetchKind,
}

/// External content transport capability.
///
/// Implementations download the requested content to `dest` and return the
/// byte size written. Network or subprocess failures propagate as errors and
/// are retried by the calling retriever.
#[cfg_attr(test, mockall::automock)]
pub trait ContentFetcher: Send + Sync {
    /// Fetch content for `request` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error on any transport failure.
    fn fetch(&self, request: &FetchRequest, dest: &Path) -> Result<u64>;
}

/// Default transport shelling out to a downloader command.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    command: String,
}

impl CommandFetcher {
    /// Create a fetcher invoking the given downloader command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ContentFetcher for CommandFetcher {
    fn fetch(&self, request: &FetchRequest, dest: &Path) -> Result<u64> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(&request.item_id).arg("--output").arg(dest);

        match &request.kind {
            FetchKind::Sample {
                duration_secs,
                start_offset_secs,
            } => {
                cmd.arg("--duration").arg(duration_secs.to_string());
                cmd.arg("--offset").arg(start_offset_secs.to_string());
            }
            FetchKind::Full { quality } => {
                cmd.arg("--quality").arg(quality.to_string());
            }
        }

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Retrieval {
                item_id: request.item_id.clone(),
                attempts: 1,
                message: format!("downloader exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let size = fs::metadata(dest).map_err(|e| Error::file_access(dest, &e))?.len();
        Ok(size)
    }
}

/// A successfully retrieved local file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievedFile {
    /// Local path of the downloaded content.
    pub path: PathBuf,
    /// Size in bytes.
    pub size_bytes: u64,
}

// =============================================================================
// Shared Retry Engine
// =============================================================================

/// Run `attempt_fn` up to `retries` times with exponential backoff.
///
/// Sleeps `base_delay_ms * 2^(attempt-1)` between attempts. After the budget
/// is spent, the last underlying error is wrapped with the attempt count.
fn retrieve_with_retries(
    item_id: &str,
    retries: u32,
    base_delay_ms: u64,
    mut attempt_fn: impl FnMut() -> Result<RetrievedFile>,
) -> Result<RetrievedFile> {
    let retries = retries.max(1);
    let mut last_error = None;

    for attempt in 1..=retries {
        match attempt_fn() {
            Ok(file) => return Ok(file),
            Err(e) => {
                warn!(
                    "Fetch attempt {}/{} failed for '{}': {}",
                    attempt, retries, item_id, e
                );
                last_error = Some(e);

                if attempt < retries {
                    let delay_ms = base_delay_ms.saturating_mul(1_u64 << (attempt - 1));
                    std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                }
            }
        }
    }

    let message = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
    Err(Error::Retrieval {
        item_id: item_id.to_string(),
        attempts: retries,
        message,
    })
}

/// Validate a downloaded file; on failure, delete it and return the reason.
///
/// Deleting keeps a failed attempt from being mistaken for a usable file on
/// the next attempt or by later cleanup.
fn validate_download(path: &Path, min_bytes: u64, check_magic: bool) -> Result<u64> {
    let size = fs::metadata(path).map_err(|e| Error::file_access(path, &e))?.len();

    if size < min_bytes {
        let _ = fs::remove_file(path);
        return Err(Error::Validation(format!(
            "downloaded file {} is {size} bytes, below the {min_bytes} byte minimum",
            path.display()
        )));
    }

    if check_magic && !has_audio_magic(path) {
        let _ = fs::remove_file(path);
        return Err(Error::Validation(format!(
            "downloaded file {} has no recognizable audio container header",
            path.display()
        )));
    }

    Ok(size)
}

/// Check for an ID3v2 header or an MPEG frame-sync at the start of the file.
fn has_audio_magic(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    match bytes.as_slice() {
        [b'I', b'D', b'3', ..] => true,
        [first, second, ..] => *first == 0xFF && (second & 0xE0) == 0xE0,
        _ => false,
    }
}

/// Checksum of an external item ID: truncated SHA-256 hex.
///
/// This is the deterministic stored-file name stem, so the retriever, the
/// track record, and replace-time deletion all agree on naming.
#[must_use]
pub fn checksum_for(item_id: &str) -> String {
    let digest = Sha256::digest(item_id.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

// =============================================================================
// Sample Retriever
// =============================================================================

/// Options for a sample fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SampleOptions {
    /// Preview length in seconds.
    pub duration_secs: u32,
    /// Number of fetch attempts.
    pub retries: u32,
    /// Offset into the content, in seconds.
    pub start_offset_secs: u32,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            duration_secs: DEFAULT_SAMPLE_SECS,
            retries: DEFAULT_RETRIES,
            start_offset_secs: 0,
        }
    }
}

impl SampleOptions {
    /// Set the number of fetch attempts.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the preview length.
    #[must_use]
    pub const fn with_duration_secs(mut self, duration_secs: u32) -> Self {
        self.duration_secs = duration_secs;
        self
    }

    /// Set the start offset.
    #[must_use]
    pub const fn with_start_offset_secs(mut self, start_offset_secs: u32) -> Self {
        self.start_offset_secs = start_offset_secs;
        self
    }
}

/// Fetches short previews to a temp directory for fingerprinting.
pub struct SampleRetriever<F: ContentFetcher> {
    fetcher: F,
    temp_dir: PathBuf,
    base_delay_ms: u64,
    produced: Vec<PathBuf>,
}

impl<F: ContentFetcher> SampleRetriever<F> {
    /// Create a sample retriever writing into `temp_dir`.
    #[must_use]
    pub fn new(fetcher: F, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            temp_dir: temp_dir.into(),
            base_delay_ms: RETRY_BASE_DELAY_MS,
            produced: Vec::new(),
        }
    }

    /// Set the backoff base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Fetch a preview of `item_id`, retrying per `options`.
    ///
    /// The produced file is tracked so [`Self::cleanup_all`] can sweep it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Retrieval`] wrapping the last underlying error after
    /// the retry budget is spent.
    pub fn retrieve(&mut self, item_id: &str, options: &SampleOptions) -> Result<RetrievedFile> {
        fs::create_dir_all(&self.temp_dir).map_err(|e| Error::file_access(&self.temp_dir, &e))?;

        let dest = self
            .temp_dir
            .join(format!("sample_{}.mp3", checksum_for(item_id)));
        let request = FetchRequest {
            item_id: item_id.to_string(),
            kind: FetchKind::Sample {
                duration_secs: options.duration_secs,
                start_offset_secs: options.start_offset_secs,
            },
        };

        let fetcher = &self.fetcher;
        let file = retrieve_with_retries(item_id, options.retries, self.base_delay_ms, || {
            fetcher.fetch(&request, &dest)?;
            let size_bytes = validate_download(&dest, MIN_SAMPLE_BYTES, false)?;
            Ok(RetrievedFile {
                path: dest.clone(),
                size_bytes,
            })
        })?;

        debug!(
            "Retrieved sample for '{}' ({} bytes)",
            item_id, file.size_bytes
        );
        self.produced.push(file.path.clone());
        Ok(file)
    }

    /// Remove a produced sample file. Removing an absent file is a success.
    pub fn cleanup(&mut self, path: &Path) -> Result<()> {
        remove_if_present(path)?;
        self.produced.retain(|p| p != path);
        Ok(())
    }

    /// Remove every sample file this retriever produced.
    pub fn cleanup_all(&mut self) -> Result<()> {
        let paths = std::mem::take(&mut self.produced);
        let count = paths.len();
        for path in paths {
            remove_if_present(&path)?;
        }
        if count > 0 {
            info!("Cleaned up {count} sample file(s)");
        }
        Ok(())
    }
}

// =============================================================================
// Full Content Retriever
// =============================================================================

/// Options for a full-content fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FullOptions {
    /// Requested quality in kbps.
    pub quality: u32,
    /// Number of fetch attempts.
    pub retries: u32,
}

impl Default for FullOptions {
    fn default() -> Self {
        Self {
            quality: 192,
            retries: DEFAULT_RETRIES,
        }
    }
}

impl FullOptions {
    /// Set the requested quality.
    #[must_use]
    pub const fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    /// Set the number of fetch attempts.
    #[must_use]
    pub const fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Fetches complete content into the library directory.
///
/// Downloads land under a `.part` name and are renamed into place only after
/// validation, so interrupted fetches never masquerade as library content.
pub struct FullRetriever<F: ContentFetcher> {
    fetcher: F,
    library_dir: PathBuf,
    base_delay_ms: u64,
}

impl<F: ContentFetcher> FullRetriever<F> {
    /// Create a full-content retriever writing into `library_dir`.
    #[must_use]
    pub fn new(fetcher: F, library_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            library_dir: library_dir.into(),
            base_delay_ms: RETRY_BASE_DELAY_MS,
        }
    }

    /// Set the backoff base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Stored file name for an item: checksum stem plus extension.
    #[must_use]
    pub fn stored_filename_for(item_id: &str) -> String {
        format!("{}.mp3", checksum_for(item_id))
    }

    /// Full stored path for an item within the library directory.
    #[must_use]
    pub fn stored_path_for(&self, item_id: &str) -> PathBuf {
        self.library_dir.join(Self::stored_filename_for(item_id))
    }

    /// Fetch the complete content of `item_id`, retrying per `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Retrieval`] wrapping the last underlying error after
    /// the retry budget is spent.
    pub fn retrieve(&mut self, item_id: &str, options: &FullOptions) -> Result<RetrievedFile> {
        fs::create_dir_all(&self.library_dir)
            .map_err(|e| Error::file_access(&self.library_dir, &e))?;

        let final_path = self.stored_path_for(item_id);
        let partial_path = final_path.with_extension(PARTIAL_SUFFIX);
        let request = FetchRequest {
            item_id: item_id.to_string(),
            kind: FetchKind::Full {
                quality: options.quality,
            },
        };

        let fetcher = &self.fetcher;
        let file = retrieve_with_retries(item_id, options.retries, self.base_delay_ms, || {
            fetcher.fetch(&request, &partial_path)?;
            let size_bytes = validate_download(&partial_path, MIN_CONTENT_BYTES, true)?;
            fs::rename(&partial_path, &final_path)
                .map_err(|e| Error::persistence(&final_path, &e))?;
            Ok(RetrievedFile {
                path: final_path.clone(),
                size_bytes,
            })
        })?;

        info!(
            "Retrieved full content for '{}' to {} ({} bytes)",
            item_id,
            file.path.display(),
            file.size_bytes
        );
        Ok(file)
    }

    /// Remove a stored file. Removing an absent file is a success.
    pub fn cleanup(&mut self, path: &Path) -> Result<()> {
        remove_if_present(path)
    }

    /// Sweep leftover partial downloads from the library directory.
    pub fn cleanup_all(&mut self) -> Result<()> {
        if !self.library_dir.exists() {
            return Ok(());
        }

        let mut removed = 0_usize;
        for entry in fs::read_dir(&self.library_dir)
            .map_err(|e| Error::file_access(&self.library_dir, &e))?
            .flatten()
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == PARTIAL_SUFFIX) {
                remove_if_present(&path)?;
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Cleaned up {removed} partial download(s)");
        }
        Ok(())
    }
}

/// Idempotent file removal: an absent file is a success, not an error.
pub(crate) fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::file_access(path, &e)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// A fetcher that writes scripted payloads, one per attempt.
    struct ScriptedFetcher {
        payloads: Mutex<Vec<Result<Vec<u8>>>>,
    }

    impl ScriptedFetcher {
        fn new(payloads: Vec<Result<Vec<u8>>>) -> Self {
            let mut payloads = payloads;
            payloads.reverse();
            Self {
                payloads: Mutex::new(payloads),
            }
        }
    }

    impl ContentFetcher for ScriptedFetcher {
        fn fetch(&self, _request: &FetchRequest, dest: &Path) -> Result<u64> {
            let next = self
                .payloads
                .lock()
                .unwrap()
                .pop()
                .expect("fetcher invoked more times than scripted");
            let bytes = next?;
            fs::write(dest, &bytes).unwrap();
            Ok(bytes.len() as u64)
        }
    }

    fn valid_sample_bytes() -> Vec<u8> {
        vec![0_u8; (MIN_SAMPLE_BYTES + 1) as usize]
    }

    fn valid_full_bytes() -> Vec<u8> {
        let mut bytes = vec![0_u8; (MIN_CONTENT_BYTES + 1) as usize];
        bytes[..3].copy_from_slice(b"ID3");
        bytes
    }

    fn transport_error() -> Error {
        Error::Retrieval {
            item_id: "yt:abc".to_string(),
            attempts: 1,
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_sample_retrieve_success() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::new(vec![Ok(valid_sample_bytes())]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let file = retriever
            .retrieve("yt:abc", &SampleOptions::default())
            .unwrap();
        assert!(file.path.exists());
        assert_eq!(file.size_bytes, MIN_SAMPLE_BYTES + 1);
    }

    #[test]
    fn test_retry_budget_exhausted_wraps_last_error() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::new(vec![
            Err(transport_error()),
            Err(transport_error()),
            Err(transport_error()),
        ]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let err = retriever
            .retrieve("yt:abc", &SampleOptions::default().with_retries(3))
            .unwrap_err();
        match err {
            Error::Retrieval {
                item_id,
                attempts,
                message,
            } => {
                assert_eq!(item_id, "yt:abc");
                assert_eq!(attempts, 3);
                assert!(message.contains("connection reset"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let dir = TempDir::new().unwrap();
        let fetcher =
            ScriptedFetcher::new(vec![Err(transport_error()), Ok(valid_sample_bytes())]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let file = retriever
            .retrieve("yt:abc", &SampleOptions::default())
            .unwrap();
        assert!(file.path.exists());
    }

    #[test]
    fn test_undersized_sample_is_deleted_and_retried() {
        let dir = TempDir::new().unwrap();
        // First attempt produces a runt file; second a valid one.
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![0_u8; 100]), Ok(valid_sample_bytes())]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let file = retriever
            .retrieve("yt:abc", &SampleOptions::default())
            .unwrap();
        assert_eq!(file.size_bytes, MIN_SAMPLE_BYTES + 1);
    }

    #[test]
    fn test_undersized_sample_every_attempt_fails() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::new(vec![Ok(vec![0_u8; 100]), Ok(vec![0_u8; 100])]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let err = retriever
            .retrieve("yt:abc", &SampleOptions::default().with_retries(2))
            .unwrap_err();
        assert!(matches!(err, Error::Retrieval { attempts: 2, .. }));
        // The runt file must not linger.
        assert!(
            !dir.path()
                .join(format!("sample_{}.mp3", checksum_for("yt:abc")))
                .exists()
        );
    }

    #[test]
    fn test_sample_cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::new(vec![Ok(valid_sample_bytes())]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let file = retriever
            .retrieve("yt:abc", &SampleOptions::default())
            .unwrap();
        retriever.cleanup(&file.path).unwrap();
        assert!(!file.path.exists());
        // Second removal of the same path is still a success.
        retriever.cleanup(&file.path).unwrap();
    }

    #[test]
    fn test_sample_cleanup_all_sweeps_produced_files() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::new(vec![
            Ok(valid_sample_bytes()),
            Ok(valid_sample_bytes()),
        ]);
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let a = retriever
            .retrieve("yt:aaa", &SampleOptions::default())
            .unwrap();
        let b = retriever
            .retrieve("yt:bbb", &SampleOptions::default())
            .unwrap();

        retriever.cleanup_all().unwrap();
        assert!(!a.path.exists());
        assert!(!b.path.exists());
    }

    #[test]
    fn test_full_retrieve_success_uses_deterministic_name() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::new(vec![Ok(valid_full_bytes())]);
        let mut retriever = FullRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let file = retriever
            .retrieve("yt:abc", &FullOptions::default())
            .unwrap();
        assert_eq!(file.path, retriever.stored_path_for("yt:abc"));
        assert!(file.path.exists());
        // No partial file remains after the commit rename.
        assert!(!file.path.with_extension(PARTIAL_SUFFIX).exists());
    }

    #[test]
    fn test_full_retrieve_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        // Large enough but all zeroes: no ID3 header, no frame sync.
        let fetcher = ScriptedFetcher::new(vec![
            Ok(vec![0_u8; (MIN_CONTENT_BYTES + 1) as usize]),
            Ok(valid_full_bytes()),
        ]);
        let mut retriever = FullRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let file = retriever
            .retrieve("yt:abc", &FullOptions::default())
            .unwrap();
        assert!(file.path.exists());
    }

    #[test]
    fn test_full_retrieve_accepts_frame_sync_magic() {
        let dir = TempDir::new().unwrap();
        let mut bytes = vec![0_u8; (MIN_CONTENT_BYTES + 1) as usize];
        bytes[0] = 0xFF;
        bytes[1] = 0xFB;
        let fetcher = ScriptedFetcher::new(vec![Ok(bytes)]);
        let mut retriever = FullRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        assert!(retriever.retrieve("yt:abc", &FullOptions::default()).is_ok());
    }

    #[test]
    fn test_full_cleanup_all_sweeps_partials_only() {
        let dir = TempDir::new().unwrap();
        let partial = dir.path().join("deadbeef.part");
        let committed = dir.path().join("deadbeef.mp3");
        fs::write(&partial, b"half").unwrap();
        fs::write(&committed, b"whole").unwrap();

        let fetcher = ScriptedFetcher::new(vec![]);
        let mut retriever = FullRetriever::new(fetcher, dir.path());
        retriever.cleanup_all().unwrap();

        assert!(!partial.exists());
        assert!(committed.exists());
    }

    #[test]
    fn test_checksum_for_is_deterministic() {
        let a = checksum_for("yt:abc");
        let b = checksum_for("yt:abc");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, checksum_for("yt:abd"));
    }

    #[test]
    fn test_mock_fetcher_retry_count() {
        // The retry engine makes exactly `retries` attempts against a
        // transport that always fails.
        let dir = TempDir::new().unwrap();
        let mut fetcher = MockContentFetcher::new();
        fetcher
            .expect_fetch()
            .times(4)
            .returning(|req, _| {
                Err(Error::Retrieval {
                    item_id: req.item_id.clone(),
                    attempts: 1,
                    message: "timeout".to_string(),
                })
            });
        let mut retriever = SampleRetriever::new(fetcher, dir.path()).with_base_delay_ms(1);

        let err = retriever
            .retrieve("yt:abc", &SampleOptions::default().with_retries(4))
            .unwrap_err();
        assert!(matches!(err, Error::Retrieval { attempts: 4, .. }));
    }
}
