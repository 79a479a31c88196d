//! Fingerprint generation adapter.
//!
//! The actual acoustic analysis is an external capability (a `fpcalc`-style
//! analyzer subprocess); this module wraps it behind the
//! [`FingerprintBackend`] trait so the rest of the pipeline is written
//! against a uniform blocking contract. The [`FingerprintGenerator`] adds:
//! - fail-fast local file checks before the backend is ever invoked
//! - validation of the backend output (minimum signature length)
//! - a TTL-bounded cache keyed by `(path, window, format)` with hit/miss
//!   statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use tunevault_core::generator::{FingerprintGenerator, FingerprintOptions};
//!
//! let mut generator = FingerprintGenerator::with_command("fpcalc");
//! let fp = generator.generate(Path::new("sample.mp3"), &FingerprintOptions::default())?;
//! println!("signature: {}", fp.signature());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, MIN_SIGNATURE_LENGTH};
use crate::track::now_epoch_secs;

/// Default analysis window length in seconds.
pub const DEFAULT_WINDOW_SECS: u32 = 60;

/// Default time-to-live for cached fingerprints (1 hour).
pub const DEFAULT_FINGERPRINT_TTL_SECS: u64 = 60 * 60;

/// Signature output format requested from the analyzer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignatureFormat {
    /// Compact base64-style signature (default).
    #[default]
    Compact,
    /// Raw integer signature.
    Raw,
}

impl std::fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compact => write!(f, "compact"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// Options controlling a single fingerprint generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintOptions {
    /// Analysis window length in seconds.
    pub window_secs: u32,

    /// Whether the TTL cache may satisfy this request.
    pub use_cache: bool,

    /// Requested signature format.
    pub format: SignatureFormat,
}

impl Default for FingerprintOptions {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            use_cache: true,
            format: SignatureFormat::default(),
        }
    }
}

impl FingerprintOptions {
    /// Set the analysis window length.
    #[must_use]
    pub const fn with_window_secs(mut self, window_secs: u32) -> Self {
        self.window_secs = window_secs;
        self
    }

    /// Enable or disable cache use for this request.
    #[must_use]
    pub const fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Set the signature format.
    #[must_use]
    pub const fn with_format(mut self, format: SignatureFormat) -> Self {
        self.format = format;
        self
    }
}

/// Unvalidated analyzer output.
#[derive(Debug, Clone)]
pub struct RawFingerprint {
    /// Signature text emitted by the analyzer.
    pub signature: String,
    /// Duration reported by the analyzer, in seconds.
    pub duration_secs: f64,
}

/// External acoustic analysis capability.
#[cfg_attr(test, mockall::automock)]
pub trait FingerprintBackend: Send + Sync {
    /// Compute a raw fingerprint for a local audio file.
    ///
    /// # Errors
    ///
    /// Returns an error if the analyzer fails or its output is unparseable.
    fn compute(&self, path: &Path, window_secs: u32, format: SignatureFormat)
    -> Result<RawFingerprint>;
}

/// Default backend shelling out to an `fpcalc`-compatible analyzer.
///
/// The analyzer is expected to print `DURATION=<secs>` and
/// `FINGERPRINT=<signature>` lines on stdout.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    command: String,
}

impl CommandBackend {
    /// Create a backend invoking the given analyzer command.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for CommandBackend {
    fn default() -> Self {
        Self::new("fpcalc")
    }
}

impl FingerprintBackend for CommandBackend {
    fn compute(
        &self,
        path: &Path,
        window_secs: u32,
        format: SignatureFormat,
    ) -> Result<RawFingerprint> {
        let mut cmd = Command::new(&self.command);
        cmd.arg("-length").arg(window_secs.to_string());
        if format == SignatureFormat::Raw {
            cmd.arg("-raw");
        }
        cmd.arg(path);

        let output = cmd.output().map_err(|e| {
            Error::InvalidFingerprint(format!("failed to run analyzer '{}': {e}", self.command))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::InvalidFingerprint(format!(
                "analyzer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_analyzer_output(&stdout)
    }
}

/// Parse `DURATION=`/`FINGERPRINT=` lines from analyzer stdout.
fn parse_analyzer_output(stdout: &str) -> Result<RawFingerprint> {
    let mut duration_secs = None;
    let mut signature = None;

    for line in stdout.lines() {
        if let Some(value) = line.strip_prefix("DURATION=") {
            duration_secs = value.trim().parse::<f64>().ok();
        } else if let Some(value) = line.strip_prefix("FINGERPRINT=") {
            signature = Some(value.trim().to_string());
        }
    }

    match (signature, duration_secs) {
        (Some(signature), Some(duration_secs)) => Ok(RawFingerprint {
            signature,
            duration_secs,
        }),
        _ => Err(Error::InvalidFingerprint(
            "analyzer output missing DURATION or FINGERPRINT".to_string(),
        )),
    }
}

/// Cache key for a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    window_secs: u32,
    format: SignatureFormat,
}

/// A cached fingerprint with its insertion time.
#[derive(Debug, Clone)]
struct CachedFingerprint {
    fingerprint: Fingerprint,
    cached_at: u64,
}

impl CachedFingerprint {
    fn is_expired(&self, ttl_secs: u64) -> bool {
        now_epoch_secs().saturating_sub(self.cached_at) > ttl_secs
    }
}

/// Cache hit/miss statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests satisfied from the cache.
    pub hits: u64,
    /// Requests that invoked the backend.
    pub misses: u64,
    /// Entries currently cached.
    pub entries: usize,
}

/// Fingerprint generator with TTL caching over an injected backend.
pub struct FingerprintGenerator<B: FingerprintBackend> {
    backend: B,
    cache: HashMap<CacheKey, CachedFingerprint>,
    ttl_secs: u64,
    hits: u64,
    misses: u64,
}

impl FingerprintGenerator<CommandBackend> {
    /// Create a generator using the given analyzer command.
    #[must_use]
    pub fn with_command(command: impl Into<String>) -> Self {
        Self::new(CommandBackend::new(command))
    }
}

impl<B: FingerprintBackend> FingerprintGenerator<B> {
    /// Create a generator over the given backend with the default TTL.
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
            ttl_secs: DEFAULT_FINGERPRINT_TTL_SECS,
            hits: 0,
            misses: 0,
        }
    }

    /// Set the cache time-to-live.
    #[must_use]
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Generate a validated fingerprint for a local audio file.
    ///
    /// Checks the file is readable before invoking the backend, and rejects
    /// signatures shorter than [`MIN_SIGNATURE_LENGTH`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileAccess`] if the file is missing or unreadable,
    /// [`Error::InvalidFingerprint`] if the analyzer fails or produces a
    /// truncated signature.
    pub fn generate(&mut self, path: &Path, options: &FingerprintOptions) -> Result<Fingerprint> {
        // Fail fast before spawning the analyzer.
        std::fs::metadata(path)
            .map_err(|e| Error::file_access(path, &e))
            .and_then(|m| {
                if m.is_file() {
                    Ok(())
                } else {
                    Err(Error::FileAccess {
                        path: path.to_path_buf(),
                        message: "not a regular file".to_string(),
                    })
                }
            })?;

        let key = CacheKey {
            path: path.to_path_buf(),
            window_secs: options.window_secs,
            format: options.format,
        };

        if options.use_cache
            && let Some(cached) = self.cache.get(&key)
            && !cached.is_expired(self.ttl_secs)
        {
            self.hits += 1;
            debug!("Fingerprint cache hit for {}", path.display());
            return Ok(cached.fingerprint.clone());
        }

        self.misses += 1;
        let raw = self
            .backend
            .compute(path, options.window_secs, options.format)?;

        if raw.signature.len() < MIN_SIGNATURE_LENGTH {
            warn!(
                "Analyzer returned a truncated signature ({} chars) for {}",
                raw.signature.len(),
                path.display()
            );
        }
        let fingerprint = Fingerprint::new(raw.signature, raw.duration_secs)?;

        if options.use_cache {
            self.cache.insert(
                key,
                CachedFingerprint {
                    fingerprint: fingerprint.clone(),
                    cached_at: now_epoch_secs(),
                },
            );
        }

        debug!(
            "Generated fingerprint for {} ({}s window, {} format)",
            path.display(),
            options.window_secs,
            options.format
        );
        Ok(fingerprint)
    }

    /// Current cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.cache.len(),
        }
    }

    /// Drop all cached fingerprints and reset the hit/miss counters.
    pub fn clear_cache(&mut self) {
        let dropped = self.cache.len();
        self.cache.clear();
        self.hits = 0;
        self.misses = 0;
        info!("Fingerprint cache cleared ({dropped} entries dropped)");
    }
}
