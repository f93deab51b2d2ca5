//! Content-addressed response cache.
//!
//! Entries are keyed by a [`Fingerprint`]: a SHA-256 over the task id, model
//! identity, trial index, normalized prompt, engine configuration and fixture
//! contents. Fields are null-delimited so adjacent values cannot collide.
//!
//! Caching is opt-in. [`NullCache`] is the default; [`FsCache`] stores one
//! JSON file per key and never overwrites an existing entry.

use crate::engine::{EngineRequest, EngineResponse};
use crate::tasks::resolve_fixture;
use crate::types::iso_timestamp_now;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode cache entry: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid fingerprint hex: {0}")]
    InvalidFingerprint(String),
    #[error("refusing to clear {path}: {reason}")]
    Unsafe { path: String, reason: String },
}

// ============================================================================
// FINGERPRINT
// ============================================================================

/// SHA-256 cache key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn builder() -> FingerprintBuilder {
        FingerprintBuilder {
            hasher: Sha256::new(),
        }
    }

    /// Key for one trial's engine call.
    pub fn for_request(request: &EngineRequest, engine_config: &str) -> Self {
        let mut builder = Self::builder()
            .field(&request.task_id)
            .field(&request.model)
            .number(u64::from(request.trial_index))
            .field(&normalize_prompt(&request.prompt))
            .field(engine_config);

        let mut fixtures: Vec<&String> = request.files.iter().collect();
        fixtures.sort();
        for fixture in fixtures {
            builder = builder.fixture(request.context_dir.as_deref(), fixture);
        }
        builder.finish()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| CacheError::InvalidFingerprint(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CacheError::InvalidFingerprint(s.to_string()))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    pub fn field(mut self, value: &str) -> Self {
        self.hasher.update(value.as_bytes());
        self.hasher.update([0u8]);
        self
    }

    pub fn number(self, value: u64) -> Self {
        self.field(&value.to_string())
    }

    /// Mix in a fixture file's contents; a missing file contributes its name
    /// so adding the file later still changes the key. Only files inside
    /// `base` are ever read.
    pub fn fixture(mut self, base: Option<&Path>, name: &str) -> Self {
        let Some(path) = base.and_then(|dir| resolve_fixture(dir, name)) else {
            return self.field(name);
        };
        match fs::read(&path) {
            Ok(bytes) => {
                self.hasher.update(&bytes);
                self.hasher.update([0u8]);
                self
            }
            Err(_) => self.field(name),
        }
    }

    pub fn finish(self) -> Fingerprint {
        let hash = self.hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        Fingerprint(bytes)
    }
}

/// CRLF to LF, then trim surrounding whitespace.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.replace("\r\n", "\n").trim().to_string()
}

// ============================================================================
// STORES
// ============================================================================

/// An immutable cache record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: Fingerprint,
    pub response: EngineResponse,
    pub created_at: String,
}

impl CacheEntry {
    pub fn new(key: Fingerprint, response: EngineResponse) -> Self {
        Self {
            key,
            response,
            created_at: iso_timestamp_now(),
        }
    }
}

/// Fingerprint-keyed response store.
///
/// Implementations must be safe for concurrent reads. Writes are idempotent
/// per key: once a key has an entry, later puts leave it untouched.
pub trait Cache: Send + Sync {
    fn get(&self, key: &Fingerprint) -> Option<CacheEntry>;
    fn put(&self, key: &Fingerprint, response: &EngineResponse) -> Result<(), CacheError>;

    /// False for [`NullCache`]; lets the orchestrator skip wrapping engines.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Always misses; writes are dropped.
#[derive(Debug, Default)]
pub struct NullCache;

impl Cache for NullCache {
    fn get(&self, _key: &Fingerprint) -> Option<CacheEntry> {
        None
    }

    fn put(&self, _key: &Fingerprint, _response: &EngineResponse) -> Result<(), CacheError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// In-process cache, handy for library callers and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<Fingerprint, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    fn put(&self, key: &Fingerprint, response: &EngineResponse) -> Result<(), CacheError> {
        self.entries
            .lock()
            .entry(*key)
            .or_insert_with(|| CacheEntry::new(*key, response.clone()));
        Ok(())
    }
}

/// One JSON file per key under `dir`, named `<hex>.json`.
#[derive(Debug)]
pub struct FsCache {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl FsCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.json", key.to_hex()))
    }

    /// Delete the cache directory. Refuses when the directory holds anything
    /// other than `.json` cache files.
    pub fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.write();
        if !self.dir.exists() {
            return Ok(());
        }

        let unsafe_dir = |reason: &str| CacheError::Unsafe {
            path: self.dir.display().to_string(),
            reason: reason.to_string(),
        };

        let mut has_entries = false;
        let mut has_cache_files = false;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            has_entries = true;
            if entry.file_type()?.is_dir() {
                return Err(unsafe_dir("directory contains subdirectories"));
            }
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                has_cache_files = true;
            } else {
                return Err(unsafe_dir("directory contains non-cache files"));
            }
        }
        if has_entries && !has_cache_files {
            return Err(unsafe_dir("no cache files found"));
        }

        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

impl Cache for FsCache {
    fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        let _guard = self.lock.read();
        let data = fs::read(self.entry_path(key)).ok()?;
        match serde_json::from_slice::<CacheEntry>(&data) {
            Ok(entry) if entry.key == *key => Some(entry),
            Ok(_) | Err(_) => {
                debug!(key = %key, "ignoring unreadable cache entry");
                None
            }
        }
    }

    fn put(&self, key: &Fingerprint, response: &EngineResponse) -> Result<(), CacheError> {
        let _guard = self.lock.write();
        let path = self.entry_path(key);
        if path.exists() {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)?;

        let entry = CacheEntry::new(*key, response.clone());
        let data = serde_json::to_vec_pretty(&entry)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str, trial_index: u32) -> EngineRequest {
        EngineRequest {
            task_id: "task".into(),
            model: "gpt-4o".into(),
            trial_index,
            prompt: prompt.into(),
            files: vec![],
            context_dir: None,
        }
    }

    fn response(output: &str) -> EngineResponse {
        EngineResponse {
            output: output.into(),
            tool_calls: 2,
            duration_ms: 12.5,
            from_cache: false,
        }
    }

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint::for_request(&request("hi", 0), "mock");
        let hex = fp.to_string();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex.parse::<Fingerprint>().unwrap(), fp);
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!("zz".repeat(32).parse::<Fingerprint>().is_err());
    }

    #[test]
    fn fingerprint_normalizes_prompt_whitespace() {
        let a = Fingerprint::for_request(&request("line one\r\nline two  ", 0), "mock");
        let b = Fingerprint::for_request(&request("line one\nline two", 0), "mock");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_varies_by_trial_and_engine() {
        let base = Fingerprint::for_request(&request("hi", 0), "mock");
        assert_ne!(base, Fingerprint::for_request(&request("hi", 1), "mock"));
        assert_ne!(base, Fingerprint::for_request(&request("hi", 0), "command:python a.py"));
    }

    #[test]
    fn fields_are_delimited() {
        let a = Fingerprint::builder().field("ab").field("c").finish();
        let b = Fingerprint::builder().field("a").field("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn fixture_contents_change_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("hi", 0);
        req.files = vec!["sample.py".into()];
        req.context_dir = Some(dir.path().to_path_buf());

        let missing = Fingerprint::for_request(&req, "mock");
        fs::write(dir.path().join("sample.py"), "print(1)").unwrap();
        let v1 = Fingerprint::for_request(&req, "mock");
        fs::write(dir.path().join("sample.py"), "print(2)").unwrap();
        let v2 = Fingerprint::for_request(&req, "mock");

        assert_ne!(missing, v1);
        assert_ne!(v1, v2);
    }

    #[test]
    fn fixtures_outside_context_dir_are_never_read() {
        let root = tempfile::tempdir().unwrap();
        let context = root.path().join("fixtures");
        fs::create_dir_all(&context).unwrap();
        let secret = root.path().join("secret.txt");
        fs::write(&secret, "one").unwrap();

        let mut req = request("hi", 0);
        req.context_dir = Some(context);
        req.files = vec!["../secret.txt".into(), secret.display().to_string()];

        let before = Fingerprint::for_request(&req, "mock");
        fs::write(&secret, "two").unwrap();
        let after = Fingerprint::for_request(&req, "mock");
        assert_eq!(before, after);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_fixture_escaping_context_dir_is_never_read() {
        let root = tempfile::tempdir().unwrap();
        let context = root.path().join("fixtures");
        fs::create_dir_all(&context).unwrap();
        let secret = root.path().join("secret.txt");
        fs::write(&secret, "one").unwrap();
        std::os::unix::fs::symlink(&secret, context.join("link.txt")).unwrap();

        let mut req = request("hi", 0);
        req.context_dir = Some(context);
        req.files = vec!["link.txt".into()];

        let before = Fingerprint::for_request(&req, "mock");
        fs::write(&secret, "two").unwrap();
        assert_eq!(before, Fingerprint::for_request(&req, "mock"));
    }

    #[test]
    fn fs_cache_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path().join("cache"));
        let key = Fingerprint::for_request(&request("hi", 0), "mock");

        assert!(cache.get(&key).is_none());
        cache.put(&key, &response("hello")).unwrap();
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.key, key);
        assert_eq!(entry.response, response("hello"));
    }

    #[test]
    fn fs_cache_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let key = Fingerprint::for_request(&request("hi", 0), "mock");

        cache.put(&key, &response("first")).unwrap();
        cache.put(&key, &response("second")).unwrap();
        assert_eq!(cache.get(&key).unwrap().response.output, "first");
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let key = Fingerprint::for_request(&request("hi", 0), "mock");
        fs::write(dir.path().join(format!("{key}.json")), "{not json").unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn clear_removes_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        let cache = FsCache::new(&cache_dir);
        cache
            .put(&Fingerprint::builder().field("x").finish(), &response("x"))
            .unwrap();
        cache.clear().unwrap();
        assert!(!cache_dir.exists());
        // Missing directory is fine.
        cache.clear().unwrap();
    }

    #[test]
    fn clear_refuses_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let cache = FsCache::new(dir.path());
        let err = cache.clear().unwrap_err();
        assert!(matches!(err, CacheError::Unsafe { .. }));
        assert!(dir.path().join("notes.txt").exists());

        let nested = tempfile::tempdir().unwrap();
        fs::create_dir(nested.path().join("sub")).unwrap();
        assert!(FsCache::new(nested.path()).clear().is_err());
    }

    #[test]
    fn memory_cache_keeps_first_write() {
        let cache = MemoryCache::new();
        let key = Fingerprint::builder().field("k").finish();
        cache.put(&key, &response("a")).unwrap();
        cache.put(&key, &response("b")).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().response.output, "a");
    }
}
