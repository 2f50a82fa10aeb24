//! Bounded cache of decode results, keyed by file identity + parameters.
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::decoder::{DecodeResult, DecoderParams};

/// Cache key: file identity (name, size, mtime) plus everything that
/// changes the decode output. Raw and intermediate buffers are never
/// cached, only final results.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub file_name: String,
  pub file_size: u64,
  pub file_mtime_ns: u128,
  pub params: DecoderParams,
  pub analyze: bool,
}

impl CacheKey {
  /// Builds a key from the file's current metadata. Returns None when
  /// the file cannot be stat'ed; such decodes simply bypass the cache.
  pub fn for_file(path: &str, params: DecoderParams, analyze: bool) -> Option<CacheKey> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta.modified().ok()?;
    let mtime_ns = mtime.duration_since(std::time::UNIX_EPOCH).ok()?.as_nanos();
    let file_name = Path::new(path).file_name()?.to_string_lossy().into_owned();
    Some(CacheKey { file_name, file_size: meta.len(), file_mtime_ns: mtime_ns, params, analyze })
  }
}

/// Process-lifetime decode cache with insertion-order eviction.
///
/// Single-threaded within one run, but batch mode shares one instance
/// across workers, so every access goes through the mutex.
pub struct ResultCache {
  inner: Mutex<CacheInner>,
  capacity: usize,
}

struct CacheInner {
  map: HashMap<CacheKey, DecodeResult>,
  order: VecDeque<CacheKey>,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 100;

impl ResultCache {
  pub fn new(capacity: usize) -> Self {
    ResultCache {
      inner: Mutex::new(CacheInner { map: HashMap::new(), order: VecDeque::new() }),
      capacity,
    }
  }

  pub fn get(&self, key: &CacheKey) -> Option<DecodeResult> {
    let inner = self.inner.lock().expect("cache mutex poisoned");
    inner.map.get(key).cloned()
  }

  /// Inserts a result, evicting the oldest inserted entry on overflow.
  pub fn insert(&self, key: CacheKey, result: DecodeResult) {
    let mut inner = self.inner.lock().expect("cache mutex poisoned");
    if inner.map.contains_key(&key) {
      inner.map.insert(key, result);
      return;
    }
    if inner.map.len() >= self.capacity {
      if let Some(oldest) = inner.order.pop_front() {
        inner.map.remove(&oldest);
      }
    }
    inner.order.push_back(key.clone());
    inner.map.insert(key, result);
  }

  pub fn len(&self) -> usize {
    self.inner.lock().expect("cache mutex poisoned").map.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for ResultCache {
  fn default() -> Self {
    ResultCache::new(DEFAULT_CACHE_CAPACITY)
  }
}
