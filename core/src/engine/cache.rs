// dwi-connectome/src/engine/cache.rs

//! Per-node fingerprints persisted as JSON in the graph work directory.

use crate::error::{DwiError, DwiResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{event, Level};

pub const CACHE_FILE: &str = "node_cache.json";

#[derive(Debug)]
pub struct NodeCache {
  path: PathBuf,
  entries: Mutex<BTreeMap<String, String>>,
}

impl NodeCache {
  /// Loads `<work_dir>/node_cache.json`. A missing file is an empty cache.
  pub fn load(work_dir: &Path) -> DwiResult<Self> {
    let path = work_dir.join(CACHE_FILE);
    let entries = match std::fs::read_to_string(&path) {
      Ok(text) => serde_json::from_str(&text).map_err(|source| DwiError::Json {
        path: path.clone(),
        source,
      })?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
      Err(e) => return Err(DwiError::io(&path, e)),
    };
    Ok(Self {
      path,
      entries: Mutex::new(entries),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn fingerprint(&self, step: &str) -> Option<String> {
    self.entries.lock().get(step).cloned()
  }

  pub fn is_current(&self, step: &str, fingerprint: &str) -> bool {
    self.entries.lock().get(step).is_some_and(|f| f == fingerprint)
  }

  /// Records a successful node and persists the whole cache.
  pub fn record(&self, step: &str, fingerprint: &str) -> DwiResult<()> {
    let mut entries = self.entries.lock();
    entries.insert(step.to_string(), fingerprint.to_string());
    self.persist(&entries)
  }

  /// Forgets every node, on disk too.
  pub fn clear(&self) -> DwiResult<()> {
    let mut entries = self.entries.lock();
    let dropped = entries.len();
    entries.clear();
    match std::fs::remove_file(&self.path) {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(DwiError::io(&self.path, e)),
    }
    event!(Level::INFO, dropped, "Node cache cleared for rerun.");
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.entries.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().is_empty()
  }

  fn persist(&self, entries: &BTreeMap<String, String>) -> DwiResult<()> {
    let text = serde_json::to_string_pretty(entries).map_err(|source| DwiError::Json {
      path: self.path.clone(),
      source,
    })?;
    std::fs::write(&self.path, text).map_err(|e| DwiError::io(&self.path, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn survives_reload_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let cache = NodeCache::load(dir.path()).unwrap();
    assert!(cache.is_empty());
    cache.record("mrconvert", "abc").unwrap();

    let reloaded = NodeCache::load(dir.path()).unwrap();
    assert!(reloaded.is_current("mrconvert", "abc"));
    assert!(!reloaded.is_current("mrconvert", "abd"));

    reloaded.clear().unwrap();
    assert!(reloaded.is_empty());
    assert!(NodeCache::load(dir.path()).unwrap().is_empty());
  }

  #[test]
  fn malformed_file_is_a_json_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CACHE_FILE), "{not json").unwrap();
    assert!(matches!(NodeCache::load(dir.path()), Err(DwiError::Json { .. })));
  }
}
