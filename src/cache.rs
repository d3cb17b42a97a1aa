//! Flat-file cache of raw API responses, keyed by dataset, geo and a hash of the filters.

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CacheMode {
    /// Read hits, write fresh responses.
    Use,
    /// Ignore existing entries but overwrite them with fresh responses.
    Refresh,
    Off,
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    mode: CacheMode,
}

pub fn default_cache_dir() -> Result<PathBuf> {
    let mut dir = dirs::cache_dir().ok_or_else(|| anyhow!("Could not locate a cache directory"))?;
    dir.push("eurostat-macro");
    Ok(dir)
}

/// Stable hash of a filter set. `BTreeMap` keeps keys sorted, so insertion order is irrelevant.
pub fn params_hash(params: &BTreeMap<String, String>) -> String {
    let serialized = serde_json::to_string(params).unwrap_or_else(|_| format!("{:?}", params));
    format!("{:x}", Sha256::digest(serialized.as_bytes()))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, mode: CacheMode) -> Self {
        let dir = dir.into();
        if mode != CacheMode::Off {
            if let Err(e) = fs::create_dir_all(&dir) {
                warn!(dir = %dir.display(), error = %e, "could not create cache directory");
            }
        }
        ResponseCache { dir, mode }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn path_for(&self, dataset: &str, geo: &str, params: &BTreeMap<String, String>) -> PathBuf {
        let name = format!("{}_{}_{}.json", sanitize(dataset), sanitize(geo), params_hash(params));
        self.dir.join(name)
    }

    /// Cached body for the request, if present and valid JSON.
    pub fn load(&self, dataset: &str, geo: &str, params: &BTreeMap<String, String>) -> Option<Vec<u8>> {
        if self.mode != CacheMode::Use {
            return None;
        }
        let path = self.path_for(dataset, geo, params);
        let bytes = match fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read cache entry, fetching remotely");
                return None;
            }
        };
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(_) => {
                debug!(path = %path.display(), "cache hit");
                Some(bytes)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry, fetching remotely");
                None
            }
        }
    }

    /// Best-effort write; failures are logged and swallowed.
    pub fn store(&self, dataset: &str, geo: &str, params: &BTreeMap<String, String>, body: &[u8]) {
        if self.mode == CacheMode::Off {
            return;
        }
        let path = self.path_for(dataset, geo, params);
        if let Err(e) = fs::write(&path, body) {
            warn!(path = %path.display(), error = %e, "cannot write cache entry");
        }
    }
}
