//! Approved baseline screenshots
//!
//! Baselines are keyed by `(url, viewport)` and stored as `<stem>.png` with a
//! `<stem>.json` sidecar. Writes go through a temp file in the same directory
//! and are renamed into place, one writer per key at a time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use locaudit_common::{BaselineKey, Viewport};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::visual::{write_png, Screenshot};

/// Longest URL slug kept in a file stem
const MAX_SLUG_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineState {
    Absent,
    Present,
}

/// Sidecar metadata for a baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineMeta {
    pub url: String,
    pub viewport: Viewport,
    pub captured_at: DateTime<Utc>,
    pub approved_at: DateTime<Utc>,
    pub sha256: String,
}

/// File stem for a key: readable URL slug, viewport, and a short digest
pub fn key_stem(key: &BaselineKey) -> String {
    let slug: String = key
        .url
        .split("://")
        .last()
        .unwrap_or(&key.url)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(MAX_SLUG_CHARS)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(key.url.as_bytes());
    hasher.update(key.viewport.to_string().as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}-{}-{}", slug.trim_matches('_'), key.viewport, &digest[..12])
}

/// Filesystem-backed baseline store
#[derive(Debug)]
pub struct BaselineStore {
    root: PathBuf,
    writers: DashMap<String, Arc<Mutex<()>>>,
}

impl BaselineStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            writers: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_path(&self, key: &BaselineKey) -> PathBuf {
        self.root.join(format!("{}.png", key_stem(key)))
    }

    pub fn meta_path(&self, key: &BaselineKey) -> PathBuf {
        self.root.join(format!("{}.json", key_stem(key)))
    }

    pub fn state(&self, key: &BaselineKey) -> BaselineState {
        if self.image_path(key).is_file() {
            BaselineState::Present
        } else {
            BaselineState::Absent
        }
    }

    /// Read the approved baseline, if any
    pub fn load(&self, key: &BaselineKey) -> EngineResult<Option<Screenshot>> {
        let path = self.image_path(key);
        if !path.is_file() {
            debug!("No baseline for {} {}", key.url, key.viewport);
            return Ok(None);
        }

        let captured_at = self.read_meta(key).map(|meta| meta.captured_at);
        let shot = Screenshot::open(&path, key, captured_at)?;
        debug!("Loaded baseline {}", path.display());
        Ok(Some(shot))
    }

    fn read_meta(&self, key: &BaselineKey) -> Option<BaselineMeta> {
        let content = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Approve a screenshot as the baseline for `key`, replacing any previous one
    pub fn save(&self, key: &BaselineKey, shot: &Screenshot) -> EngineResult<PathBuf> {
        let stem = key_stem(key);
        let lock = self
            .writers
            .entry(stem)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        self.write_files(key, shot).map_err(|e| EngineError::BaselineWrite {
            key: format!("{} {}", key.url, key.viewport),
            reason: e.to_string(),
        })
    }

    fn write_files(&self, key: &BaselineKey, shot: &Screenshot) -> EngineResult<PathBuf> {
        fs::create_dir_all(&self.root)?;

        let image_path = self.image_path(key);
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        write_png(tmp.as_file_mut(), shot.image())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&image_path).map_err(|e| e.error)?;

        let meta = BaselineMeta {
            url: key.url.clone(),
            viewport: key.viewport,
            captured_at: shot.captured_at(),
            approved_at: Utc::now(),
            sha256: shot.digest(),
        };
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &meta)?;
        tmp.persist(self.meta_path(key)).map_err(|e| e.error)?;

        info!("Saved baseline for {} {} at {}", key.url, key.viewport, image_path.display());
        Ok(image_path)
    }

    /// Keys' file stems of all stored baselines
    pub fn list(&self) -> EngineResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut stems = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "png").unwrap_or(false) {
                if let Some(stem) = path.file_stem() {
                    stems.push(stem.to_string_lossy().to_string());
                }
            }
        }
        stems.sort();
        Ok(stems)
    }
}
