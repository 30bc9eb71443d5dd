//! On-disk archive of raw elevation responses, one JSON file per batch.
//!
//! A run that fails after fetching can be finished from the archive with
//! [`Pipeline::rebuild`](crate::pipeline::Pipeline::rebuild) instead of
//! hitting the API again. `manifest.json` records how many batches the run
//! packed, so a rebuild can tell how many of them never reached the archive.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::elevation::ElevationResponse;

const MANIFEST: &str = "manifest.json";

/// What the archiving run packed, and which batches have no archived response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub batches: usize,
    /// Batch indices that were dropped or failed to archive.
    pub missing: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ResponseArchive {
    dir: PathBuf,
}

impl ResponseArchive {
    /// Opens (creating if needed) the archive directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating archive dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("batch-{index:05}.json"))
    }

    pub fn store(&self, index: usize, response: &ElevationResponse) -> Result<()> {
        let path = self.path(index);
        let body = serde_json::to_vec(response)?;
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        debug!(path = %path.display(), "Archived elevation response");
        Ok(())
    }

    /// Removes every archived response and the manifest, so a new run
    /// starts clean.
    pub fn clear(&self) -> Result<()> {
        for (_, path) in self.entries()? {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
        let manifest = self.dir.join(MANIFEST);
        if manifest.exists() {
            fs::remove_file(&manifest)
                .with_context(|| format!("removing {}", manifest.display()))?;
        }
        Ok(())
    }

    pub fn write_manifest(&self, manifest: &ArchiveManifest) -> Result<()> {
        let path = self.dir.join(MANIFEST);
        let body = serde_json::to_vec_pretty(manifest)?;
        fs::write(&path, body).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// The manifest of the archiving run, or `None` if it never wrote one.
    pub fn load_manifest(&self) -> Result<Option<ArchiveManifest>> {
        let path = self.dir.join(MANIFEST);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let manifest =
            serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(manifest))
    }

    /// Loads every archived response, ordered by batch index.
    pub fn load_all(&self) -> Result<Vec<Value>> {
        self.entries()?
            .into_iter()
            .map(|(_, path)| {
                let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", path.display()))
            })
            .collect()
    }

    fn entries(&self) -> Result<Vec<(usize, PathBuf)>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let index = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("batch-"))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(index) = index {
                entries.push((index, path));
            }
        }
        entries.sort_by_key(|(index, _)| *index);
        Ok(entries)
    }
}
