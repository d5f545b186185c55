//! Run storage on the local filesystem
//!
//! Layout, one directory per run:
//!
//! ```text
//! <dir>/<run id>/original_pipeline.json
//! <dir>/<run id>/visualizations/<step index>.json
//! <dir>/<run id>/result.csv
//! ```

use super::{RunStorage, StorageError};
use crate::core::{Pipeline, Table, Visualization};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::fs;
use tracing::{debug, info, warn};

const PIPELINE_FILE: &str = "original_pipeline.json";
const VISUALIZATIONS_DIR: &str = "visualizations";
const RESULT_FILE: &str = "result.csv";

/// Rows shown by [`FsRunStorage::result_preview`] unless asked otherwise
pub const DEFAULT_PREVIEW_ROWS: usize = 150;

/// Listing entry for a stored run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub modified: DateTime<Utc>,
    pub has_result: bool,
}

/// Stores runs below a directory, keeping at most `max_runs` of them
///
/// Runs between [`RunStorage::initialize_run`] and [`RunStorage::finish_run`]
/// are never recycled, so the limit can be exceeded while they execute.
/// Clones share the set of active runs.
#[derive(Debug, Clone)]
pub struct FsRunStorage {
    dir: PathBuf,
    max_runs: usize,
    active: Arc<Mutex<HashSet<String>>>,
}

impl FsRunStorage {
    pub fn new(dir: impl AsRef<Path>, max_runs: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            max_runs: max_runs.max(1),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn active(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        if run_id.is_empty() || run_id.contains(['/', '\\']) || run_id.contains("..") {
            return Err(StorageError::InvalidRunId(run_id.to_string()));
        }
        Ok(self.dir.join(run_id))
    }

    /// Stored runs, newest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>, StorageError> {
        let mut runs = Vec::new();
        for (path, modified) in self.run_dirs().await? {
            let Some(run_id) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            runs.push(RunSummary {
                run_id: run_id.to_string(),
                modified,
                has_result: fs::try_exists(path.join(RESULT_FILE)).await.unwrap_or(false),
            });
        }
        Ok(runs)
    }

    /// The pipeline a run was started from
    pub async fn load_pipeline(&self, run_id: &str) -> Result<Pipeline, StorageError> {
        let path = self.existing_run_dir(run_id).await?.join(PIPELINE_FILE);
        let text = read_to_string(&path).await?;
        serde_json::from_str(&text).map_err(|source| StorageError::Json { path, source })
    }

    /// Visualizations of a run keyed by step index
    pub async fn load_visualizations(
        &self,
        run_id: &str,
    ) -> Result<BTreeMap<usize, Visualization>, StorageError> {
        let dir = self.existing_run_dir(run_id).await?.join(VISUALIZATIONS_DIR);
        let mut visualizations = BTreeMap::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(visualizations),
            Err(source) => return Err(StorageError::Io { path: dir, source }),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::Io {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            let Some(index) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<usize>().ok())
            else {
                debug!("Skipping unexpected file {}", path.display());
                continue;
            };
            let text = read_to_string(&path).await?;
            let visualization = serde_json::from_str(&text)
                .map_err(|source| StorageError::Json { path, source })?;
            visualizations.insert(index, visualization);
        }
        Ok(visualizations)
    }

    /// First `rows` rows of a run's result, if the run produced one
    pub async fn result_preview(
        &self,
        run_id: &str,
        rows: usize,
    ) -> Result<Option<Table>, StorageError> {
        let path = self.existing_run_dir(run_id).await?.join(RESULT_FILE);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        let table = Table::from_csv(&text).map_err(|source| StorageError::Table { path, source })?;
        Ok(Some(table.head(rows)))
    }

    async fn existing_run_dir(&self, run_id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.run_dir(run_id)?;
        if fs::try_exists(&dir).await.unwrap_or(false) {
            Ok(dir)
        } else {
            Err(StorageError::NotFound(run_id.to_string()))
        }
    }

    /// Run directories with their modification time, newest first
    async fn run_dirs(&self) -> Result<Vec<(PathBuf, DateTime<Utc>)>, StorageError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::Io {
                path: self.dir.clone(),
                source,
            })?
        {
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            dirs.push((entry.path(), modified));
        }
        dirs.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(dirs)
    }

    /// Delete the oldest finished runs so a new one fits within the limit
    async fn recycle(&self) -> Result<(), StorageError> {
        let dirs = self.run_dirs().await?;
        let stale: Vec<PathBuf> = {
            let active = self.active();
            dirs.into_iter()
                .skip(self.max_runs - 1)
                .map(|(path, _)| path)
                .filter(|path| {
                    !path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|id| active.contains(id))
                })
                .collect()
        };
        for path in stale {
            info!("Removing old run {}", path.display());
            if let Err(e) = fs::remove_dir_all(&path).await {
                warn!("Could not remove old run {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    async fn create_run_dir(&self, dir: &Path, pipeline: &Pipeline) -> Result<(), StorageError> {
        self.recycle().await?;

        let visualizations = dir.join(VISUALIZATIONS_DIR);
        fs::create_dir_all(&visualizations)
            .await
            .map_err(|source| StorageError::Io {
                path: visualizations,
                source,
            })?;

        let path = dir.join(PIPELINE_FILE);
        let json = serde_json::to_string_pretty(pipeline).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        write(&path, json).await
    }
}

#[async_trait::async_trait]
impl RunStorage for FsRunStorage {
    async fn initialize_run(&self, run_id: &str, pipeline: &Pipeline) -> Result<()> {
        let dir = self.run_dir(run_id)?;
        self.active().insert(run_id.to_string());
        let created = self.create_run_dir(&dir, pipeline).await;
        if created.is_err() {
            self.active().remove(run_id);
        }
        created?;
        debug!("Initialized run directory {}", dir.display());
        Ok(())
    }

    async fn finish_run(&self, run_id: &str) -> Result<()> {
        self.active().remove(run_id);
        Ok(())
    }

    async fn save_visualization(
        &self,
        run_id: &str,
        step_index: usize,
        visualization: &Visualization,
    ) -> Result<()> {
        let path = self
            .existing_run_dir(run_id)
            .await?
            .join(VISUALIZATIONS_DIR)
            .join(format!("{}.json", step_index));
        let json = serde_json::to_string(visualization).map_err(|source| StorageError::Json {
            path: path.clone(),
            source,
        })?;
        write(&path, json).await?;
        Ok(())
    }

    async fn save_result(&self, run_id: &str, data: &Table) -> Result<()> {
        let path = self.existing_run_dir(run_id).await?.join(RESULT_FILE);
        let csv = data.to_csv().map_err(|source| StorageError::Table {
            path: path.clone(),
            source,
        })?;
        write(&path, csv).await?;
        info!("Stored result of run {} ({} rows)", run_id, data.len());
        Ok(())
    }
}

async fn read_to_string(path: &Path) -> Result<String, StorageError> {
    fs::read_to_string(path)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn write(path: &Path, contents: String) -> Result<(), StorageError> {
    fs::write(path, contents)
        .await
        .map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
}
