//! Persistence of run artifacts

pub mod fs;

pub use fs::{FsRunStorage, RunSummary};

use crate::core::{Pipeline, Table, TypeError, Visualization};
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not encode or decode {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid result table {path}: {source}")]
    Table {
        path: PathBuf,
        #[source]
        source: TypeError,
    },

    #[error("Run {0} not found")]
    NotFound(String),

    #[error("Invalid run id: {0:?}")]
    InvalidRunId(String),
}

/// Where the runner stores what a run produces
#[async_trait::async_trait]
pub trait RunStorage: Send + Sync {
    /// Prepare storage for a new run and keep the pipeline it was started from
    async fn initialize_run(&self, run_id: &str, pipeline: &Pipeline) -> Result<()>;

    /// Store the visualization produced by one step
    async fn save_visualization(
        &self,
        run_id: &str,
        step_index: usize,
        visualization: &Visualization,
    ) -> Result<()>;

    /// Store the final data of a successful run
    async fn save_result(&self, run_id: &str, data: &Table) -> Result<()>;

    /// Called once a run initialized here has ended, however it ended
    async fn finish_run(&self, _run_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Everything stored for one run
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub pipeline: Pipeline,
    pub visualizations: BTreeMap<usize, Visualization>,
    pub result: Option<Table>,
}

/// In-memory storage (for testing or ephemeral use)
pub struct InMemoryRunStorage {
    runs: tokio::sync::RwLock<HashMap<String, StoredRun>>,
}

impl InMemoryRunStorage {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub async fn run(&self, run_id: &str) -> Option<StoredRun> {
        self.runs.read().await.get(run_id).cloned()
    }

    pub async fn run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.runs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryRunStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RunStorage for InMemoryRunStorage {
    async fn initialize_run(&self, run_id: &str, pipeline: &Pipeline) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(
            run_id.to_string(),
            StoredRun {
                pipeline: pipeline.clone(),
                visualizations: BTreeMap::new(),
                result: None,
            },
        );
        Ok(())
    }

    async fn save_visualization(
        &self,
        run_id: &str,
        step_index: usize,
        visualization: &Visualization,
    ) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StorageError::NotFound(run_id.to_string()))?;
        run.visualizations.insert(step_index, visualization.clone());
        Ok(())
    }

    async fn save_result(&self, run_id: &str, data: &Table) -> Result<()> {
        let mut runs = self.runs.write().await;
        let run = runs
            .get_mut(run_id)
            .ok_or_else(|| StorageError::NotFound(run_id.to_string()))?;
        run.result = Some(data.clone());
        Ok(())
    }
}
