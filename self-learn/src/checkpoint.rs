use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::write_atomic;
use log::debug;
use model::PolicyRef;
use serde::{Deserialize, Serialize};

use super::IterationMetrics;

/// Written once an iteration's update has been accepted. `policy` is the policy produced by that update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub policy: PolicyRef,
    pub metrics: IterationMetrics,
    pub timestamp: DateTime<Utc>,
}

pub struct CheckpointPersistance {
    directory: PathBuf,
    run_name: String,
}

impl CheckpointPersistance {
    pub fn new(directory: PathBuf, run_name: String) -> Result<Self> {
        fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create checkpoint directory {:?}", directory))?;

        Ok(Self {
            directory,
            run_name,
        })
    }

    pub fn write(&self, record: &IterationRecord) -> Result<PathBuf> {
        let path = self.path_for_iteration(record.iteration);
        let contents = serde_json::to_vec_pretty(record)?;
        write_atomic(&path, &contents)
            .with_context(|| format!("Failed to write checkpoint {:?}", path))?;

        Ok(path)
    }

    pub fn read(path: &Path) -> Result<IterationRecord> {
        let contents =
            fs::read(path).with_context(|| format!("Failed to read checkpoint {:?}", path))?;

        serde_json::from_slice(&contents)
            .with_context(|| format!("Failed to parse checkpoint {:?}", path))
    }

    /// The checkpoint with the highest iteration number, if any.
    pub fn latest(&self) -> Result<Option<IterationRecord>> {
        let latest = fs::read_dir(&self.directory)
            .with_context(|| format!("Failed to list checkpoints in {:?}", self.directory))?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                let iteration = self.parse_iteration(name.to_str()?)?;
                Some((iteration, entry.path()))
            })
            .max_by_key(|(iteration, _)| *iteration);

        match latest {
            Some((iteration, path)) => {
                debug!("Latest checkpoint is iteration {} at {:?}", iteration, path);
                Self::read(&path).map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn path_for_iteration(&self, iteration: usize) -> PathBuf {
        self.directory
            .join(format!("{}_{:0>5}.json", self.run_name, iteration))
    }

    fn parse_iteration(&self, file_name: &str) -> Option<usize> {
        file_name
            .strip_prefix(self.run_name.as_str())?
            .strip_prefix('_')?
            .strip_suffix(".json")?
            .parse()
            .ok()
    }
}
