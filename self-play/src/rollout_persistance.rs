use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Gzip compressed JSON archive of the rollouts played in each iteration of a run.
pub struct RolloutPersistance {
    rollout_directory: PathBuf,
    run_name: String,
}

impl RolloutPersistance {
    pub fn new(rollout_directory: PathBuf, run_name: String) -> Result<Self> {
        fs::create_dir_all(&rollout_directory).with_context(|| {
            format!("Failed to create rollout directory {:?}", rollout_directory)
        })?;

        Ok(Self {
            rollout_directory,
            run_name,
        })
    }

    pub fn write<T: Serialize>(&self, iteration: usize, rollouts: &T) -> Result<PathBuf> {
        let path = self.path_for_iteration(iteration);
        let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        let mut compressor = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut compressor, rollouts)?;
        compressor.finish()?.flush()?;

        Ok(path)
    }

    pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let content = GzDecoder::new(file);
        let rollouts = serde_json::from_reader(content)
            .with_context(|| format!("Failed to parse rollouts in {:?}", path))?;

        Ok(rollouts)
    }

    pub fn path_for_iteration(&self, iteration: usize) -> PathBuf {
        self.rollout_directory
            .join(format!("{}_{:0>5}.gz", self.run_name, iteration))
    }
}
