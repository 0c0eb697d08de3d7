//! FileSink - writes each revolution as a PCD file
//!
//! Layout: `{base_path}/{sensor_id}/{sequence:06}.pcd`

use contracts::pcd::PcdEncoding;
use contracts::{ContractError, DataSink, PointCloudFrame};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, instrument};

use crate::error::DispatcherError;

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Base output directory
    pub base_path: PathBuf,
    /// PCD DATA encoding
    pub encoding: PcdEncoding,
}

impl FileSinkConfig {
    /// Read `base_path` (default `./output`) and `encoding` (default binary)
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, DispatcherError> {
        let base_path = params
            .get("base_path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./output"));

        let encoding = match params.get("encoding") {
            Some(name) => PcdEncoding::from_name(name).ok_or_else(|| {
                DispatcherError::invalid_param("encoding", format!("unknown pcd encoding '{name}'"))
            })?,
            None => PcdEncoding::default(),
        };

        Ok(Self {
            base_path,
            encoding,
        })
    }
}

/// Sink that persists revolutions to disk
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    created_dirs: HashSet<PathBuf>,
}

impl FileSink {
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Result<Self, DispatcherError> {
        fs::create_dir_all(&config.base_path)?;

        Ok(Self {
            name: name.into(),
            config,
            created_dirs: HashSet::new(),
        })
    }

    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, DispatcherError> {
        let config = FileSinkConfig::from_params(params)?;
        Self::new(name, config)
    }

    /// Path a revolution is written to
    pub fn frame_path(&self, frame: &PointCloudFrame) -> PathBuf {
        self.config
            .base_path
            .join(&frame.sensor_id)
            .join(format!("{:06}.pcd", frame.sequence))
    }

    fn write_frame_to_disk(&mut self, frame: &PointCloudFrame) -> std::io::Result<()> {
        let sensor_dir = self.config.base_path.join(&frame.sensor_id);
        if !self.created_dirs.contains(&sensor_dir) {
            fs::create_dir_all(&sensor_dir)?;
            self.created_dirs.insert(sensor_dir);
        }

        let bytes = frame.to_pcd_bytes(self.config.encoding);
        fs::write(self.frame_path(frame), bytes)
    }

    fn persist_frame(&mut self, frame: &PointCloudFrame) -> Result<(), ContractError> {
        self.write_frame_to_disk(frame).map_err(|e| {
            error!(sink = %self.name, sequence = frame.sequence, error = %e, "Write failed");
            ContractError::sink_write(&self.name, e.to_string())
        })
    }
}

impl DataSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "file_sink_write",
        skip(self, frame),
        fields(sink = %self.name, sequence = frame.sequence)
    )]
    async fn write(&mut self, frame: &PointCloudFrame) -> Result<(), ContractError> {
        self.persist_frame(frame)
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, dirs = self.created_dirs.len(), "FileSink closed");
        Ok(())
    }
}
