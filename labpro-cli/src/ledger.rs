//! The `loggers.csv` ledger of provisioned devices.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One provisioned logger: which sensors it carries and how it was armed.
/// Serialized positionally, no header row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerRecord {
    /// Id stored into the device as its system id.
    pub device_id: i64,
    /// Detected sensor type per channel; 0.0 for an empty channel.
    pub channel_1: f64,
    pub channel_2: f64,
    pub channel_3: f64,
    pub channel_4: f64,
    pub samples: i64,
    /// Seconds between samples.
    pub sample_time: i64,
    pub description: String,
    /// Unix timestamp of provisioning; doubles as the time axis origin when
    /// downloading.
    pub provisioned_at: i64,
}

impl LoggerRecord {
    pub fn channel_types(&self) -> [f64; 4] {
        [self.channel_1, self.channel_2, self.channel_3, self.channel_4]
    }
}

pub struct Ledger {
    path: PathBuf,
    records: Vec<LoggerRecord>,
}

impl Ledger {
    /// Load the ledger, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self> {
        let mut records = Vec::new();
        match File::open(path) {
            Ok(file) => {
                let mut reader = csv::ReaderBuilder::new()
                    .has_headers(false)
                    .from_reader(file);
                for record in reader.deserialize() {
                    let record: LoggerRecord =
                        record.with_context(|| format!("malformed row in {}", path.display()))?;
                    records.push(record);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| format!("opening {}", path.display()));
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn find(&self, device_id: i64) -> Option<&LoggerRecord> {
        self.records.iter().find(|r| r.device_id == device_id)
    }

    /// Next id to hand out: one past the highest recorded, but never below
    /// `floor`.
    pub fn next_device_id(&self, floor: i64) -> i64 {
        self.records
            .iter()
            .map(|r| r.device_id + 1)
            .max()
            .unwrap_or(floor)
            .max(floor)
    }

    /// Append a record to the file and the in-memory view.
    pub fn append(&mut self, record: LoggerRecord) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("appending to {}", self.path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(&record)?;
        writer.flush()?;
        self.records.push(record);
        Ok(())
    }
}
