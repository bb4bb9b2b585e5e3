//! Daily heart-rate history
//!
//! One record per calendar day holding every archived session value. The
//! monitor only appends; the averages are read by the history view.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use directories::ProjectDirs;
use jiff::civil::Date;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Number of most recent days in the weekly average
pub const WEEK_DAYS: usize = 7;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("History serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("History lock poisoned")]
    Poisoned,
    #[error("Could not determine data directory")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub day: Date,
    pub bpm_samples: Vec<u32>,
}

impl DailyRecord {
    /// Truncated mean of the day's sessions, 0 for an empty record
    pub fn average_bpm(&self) -> u32 {
        if self.bpm_samples.is_empty() {
            return 0;
        }
        let sum: u64 = self.bpm_samples.iter().map(|&v| u64::from(v)).sum();
        (sum / self.bpm_samples.len() as u64) as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAverage {
    pub day: Date,
    pub average_bpm: u32,
}

/// In-memory form of the whole history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DailyLog {
    records: Vec<DailyRecord>,
}

impl DailyLog {
    /// Add a session value to `day`, creating the day's record if needed
    pub fn append(&mut self, bpm: u32, day: Date) {
        match self.records.iter_mut().find(|r| r.day == day) {
            Some(record) => record.bpm_samples.push(bpm),
            None => self.records.push(DailyRecord {
                day,
                bpm_samples: vec![bpm],
            }),
        }
    }

    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    /// Per-day averages, oldest day first
    pub fn daily_averages(&self) -> Vec<DailyAverage> {
        let mut averages: Vec<DailyAverage> = self
            .records
            .iter()
            .map(|r| DailyAverage {
                day: r.day,
                average_bpm: r.average_bpm(),
            })
            .collect();
        averages.sort_by_key(|a| a.day);
        averages
    }

    /// Truncated mean of the daily averages of the last `WEEK_DAYS` records
    pub fn weekly_average(&self) -> u32 {
        let averages = self.daily_averages();
        let recent = &averages[averages.len().saturating_sub(WEEK_DAYS)..];
        if recent.is_empty() {
            return 0;
        }
        let sum: u64 = recent.iter().map(|a| u64::from(a.average_bpm)).sum();
        (sum / recent.len() as u64) as u32
    }
}

/// Archive of completed sessions
pub trait DailyStore: Send + Sync {
    fn append(&self, bpm: u32, day: Date) -> Result<(), StoreError>;

    fn all_daily_averages(&self) -> Result<Vec<DailyAverage>, StoreError>;

    fn weekly_average(&self) -> Result<u32, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Override for the history file location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolve_path(&self) -> Result<PathBuf, StoreError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => default_history_path().ok_or(StoreError::NoDataDir),
        }
    }
}

/// ~/.local/share/pulsecam/history.json (platform equivalent elsewhere)
pub fn default_history_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "pulsecam").map(|dirs| dirs.data_local_dir().join("history.json"))
}
