use super::{DailyAverage, DailyLog, DailyStore, StoreError};
use jiff::civil::Date;
use std::sync::Mutex;

/// Process-local history, used when archiving is disabled and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    log: Mutex<DailyLog>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of archived sessions across all days
    pub fn sample_count(&self) -> usize {
        self.log
            .lock()
            .map(|log| log.records().iter().map(|r| r.bpm_samples.len()).sum())
            .unwrap_or(0)
    }

    fn with_log<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut DailyLog) -> R,
    {
        let mut log = self.log.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut log))
    }
}

impl DailyStore for MemoryStore {
    fn append(&self, bpm: u32, day: Date) -> Result<(), StoreError> {
        self.with_log(|log| log.append(bpm, day))
    }

    fn all_daily_averages(&self) -> Result<Vec<DailyAverage>, StoreError> {
        self.with_log(|log| log.daily_averages())
    }

    fn weekly_average(&self) -> Result<u32, StoreError> {
        self.with_log(|log| log.weekly_average())
    }
}
