use super::{DailyAverage, DailyLog, DailyStore, StoreError};
use fs2::FileExt;
use jiff::civil::Date;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// History persisted as a JSON array of daily records.
///
/// Every operation takes an advisory lock on a sidecar `.lock` file, so the
/// read-modify-write in `append` is atomic across processes as well as
/// threads.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    fn with_lock<F, R>(&self, exclusive: bool, f: F) -> Result<R, StoreError>
    where
        F: FnOnce() -> Result<R, StoreError>,
    {
        let _guard = self.guard.lock().map_err(|_| StoreError::Poisoned)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())?;

        if exclusive {
            FileExt::lock_exclusive(&lock_file)?;
        } else {
            FileExt::lock_shared(&lock_file)?;
        }

        let result = f();

        if let Err(e) = FileExt::unlock(&lock_file) {
            log::warn!("Failed to release history lock: {}", e);
        }
        result
    }

    fn load(&self) -> Result<DailyLog, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(DailyLog::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DailyLog::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, log: &DailyLog) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("json.tmp");

        {
            let file = File::create(&tmp_path)?;
            serde_json::to_writer_pretty(&file, log)?;
            file.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

impl DailyStore for JsonFileStore {
    fn append(&self, bpm: u32, day: Date) -> Result<(), StoreError> {
        self.with_lock(true, || {
            let mut log = self.load()?;
            log.append(bpm, day);
            self.write(&log)
        })
    }

    fn all_daily_averages(&self) -> Result<Vec<DailyAverage>, StoreError> {
        self.with_lock(false, || Ok(self.load()?.daily_averages()))
    }

    fn weekly_average(&self) -> Result<u32, StoreError> {
        self.with_lock(false, || Ok(self.load()?.weekly_average()))
    }
}
