use crate::error::SchedError;
use crate::worker::WorkerIdentity;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Durable home for a worker's final work-unit count
pub trait CounterStore {
    /// Writes `count` under the worker's identity and returns where it went.
    fn persist(&self, identity: &WorkerIdentity, count: u64) -> Result<PathBuf, SchedError>;
}

/// Writes `<dir>/<pid>.txt` holding the decimal count and a newline
///
/// The content goes to a temporary file in the same directory first and is
/// renamed over the target, so a reader sees either no file or the whole
/// count, and an existing file is truncated in one step.
#[derive(Debug, Clone)]
pub struct FileCounterStore {
    dir: PathBuf,
}

impl FileCounterStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, identity: &WorkerIdentity) -> PathBuf {
        self.dir.join(format!("{}.txt", identity.pid))
    }
}

impl CounterStore for FileCounterStore {
    fn persist(&self, identity: &WorkerIdentity, count: u64) -> Result<PathBuf, SchedError> {
        let path = self.path_for(identity);
        let failed = |source: std::io::Error| SchedError::Persistence {
            path: path.clone(),
            source,
        };

        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(failed)?;
        writeln!(tmp, "{}", count).map_err(failed)?;
        tmp.as_file().sync_all().map_err(failed)?;
        tmp.persist(&path).map_err(|e| failed(e.error))?;
        Ok(path)
    }
}
