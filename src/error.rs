use std::path::PathBuf;

pub type ExtractResult<T> = Result<T, ExtractError>;

#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("malformed run directory {dir:?}: expected exactly 1 {what}, found {found}")]
    MalformedRunDirectory {
        dir: PathBuf,
        what: String,
        found: usize,
    },

    #[error("key {key} not found in {path:?}")]
    MissingConfigKey { key: String, path: PathBuf },

    #[error("malformed extents file {path:?}: {reason}")]
    MalformedExtents { path: PathBuf, reason: String },

    #[error("grid file not found: {0:?}")]
    GridFileMissing(PathBuf),

    #[error("failed to read grid {path:?}: {reason}")]
    GridReadError { path: PathBuf, reason: String },

    #[error("failed to read gauge table {path:?}: {source}")]
    GaugeTable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("gauge table {path:?} has no column {column}")]
    MissingGaugeColumn { path: PathBuf, column: String },

    #[error("invalid gauge record on line {line}: {reason}")]
    InvalidGaugeRecord { line: u64, reason: String },

    #[error("cannot parse timestep from snapshot name {0:?}")]
    MalformedSnapshotName(PathBuf),

    #[error("timestep {timestep} appears in both {first:?} and {second:?}")]
    DuplicateTimestep {
        timestep: i64,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    CsvOutput {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ExtractError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io {
            path: path.into(),
            source,
        }
    }
}
