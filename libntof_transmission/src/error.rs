use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum BinningError {
    #[error("Bins per decade must be a positive integer; given {0}")]
    NonPositiveBinsPerDecade(i64),
    #[error("A linear binning requires at least one bin and lower < upper; given {0} bins over [{1}, {2})")]
    InvalidLinearRange(usize, f64, f64),
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Found invalid detector keyword: {0}")]
    InvalidKeyword(String),
    #[error("Detector channel {0} is not part of the FC-U setup")]
    InvalidChannel(i32),
    #[error("Found invalid sample configuration: {0}; expected in or out")]
    InvalidSampleConfig(String),
}

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("Failed to load run configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Run configuration failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Run configuration line {0} is not of the form key = value: {1}")]
    MalformedLine(usize, String),
    #[error("Run configuration is missing required key {0}")]
    MissingKey(String),
    #[error("Run configuration key {key} has an unparseable integer list entry {value:?}")]
    BadIntegerList { key: String, value: String },
    #[error("Run configuration key {key} has an unparseable number {value:?}")]
    BadNumber { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config requested {0} worker threads; at least 1 is required")]
    BadThreadCount(i32),
    #[error("Config flight path must be positive; given {0}")]
    BadFlightPath(f64),
    #[error("Config failed due to binning error: {0}")]
    BinningError(#[from] BinningError),
}

#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("Could not open run {0} because file {1:?} does not exist")]
    BadFilePath(i32, PathBuf),
    #[error("Run {0} is not available in the event source")]
    MissingRun(i32),
    #[error("Event source failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Table {table} has columns of different length: {column} has {found} entries, expected {expected}")]
    ColumnLengthMismatch {
        table: String,
        column: String,
        found: usize,
        expected: usize,
    },
}

#[derive(Debug, Clone, Error)]
pub enum HistogramError {
    #[error("Histograms have incompatible binning: {0} bins vs. {1} bins")]
    IncompatibleBinning(usize, usize),
    #[error("Histogram edges must be strictly increasing and at least two long")]
    BadEdges,
    #[error("No transmission curves were available to average")]
    NothingToAverage,
}

#[derive(Debug, Clone, Error)]
pub enum EnergyError {
    #[error("Flight path must be positive; given {0} m")]
    NonPositiveFlightPath(f64),
    #[error("Time of flight {0} ns is not after t0 = {1} ns and has no energy")]
    NonPositiveTime(f64, f64),
    #[error("Energy {0} eV must be positive to convert back to time of flight")]
    NonPositiveEnergy(f64),
    #[error("Energy transform failed due to histogram error: {0}")]
    HistogramError(#[from] HistogramError),
}

#[derive(Debug, Error)]
pub enum EfficiencyError {
    #[error("Efficiency study failed due to binning error: {0}")]
    BinningError(#[from] BinningError),
    #[error("Efficiency study found no usable runs for {0} {1}")]
    NoUsableRuns(String, String),
}

#[derive(Debug, Error)]
pub enum HDF5WriterError {
    #[error("HDF5Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("HDF5Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("HDFWriter failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("HDFWriter failed to encode a string attribute: {0}")]
    StringError(#[from] hdf5::types::StringError),
    #[error("HDFWriter was given a path with no file name: {0:?}")]
    BadFilePath(PathBuf),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to run configuration error: {0}")]
    RunConfigError(#[from] RunConfigError),
    #[error("Processor failed due to binning error: {0}")]
    BinningError(#[from] BinningError),
    #[error("Processor failed due to histogram error: {0}")]
    HistogramError(#[from] HistogramError),
    #[error("Processor failed due to energy transform error: {0}")]
    EnergyError(#[from] EnergyError),
    #[error("Processor failed due to efficiency error: {0}")]
    EfficiencyError(#[from] EfficiencyError),
    #[error("Processor failed due to HDF5Writer error: {0}")]
    HDFError(#[from] HDF5WriterError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed because a worker thread panicked")]
    WorkerPanic,
}
