//! The run configuration (.cmnd) file.
//!
//! A plain `key = value` list describing which runs are sample-in or sample-out, which of
//! those runs each detector may use, and the per-detector amplitude thresholds and time
//! calibrations. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! prefix = /data/run
//! suffix = .h5
//! SIN = 121001, 121002, 121003
//! SOUT = 121010, 121011
//! Sin_DET1 = 121001, 121002
//! Sout_DET1 = 121010
//! cut_a_1 = 1200
//! cal_1 = -3.5
//! ```
use fxhash::FxHashMap;
use std::path::Path;
use std::str::FromStr;

use super::constants::{DEFAULT_AMPLITUDE_CUT, DEFAULT_CALIBRATION};
use super::detector::{DetectorChannel, SampleConfig};
use super::error::RunConfigError;

/// Settings of a single detector channel
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub channel: DetectorChannel,
    /// Amplitude threshold; events must be strictly above it
    pub cut_a: f64,
    /// Time calibration offset added to (tof - tflash)
    pub cal: f64,
    pub sin_runs: Vec<i32>,
    pub sout_runs: Vec<i32>,
}

impl DetectorSettings {
    pub fn runs(&self, sample: SampleConfig) -> &[i32] {
        match sample {
            SampleConfig::In => &self.sin_runs,
            SampleConfig::Out => &self.sout_runs,
        }
    }
}

/// The parsed run configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub prefix: String,
    pub suffix: String,
    pub sin_runs: Vec<i32>,
    pub sout_runs: Vec<i32>,
    pub detectors: Vec<DetectorSettings>,
}

impl RunConfig {
    /// Read and parse a run configuration file
    pub fn read(path: &Path) -> Result<Self, RunConfigError> {
        if !path.exists() {
            return Err(RunConfigError::BadFilePath(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    /// The runs of a sample configuration, in file order
    pub fn runs(&self, sample: SampleConfig) -> &[i32] {
        match sample {
            SampleConfig::In => &self.sin_runs,
            SampleConfig::Out => &self.sout_runs,
        }
    }

    pub fn detector(&self, channel: DetectorChannel) -> Option<&DetectorSettings> {
        self.detectors.iter().find(|d| d.channel == channel)
    }
}

impl FromStr for RunConfig {
    type Err = RunConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let table = KeyValueTable::parse(s)?;

        let mut detectors = Vec::with_capacity(DetectorChannel::ALL.len());
        for channel in DetectorChannel::ALL {
            let n = channel.number();
            detectors.push(DetectorSettings {
                channel,
                cut_a: table.get_float_or(&format!("cut_a_{n}"), DEFAULT_AMPLITUDE_CUT)?,
                cal: table.get_float_or(&format!("cal_{n}"), DEFAULT_CALIBRATION)?,
                sin_runs: table.get_int_list(&format!("Sin_DET{n}"))?,
                sout_runs: table.get_int_list(&format!("Sout_DET{n}"))?,
            });
        }

        Ok(Self {
            prefix: table.get_string("prefix")?,
            suffix: table.get_string("suffix")?,
            sin_runs: table.get_int_list(SampleConfig::In.run_list_key())?,
            sout_runs: table.get_int_list(SampleConfig::Out.run_list_key())?,
            detectors,
        })
    }
}

/// Raw key-value pairs of a run configuration
#[derive(Debug, Default)]
struct KeyValueTable {
    values: FxHashMap<String, String>,
}

impl KeyValueTable {
    fn parse(contents: &str) -> Result<Self, RunConfigError> {
        let mut table = Self::default();
        for (idx, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some((k, v)) if !k.trim().is_empty() => (k.trim(), v.trim()),
                _ => return Err(RunConfigError::MalformedLine(idx + 1, line.to_string())),
            };
            // Later definitions win, as when the file is read top to bottom
            table
                .values
                .insert(key.to_string(), unquote(value).to_string());
        }
        Ok(table)
    }

    fn get(&self, key: &str) -> Result<&str, RunConfigError> {
        self.values
            .get(key)
            .map(|v| v.as_str())
            .ok_or_else(|| RunConfigError::MissingKey(key.to_string()))
    }

    fn get_string(&self, key: &str) -> Result<String, RunConfigError> {
        Ok(self.get(key)?.to_string())
    }

    fn get_int_list(&self, key: &str) -> Result<Vec<i32>, RunConfigError> {
        let value = self.get(key)?;
        value
            .split(',')
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .parse::<i32>()
                    .map_err(|_| RunConfigError::BadIntegerList {
                        key: key.to_string(),
                        value: entry.to_string(),
                    })
            })
            .collect()
    }

    fn get_float_or(&self, key: &str, default: f64) -> Result<f64, RunConfigError> {
        match self.values.get(key) {
            Some(value) => value.parse::<f64>().map_err(|_| RunConfigError::BadNumber {
                key: key.to_string(),
                value: value.clone(),
            }),
            None => Ok(default),
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
