use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::binning::log_edges;
use super::constants::{DEFAULT_AMPLITUDE_BINS, DEFAULT_FLIGHT_PATH, DEFAULT_MIN_TOF_DISPLAY};
use super::detector::{DetectorChannel, SampleConfig};
use super::error::ConfigError;

/// Structure representing the application configuration. Contains pathing and analysis settings
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// The key = value run configuration (.cmnd) file
    pub run_config_path: PathBuf,
    pub output_path: PathBuf,
    pub bins_per_decade: i64,
    /// Flight path in meters
    pub flight_path: f64,
    pub min_tof_display: f64,
    pub n_threads: i32,
    pub amplitude_bins: usize,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be empty/invalid
    fn default() -> Self {
        Self {
            run_config_path: PathBuf::from("None"),
            output_path: PathBuf::from("None"),
            bins_per_decade: 200,
            flight_path: DEFAULT_FLIGHT_PATH,
            min_tof_display: DEFAULT_MIN_TOF_DISPLAY,
            n_threads: 1,
            amplitude_bins: DEFAULT_AMPLITUDE_BINS,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write this configuration as YAML, used for making templates
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// Check the settings before any data is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.is_n_threads_valid() {
            return Err(ConfigError::BadThreadCount(self.n_threads));
        }
        if !(self.flight_path > 0.0) {
            return Err(ConfigError::BadFlightPath(self.flight_path));
        }
        log_edges(self.bins_per_decade)?;
        Ok(())
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }

    /// Get the path to the transmission (ToF) output file
    pub fn get_transmission_file_name(&self) -> Result<PathBuf, ConfigError> {
        self.get_output_file(format!("transmission_total_{}bin.h5", self.bins_per_decade))
    }

    /// Get the path to the cross section output file
    pub fn get_cross_section_file_name(&self) -> Result<PathBuf, ConfigError> {
        self.get_output_file(format!(
            "cross_section__L{:.2}__{}bin.h5",
            self.flight_path, self.bins_per_decade
        ))
    }

    /// Get the path to the efficiency output file of one detector
    pub fn get_efficiency_file_name(
        &self,
        channel: DetectorChannel,
        sample: SampleConfig,
    ) -> Result<PathBuf, ConfigError> {
        self.get_output_file(format!(
            "efficiency_det{}_{}.h5",
            channel.number(),
            sample.key_prefix().to_lowercase()
        ))
    }

    fn get_output_file(&self, name: String) -> Result<PathBuf, ConfigError> {
        if self.output_path.exists() {
            Ok(self.output_path.join(name))
        } else {
            Err(ConfigError::BadFilePath(self.output_path.clone()))
        }
    }
}

/// The YAML summary written next to an HDF5 artifact: same stem, `.yml` extension
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    artifact.with_extension("yml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_path: dir.path().to_path_buf(),
            bins_per_decade: 1000,
            ..Default::default()
        };
        assert_eq!(
            config.get_transmission_file_name().unwrap(),
            dir.path().join("transmission_total_1000bin.h5")
        );
        assert_eq!(
            config.get_cross_section_file_name().unwrap(),
            dir.path().join("cross_section__L182.10__1000bin.h5")
        );
        assert_eq!(
            config
                .get_efficiency_file_name(DetectorChannel::Det7, SampleConfig::Out)
                .unwrap(),
            dir.path().join("efficiency_det7_sout.h5")
        );
        assert_eq!(
            sidecar_path(&dir.path().join("transmission_total_1000bin.h5")),
            dir.path().join("transmission_total_1000bin.yml")
        );
    }

    #[test]
    fn test_missing_output_directory() {
        let config = Config::default();
        assert!(matches!(
            config.get_transmission_file_name(),
            Err(ConfigError::BadFilePath(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());
        let bad_threads = Config {
            n_threads: 0,
            ..Default::default()
        };
        assert!(matches!(
            bad_threads.validate(),
            Err(ConfigError::BadThreadCount(0))
        ));
        let bad_path = Config {
            flight_path: 0.0,
            ..Default::default()
        };
        assert!(bad_path.validate().is_err());
        let bad_bins = Config {
            bins_per_decade: 0,
            ..Default::default()
        };
        assert!(matches!(
            bad_bins.validate(),
            Err(ConfigError::BinningError(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        let config = Config {
            n_threads: 4,
            ..Default::default()
        };
        config.write_config_file(&path).unwrap();
        let read = Config::read_config_file(&path).unwrap();
        assert_eq!(read.n_threads, 4);
        assert_eq!(read.bins_per_decade, 200);
        assert!(Config::read_config_file(&dir.path().join("missing.yml")).is_err());
    }
}
