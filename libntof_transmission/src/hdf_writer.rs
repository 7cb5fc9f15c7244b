use hdf5::types::VarLenUnicode;
use hdf5::{File, Group};
use ndarray::Array2;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::aggregator::{RunBook, RunSummary, SkippedRun};
use super::combiner::TransmissionCurve;
use super::config::sidecar_path;
use super::constants::{AREAL_DENSITY, MAX_ENERGY_DISPLAY};
use super::detector::SampleConfig;
use super::efficiency::{EfficiencyPoint, EfficiencyReport};
use super::energy::EnergyTransform;
use super::error::HDF5WriterError;
use super::histogram::Histogram;

const TRANSMISSION_NAME: &str = "transmission";
const RATIOS_NAME: &str = "ratios";
const BUCKETS_NAME: &str = "buckets";
const CROSS_SECTION_NAME: &str = "cross_section";
const EFFICIENCY_NAME: &str = "efficiency";

const EDGES_NAME: &str = "edges";
const CONTENT_NAME: &str = "content";
const ERROR_NAME: &str = "error";

/// This is the version of the output format
const FORMAT_VERSION: &str = "1.0";

/// Summary of an artifact, written as YAML next to it
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub version: String,
    pub bins_per_decade: i64,
    pub runs_sin: Vec<RunSummary>,
    pub runs_sout: Vec<RunSummary>,
    pub skipped: Vec<SkippedRun>,
    /// Accumulated intensity per bucket, keyed by bucket name
    pub intensities: BTreeMap<String, f64>,
    pub degenerate_buckets: Vec<String>,
    pub undefined_ratio_bins: usize,
}

impl ArtifactSummary {
    pub fn new(curve: &TransmissionCurve, bins_per_decade: i64, book: &RunBook) -> Self {
        Self {
            version: format_version(),
            bins_per_decade,
            runs_sin: book.sample_in.clone(),
            runs_sout: book.sample_out.clone(),
            skipped: book.skipped.clone(),
            intensities: curve
                .buckets
                .iter()
                .map(|b| (b.key.to_string(), b.intensity))
                .collect(),
            degenerate_buckets: curve
                .degenerate_buckets()
                .iter()
                .map(|key| key.to_string())
                .collect(),
            undefined_ratio_bins: curve.undefined_ratio_bins(),
        }
    }
}

fn format_version() -> String {
    format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION)
}

/// A simple struct which wraps around the hdf5-rust library.
///
/// Opens an HDF5 file for writing one analysis artifact. Each histogram is a group holding
/// `edges`, `content` and `error` datasets.
#[derive(Debug)]
pub struct HDFWriter {
    file_handle: File,
    sidecar_path: PathBuf,
}
// Structure (transmission artifact)
// transmission - version, bins_per_decade, min_display, max_display, created, n_pairs, undefined_bins
// |---- edges, content, error (dset)
// ratios - channel, pulse_type (dset)
// |---- content, error (dset, pair x bin)
// buckets - channel, pulse_type, sample_in, intensity (dset)
// |---- content, error (dset, bucket x bin)
//
// Structure (cross section artifact)
// transmission - version, flight_path, t0, min_display, max_display, created
// |---- edges, content, error (dset, increasing energy)
// cross_section - version, areal_density, min_display, max_display, created
// |---- edges, content, error (dset)
//
// Structure (efficiency artifact)
// efficiency - version, channel, sample, mean, std_dev, n_outliers, created
// |---- run_number, efficiency, efficiency_error, stability, stability_error, intensity (dset)

impl HDFWriter {
    /// Create the writer, opening a file at path
    pub fn new(path: &Path) -> Result<Self, HDF5WriterError> {
        if path.file_stem().is_none() {
            return Err(HDF5WriterError::BadFilePath(path.to_path_buf()));
        }
        let file_handle = File::create(path)?;
        Ok(Self {
            file_handle,
            sidecar_path: sidecar_path(path),
        })
    }

    /// Write the final ToF transmission, every pair ratio and every normalized bucket
    pub fn write_transmission(
        &self,
        curve: &TransmissionCurve,
        bins_per_decade: i64,
    ) -> Result<(), HDF5WriterError> {
        let group = self.file_handle.create_group(TRANSMISSION_NAME)?;
        write_histogram(&group, &curve.histogram)?;
        write_common_attrs(&group)?;
        write_display_range(&group, curve.display_range)?;
        group
            .new_attr::<i64>()
            .create("bins_per_decade")?
            .write_scalar(&bins_per_decade)?;
        group
            .new_attr::<u64>()
            .create("n_pairs")?
            .write_scalar(&(curve.ratios.len() as u64))?;
        group
            .new_attr::<u64>()
            .create("undefined_bins")?
            .write_scalar(&(curve.undefined_ratio_bins() as u64))?;

        let n_bins = curve.histogram.n_bins();
        let ratios = self.file_handle.create_group(RATIOS_NAME)?;
        let mut content = Array2::<f64>::zeros([curve.ratios.len(), n_bins]);
        let mut error = Array2::<f64>::zeros([curve.ratios.len(), n_bins]);
        for (row, ratio) in curve.ratios.iter().enumerate() {
            for bin in 0..n_bins {
                content[[row, bin]] = ratio.ratio.content()[bin];
                error[[row, bin]] = ratio.ratio.bin_error(bin);
            }
        }
        let channels: Vec<i32> = curve.ratios.iter().map(|r| r.channel.number()).collect();
        let pulse_types: Vec<i32> = curve.ratios.iter().map(|r| r.bunch.pulse_type()).collect();
        ratios
            .new_dataset_builder()
            .with_data(&content)
            .create(CONTENT_NAME)?;
        ratios
            .new_dataset_builder()
            .with_data(&error)
            .create(ERROR_NAME)?;
        ratios
            .new_dataset_builder()
            .with_data(&channels)
            .create("channel")?;
        ratios
            .new_dataset_builder()
            .with_data(&pulse_types)
            .create("pulse_type")?;

        let buckets = self.file_handle.create_group(BUCKETS_NAME)?;
        let mut content = Array2::<f64>::zeros([curve.buckets.len(), n_bins]);
        let mut error = Array2::<f64>::zeros([curve.buckets.len(), n_bins]);
        for (row, bucket) in curve.buckets.iter().enumerate() {
            for bin in 0..n_bins {
                content[[row, bin]] = bucket.histogram.content()[bin];
                error[[row, bin]] = bucket.histogram.bin_error(bin);
            }
        }
        let channels: Vec<i32> = curve.buckets.iter().map(|b| b.key.channel.number()).collect();
        let pulse_types: Vec<i32> = curve
            .buckets
            .iter()
            .map(|b| b.key.bunch.pulse_type())
            .collect();
        let sample_in: Vec<u8> = curve
            .buckets
            .iter()
            .map(|b| u8::from(b.key.sample == SampleConfig::In))
            .collect();
        let intensities: Vec<f64> = curve.buckets.iter().map(|b| b.intensity).collect();
        buckets
            .new_dataset_builder()
            .with_data(&content)
            .create(CONTENT_NAME)?;
        buckets
            .new_dataset_builder()
            .with_data(&error)
            .create(ERROR_NAME)?;
        buckets
            .new_dataset_builder()
            .with_data(&channels)
            .create("channel")?;
        buckets
            .new_dataset_builder()
            .with_data(&pulse_types)
            .create("pulse_type")?;
        buckets
            .new_dataset_builder()
            .with_data(&sample_in)
            .create("sample_in")?;
        buckets
            .new_dataset_builder()
            .with_data(&intensities)
            .create("intensity")?;

        Ok(())
    }

    /// Write the energy domain transmission and the cross section derived from it
    pub fn write_cross_section(
        &self,
        energy_transmission: &Histogram,
        cross_section: &Histogram,
        transform: &EnergyTransform,
    ) -> Result<(), HDF5WriterError> {
        let group = self.file_handle.create_group(TRANSMISSION_NAME)?;
        write_histogram(&group, energy_transmission)?;
        write_common_attrs(&group)?;
        write_display_range(&group, (0.0, MAX_ENERGY_DISPLAY))?;
        group
            .new_attr::<f64>()
            .create("flight_path")?
            .write_scalar(&transform.flight_path())?;
        group
            .new_attr::<f64>()
            .create("t0")?
            .write_scalar(&transform.t0())?;

        let group = self.file_handle.create_group(CROSS_SECTION_NAME)?;
        write_histogram(&group, cross_section)?;
        write_common_attrs(&group)?;
        write_display_range(&group, (0.0, MAX_ENERGY_DISPLAY))?;
        group
            .new_attr::<f64>()
            .create("areal_density")?
            .write_scalar(&AREAL_DENSITY)?;
        Ok(())
    }

    /// Write the per-run efficiency table of one detector
    pub fn write_efficiency(&self, report: &EfficiencyReport) -> Result<(), HDF5WriterError> {
        let group = self.file_handle.create_group(EFFICIENCY_NAME)?;
        write_common_attrs(&group)?;
        group
            .new_attr::<i32>()
            .create("channel")?
            .write_scalar(&report.channel.number())?;
        group
            .new_attr::<VarLenUnicode>()
            .create("sample")?
            .write_scalar(&VarLenUnicode::from_str(report.sample.key_prefix())?)?;
        group
            .new_attr::<f64>()
            .create("mean")?
            .write_scalar(&report.mean)?;
        group
            .new_attr::<f64>()
            .create("std_dev")?
            .write_scalar(&report.std_dev)?;
        group
            .new_attr::<u64>()
            .create("n_outliers")?
            .write_scalar(&(report.outliers.len() as u64))?;

        let column = |f: fn(&EfficiencyPoint) -> f64| -> Vec<f64> {
            report.points.iter().map(f).collect()
        };
        let runs: Vec<i32> = report.points.iter().map(|p| p.run_number).collect();
        group
            .new_dataset_builder()
            .with_data(&runs)
            .create("run_number")?;
        group
            .new_dataset_builder()
            .with_data(&column(|p| p.efficiency))
            .create("efficiency")?;
        group
            .new_dataset_builder()
            .with_data(&column(|p| p.efficiency_error))
            .create("efficiency_error")?;
        group
            .new_dataset_builder()
            .with_data(&column(|p| p.stability))
            .create("stability")?;
        group
            .new_dataset_builder()
            .with_data(&column(|p| p.stability_error))
            .create("stability_error")?;
        group
            .new_dataset_builder()
            .with_data(&column(|p| p.intensity))
            .create("intensity")?;
        Ok(())
    }

    /// Write a summary of the artifact in a separate yaml file
    pub fn write_summary<T: Serialize>(&self, summary: &T) -> Result<(), HDF5WriterError> {
        let mut sidecar = std::fs::File::create(&self.sidecar_path)?;
        sidecar.write_all(serde_yaml::to_string(summary)?.as_bytes())?;
        Ok(())
    }

    /// Flush and consume the writer
    pub fn close(self) -> Result<(), HDF5WriterError> {
        self.file_handle.flush()?;
        spdlog::info!(
            "Wrote {} and {}",
            self.file_handle.filename(),
            self.sidecar_path.to_string_lossy()
        );
        Ok(())
    }
}

fn write_histogram(group: &Group, hist: &Histogram) -> Result<(), HDF5WriterError> {
    group
        .new_dataset_builder()
        .with_data(hist.edges())
        .create(EDGES_NAME)?;
    group
        .new_dataset_builder()
        .with_data(hist.content())
        .create(CONTENT_NAME)?;
    group
        .new_dataset_builder()
        .with_data(&hist.errors())
        .create(ERROR_NAME)?;
    Ok(())
}

fn write_common_attrs(group: &Group) -> Result<(), HDF5WriterError> {
    group
        .new_attr::<VarLenUnicode>()
        .create("version")?
        .write_scalar(&VarLenUnicode::from_str(&format_version())?)?;
    group
        .new_attr::<i64>()
        .create("created")?
        .write_scalar(&time::OffsetDateTime::now_utc().unix_timestamp())?;
    Ok(())
}

fn write_display_range(group: &Group, range: (f64, f64)) -> Result<(), HDF5WriterError> {
    group
        .new_attr::<f64>()
        .create("min_display")?
        .write_scalar(&range.0)?;
    group
        .new_attr::<f64>()
        .create("max_display")?
        .write_scalar(&range.1)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::{normalize, TransmissionRatio};
    use crate::detector::{BucketKey, BunchType, DetectorChannel};

    fn curve() -> TransmissionCurve {
        let edges = vec![1.0, 10.0, 100.0];
        let hist = Histogram::from_parts(edges.clone(), vec![0.5, 0.25], &[0.1, 0.05]).unwrap();
        let key_in = BucketKey::new(DetectorChannel::Det2, BunchType::Parasitic, SampleConfig::In);
        let key_out = BucketKey::new(DetectorChannel::Det2, BunchType::Parasitic, SampleConfig::Out);
        TransmissionCurve {
            histogram: hist.clone(),
            ratios: vec![TransmissionRatio {
                channel: DetectorChannel::Det2,
                bunch: BunchType::Parasitic,
                ratio: hist.clone(),
                undefined_bins: 0,
            }],
            buckets: vec![
                normalize(key_in, hist.clone(), 2.0),
                normalize(key_out, hist, 0.0),
            ],
            display_range: (1.0e3, 1.0e8),
        }
    }

    #[test]
    fn test_write_transmission() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transmission_total_10bin.h5");
        let curve = curve();
        let writer = HDFWriter::new(&path).unwrap();
        writer.write_transmission(&curve, 10).unwrap();
        writer
            .write_summary(&ArtifactSummary::new(&curve, 10, &RunBook::default()))
            .unwrap();
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        let group = file.group(TRANSMISSION_NAME).unwrap();
        let content = group.dataset(CONTENT_NAME).unwrap().read_raw::<f64>().unwrap();
        assert_eq!(content, vec![0.5, 0.25]);
        let edges = group.dataset(EDGES_NAME).unwrap().read_raw::<f64>().unwrap();
        assert_eq!(edges.len(), 3);
        let bpd = group.attr("bins_per_decade").unwrap().read_scalar::<i64>().unwrap();
        assert_eq!(bpd, 10);
        let intensities = file
            .group(BUCKETS_NAME)
            .unwrap()
            .dataset("intensity")
            .unwrap()
            .read_raw::<f64>()
            .unwrap();
        assert_eq!(intensities, vec![2.0, 0.0]);

        let yaml = std::fs::read_to_string(dir.path().join("transmission_total_10bin.yml")).unwrap();
        assert!(yaml.contains("degenerate_buckets"));
        assert!(yaml.contains("Sout 2 parasitic"));
    }

    #[test]
    fn test_write_cross_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cross_section.h5");
        let hist = Histogram::from_parts(vec![1.0, 2.0], vec![0.5], &[0.1]).unwrap();
        let transform = EnergyTransform::new(182.1, 0.0).unwrap();
        let writer = HDFWriter::new(&path).unwrap();
        writer.write_cross_section(&hist, &hist, &transform).unwrap();
        writer.close().unwrap();

        let file = File::open(&path).unwrap();
        let flight_path = file
            .group(TRANSMISSION_NAME)
            .unwrap()
            .attr("flight_path")
            .unwrap()
            .read_scalar::<f64>()
            .unwrap();
        assert_eq!(flight_path, 182.1);
        let max_display = file
            .group(CROSS_SECTION_NAME)
            .unwrap()
            .attr("max_display")
            .unwrap()
            .read_scalar::<f64>()
            .unwrap();
        assert_eq!(max_display, MAX_ENERGY_DISPLAY);
    }
}
