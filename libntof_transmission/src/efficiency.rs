//! Detector efficiency and gain stability, run by run.
//!
//! For one detector and sample configuration, each run gets an amplitude spectrum normalized
//! by the run's delivered intensity. The efficiency is the normalized count above the
//! amplitude threshold; the stability is the position of the spectrum peak. Runs whose
//! efficiency strays more than two standard deviations from the mean are flagged.
use serde::Serialize;

use super::aggregator::SkippedRun;
use super::binning::linear_edges;
use super::constants::{AMPLITUDE_RANGE_MAX, EFFICIENCY_OUTLIER_SIGMAS};
use super::detector::{DetectorChannel, SampleConfig};
use super::error::{EfficiencyError, HistogramError};
use super::event_source::RunData;
use super::histogram::Histogram;

/// Efficiency and stability of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyPoint {
    pub run_number: i32,
    pub efficiency: f64,
    pub efficiency_error: f64,
    /// Amplitude at the centre of the spectrum maximum
    pub stability: f64,
    pub stability_error: f64,
    /// Total delivered intensity of the run
    pub intensity: f64,
    /// Raw counts above threshold, overflow included
    pub counts: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EfficiencyReport {
    pub channel: DetectorChannel,
    pub sample: SampleConfig,
    pub points: Vec<EfficiencyPoint>,
    pub mean: f64,
    pub std_dev: f64,
    /// Runs further than two standard deviations from the mean
    pub outliers: Vec<i32>,
    /// Runs with no usable efficiency (no delivered intensity)
    pub excluded: Vec<i32>,
    pub skipped: Vec<SkippedRun>,
}

/// Builds the per-run amplitude spectra of one detector
#[derive(Debug, Clone)]
pub struct EfficiencyStudy {
    channel: DetectorChannel,
    sample: SampleConfig,
    cut_a: f64,
    edges: Vec<f64>,
}

impl EfficiencyStudy {
    pub fn new(
        channel: DetectorChannel,
        sample: SampleConfig,
        cut_a: f64,
        amplitude_bins: usize,
    ) -> Result<Self, EfficiencyError> {
        Ok(Self {
            channel,
            sample,
            cut_a,
            edges: linear_edges(amplitude_bins, 0.0, AMPLITUDE_RANGE_MAX)?,
        })
    }

    pub fn channel(&self) -> DetectorChannel {
        self.channel
    }

    pub fn sample(&self) -> SampleConfig {
        self.sample
    }

    /// Amplitude spectrum of this detector above threshold, not normalized.
    ///
    /// Bunch numbers are not matched here; every trigger of the detector counts.
    pub fn amplitude_spectrum(&self, data: &RunData) -> Result<Histogram, HistogramError> {
        let mut hist = Histogram::new(self.edges.clone())?;
        data.triggers
            .iter()
            .filter(|t| t.detector == self.channel.number())
            .filter(|t| t.amplitude as f64 > self.cut_a)
            .for_each(|t| hist.fill(t.amplitude as f64));
        Ok(hist)
    }

    /// Measure one run. The efficiency is not finite when the run delivered no intensity.
    pub fn measure(
        &self,
        run_number: i32,
        data: &RunData,
    ) -> Result<EfficiencyPoint, HistogramError> {
        let intensity: f64 = data.pulses.iter().map(|p| p.intensity as f64).sum();
        let mut spectrum = self.amplitude_spectrum(data)?;

        let counts = self.sum_above_cut(&spectrum);
        let efficiency_error = (spectrum.entries() as f64).sqrt() / intensity;

        spectrum.scale(1.0 / intensity);
        let efficiency = self.sum_above_cut(&spectrum);

        let (stability, stability_error) = match spectrum.maximum_bin() {
            Some(bin) => (
                spectrum.bin_center(bin),
                spectrum.bin_width(bin) / 12.0_f64.sqrt(),
            ),
            None => (0.0, 0.0),
        };

        Ok(EfficiencyPoint {
            run_number,
            efficiency,
            efficiency_error,
            stability,
            stability_error,
            intensity,
            counts,
        })
    }

    /// Sum from the bin holding `cut_a` through the overflow. The underflow is included when
    /// `cut_a` lies below the spectrum.
    fn sum_above_cut(&self, spectrum: &Histogram) -> f64 {
        let last_bin = spectrum.n_bins() - 1;
        let in_range = match spectrum.find_bin(self.cut_a) {
            Some(first) => spectrum.integral_range(first, last_bin),
            None if self.cut_a < self.edges[0] => spectrum.underflow() + spectrum.integral(),
            None => 0.0,
        };
        in_range + spectrum.overflow()
    }

    /// Collect measured runs into a report with the spread of the efficiencies
    pub fn report(
        &self,
        points: Vec<EfficiencyPoint>,
        skipped: Vec<SkippedRun>,
    ) -> Result<EfficiencyReport, EfficiencyError> {
        let (usable, unusable): (Vec<EfficiencyPoint>, Vec<EfficiencyPoint>) =
            points.into_iter().partition(|p| p.efficiency.is_finite());
        let excluded: Vec<i32> = unusable.iter().map(|p| p.run_number).collect();
        for run in excluded.iter() {
            spdlog::warn!(
                "Run {} delivered no intensity to {} {}; excluded from the efficiency study",
                run,
                self.channel,
                self.sample
            );
        }
        if usable.is_empty() {
            return Err(EfficiencyError::NoUsableRuns(
                self.channel.to_string(),
                self.sample.to_string(),
            ));
        }

        let efficiencies: Vec<f64> = usable.iter().map(|p| p.efficiency).collect();
        let (mean, std_dev) = mean_and_std_dev(&efficiencies);
        let outliers: Vec<i32> = usable
            .iter()
            .filter(|p| (p.efficiency - mean).abs() > EFFICIENCY_OUTLIER_SIGMAS * std_dev)
            .map(|p| p.run_number)
            .collect();
        if !outliers.is_empty() {
            spdlog::warn!(
                "{} {}: runs {:?} are beyond {} standard deviations",
                self.channel,
                self.sample,
                outliers,
                EFFICIENCY_OUTLIER_SIGMAS
            );
        }

        Ok(EfficiencyReport {
            channel: self.channel,
            sample: self.sample,
            points: usable,
            mean,
            std_dev,
            outliers,
            excluded,
            skipped,
        })
    }
}

/// Mean and population standard deviation
fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_source::{BeamPulse, TriggerEvent};

    fn run(intensity: f32, amplitudes: &[f32]) -> RunData {
        RunData {
            pulses: vec![BeamPulse {
                bunch_number: 1,
                flash_time: 0.0,
                pulse_type: 2,
                intensity,
            }],
            triggers: amplitudes
                .iter()
                .map(|amp| TriggerEvent {
                    detector: 3,
                    tof: 5000.0,
                    amplitude: *amp,
                    bunch_number: 99,
                    pulse_type: 2,
                    intensity: 0.0,
                })
                .collect(),
        }
    }

    fn study() -> EfficiencyStudy {
        EfficiencyStudy::new(DetectorChannel::Det3, SampleConfig::In, 1000.0, 150).unwrap()
    }

    #[test]
    fn test_measure_single_run() {
        // 300 ADC wide bins; the peak sits in [6000, 6300)
        let data = run(4.0, &[500.0, 1500.0, 6100.0, 6200.0, 6250.0, 50000.0]);
        let point = study().measure(7, &data).unwrap();
        assert_eq!(point.counts, 5.0);
        assert!((point.efficiency - 1.25).abs() < 1.0e-12);
        assert!((point.efficiency_error - 5.0_f64.sqrt() / 4.0).abs() < 1.0e-12);
        assert!((point.stability - 6150.0).abs() < 1.0e-9);
        assert!((point.stability_error - 300.0 / 12.0_f64.sqrt()).abs() < 1.0e-9);
    }

    #[test]
    fn test_amplitudes_past_range_count() {
        let data = run(1.0, &[2000.0, 3000.0, 4000.0, 45000.0, 60000.0]);
        let point = study().measure(1, &data).unwrap();
        assert_eq!(point.counts, 5.0);
        assert!((point.efficiency - 5.0).abs() < 1.0e-12);
        assert!((point.efficiency_error - 5.0_f64.sqrt()).abs() < 1.0e-12);
    }

    #[test]
    fn test_cut_below_range_counts_underflow() {
        let study =
            EfficiencyStudy::new(DetectorChannel::Det3, SampleConfig::In, -100.0, 150).unwrap();
        let data = run(2.0, &[-200.0, -50.0, 100.0, 50000.0]);
        let point = study.measure(1, &data).unwrap();
        assert_eq!(point.counts, 3.0);
        assert!((point.efficiency - 1.5).abs() < 1.0e-12);
        assert!((point.efficiency_error - 3.0_f64.sqrt() / 2.0).abs() < 1.0e-12);
    }

    #[test]
    fn test_other_detectors_ignored() {
        let mut data = run(1.0, &[2000.0]);
        let mut other = data.triggers[0];
        other.detector = 4;
        data.triggers.push(other);
        let point = study().measure(1, &data).unwrap();
        assert_eq!(point.counts, 1.0);
    }

    #[test]
    fn test_report_outliers_and_exclusions() {
        let study = study();
        let mut points: Vec<EfficiencyPoint> = (0..10)
            .map(|i| study.measure(i, &run(1.0, &[2000.0; 10])).unwrap())
            .collect();
        points.push(study.measure(10, &run(1.0, &[2000.0; 40])).unwrap());
        points.push(study.measure(11, &run(0.0, &[2000.0; 10])).unwrap());

        let report = study.report(points, vec![]).unwrap();
        assert_eq!(report.excluded, vec![11]);
        assert_eq!(report.points.len(), 11);
        assert_eq!(report.outliers, vec![10]);
        let expected_mean = (10.0 * 10.0 + 40.0) / 11.0;
        assert!((report.mean - expected_mean).abs() < 1.0e-9);
    }

    #[test]
    fn test_report_without_usable_runs() {
        let study = study();
        let points = vec![study.measure(1, &run(0.0, &[2000.0])).unwrap()];
        assert!(matches!(
            study.report(points, vec![]),
            Err(EfficiencyError::NoUsableRuns(_, _))
        ));
    }

    #[test]
    fn test_population_std_dev() {
        let (mean, std_dev) = mean_and_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(mean, 5.0);
        assert_eq!(std_dev, 2.0);
    }
}
