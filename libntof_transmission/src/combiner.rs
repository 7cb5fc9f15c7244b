use serde::Serialize;

use super::aggregator::Accumulation;
use super::constants::{MAX_TOF_DISPLAY, MIN_INTENSITY};
use super::detector::{BucketKey, BunchType, DetectorChannel, SampleConfig};
use super::error::HistogramError;
use super::histogram::Histogram;

/// How the intensity normalization of one bucket went
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Normalization {
    /// Divided by the accumulated intensity
    Scaled(f64),
    /// No intensity was ever accumulated; the histogram was zeroed instead of divided
    Degenerate,
}

/// Normalized histogram and bookkeeping of one bucket
#[derive(Debug, Clone)]
pub struct NormalizedBucket {
    pub key: BucketKey,
    pub histogram: Histogram,
    pub intensity: f64,
    pub normalization: Normalization,
}

/// Divide a bucket histogram by its delivered intensity.
///
/// Content scales by `1 / intensity` and variance by `1 / intensity^2`. A zero (or
/// numerically zero) intensity leaves a zero-filled histogram so the bucket adds nothing to
/// the ratios downstream.
pub fn normalize(key: BucketKey, mut histogram: Histogram, intensity: f64) -> NormalizedBucket {
    let normalization = if intensity.is_finite() && intensity.abs() > MIN_INTENSITY {
        histogram.scale(1.0 / intensity);
        Normalization::Scaled(intensity)
    } else {
        spdlog::warn!(
            "Bucket {} accumulated no beam intensity ({}); its histogram is left empty",
            key,
            intensity
        );
        histogram.reset();
        Normalization::Degenerate
    };
    NormalizedBucket {
        key,
        histogram,
        intensity,
        normalization,
    }
}

/// Transmission of one detector and bunch type
#[derive(Debug, Clone)]
pub struct TransmissionRatio {
    pub channel: DetectorChannel,
    pub bunch: BunchType,
    pub ratio: Histogram,
    /// Bins where sample-out was empty but sample-in was not
    pub undefined_bins: usize,
}

/// The final, averaged transmission as a function of ToF
#[derive(Debug, Clone)]
pub struct TransmissionCurve {
    pub histogram: Histogram,
    pub ratios: Vec<TransmissionRatio>,
    pub buckets: Vec<NormalizedBucket>,
    /// Range of ToF shown: from the caller's floor up to 1e8 ns
    pub display_range: (f64, f64),
}

impl TransmissionCurve {
    pub fn degenerate_buckets(&self) -> Vec<BucketKey> {
        self.buckets
            .iter()
            .filter(|b| b.normalization == Normalization::Degenerate)
            .map(|b| b.key)
            .collect()
    }

    pub fn undefined_ratio_bins(&self) -> usize {
        self.ratios.iter().map(|r| r.undefined_bins).sum()
    }
}

/// Normalizes the sample-in and sample-out accumulations and averages the transmission of
/// every (detector, bunch type) pair.
#[derive(Debug, Clone)]
pub struct TransmissionCombiner {
    min_tof_display: f64,
}

impl TransmissionCombiner {
    pub fn new(min_tof_display: f64) -> Self {
        Self { min_tof_display }
    }

    /// Both accumulations must be complete; normalization happens here, once.
    pub fn combine(
        &self,
        sample_in: Accumulation,
        sample_out: Accumulation,
    ) -> Result<TransmissionCurve, HistogramError> {
        let mut buckets: Vec<NormalizedBucket> = sample_in
            .into_buckets()
            .into_iter()
            .chain(sample_out.into_buckets())
            .map(|(key, hist, intensity)| normalize(key, hist, intensity))
            .collect();
        buckets.sort_by_key(|b| b.key);

        let mut ratios = Vec::with_capacity(DetectorChannel::ALL.len() * BunchType::ALL.len());
        for channel in DetectorChannel::ALL {
            for bunch in BunchType::ALL {
                let find = |sample: SampleConfig| {
                    let key = BucketKey::new(channel, bunch, sample);
                    buckets.iter().find(|b| b.key == key)
                };
                let (Some(num), Some(den)) = (find(SampleConfig::In), find(SampleConfig::Out))
                else {
                    continue;
                };
                let undefined_bins = num.histogram.count_undefined_ratios(&den.histogram);
                if undefined_bins > 0 {
                    spdlog::warn!(
                        "DET{} {}: {} bins are empty in sample-out but not in sample-in; they count as zero",
                        channel.number(),
                        bunch,
                        undefined_bins
                    );
                }
                ratios.push(TransmissionRatio {
                    channel,
                    bunch,
                    ratio: num.histogram.divide(&den.histogram)?,
                    undefined_bins,
                });
            }
        }

        let histogram = average(&ratios)?;

        Ok(TransmissionCurve {
            histogram,
            ratios,
            buckets,
            display_range: (self.min_tof_display, MAX_TOF_DISPLAY),
        })
    }
}

/// Sum the ratio curves and scale by 1 / (number of detector and bunch type pairs).
///
/// The divisor is always the full pair count, so a degenerate pair pulls the average toward
/// zero instead of being dropped from it.
fn average(ratios: &[TransmissionRatio]) -> Result<Histogram, HistogramError> {
    let n_pairs = DetectorChannel::ALL.len() * BunchType::ALL.len();
    let Some(first) = ratios.first() else {
        return Err(HistogramError::NothingToAverage);
    };
    let mut total = first.ratio.empty_like();
    for ratio in ratios.iter() {
        total.add(&ratio.ratio)?;
    }
    total.scale(1.0 / n_pairs as f64);
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges() -> Vec<f64> {
        vec![1.0, 10.0, 100.0]
    }

    #[test]
    fn test_normalize_scales_variance() {
        let mut hist = Histogram::new(edges()).unwrap();
        for _ in 0..100 {
            hist.fill(5.0);
        }
        let key = BucketKey::new(DetectorChannel::Det1, BunchType::Dedicated, SampleConfig::In);
        let bucket = normalize(key, hist, 50.0);
        assert_eq!(bucket.normalization, Normalization::Scaled(50.0));
        assert!((bucket.histogram.content()[0] - 2.0).abs() < 1.0e-12);
        assert!((bucket.histogram.sumw2()[0] - 100.0 / 2500.0).abs() < 1.0e-12);
    }

    #[test]
    fn test_normalize_zero_intensity() {
        let mut hist = Histogram::new(edges()).unwrap();
        hist.fill(5.0);
        let key = BucketKey::new(DetectorChannel::Det7, BunchType::Parasitic, SampleConfig::Out);
        let bucket = normalize(key, hist, 0.0);
        assert_eq!(bucket.normalization, Normalization::Degenerate);
        assert!(bucket.histogram.content().iter().all(|c| *c == 0.0));
        assert!(bucket.histogram.content().iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_empty_out_bin_contributes_zero() {
        let num = Histogram::from_parts(edges(), vec![5.0, 2.0], &[1.0, 1.0]).unwrap();
        let den = Histogram::from_parts(edges(), vec![0.0, 4.0], &[0.0, 1.0]).unwrap();
        let ratio = num.divide(&den).unwrap();
        let ratios: Vec<TransmissionRatio> = (0..12)
            .map(|_| TransmissionRatio {
                channel: DetectorChannel::Det1,
                bunch: BunchType::Dedicated,
                ratio: ratio.clone(),
                undefined_bins: 1,
            })
            .collect();
        let total = average(&ratios).unwrap();
        assert_eq!(total.content()[0], 0.0);
        assert_eq!(total.bin_error(0), 0.0);
        assert!((total.content()[1] - 0.5).abs() < 1.0e-12);
        // twelve identical curves: error adds in quadrature, then scales by 1/12
        let single = ratio.bin_error(1);
        assert!((total.bin_error(1) - single * 12.0_f64.sqrt() / 12.0).abs() < 1.0e-12);
    }
}
