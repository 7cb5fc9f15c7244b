use fxhash::FxHashMap;
use serde::Serialize;

use super::constants::MIN_TOF_CUT;
use super::detector::{BucketKey, BunchType, DetectorChannel, SampleConfig};
use super::error::HistogramError;
use super::event_source::{BeamPulse, EventSource, RunData};
use super::histogram::Histogram;
use super::run_config::{DetectorSettings, RunConfig};
use super::run_selector::{ChannelMask, RunSelector};

/// Bookkeeping for one run that was accumulated
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_number: i32,
    pub n_pulses: usize,
    pub n_triggers: usize,
    /// Trigger entries with a matching PKUP bunch
    pub matched: usize,
    /// Matched entries that passed every cut and were filled
    pub accepted: usize,
    pub duplicate_bunches: usize,
}

/// A run that could not be loaded and contributed nothing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRun {
    pub run_number: i32,
    pub reason: String,
}

/// Run bookkeeping of both sample configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunBook {
    pub sample_in: Vec<RunSummary>,
    pub sample_out: Vec<RunSummary>,
    pub skipped: Vec<SkippedRun>,
}

impl RunBook {
    pub fn new(sample_in: &Accumulation, sample_out: &Accumulation) -> Self {
        Self {
            sample_in: sample_in.runs().to_vec(),
            sample_out: sample_out.runs().to_vec(),
            skipped: sample_in
                .skipped()
                .iter()
                .chain(sample_out.skipped())
                .cloned()
                .collect(),
        }
    }
}

/// ToF histograms and delivered intensity, one of each per bucket.
///
/// Accumulations for disjoint sets of runs can be merged, which is how per-worker partial
/// results are reduced.
#[derive(Debug, Clone)]
pub struct Accumulation {
    sample: SampleConfig,
    histograms: FxHashMap<BucketKey, Histogram>,
    intensities: FxHashMap<BucketKey, f64>,
    runs: Vec<RunSummary>,
    skipped: Vec<SkippedRun>,
}

impl Accumulation {
    /// Empty accumulation with the 12 buckets of `sample`
    pub fn new(edges: &[f64], sample: SampleConfig) -> Result<Self, HistogramError> {
        let template = Histogram::new(edges.to_vec())?;
        let mut histograms = FxHashMap::default();
        let mut intensities = FxHashMap::default();
        for key in BucketKey::all_for_sample(sample) {
            histograms.insert(key, template.empty_like());
            intensities.insert(key, 0.0);
        }
        Ok(Self {
            sample,
            histograms,
            intensities,
            runs: Vec::new(),
            skipped: Vec::new(),
        })
    }

    pub fn sample(&self) -> SampleConfig {
        self.sample
    }

    pub fn histogram(&self, key: &BucketKey) -> Option<&Histogram> {
        self.histograms.get(key)
    }

    pub fn intensity(&self, key: &BucketKey) -> f64 {
        self.intensities.get(key).copied().unwrap_or(0.0)
    }

    pub fn runs(&self) -> &[RunSummary] {
        &self.runs
    }

    pub fn skipped(&self) -> &[SkippedRun] {
        &self.skipped
    }

    fn add_intensity(&mut self, key: BucketKey, intensity: f64) {
        *self.intensities.entry(key).or_insert(0.0) += intensity;
    }

    fn fill(&mut self, key: BucketKey, value: f64) {
        if let Some(hist) = self.histograms.get_mut(&key) {
            hist.fill(value);
        }
    }

    /// Add the contents of another accumulation of the same sample configuration
    pub fn merge(&mut self, other: Accumulation) -> Result<(), HistogramError> {
        for (key, hist) in other.histograms {
            match self.histograms.get_mut(&key) {
                Some(mine) => mine.add(&hist)?,
                None => {
                    self.histograms.insert(key, hist);
                }
            }
        }
        for (key, intensity) in other.intensities {
            self.add_intensity(key, intensity);
        }
        self.runs.extend(other.runs);
        self.skipped.extend(other.skipped);
        Ok(())
    }

    /// Put the run bookkeeping back into the order of `run_order`
    pub fn sort_runs(&mut self, run_order: &[i32]) {
        let position = |run: i32| run_order.iter().position(|r| *r == run);
        self.runs.sort_by_key(|summary| position(summary.run_number));
        self.skipped.sort_by_key(|skip| position(skip.run_number));
    }

    /// Hand out the histograms and intensities, sorted by bucket
    pub fn into_buckets(self) -> Vec<(BucketKey, Histogram, f64)> {
        let intensities = self.intensities;
        let mut buckets: Vec<(BucketKey, Histogram, f64)> = self
            .histograms
            .into_iter()
            .map(|(key, hist)| {
                let intensity = intensities.get(&key).copied().unwrap_or(0.0);
                (key, hist, intensity)
            })
            .collect();
        buckets.sort_by_key(|(key, _, _)| *key);
        buckets
    }
}

/// Turns the events of runs into ToF histograms and intensity sums for one sample configuration.
#[derive(Debug, Clone)]
pub struct EventAggregator {
    sample: SampleConfig,
    selector: RunSelector,
    settings: Vec<DetectorSettings>,
}

impl EventAggregator {
    pub fn new(run_config: &RunConfig, sample: SampleConfig) -> Self {
        Self {
            sample,
            selector: RunSelector::new(run_config),
            settings: run_config.detectors.clone(),
        }
    }

    pub fn sample(&self) -> SampleConfig {
        self.sample
    }

    fn settings(&self, channel: DetectorChannel) -> Option<&DetectorSettings> {
        self.settings.iter().find(|s| s.channel == channel)
    }

    /// Load one run from the source and accumulate it.
    ///
    /// A run that cannot be loaded is logged and recorded as skipped; it adds nothing.
    pub fn process_run(
        &self,
        source: &dyn EventSource,
        run_number: i32,
        acc: &mut Accumulation,
    ) -> Option<RunSummary> {
        spdlog::info!("Now sorting {}", source.describe(run_number));
        if let Some(size) = source.run_size_bytes(run_number) {
            spdlog::info!("Run size: {}", human_bytes::human_bytes(size as f64));
        }

        let scope = self.selector.scope(run_number, self.sample);
        for channel in DetectorChannel::ALL {
            spdlog::info!("{}: {}", channel, scope.contains(channel));
        }
        if scope.is_empty() {
            spdlog::warn!(
                "Run {} ({}) is not used by any detector and adds nothing",
                run_number,
                self.sample
            );
        }

        match source.load_run(run_number) {
            Ok(data) => {
                let summary = self.accumulate_run(run_number, &data, &scope, acc);
                spdlog::info!(
                    "Run {}: {} entries, {} matched, {} accepted",
                    run_number,
                    summary.n_triggers,
                    summary.matched,
                    summary.accepted
                );
                acc.runs.push(summary.clone());
                Some(summary)
            }
            Err(e) => {
                spdlog::error!("Cannot open run {}: {e}. Skipping this run.", run_number);
                acc.skipped.push(SkippedRun {
                    run_number,
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    /// Accumulate already loaded run data for the channels in `scope`
    pub fn accumulate_run(
        &self,
        run_number: i32,
        data: &RunData,
        scope: &ChannelMask,
        acc: &mut Accumulation,
    ) -> RunSummary {
        let mut summary = RunSummary {
            run_number,
            n_pulses: data.pulses.len(),
            n_triggers: data.triggers.len(),
            ..Default::default()
        };

        // Delivered intensity, every pulse, per in-scope channel and bunch type
        for pulse in data.pulses.iter() {
            let Some(bunch) = BunchType::from_pulse_type(pulse.pulse_type) else {
                continue;
            };
            for channel in scope.channels() {
                acc.add_intensity(
                    BucketKey::new(channel, bunch, self.sample),
                    pulse.intensity as f64,
                );
            }
        }

        // Index the pickup by bunch number; the first pulse of a bunch wins
        let mut index: FxHashMap<i32, &BeamPulse> = FxHashMap::default();
        for pulse in data.pulses.iter() {
            if index.contains_key(&pulse.bunch_number) {
                summary.duplicate_bunches += 1;
            } else {
                index.insert(pulse.bunch_number, pulse);
            }
        }
        if summary.duplicate_bunches > 0 {
            spdlog::warn!(
                "Run {} has {} PKUP entries with a repeated BunchNumber; only the first is matched",
                run_number,
                summary.duplicate_bunches
            );
        }

        for event in data.triggers.iter() {
            let Some(pulse) = index.get(&event.bunch_number) else {
                continue;
            };
            summary.matched += 1;

            let Some(channel) = DetectorChannel::from_number(event.detector) else {
                continue;
            };
            if !scope.contains(channel) {
                continue;
            }
            let Some(settings) = self.settings(channel) else {
                continue;
            };
            let delta = event.tof - pulse.flash_time;
            let passes_cuts = event.amplitude as f64 > settings.cut_a && delta >= MIN_TOF_CUT;
            if !passes_cuts {
                continue;
            }
            // Bunch type comes from the trigger's own PSpulse; other values are not used
            let Some(bunch) = BunchType::from_pulse_type(event.pulse_type) else {
                continue;
            };
            acc.fill(
                BucketKey::new(channel, bunch, self.sample),
                delta + settings.cal,
            );
            summary.accepted += 1;
        }

        summary
    }
}
