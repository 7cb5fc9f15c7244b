use std::path::PathBuf;
use std::sync::mpsc::Sender;

use super::aggregator::{Accumulation, EventAggregator, RunBook, SkippedRun};
use super::binning::log_edges;
use super::combiner::{TransmissionCombiner, TransmissionCurve};
use super::config::Config;
use super::constants::{DEFAULT_AMPLITUDE_CUT, DEFAULT_T0, MAX_TOF_DISPLAY};
use super::detector::{DetectorChannel, SampleConfig};
use super::efficiency::{EfficiencyReport, EfficiencyStudy};
use super::energy::{cross_section, EnergyTransform};
use super::error::ProcessorError;
use super::event_source::{EventSource, Hdf5EventSource};
use super::hdf_writer::{ArtifactSummary, HDFWriter};
use super::histogram::Histogram;
use super::run_config::RunConfig;
use super::worker_status::{BarColor, WorkerStatus};

/// Which analysis to run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Analysis {
    Transmission,
    CrossSection,
    Efficiency(DetectorChannel, SampleConfig),
}

/// The ToF transmission and what went into it
#[derive(Debug, Clone)]
pub struct TransmissionResult {
    pub curve: TransmissionCurve,
    pub book: RunBook,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CrossSectionResult {
    pub transmission: TransmissionResult,
    /// Transmission over increasing neutron energy
    pub energy_transmission: Histogram,
    pub cross_section: Histogram,
    pub output_path: PathBuf,
}

/// Divide a run list in to a set of round-robin subsets (per thread/worker).
///
/// Workers that would get no runs are not given a subset.
pub fn create_subsets(runs: &[i32], n_threads: i32) -> Vec<Vec<i32>> {
    let mut subsets: Vec<Vec<i32>> = vec![Vec::new(); n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, run) in runs.iter().enumerate() {
        subsets[idx % n_subsets].push(*run)
    }

    subsets.retain(|subset| !subset.is_empty());
    subsets
}

/// Accumulate one subset of runs into a fresh partial accumulation
fn accumulate_subset(
    aggregator: &EventAggregator,
    source: &dyn EventSource,
    edges: &[f64],
    subset: &[i32],
    worker_id: usize,
    tx: &Sender<WorkerStatus>,
) -> Result<Accumulation, ProcessorError> {
    let sample = aggregator.sample();
    let color = BarColor::for_sample(sample);
    let stage = sample.to_string();
    let mut acc = Accumulation::new(edges, sample)?;
    let n_runs = subset.len();
    for (idx, run) in subset.iter().enumerate() {
        tx.send(
            WorkerStatus::new(idx as f32 / n_runs as f32, *run, worker_id, color).with_stage(&stage),
        )?;
        aggregator.process_run(source, *run, &mut acc);
    }
    if let Some(last) = subset.last() {
        tx.send(WorkerStatus::new(1.0, *last, worker_id, color).with_stage(&stage))?;
    }
    Ok(acc)
}

/// Accumulate every run of one sample configuration.
///
/// Runs are split over `n_threads` workers; each fills its own partial accumulation and the
/// partials are merged once every worker is done.
pub fn accumulate_sample(
    config: &Config,
    run_config: &RunConfig,
    source: &dyn EventSource,
    sample: SampleConfig,
    tx: &Sender<WorkerStatus>,
) -> Result<Accumulation, ProcessorError> {
    let edges = log_edges(config.bins_per_decade)?;
    let aggregator = EventAggregator::new(run_config, sample);
    let runs = run_config.runs(sample);
    let subsets = create_subsets(runs, config.n_threads);
    spdlog::info!(
        "Accumulating {} {} runs with {} workers",
        runs.len(),
        sample,
        subsets.len()
    );

    let partials: Vec<Result<Accumulation, ProcessorError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = subsets
            .iter()
            .enumerate()
            .map(|(worker_id, subset)| {
                let aggregator = &aggregator;
                let edges = &edges;
                let tx = tx.clone();
                scope.spawn(move || {
                    accumulate_subset(aggregator, source, edges, subset, worker_id, &tx)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(result) => result,
                Err(_) => Err(ProcessorError::WorkerPanic),
            })
            .collect()
    });

    let mut total = Accumulation::new(&edges, sample)?;
    for partial in partials {
        total.merge(partial?)?;
    }
    total.sort_runs(runs);
    Ok(total)
}

/// Accumulate both sample configurations, normalize, combine and write the ToF transmission
pub fn compute_transmission(
    config: &Config,
    run_config: &RunConfig,
    source: &dyn EventSource,
    tx: &Sender<WorkerStatus>,
) -> Result<TransmissionResult, ProcessorError> {
    config.validate()?;
    let output_path = config.get_transmission_file_name()?;

    let sample_in = accumulate_sample(config, run_config, source, SampleConfig::In, tx)?;
    let sample_out = accumulate_sample(config, run_config, source, SampleConfig::Out, tx)?;
    let book = RunBook::new(&sample_in, &sample_out);
    if !book.skipped.is_empty() {
        spdlog::warn!("{} runs could not be read and were skipped", book.skipped.len());
    }

    let curve = TransmissionCombiner::new(config.min_tof_display).combine(sample_in, sample_out)?;
    match curve
        .histogram
        .display_window(config.min_tof_display, MAX_TOF_DISPLAY)
    {
        Some((first, last)) => spdlog::info!(
            "Transmission display window covers bins {} to {} of {}",
            first,
            last,
            curve.histogram.n_bins()
        ),
        None => spdlog::warn!(
            "No complete bin lies in the display range [{}, {}]",
            config.min_tof_display,
            MAX_TOF_DISPLAY
        ),
    }

    let writer = HDFWriter::new(&output_path)?;
    writer.write_transmission(&curve, config.bins_per_decade)?;
    writer.write_summary(&ArtifactSummary::new(
        &curve,
        config.bins_per_decade,
        &book,
    ))?;
    writer.close()?;

    Ok(TransmissionResult {
        curve,
        book,
        output_path,
    })
}

/// Compute the transmission, move it onto neutron energy and derive the cross section
pub fn compute_cross_section(
    config: &Config,
    run_config: &RunConfig,
    source: &dyn EventSource,
    tx: &Sender<WorkerStatus>,
) -> Result<CrossSectionResult, ProcessorError> {
    let transform = EnergyTransform::new(config.flight_path, DEFAULT_T0)?;
    let output_path = config.get_cross_section_file_name()?;
    let transmission = compute_transmission(config, run_config, source, tx)?;

    let energy_transmission = transform.apply(&transmission.curve.histogram)?;
    let sigma = cross_section(&energy_transmission)?;
    let non_positive = energy_transmission
        .content()
        .iter()
        .filter(|tra| **tra <= 0.0)
        .count();
    if non_positive > 0 {
        spdlog::warn!(
            "{} energy bins have a non-positive transmission; their cross section is 0 +- 0.1",
            non_positive
        );
    }

    let writer = HDFWriter::new(&output_path)?;
    writer.write_cross_section(&energy_transmission, &sigma, &transform)?;
    writer.write_summary(&ArtifactSummary::new(
        &transmission.curve,
        config.bins_per_decade,
        &transmission.book,
    ))?;
    writer.close()?;

    Ok(CrossSectionResult {
        transmission,
        energy_transmission,
        cross_section: sigma,
        output_path,
    })
}

/// Efficiency and stability of one detector over its runs of one sample configuration
pub fn compute_efficiency(
    config: &Config,
    run_config: &RunConfig,
    source: &dyn EventSource,
    channel: DetectorChannel,
    sample: SampleConfig,
    tx: &Sender<WorkerStatus>,
) -> Result<EfficiencyReport, ProcessorError> {
    config.validate()?;
    let output_path = config.get_efficiency_file_name(channel, sample)?;
    let (cut_a, runs) = match run_config.detector(channel) {
        Some(settings) => (settings.cut_a, settings.runs(sample).to_vec()),
        None => (DEFAULT_AMPLITUDE_CUT, Vec::new()),
    };
    let study = EfficiencyStudy::new(channel, sample, cut_a, config.amplitude_bins)?;

    let mut points = Vec::with_capacity(runs.len());
    let mut skipped = Vec::new();
    for (idx, run) in runs.iter().enumerate() {
        tx.send(
            WorkerStatus::new(idx as f32 / runs.len() as f32, *run, 0, BarColor::GREEN)
                .with_stage("efficiency"),
        )?;
        spdlog::info!("Now measuring {}", source.describe(*run));
        match source.load_run(*run) {
            Ok(data) => points.push(study.measure(*run, &data)?),
            Err(e) => {
                spdlog::error!("Cannot open run {}: {e}. Skipping this run.", run);
                skipped.push(SkippedRun {
                    run_number: *run,
                    reason: e.to_string(),
                });
            }
        }
    }

    let report = study.report(points, skipped)?;
    spdlog::info!(
        "{} {}: efficiency mean {} std. dev. {} over {} runs",
        channel,
        sample,
        report.mean,
        report.std_dev,
        report.points.len()
    );

    let writer = HDFWriter::new(&output_path)?;
    writer.write_efficiency(&report)?;
    writer.write_summary(&report)?;
    writer.close()?;
    let last_run = runs.last().copied().unwrap_or(0);
    tx.send(WorkerStatus::new(1.0, last_run, 0, BarColor::GREEN).with_stage("efficiency"))?;

    Ok(report)
}

/// The function to be called by a separate thread (typically the UI).
///
/// Reads the run configuration and runs the requested analysis over the HDF5 run files it
/// points to.
pub fn process(
    config: Config,
    analysis: Analysis,
    tx: Sender<WorkerStatus>,
) -> Result<(), ProcessorError> {
    config.validate()?;
    let run_config = RunConfig::read(&config.run_config_path)?;
    let source = Hdf5EventSource::new(&run_config.prefix, &run_config.suffix);
    match analysis {
        Analysis::Transmission => {
            let result = compute_transmission(&config, &run_config, &source, &tx)?;
            spdlog::info!("Transmission written to {:?}", result.output_path);
        }
        Analysis::CrossSection => {
            let result = compute_cross_section(&config, &run_config, &source, &tx)?;
            spdlog::info!("Cross section written to {:?}", result.output_path);
        }
        Analysis::Efficiency(channel, sample) => {
            compute_efficiency(&config, &run_config, &source, channel, sample, &tx)?;
        }
    }
    Ok(())
}
