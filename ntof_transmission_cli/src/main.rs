use clap::{Arg, Command};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use indicatif_log_bridge::LogWrapper;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use libntof_transmission::config::Config;
use libntof_transmission::detector::{DetectorChannel, SampleConfig};
use libntof_transmission::process::{process, Analysis};
use libntof_transmission::worker_status::{BarColor, WorkerStatus};

const LOG_PATH: &str = "./ntof_transmission.log";

/// Send the library's spdlog output to a file, truncated every invocation
fn init_file_log() -> Result<(), spdlog::Error> {
    let file_sink = Arc::new(
        spdlog::sink::FileSink::builder()
            .path(PathBuf::from(LOG_PATH))
            .formatter(Box::new(spdlog::formatter::PatternFormatter::new(
                spdlog::formatter::pattern!(
                    "[{date_short} {time_short}] - [thread: {tid}] - [{^{level}}] - {payload}{eol}"
                ),
            )))
            .truncate(true)
            .build()?,
    );
    let logger = Arc::new(
        spdlog::Logger::builder()
            .flush_level_filter(spdlog::LevelFilter::All)
            .sink(file_sink)
            .build()?,
    );
    spdlog::set_default_logger(logger);
    Ok(())
}

fn make_template_config(path: &Path) {
    match Config::default().write_config_file(path) {
        Ok(()) => log::info!("Done."),
        Err(e) => log::error!("Could not write template config: {e}"),
    }
}

fn bar_style(color: &BarColor) -> ProgressStyle {
    let color_name = match color {
        BarColor::CYAN => "cyan",
        BarColor::MAGENTA => "magenta",
        BarColor::GREEN => "green",
    };
    let template = format!("{{prefix:>12}} [{{bar:40.{color_name}/blue}}] {{percent:>3}}% {{msg}}");
    ProgressStyle::with_template(&template).unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Move the bar of the status' stage and worker, creating it on first report
fn update_bar(
    bars: &mut HashMap<(String, usize), ProgressBar>,
    pb_manager: &MultiProgress,
    status: &WorkerStatus,
) {
    let bar = bars
        .entry((status.stage.clone(), status.worker_id))
        .or_insert_with(|| {
            let bar = pb_manager.add(ProgressBar::new(100));
            bar.set_style(bar_style(&status.color));
            bar.set_prefix(format!("{} #{}", status.stage, status.worker_id));
            bar
        });
    bar.set_position((status.progress * 100.0) as u64);
    bar.set_message(format!("run {}", status.run_number));
}

/// Parse the efficiency arguments into the requested analysis
fn efficiency_analysis(matches: &clap::ArgMatches) -> Option<Analysis> {
    let detector = matches.get_one::<String>("detector")?;
    let sample = matches.get_one::<String>("sample")?;
    let channel = match DetectorChannel::from_str(detector) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return None;
        }
    };
    let sample = match SampleConfig::from_str(sample) {
        Ok(s) => s,
        Err(e) => {
            log::error!("{e}");
            return None;
        }
    };
    Some(Analysis::Efficiency(channel, sample))
}

fn main() {
    // Create a cli
    let matches = Command::new("ntof_transmission_cli")
        .arg_required_else_help(true)
        .subcommand(Command::new("new").about("Make a template configuration yaml file"))
        .subcommand(
            Command::new("transmission").about("Compute the transmission as a function of ToF"),
        )
        .subcommand(
            Command::new("cross-section")
                .about("Compute the transmission in energy and the total cross section"),
        )
        .subcommand(
            Command::new("efficiency")
                .about("Run-by-run efficiency and stability of one detector")
                .arg(
                    Arg::new("detector")
                        .short('d')
                        .long("detector")
                        .required(true)
                        .help("Detector channel (1, 2, 3, 4, 7 or 8)"),
                )
                .arg(
                    Arg::new("sample")
                        .short('s')
                        .long("sample")
                        .required(true)
                        .help("Sample configuration (in or out)"),
                ),
        )
        .arg(
            Arg::new("path")
                .short('p')
                .long("path")
                .required(true)
                .help("Path to the configuration file"),
        )
        .get_matches();

    // Initialize feedback
    let logger = simplelog::TermLogger::new(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    let pb_manager = MultiProgress::new();

    if let Err(e) = LogWrapper::new(pb_manager.clone(), logger).try_init() {
        eprintln!("Could not create logging/progress: {e}");
        return;
    }
    if let Err(e) = init_file_log() {
        log::warn!("Could not open {LOG_PATH}, library messages will not be saved: {e}");
    }

    // Parse the cli
    let config_path = match matches.get_one::<String>("path") {
        Some(p) => PathBuf::from(p),
        None => {
            log::error!("A configuration path is required");
            return;
        }
    };

    let analysis = match matches.subcommand() {
        Some(("new", _)) => {
            log::info!(
                "Making a template config at {}...",
                config_path.to_string_lossy()
            );
            make_template_config(&config_path);
            return;
        }
        Some(("transmission", _)) => Analysis::Transmission,
        Some(("cross-section", _)) => Analysis::CrossSection,
        Some(("efficiency", sub)) => match efficiency_analysis(sub) {
            Some(a) => a,
            None => return,
        },
        _ => {
            log::error!("Please choose one of: new, transmission, cross-section, efficiency");
            return;
        }
    };

    // Load our config
    log::info!("Loading config from {}...", config_path.to_string_lossy());
    let config = match Config::read_config_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            log::error!("{e}");
            return;
        }
    };
    log::info!("Config successfully loaded.");
    log::info!(
        "Run configuration: {}",
        config.run_config_path.to_string_lossy()
    );
    log::info!("Output Path: {}", config.output_path.to_string_lossy());
    log::info!(
        "Bins per decade: {} Flight path: {} m",
        config.bins_per_decade,
        config.flight_path
    );
    log::info!("Number of workers: {}", config.n_threads);

    // Spawn the task!
    let (tx, rx) = channel::<WorkerStatus>();
    let handle = std::thread::spawn(move || process(config, analysis, tx));

    let mut bars: HashMap<(String, usize), ProgressBar> = HashMap::new();
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(status) => update_bar(&mut bars, &pb_manager, &status),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if handle.is_finished() {
            // Drain what was sent before the worker finished
            while let Ok(status) = rx.try_recv() {
                update_bar(&mut bars, &pb_manager, &status);
            }
            break;
        }
    }

    for bar in bars.values() {
        bar.finish();
    }

    match handle.join() {
        Ok(result) => match result {
            Ok(_) => log::info!("Analysis completed successfully!"),
            Err(e) => log::error!("Analysis failed with error: {e}. See {LOG_PATH} for details."),
        },
        Err(_) => log::error!("Failed to join analysis task!"),
    }

    log::info!("Done.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn test_late_stage_gets_a_bar() {
        let pb_manager = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let mut bars = HashMap::new();
        let first = WorkerStatus::new(0.5, 1, 0, BarColor::CYAN).with_stage("sin");
        update_bar(&mut bars, &pb_manager, &first);
        let last = WorkerStatus::new(1.0, 2, 0, BarColor::MAGENTA).with_stage("sout");
        update_bar(&mut bars, &pb_manager, &last);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[&("sin".to_string(), 0)].position(), 50);
        assert_eq!(bars[&("sout".to_string(), 0)].position(), 100);
    }
}
