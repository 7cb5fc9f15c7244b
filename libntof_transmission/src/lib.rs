//! # ntof_transmission
//!
//! ntof_transmission computes the neutron transmission of a sample measured at the n_TOF
//! facility with the FC-U fission chamber, written in Rust. It takes per-run data files
//! holding the beam pickup (PKUP) and detector (FC-U) tables, histograms the time of flight
//! of every accepted detector hit, and combines sample-in and sample-out measurements into a
//! single transmission curve. The curve can be moved onto neutron energy and turned into a
//! total cross section.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installing the tool chain.
//!
//! ### HDF5
//!
//! Before building, HDF5 must be installed. Typically this will be installed using a
//! package manager (homebrew, apt, etc), and the Rust libraries will auto detect the
//! location of the HDF install. If HDF5 lives in a custom location, write the following
//! snippet into `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./ntof_transmission_cli` from the
//! top level repository.
//!
//! ## Configuration
//!
//! Two files configure an analysis. The application configuration is YAML:
//!
//! ```yml
//! run_config_path: /path/to/runs.cmnd
//! output_path: /path/to/output/
//! bins_per_decade: 200
//! flight_path: 182.1
//! min_tof_display: 1000.0
//! n_threads: 1
//! amplitude_bins: 150
//! ```
//!
//! `n_threads` is the number of workers the runs of each sample configuration are divided
//! amongst. Must be at least 1.
//!
//! The run configuration is a `key = value` file, see [`run_config`] for the keys. It lists
//! the sample-in and sample-out runs, which of those runs each detector may use, and the
//! amplitude threshold and time calibration of each detector.
//!
//! ## Analysis
//!
//! For every run the PKUP and FC-U tables are joined on the bunch number. Hits with an
//! amplitude above the detector threshold and at least 1 us after the gamma flash are
//! histogrammed in `tof - tflash + cal` on a logarithmic binning spanning 1 ns to 100 ms.
//! Each of the six detectors and two bunch types (dedicated, parasitic) gets its own
//! histogram per sample configuration, normalized by the proton intensity delivered to it.
//! The transmission is the average over the twelve sample-in / sample-out ratios.
//!
//! ## Output
//!
//! Each analysis writes an HDF5 file and a YAML summary with the same stem into the output
//! directory, plus a log file `ntof_transmission.log` in the working directory.
//!
//! ```text
//! transmission_total_{bins_per_decade}bin.h5
//! transmission - version, bins_per_decade, min_display, max_display, created, n_pairs, undefined_bins
//! |---- edges, content, error (dset)
//! ratios
//! |---- content, error, channel, pulse_type (dset)
//! buckets
//! |---- content, error, channel, pulse_type, sample_in, intensity (dset)
//!
//! cross_section__L{flight_path}__{bins_per_decade}bin.h5
//! transmission - version, flight_path, t0, min_display, max_display, created
//! |---- edges, content, error (dset)
//! cross_section - version, areal_density, min_display, max_display, created
//! |---- edges, content, error (dset)
//!
//! efficiency_det{n}_{sin|sout}.h5
//! efficiency - version, channel, sample, mean, std_dev, n_outliers, created
//! |---- run_number, efficiency, efficiency_error, stability, stability_error, intensity (dset)
//! ```
pub mod aggregator;
pub mod binning;
pub mod combiner;
pub mod config;
pub mod constants;
pub mod detector;
pub mod efficiency;
pub mod energy;
pub mod error;
pub mod event_source;
pub mod hdf_writer;
pub mod histogram;
pub mod process;
pub mod run_config;
pub mod run_selector;
pub mod worker_status;
