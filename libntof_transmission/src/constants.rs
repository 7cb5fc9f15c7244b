// Binning
pub const NUMBER_OF_DECADES: u32 = 8;
pub const FIRST_TOF_EDGE: f64 = 1.0;

// Selection cuts
/// Minimum accepted (tof - tflash), in ns
pub const MIN_TOF_CUT: f64 = 1000.0;
pub const DEFAULT_AMPLITUDE_CUT: f64 = 1.0;
pub const DEFAULT_CALIBRATION: f64 = 1.0;

// PSpulse discriminants
pub const DEDICATED_PULSE_TYPE: i32 = 2;
pub const PARASITIC_PULSE_TYPE: i32 = 3;

// Normalization
/// Accumulated intensities at or below this are treated as empty
pub const MIN_INTENSITY: f64 = f64::EPSILON;

// Display ranges
pub const DEFAULT_MIN_TOF_DISPLAY: f64 = 1.0e3;
pub const MAX_TOF_DISPLAY: f64 = 1.0e8;
pub const MAX_ENERGY_DISPLAY: f64 = 1.0e7;

// Energy conversion
/// sqrt(m_n c^2 / 2) / c in units of ns * sqrt(eV) / m
pub const TOF_ENERGY_CONSTANT: f64 = 72297.7;
pub const DEFAULT_FLIGHT_PATH: f64 = 182.1;
pub const DEFAULT_T0: f64 = 0.0;

// Cross section
/// natCu sample thickness in atoms/barn
pub const AREAL_DENSITY: f64 = 0.05174;
pub const NON_POSITIVE_TRANSMISSION_ERROR: f64 = 0.1;

// Amplitude spectra
pub const AMPLITUDE_RANGE_MAX: f64 = 45.0e3;
pub const DEFAULT_AMPLITUDE_BINS: usize = 150;
pub const EFFICIENCY_OUTLIER_SIGMAS: f64 = 2.0;
