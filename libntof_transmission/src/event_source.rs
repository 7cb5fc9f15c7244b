use fxhash::FxHashMap;
use hdf5::{File, Group, H5Type};
use std::path::{Path, PathBuf};

use super::error::EventSourceError;

// Table (tree) names in a run file
const PKUP_NAME: &str = "PKUP";
const TRIGGER_NAME: &str = "FC-U";

// Column (branch) names
const FLASH_TIME_NAME: &str = "tflash";
const BUNCH_NUMBER_NAME: &str = "BunchNumber";
const PULSE_INTENSITY_NAME: &str = "PulseIntensity";
const PULSE_TYPE_NAME: &str = "PSpulse";
const DETECTOR_NAME: &str = "detn";
const TOF_NAME: &str = "tof";
const AMPLITUDE_NAME: &str = "amp";

/// One entry of the beam pickup (PKUP) table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamPulse {
    pub bunch_number: i32,
    /// Reference (gamma flash) time in ns
    pub flash_time: f64,
    pub pulse_type: i32,
    /// Delivered protons
    pub intensity: f32,
}

/// One detector hit from the FC-U table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerEvent {
    pub detector: i32,
    /// Time of flight in ns, before flash subtraction
    pub tof: f64,
    pub amplitude: f32,
    pub bunch_number: i32,
    pub pulse_type: i32,
    pub intensity: f32,
}

/// Both tables of a single run, fully loaded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunData {
    pub pulses: Vec<BeamPulse>,
    pub triggers: Vec<TriggerEvent>,
}

/// Something that can provide the event data of a run by run number.
///
/// Failing to load a run is not fatal for the analysis; callers skip the run.
pub trait EventSource: Sync {
    fn load_run(&self, run_number: i32) -> Result<RunData, EventSourceError>;

    /// A human readable description of where the run comes from, for logging
    fn describe(&self, run_number: i32) -> String;

    /// Size of the run on disk, if known
    fn run_size_bytes(&self, _run_number: i32) -> Option<u64> {
        None
    }
}

/// Reads runs from HDF5 files at `prefix + run + suffix`.
///
/// Each file contains a `PKUP` group and an `FC-U` group, each holding one 1D dataset per
/// column. The file is only open for the duration of [`EventSource::load_run`].
#[derive(Debug, Clone)]
pub struct Hdf5EventSource {
    prefix: String,
    suffix: String,
}

impl Hdf5EventSource {
    pub fn new(prefix: &str, suffix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// The data path of a run: prefix + run number + suffix
    pub fn run_path(&self, run_number: i32) -> PathBuf {
        PathBuf::from(format!("{}{}{}", self.prefix, run_number, self.suffix))
    }

    fn read_pulses(group: &Group) -> Result<Vec<BeamPulse>, EventSourceError> {
        let flash_time = read_column::<f64>(group, FLASH_TIME_NAME)?;
        let n_rows = flash_time.len();
        let bunch_number = read_checked::<i32>(group, BUNCH_NUMBER_NAME, n_rows)?;
        let intensity = read_checked::<f32>(group, PULSE_INTENSITY_NAME, n_rows)?;
        let pulse_type = read_checked::<i32>(group, PULSE_TYPE_NAME, n_rows)?;

        Ok((0..n_rows)
            .map(|row| BeamPulse {
                bunch_number: bunch_number[row],
                flash_time: flash_time[row],
                pulse_type: pulse_type[row],
                intensity: intensity[row],
            })
            .collect())
    }

    fn read_triggers(group: &Group) -> Result<Vec<TriggerEvent>, EventSourceError> {
        let detector = read_column::<i32>(group, DETECTOR_NAME)?;
        let n_rows = detector.len();
        let tof = read_checked::<f64>(group, TOF_NAME, n_rows)?;
        let amplitude = read_checked::<f32>(group, AMPLITUDE_NAME, n_rows)?;
        let bunch_number = read_checked::<i32>(group, BUNCH_NUMBER_NAME, n_rows)?;
        let pulse_type = read_checked::<i32>(group, PULSE_TYPE_NAME, n_rows)?;
        let intensity = read_checked::<f32>(group, PULSE_INTENSITY_NAME, n_rows)?;

        Ok((0..n_rows)
            .map(|row| TriggerEvent {
                detector: detector[row],
                tof: tof[row],
                amplitude: amplitude[row],
                bunch_number: bunch_number[row],
                pulse_type: pulse_type[row],
                intensity: intensity[row],
            })
            .collect())
    }
}

impl EventSource for Hdf5EventSource {
    fn load_run(&self, run_number: i32) -> Result<RunData, EventSourceError> {
        let path = self.run_path(run_number);
        if !path.exists() {
            return Err(EventSourceError::BadFilePath(run_number, path));
        }
        // The handle drops at the end of this scope, on error paths included
        let file = File::open(&path)?;
        let pulses = Self::read_pulses(&file.group(PKUP_NAME)?)?;
        let triggers = Self::read_triggers(&file.group(TRIGGER_NAME)?)?;
        Ok(RunData { pulses, triggers })
    }

    fn describe(&self, run_number: i32) -> String {
        self.run_path(run_number).to_string_lossy().to_string()
    }

    fn run_size_bytes(&self, run_number: i32) -> Option<u64> {
        file_size(&self.run_path(run_number))
    }
}

fn file_size(path: &Path) -> Option<u64> {
    path.metadata().ok().map(|meta| meta.len())
}

fn read_column<T: H5Type>(group: &Group, name: &str) -> Result<Vec<T>, EventSourceError> {
    Ok(group.dataset(name)?.read_raw::<T>()?)
}

fn read_checked<T: H5Type>(
    group: &Group,
    name: &str,
    expected: usize,
) -> Result<Vec<T>, EventSourceError> {
    let column = read_column::<T>(group, name)?;
    if column.len() != expected {
        return Err(EventSourceError::ColumnLengthMismatch {
            table: group.name(),
            column: name.to_string(),
            found: column.len(),
            expected,
        });
    }
    Ok(column)
}

/// Runs held in memory, keyed by run number
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSource {
    runs: FxHashMap<i32, RunData>,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_run(&mut self, run_number: i32, data: RunData) {
        self.runs.insert(run_number, data);
    }
}

impl EventSource for MemoryEventSource {
    fn load_run(&self, run_number: i32) -> Result<RunData, EventSourceError> {
        self.runs
            .get(&run_number)
            .cloned()
            .ok_or(EventSourceError::MissingRun(run_number))
    }

    fn describe(&self, run_number: i32) -> String {
        format!("memory run {run_number}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_run(path: &Path, n_triggers: usize, bad_column: bool) {
        let file = File::create(path).unwrap();
        let pkup = file.create_group(PKUP_NAME).unwrap();
        pkup.new_dataset_builder()
            .with_data(&[10.0_f64, 20.0])
            .create(FLASH_TIME_NAME)
            .unwrap();
        pkup.new_dataset_builder()
            .with_data(&[1_i32, 2])
            .create(BUNCH_NUMBER_NAME)
            .unwrap();
        pkup.new_dataset_builder()
            .with_data(&[5.0e12_f32, 6.0e12])
            .create(PULSE_INTENSITY_NAME)
            .unwrap();
        pkup.new_dataset_builder()
            .with_data(&[2_i32, 3])
            .create(PULSE_TYPE_NAME)
            .unwrap();

        let fcu = file.create_group(TRIGGER_NAME).unwrap();
        let detn: Vec<i32> = vec![1; n_triggers];
        let tof: Vec<f64> = (0..n_triggers).map(|i| 2000.0 + i as f64).collect();
        let amp: Vec<f32> = vec![100.0; n_triggers];
        let bunch: Vec<i32> = vec![1; if bad_column { n_triggers + 1 } else { n_triggers }];
        let pulse_type: Vec<i32> = vec![2; n_triggers];
        let intensity: Vec<f32> = vec![5.0e12; n_triggers];
        fcu.new_dataset_builder()
            .with_data(detn.as_slice())
            .create(DETECTOR_NAME)
            .unwrap();
        fcu.new_dataset_builder()
            .with_data(tof.as_slice())
            .create(TOF_NAME)
            .unwrap();
        fcu.new_dataset_builder()
            .with_data(amp.as_slice())
            .create(AMPLITUDE_NAME)
            .unwrap();
        fcu.new_dataset_builder()
            .with_data(bunch.as_slice())
            .create(BUNCH_NUMBER_NAME)
            .unwrap();
        fcu.new_dataset_builder()
            .with_data(pulse_type.as_slice())
            .create(PULSE_TYPE_NAME)
            .unwrap();
        fcu.new_dataset_builder()
            .with_data(intensity.as_slice())
            .create(PULSE_INTENSITY_NAME)
            .unwrap();
    }

    #[test]
    fn test_hdf5_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("{}/run", dir.path().to_string_lossy());
        write_run(&dir.path().join("run42.h5"), 3, false);

        let source = Hdf5EventSource::new(&prefix, ".h5");
        assert_eq!(source.run_path(42), dir.path().join("run42.h5"));
        let data = source.load_run(42).unwrap();
        assert_eq!(data.pulses.len(), 2);
        assert_eq!(data.pulses[1].bunch_number, 2);
        assert_eq!(data.pulses[1].pulse_type, 3);
        assert_eq!(data.pulses[0].flash_time, 10.0);
        assert_eq!(data.triggers.len(), 3);
        assert_eq!(data.triggers[2].tof, 2002.0);
        assert!(source.run_size_bytes(42).is_some());
    }

    #[test]
    fn test_hdf5_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = format!("{}/run", dir.path().to_string_lossy());
        let source = Hdf5EventSource::new(&prefix, ".h5");
        assert!(matches!(
            source.load_run(7),
            Err(EventSourceError::BadFilePath(7, _))
        ));

        write_run(&dir.path().join("run8.h5"), 3, true);
        assert!(matches!(
            source.load_run(8),
            Err(EventSourceError::ColumnLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_memory_source() {
        let mut source = MemoryEventSource::new();
        source.insert_run(1, RunData::default());
        assert!(source.load_run(1).is_ok());
        assert!(matches!(
            source.load_run(2),
            Err(EventSourceError::MissingRun(2))
        ));
    }
}
