use super::detector::SampleConfig;

/// Progress bar colors: sample-in, sample-out and the efficiency study
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    GREEN,
}

impl BarColor {
    /// Sample-in runs are shown in cyan, sample-out in magenta
    pub fn for_sample(sample: SampleConfig) -> Self {
        match sample {
            SampleConfig::In => Self::CYAN,
            SampleConfig::Out => Self::MAGENTA,
        }
    }
}

/// A progress report sent from a worker to the front end
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    /// Fraction of the worker's runs done, in [0, 1]
    pub progress: f32,
    pub run_number: i32,
    pub worker_id: usize,
    pub color: BarColor,
    pub stage: String,
}

impl WorkerStatus {
    pub fn new(progress: f32, run_number: i32, worker_id: usize, color: BarColor) -> Self {
        Self {
            progress,
            run_number,
            worker_id,
            color,
            stage: String::new(),
        }
    }

    pub fn with_stage(mut self, stage: &str) -> Self {
        self.stage = stage.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_colors() {
        assert_eq!(BarColor::for_sample(SampleConfig::In), BarColor::CYAN);
        assert_eq!(BarColor::for_sample(SampleConfig::Out), BarColor::MAGENTA);
        let status = WorkerStatus::new(0.5, 3, 1, BarColor::GREEN).with_stage("efficiency");
        assert_eq!(status.stage, "efficiency");
        assert_eq!(status.color, BarColor::GREEN);
    }
}
