use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use super::constants::{DEDICATED_PULSE_TYPE, PARASITIC_PULSE_TYPE};
use super::error::DetectorError;

/// The FC-U detector channels used for the transmission measurement.
///
/// Channels 5 and 6 are not part of the setup, so the channel numbers are not contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DetectorChannel {
    Det1,
    Det2,
    Det3,
    Det4,
    Det7,
    Det8,
}

impl DetectorChannel {
    pub const ALL: [DetectorChannel; 6] = [
        Self::Det1,
        Self::Det2,
        Self::Det3,
        Self::Det4,
        Self::Det7,
        Self::Det8,
    ];

    /// The detector number as written in the detn column
    pub fn number(&self) -> i32 {
        match self {
            Self::Det1 => 1,
            Self::Det2 => 2,
            Self::Det3 => 3,
            Self::Det4 => 4,
            Self::Det7 => 7,
            Self::Det8 => 8,
        }
    }

    /// Dense index in [0, 6), used for channel masks
    pub fn index(&self) -> usize {
        match self {
            Self::Det1 => 0,
            Self::Det2 => 1,
            Self::Det3 => 2,
            Self::Det4 => 3,
            Self::Det7 => 4,
            Self::Det8 => 5,
        }
    }

    pub fn from_number(number: i32) -> Option<Self> {
        match number {
            1 => Some(Self::Det1),
            2 => Some(Self::Det2),
            3 => Some(Self::Det3),
            4 => Some(Self::Det4),
            7 => Some(Self::Det7),
            8 => Some(Self::Det8),
            _ => None,
        }
    }
}

impl TryFrom<i32> for DetectorChannel {
    type Error = DetectorError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::from_number(value).ok_or(DetectorError::InvalidChannel(value))
    }
}

impl FromStr for DetectorChannel {
    type Err = DetectorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("DET")
            .or_else(|| trimmed.strip_prefix("det"))
            .unwrap_or(trimmed);
        match digits.parse::<i32>() {
            Ok(n) => Self::try_from(n),
            Err(_) => Err(DetectorError::InvalidKeyword(s.to_string())),
        }
    }
}

impl Display for DetectorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DET{}", self.number())
    }
}

/// Beam bunch category, given by the PSpulse discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BunchType {
    Dedicated,
    Parasitic,
}

impl BunchType {
    pub const ALL: [BunchType; 2] = [Self::Dedicated, Self::Parasitic];

    /// Classify a pulse. Any discriminant other than 2 or 3 is not a bunch we use.
    pub fn from_pulse_type(pulse_type: i32) -> Option<Self> {
        match pulse_type {
            DEDICATED_PULSE_TYPE => Some(Self::Dedicated),
            PARASITIC_PULSE_TYPE => Some(Self::Parasitic),
            _ => None,
        }
    }

    /// The PSpulse discriminant of this bunch type
    pub fn pulse_type(&self) -> i32 {
        match self {
            Self::Dedicated => DEDICATED_PULSE_TYPE,
            Self::Parasitic => PARASITIC_PULSE_TYPE,
        }
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Dedicated => "dedi",
            Self::Parasitic => "para",
        }
    }
}

impl Display for BunchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dedicated => write!(f, "dedicated"),
            Self::Parasitic => write!(f, "parasitic"),
        }
    }
}

/// Whether the sample was in the beam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SampleConfig {
    In,
    Out,
}

impl SampleConfig {
    pub const ALL: [SampleConfig; 2] = [Self::In, Self::Out];

    /// The prefix used by the run configuration keys (Sin_DET1, Sout_DET1, ...)
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Self::In => "Sin",
            Self::Out => "Sout",
        }
    }

    /// The key holding the full run list of this configuration
    pub fn run_list_key(&self) -> &'static str {
        match self {
            Self::In => "SIN",
            Self::Out => "SOUT",
        }
    }
}

impl FromStr for SampleConfig {
    type Err = DetectorError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "in" | "sin" => Ok(Self::In),
            "out" | "sout" => Ok(Self::Out),
            _ => Err(DetectorError::InvalidSampleConfig(s.to_string())),
        }
    }
}

impl Display for SampleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key_prefix())
    }
}

/// Identity of one accumulation bucket: one histogram and one intensity sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub channel: DetectorChannel,
    pub bunch: BunchType,
    pub sample: SampleConfig,
}

impl BucketKey {
    pub fn new(channel: DetectorChannel, bunch: BunchType, sample: SampleConfig) -> Self {
        Self {
            channel,
            bunch,
            sample,
        }
    }

    /// All 24 (channel, bunch, sample) buckets
    pub fn all() -> impl Iterator<Item = BucketKey> {
        SampleConfig::ALL
            .into_iter()
            .flat_map(Self::all_for_sample)
    }

    /// The 12 buckets filled by runs of one sample configuration
    pub fn all_for_sample(sample: SampleConfig) -> impl Iterator<Item = BucketKey> {
        DetectorChannel::ALL.into_iter().flat_map(move |channel| {
            BunchType::ALL
                .into_iter()
                .map(move |bunch| BucketKey::new(channel, bunch, sample))
        })
    }
}

impl Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.sample, self.channel.number(), self.bunch)
    }
}
