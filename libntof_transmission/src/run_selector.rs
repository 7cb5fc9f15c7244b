use bit_set::BitSet;
use fxhash::{FxHashMap, FxHashSet};

use super::detector::{DetectorChannel, SampleConfig};
use super::run_config::RunConfig;

/// The set of detector channels that may use a given run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMask {
    bits: BitSet,
}

impl ChannelMask {
    pub fn insert(&mut self, channel: DetectorChannel) {
        self.bits.insert(channel.index());
    }

    pub fn contains(&self, channel: DetectorChannel) -> bool {
        self.bits.contains(channel.index())
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// The channels in the mask, in channel order
    pub fn channels(&self) -> impl Iterator<Item = DetectorChannel> + '_ {
        DetectorChannel::ALL
            .into_iter()
            .filter(|channel| self.contains(*channel))
    }
}

/// Decides which detectors may use which runs.
///
/// A run can belong to any number of detectors' membership lists. The run file is read once
/// and the mask returned by [`RunSelector::scope`] filters its events per detector.
#[derive(Debug, Clone, Default)]
pub struct RunSelector {
    membership: FxHashMap<(DetectorChannel, SampleConfig), FxHashSet<i32>>,
}

impl RunSelector {
    pub fn new(run_config: &RunConfig) -> Self {
        let mut selector = Self::default();
        for detector in run_config.detectors.iter() {
            for sample in SampleConfig::ALL {
                selector.membership.insert(
                    (detector.channel, sample),
                    detector.runs(sample).iter().copied().collect(),
                );
            }
        }
        selector
    }

    /// Is `run` in the membership list of `channel` for `sample`
    pub fn is_in_scope(&self, run: i32, channel: DetectorChannel, sample: SampleConfig) -> bool {
        self.membership
            .get(&(channel, sample))
            .is_some_and(|runs| runs.contains(&run))
    }

    /// All channels for which `run` is in scope
    pub fn scope(&self, run: i32, sample: SampleConfig) -> ChannelMask {
        let mut mask = ChannelMask::default();
        for channel in DetectorChannel::ALL {
            if self.is_in_scope(run, channel, sample) {
                mask.insert(channel);
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_config::DetectorSettings;

    fn config() -> RunConfig {
        let detectors = DetectorChannel::ALL
            .into_iter()
            .map(|channel| DetectorSettings {
                channel,
                cut_a: 1.0,
                cal: 1.0,
                sin_runs: match channel {
                    DetectorChannel::Det1 | DetectorChannel::Det2 => vec![100, 101],
                    DetectorChannel::Det8 => vec![101],
                    _ => vec![],
                },
                sout_runs: vec![200],
            })
            .collect();
        RunConfig {
            prefix: String::new(),
            suffix: String::new(),
            sin_runs: vec![100, 101],
            sout_runs: vec![200],
            detectors,
        }
    }

    #[test]
    fn test_shared_runs() {
        let selector = RunSelector::new(&config());
        let mask = selector.scope(101, SampleConfig::In);
        let channels: Vec<_> = mask.channels().collect();
        assert_eq!(
            channels,
            vec![
                DetectorChannel::Det1,
                DetectorChannel::Det2,
                DetectorChannel::Det8
            ]
        );
        assert!(!selector.scope(100, SampleConfig::In).contains(DetectorChannel::Det8));
    }

    #[test]
    fn test_samples_are_independent() {
        let selector = RunSelector::new(&config());
        assert!(selector.is_in_scope(200, DetectorChannel::Det4, SampleConfig::Out));
        assert!(!selector.is_in_scope(200, DetectorChannel::Det4, SampleConfig::In));
        assert!(!selector.is_in_scope(100, DetectorChannel::Det1, SampleConfig::Out));
        assert!(selector.scope(999, SampleConfig::In).is_empty());
    }
}
