use super::error::HistogramError;

/// A 1D histogram with variable bin edges and per-bin variance tracking.
///
/// Bin `i` covers `[edges[i], edges[i + 1])`. Values outside of the edges are kept in the
/// underflow and overflow sums and never enter the bin contents. Every bin tracks the sum of
/// weights and the sum of squared weights, so that errors survive scaling, division and
/// addition.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    edges: Vec<f64>,
    content: Vec<f64>,
    sumw2: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
}

impl Histogram {
    /// Create an empty histogram over the given edges
    pub fn new(edges: Vec<f64>) -> Result<Self, HistogramError> {
        if edges.len() < 2 || !edges.windows(2).all(|w| w[0] < w[1]) {
            return Err(HistogramError::BadEdges);
        }
        let n_bins = edges.len() - 1;
        Ok(Self {
            edges,
            content: vec![0.0; n_bins],
            sumw2: vec![0.0; n_bins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        })
    }

    /// Create a histogram with the given contents and errors
    pub fn from_parts(
        edges: Vec<f64>,
        content: Vec<f64>,
        errors: &[f64],
    ) -> Result<Self, HistogramError> {
        let mut hist = Self::new(edges)?;
        if content.len() != hist.n_bins() || errors.len() != hist.n_bins() {
            return Err(HistogramError::IncompatibleBinning(
                hist.n_bins(),
                content.len().max(errors.len()),
            ));
        }
        hist.sumw2 = errors.iter().map(|e| e * e).collect();
        hist.content = content;
        Ok(hist)
    }

    /// An empty histogram with the same binning as this one
    pub fn empty_like(&self) -> Self {
        Self {
            edges: self.edges.clone(),
            content: vec![0.0; self.n_bins()],
            sumw2: vec![0.0; self.n_bins()],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
        }
    }

    pub fn n_bins(&self) -> usize {
        self.content.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn content(&self) -> &[f64] {
        &self.content
    }

    pub fn sumw2(&self) -> &[f64] {
        &self.sumw2
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|w2| w2.sqrt()).collect()
    }

    pub fn bin_error(&self, bin: usize) -> f64 {
        self.sumw2[bin].sqrt()
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    pub fn bin_width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    /// Find the bin containing `value`, lower edge inclusive
    pub fn find_bin(&self, value: f64) -> Option<usize> {
        if !(value >= self.edges[0]) || value >= self.edges[self.edges.len() - 1] {
            return None;
        }
        // partition_point gives the first edge strictly greater than value
        let upper = self.edges.partition_point(|edge| *edge <= value);
        Some(upper - 1)
    }

    /// Add a unit weight at `value`
    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        self.entries += 1;
        match self.find_bin(value) {
            Some(bin) => {
                self.content[bin] += weight;
                self.sumw2[bin] += weight * weight;
            }
            None => {
                if value >= self.edges[self.edges.len() - 1] {
                    self.overflow += weight;
                } else {
                    self.underflow += weight;
                }
            }
        }
    }

    /// Sum of bin contents (flows excluded)
    pub fn integral(&self) -> f64 {
        self.content.iter().sum()
    }

    /// Sum of bin contents in the inclusive bin range `[first, last]`
    pub fn integral_range(&self, first: usize, last: usize) -> f64 {
        if first > last || first >= self.n_bins() {
            return 0.0;
        }
        let last = last.min(self.n_bins() - 1);
        self.content[first..=last].iter().sum()
    }

    /// The bin with the largest content. Ties resolve to the lowest bin.
    pub fn maximum_bin(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (bin, value) in self.content.iter().enumerate() {
            match best {
                Some(b) if self.content[b] >= *value => (),
                _ => best = Some(bin),
            }
        }
        best
    }

    /// Multiply contents by `factor` and variances by `factor^2`
    pub fn scale(&mut self, factor: f64) {
        let factor2 = factor * factor;
        self.content.iter_mut().for_each(|c| *c *= factor);
        self.sumw2.iter_mut().for_each(|w2| *w2 *= factor2);
        self.underflow *= factor;
        self.overflow *= factor;
    }

    /// Zero every bin, keeping the binning
    pub fn reset(&mut self) {
        self.content.iter_mut().for_each(|c| *c = 0.0);
        self.sumw2.iter_mut().for_each(|w2| *w2 = 0.0);
        self.underflow = 0.0;
        self.overflow = 0.0;
        self.entries = 0;
    }

    /// Add another histogram bin-by-bin; variances add
    pub fn add(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.check_compatible(other)?;
        for bin in 0..self.n_bins() {
            self.content[bin] += other.content[bin];
            self.sumw2[bin] += other.sumw2[bin];
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.entries += other.entries;
        Ok(())
    }

    /// Bin-by-bin ratio `self / denominator` with uncorrelated error propagation.
    ///
    /// Bins where the denominator is zero hold zero content and zero error.
    pub fn divide(&self, denominator: &Histogram) -> Result<Histogram, HistogramError> {
        self.check_compatible(denominator)?;
        let mut ratio = self.empty_like();
        for bin in 0..self.n_bins() {
            let a = self.content[bin];
            let b = denominator.content[bin];
            if b == 0.0 {
                continue;
            }
            let b2 = b * b;
            ratio.content[bin] = a / b;
            ratio.sumw2[bin] = (self.sumw2[bin] * b2 + denominator.sumw2[bin] * a * a) / (b2 * b2);
        }
        ratio.entries = self.entries;
        Ok(ratio)
    }

    /// Count of bins that are zero in the denominator and non-zero in the numerator
    pub fn count_undefined_ratios(&self, denominator: &Histogram) -> usize {
        self.content
            .iter()
            .zip(denominator.content.iter())
            .filter(|(a, b)| **b == 0.0 && **a != 0.0)
            .count()
    }

    /// The inclusive range of bins lying entirely inside `[min, max]`
    pub fn display_window(&self, min: f64, max: f64) -> Option<(usize, usize)> {
        let first = self.edges.partition_point(|edge| *edge < min);
        let end_edge = self.edges.partition_point(|edge| *edge <= max);
        if end_edge == 0 || first + 1 >= end_edge {
            return None;
        }
        Some((first, end_edge - 2))
    }

    fn check_compatible(&self, other: &Histogram) -> Result<(), HistogramError> {
        if self.n_bins() != other.n_bins() || self.edges != other.edges {
            return Err(HistogramError::IncompatibleBinning(
                self.n_bins(),
                other.n_bins(),
            ));
        }
        Ok(())
    }
}
