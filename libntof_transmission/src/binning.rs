use super::constants::{FIRST_TOF_EDGE, NUMBER_OF_DECADES};
use super::error::BinningError;

/// Build the logarithmic time-of-flight edges.
///
/// The range always spans [`NUMBER_OF_DECADES`] decades starting at 1 ns, so there are
/// `8 * bins_per_decade` bins and one more edge than bins. Edge `i` is `10^(i * 8 / n)`.
pub fn log_edges(bins_per_decade: i64) -> Result<Vec<f64>, BinningError> {
    if bins_per_decade <= 0 {
        return Err(BinningError::NonPositiveBinsPerDecade(bins_per_decade));
    }
    let n_bins = bins_per_decade as usize * NUMBER_OF_DECADES as usize;
    let step = NUMBER_OF_DECADES as f64 / n_bins as f64;
    let edges = (0..=n_bins)
        .map(|i| FIRST_TOF_EDGE * 10.0_f64.powf(step * i as f64))
        .collect();
    Ok(edges)
}

/// Build `n_bins` equal width bins over `[lower, upper)`
pub fn linear_edges(n_bins: usize, lower: f64, upper: f64) -> Result<Vec<f64>, BinningError> {
    if n_bins == 0 || !(lower < upper) {
        return Err(BinningError::InvalidLinearRange(n_bins, lower, upper));
    }
    let width = (upper - lower) / n_bins as f64;
    let mut edges: Vec<f64> = (0..n_bins).map(|i| lower + width * i as f64).collect();
    // Pin the last edge exactly to avoid accumulated rounding
    edges.push(upper);
    Ok(edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_edges_shape() {
        for bpd in [1, 10, 200, 1000] {
            let edges = log_edges(bpd).unwrap();
            assert_eq!(edges.len() - 1, 8 * bpd as usize);
            assert_eq!(edges[0], 1.0);
            let last = edges[edges.len() - 1];
            assert!((last - 1.0e8).abs() / 1.0e8 < 1.0e-12);
            assert!(edges.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_log_edges_decades() {
        let edges = log_edges(10).unwrap();
        // every tenth edge is a power of ten
        assert!((edges[10] - 10.0).abs() < 1.0e-9);
        assert!((edges[30] - 1000.0).abs() < 1.0e-9);
    }

    #[test]
    fn test_log_edges_rejects_non_positive() {
        assert!(matches!(
            log_edges(0),
            Err(BinningError::NonPositiveBinsPerDecade(0))
        ));
        assert!(log_edges(-5).is_err());
    }

    #[test]
    fn test_linear_edges() {
        let edges = linear_edges(150, 0.0, 45.0e3).unwrap();
        assert_eq!(edges.len(), 151);
        assert_eq!(edges[150], 45.0e3);
        assert!((edges[1] - 300.0).abs() < 1.0e-9);
        assert!(linear_edges(0, 0.0, 1.0).is_err());
        assert!(linear_edges(10, 1.0, 1.0).is_err());
    }
}
