use super::constants::{AREAL_DENSITY, NON_POSITIVE_TRANSMISSION_ERROR, TOF_ENERGY_CONSTANT};
use super::error::EnergyError;
use super::histogram::Histogram;

/// Neutron kinetic energy in eV for a time of flight in ns over `flight_path` meters.
///
/// Non-relativistic: `E = (K * L / (t - t0))^2`.
pub fn tof_to_energy(tof: f64, flight_path: f64, t0: f64) -> Result<f64, EnergyError> {
    let time = tof - t0;
    if !(time > 0.0) {
        return Err(EnergyError::NonPositiveTime(tof, t0));
    }
    let velocity_term = TOF_ENERGY_CONSTANT * flight_path / time;
    Ok(velocity_term * velocity_term)
}

/// Inverse of [`tof_to_energy`]
pub fn energy_to_tof(energy: f64, flight_path: f64, t0: f64) -> Result<f64, EnergyError> {
    if !(energy > 0.0) {
        return Err(EnergyError::NonPositiveEnergy(energy));
    }
    Ok(t0 + TOF_ENERGY_CONSTANT * flight_path / energy.sqrt())
}

/// Remaps a ToF histogram onto neutron energy.
///
/// Every ToF edge is converted; since energy falls with time the bin order is reversed so the
/// energy edges increase. Each energy bin carries the integrated content and error of its
/// ToF bin, so the integral and relative errors are unchanged. Per unit of the axis, the
/// density is divided by the bin Jacobian `|dE/dt|`.
#[derive(Debug, Clone, Copy)]
pub struct EnergyTransform {
    flight_path: f64,
    t0: f64,
}

impl EnergyTransform {
    pub fn new(flight_path: f64, t0: f64) -> Result<Self, EnergyError> {
        if !(flight_path > 0.0) {
            return Err(EnergyError::NonPositiveFlightPath(flight_path));
        }
        Ok(Self { flight_path, t0 })
    }

    pub fn flight_path(&self) -> f64 {
        self.flight_path
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn apply(&self, tof_hist: &Histogram) -> Result<Histogram, EnergyError> {
        let energy_edges = tof_hist
            .edges()
            .iter()
            .rev()
            .map(|t| tof_to_energy(*t, self.flight_path, self.t0))
            .collect::<Result<Vec<f64>, EnergyError>>()?;
        let content: Vec<f64> = tof_hist.content().iter().rev().copied().collect();
        let errors: Vec<f64> = tof_hist.errors().into_iter().rev().collect();
        Ok(Histogram::from_parts(energy_edges, content, &errors)?)
    }

    /// Map energy edges back onto ToF, in increasing time order
    pub fn invert_edges(&self, energy_hist: &Histogram) -> Result<Vec<f64>, EnergyError> {
        energy_hist
            .edges()
            .iter()
            .rev()
            .map(|e| energy_to_tof(*e, self.flight_path, self.t0))
            .collect()
    }

    /// `|dE/dt|` for each bin of the energy histogram produced from `tof_hist`, ordered as
    /// the energy bins are
    pub fn jacobians(&self, tof_hist: &Histogram) -> Result<Vec<f64>, EnergyError> {
        let n_bins = tof_hist.n_bins();
        let mut jacobians = Vec::with_capacity(n_bins);
        for bin in (0..n_bins).rev() {
            let low = tof_to_energy(tof_hist.edges()[bin], self.flight_path, self.t0)?;
            let high = tof_to_energy(tof_hist.edges()[bin + 1], self.flight_path, self.t0)?;
            jacobians.push((low - high).abs() / tof_hist.bin_width(bin));
        }
        Ok(jacobians)
    }
}

/// Content per unit of the axis for each bin
pub fn densities(hist: &Histogram) -> Vec<f64> {
    (0..hist.n_bins())
        .map(|bin| hist.content()[bin] / hist.bin_width(bin))
        .collect()
}

/// Cross section of one bin from its transmission, `sigma = -ln(T) / rho`.
///
/// A non-positive transmission has no logarithm; it yields `0 +- 0.1`.
pub fn cross_section_point(transmission: f64, transmission_error: f64) -> (f64, f64) {
    if transmission > 0.0 {
        let sigma = -transmission.ln() / AREAL_DENSITY;
        let sigma_error = (sigma * (transmission_error / transmission)).abs();
        (sigma, sigma_error)
    } else {
        (0.0, NON_POSITIVE_TRANSMISSION_ERROR)
    }
}

/// Cross section (barn) over the bins of an energy-domain transmission histogram
pub fn cross_section(transmission: &Histogram) -> Result<Histogram, EnergyError> {
    let (content, errors): (Vec<f64>, Vec<f64>) = transmission
        .content()
        .iter()
        .zip(transmission.errors())
        .map(|(tra, tra_err)| cross_section_point(*tra, tra_err))
        .unzip();
    Ok(Histogram::from_parts(
        transmission.edges().to_vec(),
        content,
        &errors,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::log_edges;

    fn tof_histogram() -> Histogram {
        let edges = log_edges(20).unwrap();
        let n_bins = edges.len() - 1;
        let content: Vec<f64> = (0..n_bins).map(|i| 0.5 + (i % 7) as f64 * 0.05).collect();
        let errors: Vec<f64> = content.iter().map(|c| c * 0.1).collect();
        Histogram::from_parts(edges, content, &errors).unwrap()
    }

    #[test]
    fn test_known_energy() {
        // 1 eV neutrons take K * L ns
        let tof = TOF_ENERGY_CONSTANT * 182.1;
        let energy = tof_to_energy(tof, 182.1, 0.0).unwrap();
        assert!((energy - 1.0).abs() < 1.0e-12);
        assert!(tof_to_energy(0.0, 182.1, 0.0).is_err());
        assert!(tof_to_energy(5.0, 182.1, 10.0).is_err());
    }

    #[test]
    fn test_round_trip_edges() {
        let transform = EnergyTransform::new(182.1, 0.0).unwrap();
        let tof = tof_histogram();
        let energy = transform.apply(&tof).unwrap();
        assert!(energy.edges().windows(2).all(|w| w[0] < w[1]));
        let back = transform.invert_edges(&energy).unwrap();
        for (orig, rec) in tof.edges().iter().zip(back.iter()) {
            assert!((orig - rec).abs() / orig < 1.0e-10);
        }
    }

    #[test]
    fn test_integral_conserved() {
        let transform = EnergyTransform::new(182.1, 0.0).unwrap();
        let tof = tof_histogram();
        let energy = transform.apply(&tof).unwrap();
        assert!((tof.integral() - energy.integral()).abs() < 1.0e-9);

        // Density integrated over each axis agrees, and densities relate by the Jacobian
        let tof_density = densities(&tof);
        let energy_density = densities(&energy);
        let tof_total: f64 = (0..tof.n_bins()).map(|b| tof_density[b] * tof.bin_width(b)).sum();
        let energy_total: f64 = (0..energy.n_bins())
            .map(|b| energy_density[b] * energy.bin_width(b))
            .sum();
        assert!((tof_total - energy_total).abs() < 1.0e-9);

        let jacobians = transform.jacobians(&tof).unwrap();
        let n = tof.n_bins();
        for j in [0, n / 2, n - 1] {
            let i = n - 1 - j;
            let expected = tof_density[i] / jacobians[j];
            assert!((energy_density[j] - expected).abs() / expected < 1.0e-9);
            // relative error is unchanged
            let rel_tof = tof.bin_error(i) / tof.content()[i];
            let rel_energy = energy.bin_error(j) / energy.content()[j];
            assert!((rel_tof - rel_energy).abs() < 1.0e-12);
        }
    }

    #[test]
    fn test_bad_flight_path() {
        assert!(EnergyTransform::new(0.0, 0.0).is_err());
        assert!(EnergyTransform::new(-1.0, 0.0).is_err());
    }

    #[test]
    fn test_cross_section_points() {
        let (sigma, _) = cross_section_point(1.0, 0.1);
        assert_eq!(sigma, 0.0);
        assert_eq!(cross_section_point(0.0, 0.3), (0.0, 0.1));
        assert_eq!(cross_section_point(-0.2, 0.3), (0.0, 0.1));

        let (sigma, error) = cross_section_point(0.5, 0.05);
        let expected = -(0.5_f64.ln()) / AREAL_DENSITY;
        assert!((sigma - expected).abs() < 1.0e-12);
        assert!((error - expected * 0.1).abs() < 1.0e-12);
    }

    #[test]
    fn test_cross_section_histogram() {
        let tra = Histogram::from_parts(
            vec![1.0, 2.0, 3.0, 4.0],
            vec![1.0, 0.0, 0.25],
            &[0.1, 0.1, 0.025],
        )
        .unwrap();
        let sigma = cross_section(&tra).unwrap();
        assert_eq!(sigma.content()[0], 0.0);
        assert_eq!(sigma.content()[1], 0.0);
        assert!((sigma.bin_error(1) - 0.1).abs() < 1.0e-15);
        let expected = -(0.25_f64.ln()) / AREAL_DENSITY;
        assert!((sigma.content()[2] - expected).abs() < 1.0e-12);
    }
}
