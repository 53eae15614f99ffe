//! Two resonances on top of a linear background.
//!
//! The Gaussian components use `N * exp(-((x - mu) / (2 sigma))^2)`. The
//! integral below is the one for the textbook form `exp(-(x - mu)^2 / (2 sigma^2))`.
//! Both are left as they are; changing either shifts every efficiency.

use std::ops::{Add, AddAssign};

use crate::fitter::common::{Parameter, Value};

pub const N_PARAMETERS: usize = 8;

pub const NORM_1: usize = 0;
pub const MEAN_1: usize = 1;
pub const SIGMA_1: usize = 2;
pub const NORM_2: usize = 3;
pub const MEAN_2: usize = 4;
pub const SIGMA_2: usize = 5;
pub const INTERCEPT: usize = 6;
pub const SLOPE: usize = 7;

const SQRT_TWO_PI: f64 = 2.506_628_274_631_000_2;

pub fn gauss(x: f64, norm: f64, mean: f64, sigma: f64) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    let arg = ((x - mean) / (2.0 * sigma)).powi(2);
    norm * (-arg).exp()
}

pub fn pol1(x: f64, intercept: f64, slope: f64) -> f64 {
    intercept + x * slope
}

/// Area of one Gaussian component in units of histogram entries, together with
/// its variance.
///
/// The variance adds the two error contributions linearly before squaring. That
/// is a first-order approximation that ignores the norm/sigma correlation.
pub fn signal_integral(
    norm: f64,
    sigma: f64,
    norm_err: f64,
    sigma_err: f64,
    bin_width: f64,
) -> (f64, f64) {
    let area = norm * sigma * SQRT_TWO_PI / bin_width;
    let error = SQRT_TWO_PI * (norm * sigma_err + sigma * norm_err);
    (area, error.powi(2))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalYield {
    pub value: f64,
    pub variance: f64,
}

impl SignalYield {
    pub fn from_component(norm: Value, sigma: Value, bin_width: f64) -> Self {
        let (value, variance) = signal_integral(
            norm.value,
            sigma.value,
            norm.uncertainty,
            sigma.uncertainty,
            bin_width,
        );
        Self { value, variance }
    }

    pub fn uncertainty(&self) -> f64 {
        self.variance.sqrt()
    }
}

impl Add for SignalYield {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            value: self.value + rhs.value,
            variance: self.variance + rhs.variance,
        }
    }
}

impl AddAssign for SignalYield {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MassModel {
    pub parameters: Vec<Parameter>,
}

impl Default for MassModel {
    fn default() -> Self {
        Self {
            parameters: Self::default_parameters(),
        }
    }
}

impl MassModel {
    /// Starting values and limits for the two resonances (1.97 and 1.87) and the background.
    pub fn default_parameters() -> Vec<Parameter> {
        vec![
            Parameter::new("N_{1}", 2000.0, 0.0, 10000.0),
            Parameter::new("#mu_{1}", 1.97, 1.93, 2.0),
            Parameter::new("#sigma_{1}", 0.005, 0.0, 0.02),
            Parameter::new("N_{2}", 1000.0, 0.0, 10000.0),
            Parameter::new("#mu_{2}", 1.87, 1.83, 1.9),
            Parameter::new("#sigma_{2}", 0.005, 0.0, 0.02),
            Parameter::new("q", 500.0, 0.0, 2000.0),
            Parameter::new("m", -1000.0, -5000.0, 5000.0),
        ]
    }

    /// Starting point of every fit, pulled inside the limits.
    pub fn initial_values(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|p| p.clamp(p.initial_guess))
            .collect()
    }

    pub fn bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| (p.min, p.max)).collect()
    }

    pub fn shape(x: f64, params: &[f64]) -> f64 {
        gauss(x, params[NORM_1], params[MEAN_1], params[SIGMA_1])
            + gauss(x, params[NORM_2], params[MEAN_2], params[SIGMA_2])
            + pol1(x, params[INTERCEPT], params[SLOPE])
    }

    /// Mean of the shape over `[lo, hi]` by composite Simpson's rule.
    pub fn bin_average(lo: f64, hi: f64, params: &[f64]) -> f64 {
        const STEPS: usize = 8;
        let h = (hi - lo) / STEPS as f64;
        if h <= 0.0 {
            return Self::shape(lo, params);
        }

        let mut sum = Self::shape(lo, params) + Self::shape(hi, params);
        for i in 1..STEPS {
            let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * Self::shape(lo + i as f64 * h, params);
        }
        sum * h / 3.0 / (hi - lo)
    }

    /// Summed yield of both Gaussian components from fitted parameters.
    pub fn signal_yield(parameters: &[Parameter], bin_width: f64) -> SignalYield {
        SignalYield::from_component(
            parameters[NORM_1].as_value(),
            parameters[SIGMA_1].as_value(),
            bin_width,
        ) + SignalYield::from_component(
            parameters[NORM_2].as_value(),
            parameters[SIGMA_2].as_value(),
            bin_width,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const BIN_WIDTH: f64 = 0.0075;

    #[test]
    fn gauss_uses_two_sigma_in_the_exponent() {
        assert_relative_eq!(gauss(1.97, 10.0, 1.97, 0.01), 10.0);
        // one unit of (x - mu) / (2 sigma) away
        assert_relative_eq!(gauss(1.99, 10.0, 1.97, 0.01), 10.0 * (-1.0f64).exp(), epsilon = 1e-12);
        assert_eq!(gauss(1.97, 10.0, 1.97, 0.0), 0.0);
    }

    #[test]
    fn shape_is_sum_of_components() {
        let params = [100.0, 1.97, 0.01, 50.0, 1.87, 0.008, 20.0, -5.0];
        let x = 1.9;
        let expected = gauss(x, 100.0, 1.97, 0.01) + gauss(x, 50.0, 1.87, 0.008) + 20.0 - 5.0 * x;
        assert_relative_eq!(MassModel::shape(x, &params), expected);
    }

    #[test]
    fn signal_integral_matches_closed_form() {
        let (area, variance) = signal_integral(100.0, 0.01, 5.0, 0.001, BIN_WIDTH);
        assert_relative_eq!(area, 100.0 * 0.01 * SQRT_TWO_PI / BIN_WIDTH);
        let err = SQRT_TWO_PI * (100.0 * 0.001 + 0.01 * 5.0);
        assert_relative_eq!(variance, err * err);
    }

    #[test]
    fn signal_integral_is_positive_and_linear() {
        for &norm in &[0.5, 10.0, 2500.0] {
            for &sigma in &[0.001, 0.005, 0.02] {
                let (area, variance) = signal_integral(norm, sigma, 1.0, 0.001, BIN_WIDTH);
                assert!(area > 0.0, "area must be positive for norm={norm} sigma={sigma}");
                assert!(variance >= 0.0);

                let (double_norm, _) = signal_integral(2.0 * norm, sigma, 1.0, 0.001, BIN_WIDTH);
                let (double_sigma, _) = signal_integral(norm, 2.0 * sigma, 1.0, 0.001, BIN_WIDTH);
                assert_relative_eq!(double_norm, 2.0 * area, max_relative = 1e-12);
                assert_relative_eq!(double_sigma, 2.0 * area, max_relative = 1e-12);
            }
        }
    }

    #[test]
    fn signal_yield_sums_areas_and_variances() {
        let mut parameters = MassModel::default_parameters();
        parameters[NORM_1].value = Some(300.0);
        parameters[NORM_1].uncertainty = Some(10.0);
        parameters[SIGMA_1].value = Some(0.01);
        parameters[SIGMA_1].uncertainty = Some(0.0005);
        parameters[NORM_2].value = Some(150.0);
        parameters[NORM_2].uncertainty = Some(8.0);
        parameters[SIGMA_2].value = Some(0.009);
        parameters[SIGMA_2].uncertainty = Some(0.0007);

        let total = MassModel::signal_yield(&parameters, BIN_WIDTH);
        let (a1, v1) = signal_integral(300.0, 0.01, 10.0, 0.0005, BIN_WIDTH);
        let (a2, v2) = signal_integral(150.0, 0.009, 8.0, 0.0007, BIN_WIDTH);
        assert_relative_eq!(total.value, a1 + a2);
        assert_relative_eq!(total.variance, v1 + v2);
    }

    #[test]
    fn bin_average_of_linear_background_is_midpoint_value() {
        let params = [0.0, 1.97, 0.01, 0.0, 1.87, 0.01, 100.0, -20.0];
        let avg = MassModel::bin_average(1.8, 1.8075, &params);
        assert_relative_eq!(avg, pol1(1.80375, 100.0, -20.0), epsilon = 1e-10);
    }

    #[test]
    fn default_parameters_start_inside_their_limits() {
        let model = MassModel::default();
        assert_eq!(model.parameters.len(), N_PARAMETERS);
        for p in &model.parameters {
            assert!(p.is_within_bounds(p.initial_guess), "{} starts out of bounds", p.name);
        }
    }
}
