//! Box constrained chi2 minimisation with argmin's L-BFGS.
//!
//! Free parameters are mapped onto the unit interval spanned by their limits,
//! so that norms in the thousands and widths of a few MeV share one scale.
//! Bounds are enforced by clamping, with the gradient projected at the walls.

use argmin::core::{
    CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::DMatrix;

use super::common::Data;
use crate::error::{EffError, Result};

#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct MinimizerConfig {
    pub max_iterations: u64,
    /// Gradient norm, in scaled coordinates, below which the fit has converged.
    pub tolerance_grad: f64,
    /// Chi2 change between iterations below which the fit has converged.
    pub tolerance_cost: f64,
    /// Number of corrections kept for the inverse Hessian.
    pub memory: usize,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance_grad: 1e-6,
            tolerance_cost: 1e-8,
            memory: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub parameters: Vec<f64>,
    /// Zero for parameters that were held fixed.
    pub uncertainties: Vec<f64>,
    pub chi2: f64,
    pub iterations: u64,
    pub converged: bool,
    pub termination: String,
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params
        .iter()
        .zip(bounds)
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect()
}

fn to_argmin(e: EffError) -> argmin::core::Error {
    argmin::core::Error::msg(e.to_string())
}

/// Weighted least squares over the free parameters in scaled coordinates.
struct LeastSquares<'a, F> {
    data: &'a Data,
    predict: F,
    bounds: &'a [(f64, f64)],
    /// Full parameter vector; fixed entries are read from here.
    start: Vec<f64>,
    free: Vec<usize>,
}

impl<F> LeastSquares<'_, F>
where
    F: Fn(usize, &[f64]) -> f64,
{
    fn span(&self, k: usize) -> f64 {
        let (lo, hi) = self.bounds[k];
        hi - lo
    }

    fn scale(&self, params: &[f64]) -> Vec<f64> {
        self.free
            .iter()
            .map(|&k| (params[k] - self.bounds[k].0) / self.span(k))
            .collect()
    }

    fn unscale(&self, scaled: &[f64]) -> Vec<f64> {
        let mut params = self.start.clone();
        for (&u, &k) in scaled.iter().zip(&self.free) {
            params[k] = self.bounds[k].0 + u.clamp(0.0, 1.0) * self.span(k);
        }
        params
    }

    fn residuals(&self, params: &[f64]) -> Vec<f64> {
        (0..self.data.len())
            .map(|i| (self.data.y[i] - (self.predict)(i, params)) / self.data.sigma[i])
            .collect()
    }

    fn chi2(&self, params: &[f64]) -> Result<f64> {
        let chi2: f64 = self.residuals(params).iter().map(|r| r * r).sum();
        if chi2.is_finite() {
            Ok(chi2)
        } else {
            Err(EffError::Fit("chi2 is not finite".to_owned()))
        }
    }

    /// Derivative of the weighted model, one column per free parameter, in
    /// physical units. Steps that would leave the box become one sided.
    fn jacobian(&self, params: &[f64]) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.data.len(), self.free.len());
        let mut shifted = params.to_vec();

        for (column, &k) in self.free.iter().enumerate() {
            let (lo, hi) = self.bounds[k];
            let h = 1e-7 * params[k].abs().max(1e-3);
            let up = (params[k] + h).min(hi);
            let down = (params[k] - h).max(lo);
            let width = up - down;
            if width <= 0.0 {
                continue;
            }

            for i in 0..self.data.len() {
                shifted[k] = up;
                let f_up = (self.predict)(i, &shifted);
                shifted[k] = down;
                let f_down = (self.predict)(i, &shifted);
                jac[(i, column)] = (f_up - f_down) / width / self.data.sigma[i];
            }
            shifted[k] = params[k];
        }

        jac
    }
}

/// What argmin sees: chi2 and its gradient as functions of the scaled free parameters.
struct Objective<'p, 'a, F>(&'p LeastSquares<'a, F>);

impl<F> CostFunction for Objective<'_, '_, F>
where
    F: Fn(usize, &[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, scaled: &Self::Param) -> std::result::Result<f64, argmin::core::Error> {
        self.0.chi2(&self.0.unscale(scaled)).map_err(to_argmin)
    }
}

impl<F> Gradient for Objective<'_, '_, F>
where
    F: Fn(usize, &[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, scaled: &Self::Param) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        let problem = self.0;
        let params = problem.unscale(scaled);
        let jac = problem.jacobian(&params);
        let residuals = problem.residuals(&params);

        // d chi2 / du_k = -2 sum_i r_i J_ik span_k
        let mut grad: Vec<f64> = problem
            .free
            .iter()
            .enumerate()
            .map(|(column, &k)| {
                let dot: f64 = residuals
                    .iter()
                    .enumerate()
                    .map(|(i, r)| r * jac[(i, column)])
                    .sum();
                -2.0 * dot * problem.span(k)
            })
            .collect();

        // projected gradient: no component points out of the box at a wall
        for (g, &u) in grad.iter_mut().zip(scaled) {
            if (u <= 0.0 && *g > 0.0) || (u >= 1.0 && *g < 0.0) {
                *g = 0.0;
            }
        }

        if grad.iter().all(|g| g.is_finite()) {
            Ok(grad)
        } else {
            Err(to_argmin(EffError::Fit("gradient is not finite".to_owned())))
        }
    }
}

fn covariance(jtj: DMatrix<f64>) -> Option<DMatrix<f64>> {
    jtj.clone()
        .try_inverse()
        .or_else(|| jtj.pseudo_inverse(1e-12).ok())
}

/// Minimise `sum(((y - predict(i, p)) / sigma)^2)` with every parameter kept
/// inside `bounds`. `predict` receives the point index so the caller can decide
/// between bin centre and bin average evaluation. Parameter errors come from
/// `(J^T J)^-1` at the minimum.
pub fn minimize<F>(
    data: &Data,
    predict: F,
    start: &[f64],
    bounds: &[(f64, f64)],
    free: &[bool],
    config: &MinimizerConfig,
) -> Result<Minimum>
where
    F: Fn(usize, &[f64]) -> f64,
{
    if start.len() != bounds.len() || start.len() != free.len() {
        return Err(EffError::Fit(format!(
            "parameter, bound and mask lengths differ: {} / {} / {}",
            start.len(),
            bounds.len(),
            free.len()
        )));
    }
    if let Some(&(lo, hi)) = bounds
        .iter()
        .find(|(lo, hi)| !lo.is_finite() || !hi.is_finite() || lo > hi)
    {
        return Err(EffError::Fit(format!(
            "parameter limits [{lo}, {hi}] must be finite and ordered"
        )));
    }
    if data.sigma.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
        return Err(EffError::Fit("non-positive point uncertainty".to_owned()));
    }

    let problem = LeastSquares {
        data,
        predict,
        bounds,
        start: clamp_params(start, bounds),
        free: (0..start.len())
            .filter(|&k| free[k] && bounds[k].1 > bounds[k].0)
            .collect(),
    };

    let initial = problem.start.clone();
    problem
        .chi2(&initial)
        .map_err(|e| EffError::Fit(format!("bad starting point: {e}")))?;
    let scaled_start = problem.scale(&initial);

    let (scaled_best, iterations, converged, termination) = if problem.free.is_empty() {
        (scaled_start, 0, true, "no free parameters".to_owned())
    } else {
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), config.memory)
            .with_tolerance_grad(config.tolerance_grad)
            .and_then(|s| s.with_tolerance_cost(config.tolerance_cost))
            .map_err(|e| EffError::Fit(format!("invalid minimizer settings: {e}")))?;

        let res = Executor::new(Objective(&problem), solver)
            .configure(|state| state.param(scaled_start).max_iters(config.max_iterations))
            .run()
            .map_err(|e| EffError::Fit(format!("minimisation failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| EffError::Fit("minimizer returned no parameters".to_owned()))?
            .clone();
        let status = state.get_termination_status();
        let converged = matches!(
            status,
            TerminationStatus::Terminated(
                TerminationReason::SolverConverged | TerminationReason::TargetCostReached
            )
        );
        (best, state.get_iter(), converged, status.to_string())
    };

    let parameters = problem.unscale(&scaled_best);
    let chi2 = problem.chi2(&parameters)?;
    log::debug!("minimum chi2 = {chi2:.6} after {iterations} iterations ({termination})");

    let jac = problem.jacobian(&parameters);
    let mut uncertainties = vec![0.0; parameters.len()];
    match covariance(jac.tr_mul(&jac)) {
        Some(cov) => {
            for (d, &k) in problem.free.iter().enumerate() {
                uncertainties[k] = cov[(d, d)].abs().sqrt();
            }
        }
        None => log::warn!("covariance matrix could not be inverted, uncertainties set to zero"),
    }

    Ok(Minimum {
        parameters,
        uncertainties,
        chi2,
        iterations,
        converged,
        termination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line_data() -> Data {
        let x: Vec<f64> = (0..20).map(|i| i as f64 * 0.5).collect();
        let y = x.iter().map(|x| 3.0 - 0.7 * x).collect();
        Data {
            sigma: vec![0.1; x.len()],
            bins: Vec::new(),
            x,
            y,
        }
    }

    #[test]
    fn recovers_straight_line() {
        let data = line_data();
        let minimum = minimize(
            &data,
            |i, p: &[f64]| p[0] + p[1] * data.x[i],
            &[0.0, 0.0],
            &[(-10.0, 10.0), (-10.0, 10.0)],
            &[true, true],
            &MinimizerConfig::default(),
        )
        .unwrap();

        assert!(minimum.converged, "{}", minimum.termination);
        assert_relative_eq!(minimum.parameters[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(minimum.parameters[1], -0.7, epsilon = 1e-4);
        assert!(minimum.chi2 < 1e-4);
        assert!(minimum.uncertainties.iter().all(|&u| u > 0.0));
    }

    #[test]
    fn respects_parameter_bounds() {
        let data = line_data();
        let minimum = minimize(
            &data,
            |i, p: &[f64]| p[0] + p[1] * data.x[i],
            &[0.0, 0.0],
            &[(-10.0, 10.0), (-0.5, 10.0)],
            &[true, true],
            &MinimizerConfig::default(),
        )
        .unwrap();

        assert!(minimum.parameters[1] >= -0.5);
        assert_relative_eq!(minimum.parameters[1], -0.5, epsilon = 1e-3);
    }

    #[test]
    fn fixed_parameters_do_not_move() {
        let data = line_data();
        let minimum = minimize(
            &data,
            |i, p: &[f64]| p[0] + p[1] * data.x[i],
            &[1.0, -0.7],
            &[(-10.0, 10.0), (-10.0, 10.0)],
            &[true, false],
            &MinimizerConfig::default(),
        )
        .unwrap();

        assert_eq!(minimum.parameters[1], -0.7);
        assert_eq!(minimum.uncertainties[1], 0.0);
        assert_relative_eq!(minimum.parameters[0], 3.0, epsilon = 1e-4);
    }

    #[test]
    fn start_outside_the_limits_is_clamped() {
        let data = line_data();
        let minimum = minimize(
            &data,
            |i, p: &[f64]| p[0] + p[1] * data.x[i],
            &[50.0, -0.7],
            &[(-10.0, 10.0), (-10.0, 10.0)],
            &[false, false],
            &MinimizerConfig::default(),
        )
        .unwrap();

        assert_eq!(minimum.parameters, vec![10.0, -0.7]);
        assert_eq!(minimum.iterations, 0);
    }

    #[test]
    fn rejects_mismatched_lengths_and_open_limits() {
        let data = line_data();
        let mismatched = minimize(
            &data,
            |_, p: &[f64]| p[0],
            &[0.0, 1.0],
            &[(-1.0, 1.0)],
            &[true, true],
            &MinimizerConfig::default(),
        );
        assert!(matches!(mismatched, Err(EffError::Fit(_))));

        let open = minimize(
            &data,
            |_, p: &[f64]| p[0],
            &[0.0],
            &[(f64::NEG_INFINITY, 1.0)],
            &[true],
            &MinimizerConfig::default(),
        );
        assert!(matches!(open, Err(EffError::Fit(_))));
    }
}
