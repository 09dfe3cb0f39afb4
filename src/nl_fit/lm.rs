use crate::error::{InputDataError, NumericalDegeneracy};
use crate::nl_fit::bounds::clamp_to_bounds;
use crate::nl_fit::curve_fit::{CurveFitResult, CurveFitTrait};
use crate::nl_fit::data::Data;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, Owned};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;

/// Relative step of the central-difference Jacobian, cube root of machine epsilon
const FD_STEP: f64 = 6.055_454_452_393_343e-6;

/// Bounded Levenberg–Marquardt non-linear least-squares fitter
///
/// Wraps the MINPACK-style trust-region solver of the `levenberg-marquardt` crate. The Jacobian
/// is estimated with central finite differences, so the model needs no derivatives. Bounds are
/// enforced by evaluating the model at the parameters projected onto the box. After convergence
/// the parameter covariance is estimated as `(JᵀJ)⁻¹ · χ²/(n - NPARAMS)`, the same convention
/// as SciPy's `curve_fit` with relative errors.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename = "Lm", into = "LmParameters", try_from = "LmParameters")]
pub struct LmCurveFit {
    pub niterations: usize,
    pub xtol: f64,
    pub ftol: f64,
}

impl LmCurveFit {
    /// Create a new [LmCurveFit].
    ///
    /// # Arguments
    /// - `niterations`: solver patience, the run stops after `niterations · (NPARAMS + 1)`
    ///   residual evaluations
    /// - `xtol`: relative tolerance on the parameter step
    /// - `ftol`: relative tolerance on the χ² decrease
    pub fn new(niterations: usize, xtol: f64, ftol: f64) -> Self {
        assert!(niterations > 0, "niterations must be positive");
        assert!(xtol >= 0.0 && xtol.is_finite(), "xtol must be non-negative");
        assert!(ftol >= 0.0 && ftol.is_finite(), "ftol must be non-negative");
        Self {
            niterations,
            xtol,
            ftol,
        }
    }

    #[inline]
    pub fn default_niterations() -> usize {
        100
    }

    #[inline]
    pub fn default_xtol() -> f64 {
        30.0 * f64::EPSILON
    }

    #[inline]
    pub fn default_ftol() -> f64 {
        30.0 * f64::EPSILON
    }
}

impl Default for LmCurveFit {
    fn default() -> Self {
        Self::new(
            Self::default_niterations(),
            Self::default_xtol(),
            Self::default_ftol(),
        )
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "Lm")]
struct LmParameters {
    niterations: usize,
    xtol: f64,
    ftol: f64,
}

impl From<LmCurveFit> for LmParameters {
    fn from(f: LmCurveFit) -> Self {
        Self {
            niterations: f.niterations,
            xtol: f.xtol,
            ftol: f.ftol,
        }
    }
}

impl TryFrom<LmParameters> for LmCurveFit {
    type Error = InputDataError;

    fn try_from(p: LmParameters) -> Result<Self, Self::Error> {
        if p.niterations == 0 {
            return Err(InputDataError::InvalidParameter("niterations must be positive"));
        }
        if !(p.xtol >= 0.0 && p.xtol.is_finite()) || !(p.ftol >= 0.0 && p.ftol.is_finite()) {
            return Err(InputDataError::InvalidParameter("tolerances must be non-negative"));
        }
        Ok(Self::new(p.niterations, p.xtol, p.ftol))
    }
}

/// Least-squares problem of a closure model projected onto a parameter box
struct BoundedProblem<'a, F, const NPARAMS: usize> {
    ts: &'a Data,
    model: &'a F,
    lower: &'a [f64; NPARAMS],
    upper: &'a [f64; NPARAMS],
    params: DVector<f64>,
    /// Lowest χ² evaluated so far and its projected parameters
    best: Cell<Option<([f64; NPARAMS], f64)>>,
}

impl<F, const NPARAMS: usize> BoundedProblem<'_, F, NPARAMS>
where
    F: Fn(f64, &[f64; NPARAMS]) -> Result<f64, NumericalDegeneracy>,
{
    fn projected(&self) -> [f64; NPARAMS] {
        let x = std::array::from_fn(|i| self.params[i]);
        clamp_to_bounds(&x, self.lower, self.upper)
    }

    fn residuals_at(&self, x: &[f64; NPARAMS]) -> Result<DVector<f64>, NumericalDegeneracy> {
        let r = self
            .ts
            .t
            .iter()
            .zip(self.ts.m.iter())
            .map(|(&t, &m)| (self.model)(t, x).map(|y| y - m))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DVector::from_vec(r))
    }

    /// Central-difference Jacobian at a point inside the box, one-sided next to a bound or a
    /// degenerate neighbour
    fn jacobian_at(&self, x: &[f64; NPARAMS]) -> Option<DMatrix<f64>> {
        let r = self.residuals_at(x).ok()?;
        let mut jac = DMatrix::zeros(self.ts.lenu(), NPARAMS);
        for j in 0..NPARAMS {
            let h = FD_STEP * if x[j] != 0.0 { x[j].abs() } else { 1.0 };
            let mut forward = *x;
            forward[j] += h;
            let forward = clamp_to_bounds(&forward, self.lower, self.upper);
            let mut backward = *x;
            backward[j] -= h;
            let backward = clamp_to_bounds(&backward, self.lower, self.upper);
            let column = match (self.residuals_at(&forward), self.residuals_at(&backward)) {
                (Ok(f), Ok(b)) if forward[j] > backward[j] => {
                    (f - b) / (forward[j] - backward[j])
                }
                (Ok(f), _) if forward[j] > x[j] => (f - &r) / (forward[j] - x[j]),
                (_, Ok(b)) if x[j] > backward[j] => (&r - b) / (x[j] - backward[j]),
                _ => return None,
            };
            jac.set_column(j, &column);
        }
        Some(jac)
    }
}

impl<F, const NPARAMS: usize> LeastSquaresProblem<f64, Dyn, Dyn>
    for BoundedProblem<'_, F, NPARAMS>
where
    F: Fn(f64, &[f64; NPARAMS]) -> Result<f64, NumericalDegeneracy>,
{
    type ParameterStorage = Owned<f64, Dyn>;
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let x = self.projected();
        // a degenerate trial point ends the solver run
        let r = self.residuals_at(&x).ok()?;
        let chi2 = r.norm_squared();
        if !chi2.is_finite() {
            return None;
        }
        if self.best.get().is_none_or(|(_, best)| chi2 < best) {
            self.best.set(Some((x, chi2)));
        }
        Some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jac = self.jacobian_at(&self.projected())?;
        // the projection is flat along a coordinate that left the box
        for j in 0..NPARAMS {
            if !(self.lower[j]..=self.upper[j]).contains(&self.params[j]) {
                jac.column_mut(j).fill(0.0);
            }
        }
        Some(jac)
    }
}

impl CurveFitTrait for LmCurveFit {
    fn curve_fit<F, const NPARAMS: usize>(
        &self,
        ts: Rc<Data>,
        x0: &[f64; NPARAMS],
        bounds: (&[f64; NPARAMS], &[f64; NPARAMS]),
        model: F,
    ) -> Result<CurveFitResult<NPARAMS>, NumericalDegeneracy>
    where
        F: Fn(f64, &[f64; NPARAMS]) -> Result<f64, NumericalDegeneracy>,
    {
        let (lower, upper) = bounds;
        let x0 = clamp_to_bounds(x0, lower, upper);
        let problem = BoundedProblem {
            ts: &ts,
            model: &model,
            lower,
            upper,
            params: DVector::from_column_slice(&x0),
            best: Cell::new(None),
        };
        let chi2 = problem.residuals_at(&x0)?.norm_squared();
        if !chi2.is_finite() {
            return Err(NumericalDegeneracy::NonFinitePrediction);
        }

        let (problem, report) = LevenbergMarquardt::new()
            .with_patience(self.niterations)
            .with_xtol(self.xtol)
            .with_ftol(self.ftol)
            .minimize(problem);
        let success = report.termination.was_successful();
        if !success {
            log::debug!("Levenberg–Marquardt stopped: {:?}", report.termination);
        }
        let (x, chi2) = problem.best.get().unwrap_or((x0, chi2));

        let dof = ts.lenu().saturating_sub(NPARAMS);
        let reduced_chi2 = if dof > 0 { chi2 / dof as f64 } else { f64::NAN };
        let covariance = problem
            .jacobian_at(&x)
            .filter(|_| dof > 0)
            .and_then(|jac| jac.tr_mul(&jac).try_inverse())
            .map(|inv| {
                std::array::from_fn(|i| std::array::from_fn(|j| inv[(i, j)] * reduced_chi2))
            });

        Ok(CurveFitResult {
            x,
            covariance,
            reduced_chi2,
            niterations: report.number_of_evaluations,
            success,
        })
    }
}
