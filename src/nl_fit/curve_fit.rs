use crate::error::NumericalDegeneracy;
use crate::nl_fit::data::Data;

use std::rc::Rc;

/// Outcome of a least-squares fit
#[derive(Clone, Debug, PartialEq)]
pub struct CurveFitResult<const NPARAMS: usize> {
    pub x: [f64; NPARAMS],
    /// Parameter covariance scaled by the reduced χ², `None` when `JᵀJ` is singular
    pub covariance: Option<[[f64; NPARAMS]; NPARAMS]>,
    pub reduced_chi2: f64,
    pub niterations: usize,
    pub success: bool,
}

impl<const NPARAMS: usize> CurveFitResult<NPARAMS> {
    /// Diagonal of the covariance matrix
    pub fn variances(&self) -> Option<[f64; NPARAMS]> {
        self.covariance.map(|cov| std::array::from_fn(|i| cov[i][i]))
    }
}

pub trait CurveFitTrait {
    /// Minimise the sum of squared residuals of `model` against `ts` within `bounds`
    ///
    /// `model` may report a [NumericalDegeneracy]. At the initial guess this is an error, at a
    /// later trial point it ends the run with `success == false` and the best point so far.
    fn curve_fit<F, const NPARAMS: usize>(
        &self,
        ts: Rc<Data>,
        x0: &[f64; NPARAMS],
        bounds: (&[f64; NPARAMS], &[f64; NPARAMS]),
        model: F,
    ) -> Result<CurveFitResult<NPARAMS>, NumericalDegeneracy>
    where
        F: Fn(f64, &[f64; NPARAMS]) -> Result<f64, NumericalDegeneracy>;
}
