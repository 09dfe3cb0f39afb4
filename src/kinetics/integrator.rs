use crate::error::NumericalDegeneracy;
use crate::types::{Array1f, ArrayView1f};

use conv::{ConvAsUtil, RoundToNearest};

/// Fixed-step classical Runge–Kutta integrator for autonomous scalar rate laws
///
/// The trajectory is computed on the grid `0, h, 2h, …` covering the last requested time and
/// then resampled onto the measurement timestamps by nearest grid index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedStepIntegrator {
    step: f64,
}

impl FixedStepIntegrator {
    pub fn new(step: f64) -> Self {
        assert!(step.is_finite(), "step must be finite");
        assert!(step > 0.0, "step must be positive");
        Self { step }
    }

    #[inline]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Integrate `dy/dt = rhs(y)` from `y(0) = y0` up to at least `t_end`
    pub fn integrate<F>(&self, y0: f64, t_end: f64, rhs: F) -> Result<Array1f, NumericalDegeneracy>
    where
        F: Fn(f64) -> Result<f64, NumericalDegeneracy>,
    {
        let n_steps = self.grid_index(t_end)?;
        let h = self.step;
        let mut trajectory = Vec::with_capacity(n_steps + 1);
        let mut y = y0;
        trajectory.push(y);
        for i in 0..n_steps {
            let k1 = rhs(y)?;
            let k2 = rhs(y + 0.5 * h * k1)?;
            let k3 = rhs(y + 0.5 * h * k2)?;
            let k4 = rhs(y + h * k3)?;
            y += h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
            if !y.is_finite() {
                return Err(NumericalDegeneracy::NonFiniteState {
                    time: (i + 1) as f64 * h,
                });
            }
            trajectory.push(y);
        }
        Ok(trajectory.into())
    }

    /// Values of the grid `trajectory` at the nearest grid points of `t`
    pub fn resample(
        &self,
        trajectory: ArrayView1f,
        t: ArrayView1f,
    ) -> Result<Array1f, NumericalDegeneracy> {
        let last = trajectory.len().saturating_sub(1);
        t.iter()
            .map(|&t| Ok(trajectory[self.grid_index(t)?.min(last)]))
            .collect()
    }

    /// Integrate and resample onto `t`, which must start at or after zero
    pub fn solve<F>(&self, y0: f64, t: ArrayView1f, rhs: F) -> Result<Array1f, NumericalDegeneracy>
    where
        F: Fn(f64) -> Result<f64, NumericalDegeneracy>,
    {
        let t_end = t.iter().copied().fold(0.0, f64::max);
        let trajectory = self.integrate(y0, t_end, rhs)?;
        self.resample(trajectory.view(), t)
    }

    fn grid_index(&self, t: f64) -> Result<usize, NumericalDegeneracy> {
        (t / self.step)
            .approx_by::<RoundToNearest>()
            .map_err(|_| NumericalDegeneracy::NonFiniteState { time: t })
    }
}
