//! Derivative-free two-parameter refinement of the primary estimate
//!
//! Both optimizers integrate a [JointModel] and nudge each free parameter by a fixed
//! multiplicative factor in whichever direction lowers the sum of squared residuals. They differ
//! in how the direction is chosen ([StepRule]), in the step damping and in the exact-tier
//! threshold. All optimizer state lives in local variables of a single call.

use crate::data::KineticTrace;
use crate::diagnostics::{
    ConvergenceThresholds, ConvergenceTier, Diagnostics, GoodnessOfFit, diagnose,
    sum_squared_residuals,
};
use crate::error::{AnalysisError, InputDataError, ModelDivergenceError, NumericalDegeneracy};
use crate::kinetics::JointModel;
use crate::parameters::ExperimentParameters;
use crate::primary_fit::PrimaryFit;
use crate::types::{Array1f, ArrayView1f};

use enum_dispatch::enum_dispatch;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

mod product_absorption;
pub use product_absorption::ProductAbsorptionOptimizer;

mod thermal;
pub use thermal::ThermalReversionOptimizer;

/// Starting point shared by the joint optimizers
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointStart {
    pub quantum_yield: f64,
    /// Quantum yield is the known constant of the experiment and must not move
    pub quantum_yield_fixed: bool,
    /// Photon flux, photons/s, held fixed during the refinement
    pub photon_flux: f64,
}

impl JointStart {
    /// Start from the primary fit: its estimate or the fixed value
    pub fn from_primary(params: &ExperimentParameters, primary: &PrimaryFit) -> Self {
        Self {
            quantum_yield: primary.quantum_yield,
            quantum_yield_fixed: params.quantum_yield.is_some(),
            photon_flux: primary.photon_flux,
        }
    }
}

/// One line of the optimizer log
#[derive(Clone, Debug, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub wavelength: f64,
    pub names: [&'static str; 2],
    pub parameters: [f64; 2],
    pub goodness: GoodnessOfFit,
}

impl fmt::Display for IterationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} nm  #{:<3}  {} = {:.6e}  {} = {:.6e}  loose R² = {:.6}  tight R² = {:.6}",
            self.wavelength,
            self.iteration,
            self.names[0],
            self.parameters[0],
            self.names[1],
            self.parameters[1],
            self.goodness.loose_r2,
            self.goodness.tight_r2,
        )
    }
}

/// Outcome of a joint optimization, usable even when not converged
#[derive(Clone, Debug, PartialEq)]
pub struct JointFit {
    pub names: [&'static str; 2],
    pub parameters: [f64; 2],
    pub photon_flux: f64,
    /// `measured - predicted` over the whole trace
    pub residuals: Array1f,
    pub goodness: GoodnessOfFit,
    pub tier: ConvergenceTier,
    /// Exact tier reached before the iteration cap
    pub converged: bool,
    pub niterations: usize,
    pub history: Vec<IterationRecord>,
}

impl JointFit {
    pub fn quantum_yield(&self) -> f64 {
        self.parameters[0]
    }

    /// Product quantum yield or thermal rate constant, depending on the optimizer
    pub fn secondary(&self) -> f64 {
        self.parameters[1]
    }
}

#[enum_dispatch]
pub trait JointOptimizerTrait {
    fn optimize(
        &self,
        trace: &KineticTrace,
        params: &ExperimentParameters,
        start: &JointStart,
    ) -> Result<JointFit, AnalysisError>;
}

/// Either refinement, as a serializable value
#[enum_dispatch(JointOptimizerTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[non_exhaustive]
pub enum JointOptimizer {
    ProductAbsorption(ProductAbsorptionOptimizer),
    ThermalReversion(ThermalReversionOptimizer),
}

/// Validate the settings shared by the optimizers before they reach the asserting constructors
fn check_climb_settings(step: f64, scale: f64, niterations: usize) -> Result<(), InputDataError> {
    if !(step > 0.0 && step.is_finite()) {
        return Err(InputDataError::InvalidParameter(
            "integration step must be positive",
        ));
    }
    if !(scale > 0.0 && scale < 1.0) {
        return Err(InputDataError::InvalidParameter(
            "relative perturbation must be in (0, 1)",
        ));
    }
    if niterations == 0 {
        return Err(InputDataError::InvalidParameter(
            "at least one iteration is required",
        ));
    }
    Ok(())
}

/// How a parameter's move direction is chosen from its two perturbations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StepRule {
    /// One-sided differences from the current point, the larger improvement wins
    OneSided,
    /// Symmetric difference across both perturbations
    Symmetric,
}

impl StepRule {
    /// Multiplicative factor to apply, `None` to hold the parameter
    ///
    /// A degenerate perturbation counts as "no improvement" in that direction.
    fn choose(
        &self,
        ssr: f64,
        scale: f64,
        delta: f64,
        up: Option<f64>,
        down: Option<f64>,
    ) -> Option<f64> {
        let improves = |x: f64| x < ssr;
        match (self, up, down) {
            (Self::Symmetric, Some(up), Some(down)) => {
                let gradient = (up - down) / (2.0 * delta);
                if gradient < 0.0 && improves(up) {
                    Some(1.0 + scale)
                } else if gradient > 0.0 && improves(down) {
                    Some(1.0 - scale)
                } else {
                    None
                }
            }
            _ => {
                // negative means that direction lowers the residuals
                let gradient_up = up.map(|up| (up - ssr) / delta);
                let gradient_down = down.map(|down| (down - ssr) / delta);
                match (gradient_up, gradient_down) {
                    (Some(gu), Some(gd)) if gu < 0.0 && gu <= gd => Some(1.0 + scale),
                    (Some(_), Some(gd)) if gd < 0.0 => Some(1.0 - scale),
                    (Some(gu), None) if gu < 0.0 => Some(1.0 + scale),
                    (None, Some(gd)) if gd < 0.0 => Some(1.0 - scale),
                    _ => None,
                }
            }
        }
    }
}

/// Settings of one hill-climbing run
pub(crate) struct Climb {
    pub niterations: usize,
    pub scale: f64,
    /// Iteration after which the scale is divided by `iteration / onset`
    pub damping_onset: Option<usize>,
    pub rule: StepRule,
    pub thresholds: ConvergenceThresholds,
    /// Stop when no parameter moved, useful when the step scale never changes
    pub stop_on_stall: bool,
}

impl Climb {
    fn scale_at(&self, iteration: usize) -> f64 {
        match self.damping_onset {
            Some(onset) if iteration > onset => self.scale / (iteration as f64 / onset as f64),
            _ => self.scale,
        }
    }

    pub fn run<M: JointModel>(
        &self,
        model: &M,
        trace: &KineticTrace,
        start: [f64; 2],
        fixed: [bool; 2],
        photon_flux: f64,
    ) -> Result<JointFit, AnalysisError> {
        let objective = Objective {
            model,
            t: trace.t.view(),
            measured: trace.analysis.view(),
        };
        let record = |iteration: usize, parameters: [f64; 2], goodness: GoodnessOfFit| {
            IterationRecord {
                iteration,
                wavelength: trace.analysis_wavelength,
                names: M::PARAMETER_NAMES,
                parameters,
                goodness,
            }
        };

        let mut parameters = start;
        let mut current = objective
            .diagnose(parameters)
            .map_err(ModelDivergenceError::from)?;
        let mut tier = self.thresholds.classify(&current.goodness);
        let mut history = Vec::with_capacity(self.niterations);
        let mut converged = false;
        let mut niterations = 0;

        for iteration in 1..=self.niterations {
            niterations = iteration;
            let scale = self.scale_at(iteration);
            let ssr = current.goodness.ssr;

            let mut next = parameters;
            for i in 0..2 {
                if fixed[i] {
                    continue;
                }
                let delta = scale * parameters[i].abs();
                if !(delta > 0.0) {
                    continue;
                }
                let mut up = parameters;
                up[i] *= 1.0 + scale;
                let mut down = parameters;
                down[i] *= 1.0 - scale;
                let factor = self.rule.choose(
                    ssr,
                    scale,
                    delta,
                    objective.ssr(up).ok(),
                    objective.ssr(down).ok(),
                );
                if let Some(factor) = factor {
                    next[i] = parameters[i] * factor;
                }
            }

            let mut moved = next != parameters;
            if moved {
                match objective.diagnose(next) {
                    Ok(diagnostics) => {
                        parameters = next;
                        current = diagnostics;
                    }
                    Err(err) => {
                        log::warn!("iteration {iteration} failed, parameters kept: {err}");
                        moved = false;
                    }
                }
            }

            let line = record(iteration, parameters, current.goodness);
            log::debug!("{line}");
            history.push(line);

            tier = self.thresholds.classify(&current.goodness);
            if tier == ConvergenceTier::Exact {
                converged = true;
                break;
            }
            if !moved && self.stop_on_stall {
                break;
            }
        }

        if !converged {
            log::warn!(
                "{} = {:.6e}, {} = {:.6e}: exact tier not reached after {} iterations ({})",
                M::PARAMETER_NAMES[0],
                parameters[0],
                M::PARAMETER_NAMES[1],
                parameters[1],
                niterations,
                tier,
            );
        }

        Ok(JointFit {
            names: M::PARAMETER_NAMES,
            parameters,
            photon_flux,
            residuals: current.residuals,
            goodness: current.goodness,
            tier,
            converged,
            niterations,
            history,
        })
    }
}

struct Objective<'a, M> {
    model: &'a M,
    t: ArrayView1f<'a>,
    measured: ArrayView1f<'a>,
}

impl<M: JointModel> Objective<'_, M> {
    fn ssr(&self, parameters: [f64; 2]) -> Result<f64, NumericalDegeneracy> {
        let predicted = self.model.evaluate(self.t, parameters)?;
        sum_squared_residuals(self.measured, predicted.view())
    }

    fn diagnose(&self, parameters: [f64; 2]) -> Result<Diagnostics, NumericalDegeneracy> {
        let predicted = self.model.evaluate(self.t, parameters)?;
        diagnose(self.measured, predicted.view())
    }
}
