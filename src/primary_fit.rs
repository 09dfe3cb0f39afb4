use crate::data::KineticTrace;
use crate::diagnostics::{ConvergenceThresholds, ConvergenceTier, GoodnessOfFit, diagnose};
use crate::error::{AnalysisError, InputDataError, ModelDivergenceError};
use crate::kinetics::ClosedFormDecay;
use crate::nl_fit::data::Data;
use crate::nl_fit::{CurveFitTrait, LmCurveFit, active_bound};
use crate::parameters::{ExperimentParameters, Unknown};
use crate::types::Array1f;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Estimate of the unknown actinometric constant from the closed-form model
#[derive(Clone, Debug, PartialEq)]
pub struct PrimaryFit {
    pub unknown: Unknown,
    pub estimate: f64,
    pub variance: f64,
    /// Fitted or fixed quantum yield
    pub quantum_yield: f64,
    /// Fitted or fixed photon flux, photons/s
    pub photon_flux: f64,
    /// `measured - predicted` over the fitted points
    pub residuals: Array1f,
    pub goodness: GoodnessOfFit,
    pub tier: ConvergenceTier,
    pub niterations: usize,
}

impl PrimaryFit {
    pub fn std_error(&self) -> f64 {
        self.variance.sqrt()
    }

    /// Number of trace points used by the fit
    pub fn npoints(&self) -> usize {
        self.residuals.len()
    }
}

/// Bounded least-squares fit of [ClosedFormDecay] to the first points of a trace
///
/// Only the first `seed_points` samples are used: the closed-form model ignores photoproduct
/// absorption and thermal reversion, so it is trusted at early times only.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PrimaryFitter {
    algorithm: LmCurveFit,
    thresholds: ConvergenceThresholds,
}

impl PrimaryFitter {
    pub fn new(algorithm: LmCurveFit, thresholds: ConvergenceThresholds) -> Self {
        Self {
            algorithm,
            thresholds,
        }
    }

    #[inline]
    pub fn default_algorithm() -> LmCurveFit {
        LmCurveFit::default()
    }

    #[inline]
    pub fn default_thresholds() -> ConvergenceThresholds {
        ConvergenceThresholds::with_exact(0.999)
    }

    /// Initial guess, lower and upper bound of the unknown
    pub fn init_and_bounds(unknown: Unknown) -> (f64, f64, f64) {
        match unknown {
            Unknown::PhotonFlux => (1e15, 0.0, 1e21),
            Unknown::QuantumYield => (0.5, -1.0, 10.0),
        }
    }

    pub fn fit(
        &self,
        trace: &KineticTrace,
        params: &ExperimentParameters,
    ) -> Result<PrimaryFit, AnalysisError> {
        let unknown = params.validate()?;
        let fixed = match unknown {
            Unknown::QuantumYield => params.photon_flux,
            Unknown::PhotonFlux => params.quantum_yield,
        }
        .ok_or(InputDataError::InvalidParameter(
            "the known actinometric constant is missing",
        ))?;

        let (t, m) = trace.head(params.seed_points);
        if t.len() < KineticTrace::MIN_LENGTH {
            return Err(InputDataError::ShortTrace {
                actual: t.len(),
                minimum: KineticTrace::MIN_LENGTH,
            }
            .into());
        }
        let ts = Rc::new(Data::new(t, m));

        let decay = ClosedFormDecay::from_trace(trace, params);
        let constants = move |x: f64| match unknown {
            Unknown::QuantumYield => (x, fixed),
            Unknown::PhotonFlux => (fixed, x),
        };
        let model = move |t: f64, p: &[f64; 1]| {
            let (quantum_yield, photon_flux) = constants(p[0]);
            decay.absorbance(t, quantum_yield, photon_flux)
        };

        let (init, lower, upper) = Self::init_and_bounds(unknown);
        let result = self
            .algorithm
            .curve_fit(ts.clone(), &[init], (&[lower], &[upper]), model)
            .map_err(ModelDivergenceError::from)?;
        if !result.success {
            log::warn!(
                "primary fit of the {} stopped after {} evaluations without converging",
                unknown.name(),
                result.niterations
            );
            return Err(ModelDivergenceError::NotConverged {
                niterations: result.niterations,
            }
            .into());
        }

        let estimate = result.x[0];
        if let Some((_, bound)) = active_bound(&result.x, &[lower], &[upper]) {
            return Err(ModelDivergenceError::AtBound {
                value: estimate,
                bound,
            }
            .into());
        }
        let variance = result
            .variances()
            .ok_or(ModelDivergenceError::SingularCovariance)?[0];
        if !variance.is_finite() {
            return Err(ModelDivergenceError::NonFiniteCovariance.into());
        }

        let (quantum_yield, photon_flux) = constants(estimate);
        let predicted = decay
            .predict(ts.t.view(), quantum_yield, photon_flux)
            .map_err(ModelDivergenceError::from)?;
        let diagnostics =
            diagnose(ts.m.view(), predicted.view()).map_err(ModelDivergenceError::from)?;
        let tier = self.thresholds.classify(&diagnostics.goodness);

        log::info!(
            "primary fit: {} = {:.6e} ± {:.2e} from {} points, {} iterations, tight R² = {:.6}",
            unknown.name(),
            estimate,
            variance.sqrt(),
            ts.lenu(),
            result.niterations,
            diagnostics.goodness.tight_r2,
        );

        Ok(PrimaryFit {
            unknown,
            estimate,
            variance,
            quantum_yield,
            photon_flux,
            residuals: diagnostics.residuals,
            goodness: diagnostics.goodness,
            tier,
            niterations: result.niterations,
        })
    }
}

impl Default for PrimaryFitter {
    fn default() -> Self {
        Self::new(Self::default_algorithm(), Self::default_thresholds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    use approx::assert_relative_eq;

    #[test]
    fn recovers_quantum_yield_from_exact_trace() {
        let params = experiment_parameters();
        let trace = trace_from(&closed_form_scenario(0.3).to_text(), &params);
        let fit = PrimaryFitter::default().fit(&trace, &params).unwrap();
        assert_eq!(fit.unknown, Unknown::QuantumYield);
        assert_relative_eq!(fit.estimate, 0.3, max_relative = 1e-6);
        assert_relative_eq!(fit.photon_flux, 5e14);
        assert_eq!(fit.tier, ConvergenceTier::Exact);
        assert_eq!(fit.npoints(), 20);
    }

    #[test]
    fn recovers_photon_flux_from_exact_trace() {
        let params = ExperimentParameters {
            quantum_yield: Some(0.3),
            photon_flux: None,
            ..experiment_parameters()
        };
        let trace = trace_from(&closed_form_scenario(0.3).to_text(), &params);
        let fit = PrimaryFitter::default().fit(&trace, &params).unwrap();
        assert_eq!(fit.unknown, Unknown::PhotonFlux);
        assert_relative_eq!(fit.estimate, 5e14, max_relative = 1e-6);
        assert_relative_eq!(fit.quantum_yield, 0.3);
    }

    #[test]
    fn noisy_twenty_point_trace() {
        let params = experiment_parameters();
        let text = closed_form_scenario(0.3).with_noise(5e-4, 42).to_text();
        let trace = trace_from(&text, &params);
        assert_eq!(trace.lenu(), 20);
        let fit = PrimaryFitter::default().fit(&trace, &params).unwrap();
        assert!(
            (0.29..=0.31).contains(&fit.estimate),
            "estimate {} is out of range",
            fit.estimate
        );
        assert!(fit.std_error() > 0.0 && fit.std_error() < 0.01);
        assert_eq!(fit.residuals.len(), 20);
    }

    #[test]
    fn seed_points_limit_the_fit() {
        let params = ExperimentParameters {
            seed_points: 5,
            ..experiment_parameters()
        };
        let trace = trace_from(&closed_form_scenario(0.3).to_text(), &params);
        let fit = PrimaryFitter::default().fit(&trace, &params).unwrap();
        assert_eq!(fit.npoints(), 5);
        assert_relative_eq!(fit.estimate, 0.3, max_relative = 1e-6);
    }

    #[test]
    fn insensitive_model_has_singular_covariance() {
        let params = ExperimentParameters {
            photon_flux: Some(1e-6),
            ..experiment_parameters()
        };
        // the model cannot change within f64 precision at this flux
        let trace = trace_from(&closed_form_scenario(0.3).to_text(), &params);
        let result = PrimaryFitter::default().fit(&trace, &params);
        assert_eq!(
            result,
            Err(AnalysisError::ModelDivergence(
                ModelDivergenceError::SingularCovariance
            ))
        );
    }

    #[test]
    fn exhausted_solver_is_an_error() {
        let params = experiment_parameters();
        let trace = trace_from(&closed_form_scenario(0.3).to_text(), &params);
        let fitter = PrimaryFitter::new(
            LmCurveFit::new(1, LmCurveFit::default_xtol(), LmCurveFit::default_ftol()),
            PrimaryFitter::default_thresholds(),
        );
        let result = fitter.fit(&trace, &params);
        assert!(
            matches!(
                result,
                Err(AnalysisError::ModelDivergence(
                    ModelDivergenceError::NotConverged { .. }
                ))
            ),
            "{result:?}"
        );
    }

    #[test]
    fn closed_form_doc_is_rendered() {
        assert!(ClosedFormDecay::doc().contains("c_1"));
        assert_eq!(
            PrimaryFitter::init_and_bounds(Unknown::PhotonFlux),
            (1e15, 0.0, 1e21)
        );
        assert_eq!(
            PrimaryFitter::init_and_bounds(Unknown::QuantumYield),
            (0.5, -1.0, 10.0)
        );
    }
}
