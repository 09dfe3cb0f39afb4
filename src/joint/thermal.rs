use crate::data::KineticTrace;
use crate::diagnostics::ConvergenceThresholds;
use crate::error::{AnalysisError, InputDataError};
use crate::joint::{Climb, JointFit, JointOptimizerTrait, JointStart, StepRule};
use crate::kinetics::{FixedStepIntegrator, ThermalReversionModel};
use crate::parameters::ExperimentParameters;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
Joint refinement of the quantum yield and the thermal back-conversion rate constant

The integrated [ThermalReversionModel](crate::kinetics::ThermalReversionModel) is compared with
the whole trace. Every iteration each free parameter is multiplied by $1 \pm s$ and the symmetric
difference of the sum of squared residuals picks the direction; the move is taken only if it
lowers the residuals. After the damping onset iteration $m$ the perturbation shrinks as
$s / (i / m)$. Iterations stop at the exact tier ($R^2_\mathrm{tight} \geq 0.9999$ by default)
or at the iteration cap.

A rate constant given in the experiment parameters is held fixed, otherwise it starts from the
configured seed.
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(
    rename = "ThermalReversion",
    into = "ThermalReversionParameters",
    try_from = "ThermalReversionParameters"
)]
pub struct ThermalReversionOptimizer {
    /// Integration step, s
    step: f64,
    /// Relative perturbation of a parameter per iteration before damping
    scale: f64,
    niterations: usize,
    damping_onset: usize,
    /// Starting rate constant when it is not fixed, 1/s
    thermal_rate: f64,
    thresholds: ConvergenceThresholds,
}

impl ThermalReversionOptimizer {
    pub fn new(
        step: f64,
        scale: f64,
        niterations: usize,
        damping_onset: usize,
        thermal_rate: f64,
        thresholds: ConvergenceThresholds,
    ) -> Self {
        assert!(step > 0.0, "integration step must be positive");
        assert!(
            scale > 0.0 && scale < 1.0,
            "relative perturbation must be in (0, 1)"
        );
        assert!(niterations > 0, "at least one iteration is required");
        assert!(damping_onset > 0, "damping onset must be positive");
        assert!(thermal_rate > 0.0, "seed rate constant must be positive");
        Self {
            step,
            scale,
            niterations,
            damping_onset,
            thermal_rate,
            thresholds,
        }
    }

    #[inline]
    pub fn default_step() -> f64 {
        0.2
    }

    #[inline]
    pub fn default_scale() -> f64 {
        0.02
    }

    #[inline]
    pub fn default_niterations() -> usize {
        100
    }

    #[inline]
    pub fn default_damping_onset() -> usize {
        50
    }

    #[inline]
    pub fn default_thermal_rate() -> f64 {
        1e-4
    }

    #[inline]
    pub fn default_thresholds() -> ConvergenceThresholds {
        ConvergenceThresholds::with_exact(0.9999)
    }

    pub fn doc() -> &'static str {
        DOC
    }

    fn climb(&self) -> Climb {
        Climb {
            niterations: self.niterations,
            scale: self.scale,
            damping_onset: Some(self.damping_onset),
            rule: StepRule::Symmetric,
            thresholds: self.thresholds,
            stop_on_stall: false,
        }
    }
}

impl Default for ThermalReversionOptimizer {
    fn default() -> Self {
        Self::new(
            Self::default_step(),
            Self::default_scale(),
            Self::default_niterations(),
            Self::default_damping_onset(),
            Self::default_thermal_rate(),
            Self::default_thresholds(),
        )
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "ThermalReversion")]
struct ThermalReversionParameters {
    step: f64,
    scale: f64,
    niterations: usize,
    damping_onset: usize,
    thermal_rate: f64,
    thresholds: ConvergenceThresholds,
}

impl From<ThermalReversionOptimizer> for ThermalReversionParameters {
    fn from(f: ThermalReversionOptimizer) -> Self {
        Self {
            step: f.step,
            scale: f.scale,
            niterations: f.niterations,
            damping_onset: f.damping_onset,
            thermal_rate: f.thermal_rate,
            thresholds: f.thresholds,
        }
    }
}

impl TryFrom<ThermalReversionParameters> for ThermalReversionOptimizer {
    type Error = InputDataError;

    fn try_from(p: ThermalReversionParameters) -> Result<Self, Self::Error> {
        super::check_climb_settings(p.step, p.scale, p.niterations)?;
        if p.damping_onset == 0 {
            return Err(InputDataError::InvalidParameter(
                "damping onset must be positive",
            ));
        }
        if !(p.thermal_rate > 0.0 && p.thermal_rate.is_finite()) {
            return Err(InputDataError::InvalidParameter(
                "seed rate constant must be positive",
            ));
        }
        Ok(Self::new(
            p.step,
            p.scale,
            p.niterations,
            p.damping_onset,
            p.thermal_rate,
            p.thresholds,
        ))
    }
}

impl JointOptimizerTrait for ThermalReversionOptimizer {
    fn optimize(
        &self,
        trace: &KineticTrace,
        params: &ExperimentParameters,
        start: &JointStart,
    ) -> Result<JointFit, AnalysisError> {
        params.validate()?;
        let model = ThermalReversionModel::from_trace(
            trace,
            params,
            start.photon_flux,
            FixedStepIntegrator::new(self.step),
        );
        let (thermal_rate, thermal_rate_fixed) = match params.thermal_rate {
            Some(k) => (k, true),
            None => (self.thermal_rate, false),
        };
        self.climb().run(
            &model,
            trace,
            [start.quantum_yield, thermal_rate],
            [start.quantum_yield_fixed, thermal_rate_fixed],
            start.photon_flux,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ConvergenceTier;
    use crate::joint::JointOptimizer;
    use crate::primary_fit::PrimaryFitter;
    use crate::tests::*;

    use approx::assert_relative_eq;

    fn optimizer_with_seed(thermal_rate: f64) -> ThermalReversionOptimizer {
        ThermalReversionOptimizer::new(
            ThermalReversionOptimizer::default_step(),
            ThermalReversionOptimizer::default_scale(),
            ThermalReversionOptimizer::default_niterations(),
            ThermalReversionOptimizer::default_damping_onset(),
            thermal_rate,
            ThermalReversionOptimizer::default_thresholds(),
        )
    }

    #[test]
    fn zero_fixed_rate_reproduces_primary_estimate() {
        let params = ExperimentParameters {
            thermal_rate: Some(0.0),
            ..experiment_parameters()
        };
        let trace = trace_from(&closed_form_scenario(0.3).to_text(), &params);
        let primary = PrimaryFitter::default().fit(&trace, &params).unwrap();
        let start = JointStart {
            quantum_yield: 1.1 * primary.quantum_yield,
            ..JointStart::from_primary(&params, &primary)
        };

        let fit = ThermalReversionOptimizer::default()
            .optimize(&trace, &params, &start)
            .unwrap();
        assert_eq!(fit.secondary(), 0.0);
        assert_relative_eq!(fit.quantum_yield(), primary.quantum_yield, max_relative = 0.01);
        assert!(fit.goodness.tight_r2 >= 0.995);
        assert_eq!(fit.tier, ConvergenceTier::Exact);
        assert!(fit.niterations < 10);
    }

    #[test]
    fn recovers_rate_constant() {
        let params = thermal_parameters();
        let trace = trace_from(&thermal_scenario(0.3, 2e-3).to_text(), &params);
        let primary = PrimaryFitter::default().fit(&trace, &params).unwrap();
        let start = JointStart::from_primary(&params, &primary);

        let fit = optimizer_with_seed(1e-3)
            .optimize(&trace, &params, &start)
            .unwrap();
        assert!(fit.converged);
        assert_eq!(fit.names, ["qy", "k"]);
        assert_relative_eq!(fit.quantum_yield(), 0.3, max_relative = 0.05);
        assert_relative_eq!(fit.secondary(), 2e-3, max_relative = 0.05);
        assert!(fit.goodness.tight_r2 >= 0.9999);
    }

    #[test]
    fn iteration_cap_keeps_best_estimate() {
        let params = thermal_parameters();
        let trace = trace_from(&thermal_scenario(0.3, 2e-3).to_text(), &params);
        let primary = PrimaryFitter::default().fit(&trace, &params).unwrap();
        let start = JointStart::from_primary(&params, &primary);

        let fit = ThermalReversionOptimizer::default()
            .optimize(&trace, &params, &start)
            .unwrap();
        assert!(!fit.converged);
        assert_eq!(fit.niterations, ThermalReversionOptimizer::default_niterations());
        assert_eq!(fit.history.len(), fit.niterations);
        assert!(fit.secondary() > ThermalReversionOptimizer::default_thermal_rate());
        assert!(fit.goodness.ssr < fit.history[0].goodness.ssr);
    }

    #[test]
    fn deterministic() {
        let params = thermal_parameters();
        let trace = trace_from(&thermal_scenario(0.3, 2e-3).to_text(), &params);
        let start = JointStart {
            quantum_yield: 0.28,
            quantum_yield_fixed: false,
            photon_flux: 5e14,
        };
        let optimizer = optimizer_with_seed(1e-3);
        let a = optimizer.optimize(&trace, &params, &start).unwrap();
        let b = optimizer.optimize(&trace, &params, &start).unwrap();
        assert_eq!(a.history, b.history);
        assert_eq!(a.parameters, b.parameters);
    }

    #[test]
    fn optimizer_enum_serialization() {
        let optimizer: JointOptimizer = ThermalReversionOptimizer::default().into();
        let json = serde_json::to_string(&optimizer).unwrap();
        assert!(json.contains("ThermalReversion"));
        let back: JointOptimizer = serde_json::from_str(&json).unwrap();
        assert_eq!(optimizer, back);
    }

    #[test]
    fn invalid_settings_are_rejected_on_deserialization() {
        let valid = serde_json::to_value(ThermalReversionOptimizer::default()).unwrap();
        for (field, value) in [("step", 0.0), ("scale", 0.0), ("thermal_rate", -1e-4)] {
            let mut json = valid.clone();
            json[field] = value.into();
            let result = serde_json::from_value::<ThermalReversionOptimizer>(json);
            assert!(result.is_err(), "{field} = {value} was accepted");
        }
        let mut json = valid.clone();
        json["damping_onset"] = 0.into();
        assert!(serde_json::from_value::<ThermalReversionOptimizer>(json).is_err());
    }

    #[test]
    fn zero_step_in_enum_is_rejected() {
        let optimizer: JointOptimizer = ThermalReversionOptimizer::default().into();
        let mut json = serde_json::to_value(&optimizer).unwrap();
        assert_eq!(json["ThermalReversion"]["step"], 0.2);
        json["ThermalReversion"]["step"] = 0.0.into();
        let result = serde_json::from_value::<JointOptimizer>(json);
        assert!(result.is_err());
    }
}
