use crate::data::KineticTrace;
use crate::diagnostics::ConvergenceThresholds;
use crate::error::{AnalysisError, InputDataError};
use crate::joint::{Climb, JointFit, JointOptimizerTrait, JointStart, StepRule};
use crate::kinetics::{FixedStepIntegrator, ProductAbsorptionModel};
use crate::parameters::ExperimentParameters;

use macro_const::macro_const;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_const! {
    const DOC: &str = r#"
Joint refinement of the reactant and photoproduct quantum yields

The integrated [ProductAbsorptionModel](crate::kinetics::ProductAbsorptionModel) is compared with
the whole trace. Every iteration each free yield is multiplied by $1 \pm s$, the one-sided
differences of the sum of squared residuals are compared and the parameter moves in the
direction with the larger decrease. Both moves are decided from the same point and applied
together. Iterations stop at the exact tier ($R^2_\mathrm{tight} \geq 0.999$ by default), when
no parameter moves, or at the iteration cap.

Photon flux and the thermal rate constant are held at their known values.
"#;
}

#[doc = DOC!()]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(
    rename = "ProductAbsorption",
    into = "ProductAbsorptionParameters",
    try_from = "ProductAbsorptionParameters"
)]
pub struct ProductAbsorptionOptimizer {
    /// Integration step, s
    step: f64,
    /// Relative perturbation of a parameter per iteration
    scale: f64,
    niterations: usize,
    /// Starting photoproduct quantum yield
    product_quantum_yield: f64,
    thresholds: ConvergenceThresholds,
}

impl ProductAbsorptionOptimizer {
    pub fn new(
        step: f64,
        scale: f64,
        niterations: usize,
        product_quantum_yield: f64,
        thresholds: ConvergenceThresholds,
    ) -> Self {
        assert!(step > 0.0, "integration step must be positive");
        assert!(
            scale > 0.0 && scale < 1.0,
            "relative perturbation must be in (0, 1)"
        );
        assert!(niterations > 0, "at least one iteration is required");
        Self {
            step,
            scale,
            niterations,
            product_quantum_yield,
            thresholds,
        }
    }

    #[inline]
    pub fn default_step() -> f64 {
        1.0
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
    pub fn default_product_quantum_yield() -> f64 {
        0.5
    }

    #[inline]
    pub fn default_thresholds() -> ConvergenceThresholds {
        ConvergenceThresholds::with_exact(0.999)
    }

    pub fn doc() -> &'static str {
        DOC
    }

    fn climb(&self) -> Climb {
        Climb {
            niterations: self.niterations,
            scale: self.scale,
            damping_onset: None,
            rule: StepRule::OneSided,
            thresholds: self.thresholds,
            stop_on_stall: true,
        }
    }
}

impl Default for ProductAbsorptionOptimizer {
    fn default() -> Self {
        Self::new(
            Self::default_step(),
            Self::default_scale(),
            Self::default_niterations(),
            Self::default_product_quantum_yield(),
            Self::default_thresholds(),
        )
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "ProductAbsorption")]
struct ProductAbsorptionParameters {
    step: f64,
    scale: f64,
    niterations: usize,
    product_quantum_yield: f64,
    thresholds: ConvergenceThresholds,
}

impl From<ProductAbsorptionOptimizer> for ProductAbsorptionParameters {
    fn from(f: ProductAbsorptionOptimizer) -> Self {
        Self {
            step: f.step,
            scale: f.scale,
            niterations: f.niterations,
            product_quantum_yield: f.product_quantum_yield,
            thresholds: f.thresholds,
        }
    }
}

impl TryFrom<ProductAbsorptionParameters> for ProductAbsorptionOptimizer {
    type Error = InputDataError;

    fn try_from(p: ProductAbsorptionParameters) -> Result<Self, Self::Error> {
        super::check_climb_settings(p.step, p.scale, p.niterations)?;
        if !p.product_quantum_yield.is_finite() {
            return Err(InputDataError::InvalidParameter(
                "seed photoproduct quantum yield must be finite",
            ));
        }
        Ok(Self::new(
            p.step,
            p.scale,
            p.niterations,
            p.product_quantum_yield,
            p.thresholds,
        ))
    }
}

impl JointOptimizerTrait for ProductAbsorptionOptimizer {
    fn optimize(
        &self,
        trace: &KineticTrace,
        params: &ExperimentParameters,
        start: &JointStart,
    ) -> Result<JointFit, AnalysisError> {
        params.validate()?;
        let model = ProductAbsorptionModel::from_trace(
            trace,
            params,
            start.photon_flux,
            FixedStepIntegrator::new(self.step),
        );
        self.climb().run(
            &model,
            trace,
            [start.quantum_yield, self.product_quantum_yield],
            [start.quantum_yield_fixed, false],
            start.photon_flux,
        )
    }
}
