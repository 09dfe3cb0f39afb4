//! Rate laws of the photoreaction and their solutions
//!
//! [ClosedFormDecay] is the analytic solution used by the primary fit. The two integrated
//! models extend it with an absorbing photoproduct ([ProductAbsorptionModel]) or thermal
//! back-conversion ([ThermalReversionModel]); both are solved with [FixedStepIntegrator] and
//! implement [JointModel] so the joint optimizers can treat them uniformly.

use crate::error::NumericalDegeneracy;
use crate::types::{Array1f, ArrayView1f};

mod closed_form;
pub use closed_form::{BRANCH_INDEX, ClosedFormDecay};

mod integrator;
pub use integrator::FixedStepIntegrator;

mod product_absorption;
pub use product_absorption::{MIN_TOTAL_ABSORBANCE, ProductAbsorptionModel};

mod thermal;
pub use thermal::ThermalReversionModel;

/// Absorbance model with two adjustable parameters
pub trait JointModel {
    /// Names used in iteration logs
    const PARAMETER_NAMES: [&'static str; 2];

    /// Predicted analysis-wavelength absorbance at times `t`
    fn evaluate(
        &self,
        t: ArrayView1f,
        parameters: [f64; 2],
    ) -> Result<Array1f, NumericalDegeneracy>;
}
