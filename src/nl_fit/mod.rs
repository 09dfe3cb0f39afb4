//! Non-linear least-squares infrastructure for the primary fit
//!
//! Models are plain closures `Fn(t, &[f64; NPARAMS]) -> Result<f64, NumericalDegeneracy>`
//! evaluated on unweighted [Data](data::Data). [CurveFitTrait] is the seam between a model and an
//! optimisation algorithm; [LmCurveFit] is the bounded Levenberg–Marquardt implementation used by
//! [PrimaryFitter](crate::PrimaryFitter).

mod bounds;
pub(crate) use bounds::active_bound;

pub mod curve_fit;
pub use curve_fit::{CurveFitResult, CurveFitTrait};

pub mod data;

pub mod lm;
pub use lm::LmCurveFit;
