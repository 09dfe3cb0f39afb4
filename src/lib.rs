#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

mod analysis;
pub use analysis::{Analysis, AnalysisReport, EpsilonCheck, analyze};

mod data;
pub use data::{KineticTrace, SpectralDataset};

mod diagnostics;
pub use diagnostics::{
    ConvergenceThresholds, ConvergenceTier, Diagnostics, GoodnessOfFit, diagnose,
    sum_squared_residuals,
};

mod error;
pub use error::{AnalysisError, InputDataError, ModelDivergenceError, NumericalDegeneracy};

pub mod joint;
pub use joint::{
    IterationRecord, JointFit, JointOptimizer, JointOptimizerTrait, JointStart,
    ProductAbsorptionOptimizer, ThermalReversionOptimizer,
};

pub mod kinetics;
pub use kinetics::{
    ClosedFormDecay, FixedStepIntegrator, JointModel, ProductAbsorptionModel,
    ThermalReversionModel,
};

pub mod nl_fit;
pub use nl_fit::{CurveFitResult, CurveFitTrait, LmCurveFit};

mod parameters;
pub use parameters::{
    AVOGADRO, AnalysisWindow, ExperimentParameters, ReferenceEpsilon, Unknown, Wavelengths,
};

mod primary_fit;
pub use primary_fit::{PrimaryFit, PrimaryFitter};

mod types;

pub use ndarray;
