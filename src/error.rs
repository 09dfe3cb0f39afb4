/// Structural problems with a measurement file, the analysis window or the parameters
///
/// These abort the current run and are surfaced to the caller verbatim.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InputDataError {
    #[error("measurement file is empty")]
    EmptyFile,

    #[error("measurement file has no {0} row")]
    MissingHeader(&'static str),

    #[error("line {line}: cannot parse value: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: expected {expected} columns, found {actual}")]
    ColumnCount {
        line: usize,
        expected: usize,
        actual: usize,
    },

    #[error("reference row has {actual} values, wavelength axis has {expected}")]
    ReferenceLength { expected: usize, actual: usize },

    #[error("wavelength axis is empty")]
    EmptyWavelengthAxis,

    #[error("elapsed time is not strictly increasing at sample {index}")]
    NonIncreasingTime { index: usize },

    #[error("line {line}: non-finite value")]
    NonFinite { line: usize },

    #[error("analysis window [{start}, {end}) is out of range for {len} samples")]
    WindowOutOfRange { start: usize, end: usize, len: usize },

    #[error("kinetic trace length {actual} is smaller than the minimum required length {minimum}")]
    ShortTrace { actual: usize, minimum: usize },

    #[error("first baseline-corrected sample at {wavelength} nm is {value}, must be positive")]
    NonPositiveFirstSample { wavelength: f64, value: f64 },

    #[error("invalid experiment parameter: {0}")]
    InvalidParameter(&'static str),
}

/// The primary nonlinear fit could not produce a usable estimate
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ModelDivergenceError {
    #[error("covariance is singular, the model does not depend on the fitted parameter")]
    SingularCovariance,

    #[error("covariance is not finite")]
    NonFiniteCovariance,

    #[error("solver stopped after {niterations} evaluations without converging")]
    NotConverged { niterations: usize },

    #[error("solution {value} is at the search bound {bound}")]
    AtBound { value: f64, bound: f64 },

    #[error("model produced a non-finite value: {0}")]
    NonFiniteModel(NumericalDegeneracy),
}

/// A model evaluation left the domain where it is defined
///
/// Raised at the point of evaluation so that a non-finite number never reaches residual or
/// goodness-of-fit arithmetic.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq)]
pub enum NumericalDegeneracy {
    #[error("logarithm argument is not positive")]
    NonPositiveLogArgument,

    #[error("total absorbance {0} is too small to apportion photons")]
    VanishingAbsorption(f64),

    #[error("integrated state is not finite at t = {time}")]
    NonFiniteState { time: f64 },

    #[error("predicted absorbance is not finite")]
    NonFinitePrediction,
}

impl From<NumericalDegeneracy> for ModelDivergenceError {
    fn from(value: NumericalDegeneracy) -> Self {
        Self::NonFiniteModel(value)
    }
}

/// Error returned from [crate::analyze]
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AnalysisError {
    #[error(transparent)]
    InputData(#[from] InputDataError),

    #[error(transparent)]
    ModelDivergence(#[from] ModelDivergenceError),
}
