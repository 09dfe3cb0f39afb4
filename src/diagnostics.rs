use crate::error::{InputDataError, NumericalDegeneracy};
use crate::types::{Array1f, ArrayView1f};

use ndarray::Zip;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Agreement between a measured and a predicted trace
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GoodnessOfFit {
    /// Squared Pearson correlation coefficient, insensitive to scale and offset
    pub loose_r2: f64,
    /// Coefficient of determination `1 - SSR/SST`
    pub tight_r2: f64,
    /// Sum of squared residuals
    pub ssr: f64,
}

/// Output of the diagnostics reporter for one comparison
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostics {
    pub goodness: GoodnessOfFit,
    /// `measured - predicted`
    pub residuals: Array1f,
}

/// Compare a measured trace with a model prediction
///
/// A non-finite prediction fails the comparison instead of producing a NaN R².
pub fn diagnose(
    measured: ArrayView1f,
    predicted: ArrayView1f,
) -> Result<Diagnostics, NumericalDegeneracy> {
    assert_eq!(
        measured.len(),
        predicted.len(),
        "measured and predicted traces should have the same size"
    );
    if !predicted.iter().all(|x| x.is_finite()) {
        return Err(NumericalDegeneracy::NonFinitePrediction);
    }

    let residuals = Zip::from(&measured)
        .and(&predicted)
        .map_collect(|&m, &p| m - p);
    let ssr = residuals.dot(&residuals);

    let n = measured.len() as f64;
    let m_mean = measured.sum() / n;
    let p_mean = predicted.sum() / n;
    let (smm, spp, smp) = Zip::from(&measured).and(&predicted).fold(
        (0.0, 0.0, 0.0),
        |(smm, spp, smp), &m, &p| {
            let dm = m - m_mean;
            let dp = p - p_mean;
            (smm + dm * dm, spp + dp * dp, smp + dm * dp)
        },
    );

    let loose_r2 = if smm > 0.0 && spp > 0.0 {
        smp * smp / (smm * spp)
    } else {
        0.0
    };
    let tight_r2 = if smm > 0.0 {
        1.0 - ssr / smm
    } else if ssr == 0.0 {
        1.0
    } else {
        0.0
    };

    Ok(Diagnostics {
        goodness: GoodnessOfFit {
            loose_r2,
            tight_r2,
            ssr,
        },
        residuals,
    })
}

/// Sum of squared residuals, failing on a non-finite prediction
pub fn sum_squared_residuals(
    measured: ArrayView1f,
    predicted: ArrayView1f,
) -> Result<f64, NumericalDegeneracy> {
    let ssr = Zip::from(&measured)
        .and(&predicted)
        .fold(0.0, |acc, &m, &p| acc + (m - p).powi(2));
    if ssr.is_finite() {
        Ok(ssr)
    } else {
        Err(NumericalDegeneracy::NonFinitePrediction)
    }
}

/// How close an optimizer got to the measured trace
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum ConvergenceTier {
    None,
    Loose,
    Tight,
    Exact,
}

impl ConvergenceTier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "not converged",
            Self::Loose => "loose converged",
            Self::Tight => "tight converged",
            Self::Exact => "exact",
        }
    }
}

impl fmt::Display for ConvergenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// R² thresholds of the convergence tiers
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(
    into = "ConvergenceThresholdsParameters",
    try_from = "ConvergenceThresholdsParameters"
)]
pub struct ConvergenceThresholds {
    pub loose: f64,
    pub tight: f64,
    pub exact: f64,
}

impl ConvergenceThresholds {
    pub fn new(loose: f64, tight: f64, exact: f64) -> Self {
        assert!(tight <= exact, "exact threshold must not be below the tight one");
        Self {
            loose,
            tight,
            exact,
        }
    }

    #[inline]
    pub fn default_loose() -> f64 {
        0.995
    }

    #[inline]
    pub fn default_tight() -> f64 {
        0.995
    }

    /// Thresholds with the default loose and tight levels
    pub fn with_exact(exact: f64) -> Self {
        Self::new(Self::default_loose(), Self::default_tight(), exact)
    }

    pub fn classify(&self, goodness: &GoodnessOfFit) -> ConvergenceTier {
        if goodness.tight_r2 >= self.exact {
            ConvergenceTier::Exact
        } else if goodness.tight_r2 >= self.tight {
            ConvergenceTier::Tight
        } else if goodness.loose_r2 >= self.loose {
            ConvergenceTier::Loose
        } else {
            ConvergenceTier::None
        }
    }
}

#[derive(Serialize, Deserialize, JsonSchema)]
#[serde(rename = "ConvergenceThresholds")]
struct ConvergenceThresholdsParameters {
    loose: f64,
    tight: f64,
    exact: f64,
}

impl From<ConvergenceThresholds> for ConvergenceThresholdsParameters {
    fn from(t: ConvergenceThresholds) -> Self {
        Self {
            loose: t.loose,
            tight: t.tight,
            exact: t.exact,
        }
    }
}

impl TryFrom<ConvergenceThresholdsParameters> for ConvergenceThresholds {
    type Error = InputDataError;

    fn try_from(p: ConvergenceThresholdsParameters) -> Result<Self, Self::Error> {
        if ![p.loose, p.tight, p.exact].iter().all(|x| x.is_finite()) {
            return Err(InputDataError::InvalidParameter(
                "convergence thresholds must be finite",
            ));
        }
        if p.tight > p.exact {
            return Err(InputDataError::InvalidParameter(
                "exact threshold must not be below the tight one",
            ));
        }
        Ok(Self::new(p.loose, p.tight, p.exact))
    }
}
