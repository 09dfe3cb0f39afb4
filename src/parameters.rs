use crate::error::InputDataError;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Avogadro constant, 1/mol
pub const AVOGADRO: f64 = 6.022_140_76e23;

/// Which of the two actinometric constants is estimated from the trace
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum Unknown {
    QuantumYield,
    PhotonFlux,
}

impl Unknown {
    pub fn name(&self) -> &'static str {
        match self {
            Self::QuantumYield => "quantum yield",
            Self::PhotonFlux => "photon flux",
        }
    }
}

/// Monitored wavelengths, nm
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Wavelengths {
    pub excitation: f64,
    pub analysis: f64,
    pub zero_reference: f64,
}

/// Half-open range `[start, end)` of timestamp indices used for the analysis
///
/// `end == None` means "up to the last sample".
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub start: usize,
    pub end: Option<usize>,
}

impl AnalysisWindow {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// Resolve the window against a dataset of `len` samples
    pub fn range(&self, len: usize) -> Result<std::ops::Range<usize>, InputDataError> {
        let end = self.end.unwrap_or(len);
        if self.start >= end || end > len {
            return Err(InputDataError::WindowOutOfRange {
                start: self.start,
                end,
                len,
            });
        }
        Ok(self.start..end)
    }
}

/// Literature extinction coefficient of the reactant, M⁻¹cm⁻¹, at a given wavelength, nm
#[derive(Clone, Copy, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ReferenceEpsilon {
    pub value: f64,
    pub wavelength: f64,
}

/// Operator-supplied description of one irradiation experiment
///
/// Constructed once per analysis and never mutated by the engine. Concentrations are in mol/L,
/// path length in cm, volume in L, photon flux in photons/s and extinction coefficients in
/// M⁻¹cm⁻¹. Exactly one of `quantum_yield` and `photon_flux` must be `None`: that one is the
/// unknown to estimate.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExperimentParameters {
    pub quantum_yield: Option<f64>,
    pub photon_flux: Option<f64>,
    pub starting_concentration: f64,
    pub path_length: f64,
    pub volume: f64,
    #[serde(default)]
    pub led_current: Option<f64>,
    pub wavelengths: Wavelengths,
    #[serde(default)]
    pub reactant_epsilon: Option<ReferenceEpsilon>,
    /// Overrides the apparent (first-sample) reactant coefficient in the joint optimizers
    #[serde(default)]
    pub reactant_epsilon_excitation: Option<f64>,
    /// Overrides the apparent (first-sample) reactant coefficient in the joint optimizers
    #[serde(default)]
    pub reactant_epsilon_analysis: Option<f64>,
    #[serde(default)]
    pub product_epsilon_excitation: f64,
    #[serde(default)]
    pub product_epsilon_analysis: f64,
    pub seed_points: usize,
    #[serde(default)]
    pub window: AnalysisWindow,
    /// Fixed first-order thermal back-conversion rate, 1/s
    #[serde(default)]
    pub thermal_rate: Option<f64>,
}

impl ExperimentParameters {
    /// Check physical sanity and return the unknown to estimate
    pub fn validate(&self) -> Result<Unknown, InputDataError> {
        fn positive(x: f64) -> bool {
            x.is_finite() && x > 0.0
        }

        if !positive(self.starting_concentration) {
            return Err(InputDataError::InvalidParameter(
                "starting concentration must be positive",
            ));
        }
        if !positive(self.path_length) {
            return Err(InputDataError::InvalidParameter(
                "path length must be positive",
            ));
        }
        if !positive(self.volume) {
            return Err(InputDataError::InvalidParameter("volume must be positive"));
        }
        if self.seed_points < 2 {
            return Err(InputDataError::InvalidParameter(
                "at least two seed points are required",
            ));
        }
        if !(self.product_epsilon_excitation.is_finite()
            && self.product_epsilon_analysis.is_finite())
        {
            return Err(InputDataError::InvalidParameter(
                "product extinction coefficients must be finite",
            ));
        }
        if let Some(k) = self.thermal_rate {
            if !k.is_finite() || k < 0.0 {
                return Err(InputDataError::InvalidParameter(
                    "thermal rate must be non-negative",
                ));
            }
        }
        match (self.quantum_yield, self.photon_flux) {
            (None, Some(flux)) if positive(flux) => Ok(Unknown::QuantumYield),
            (Some(qy), None) if qy.is_finite() && qy != 0.0 => Ok(Unknown::PhotonFlux),
            (None, Some(_)) => Err(InputDataError::InvalidParameter(
                "photon flux must be positive",
            )),
            (Some(_), None) => Err(InputDataError::InvalidParameter(
                "quantum yield must be finite and non-zero",
            )),
            (Some(_), Some(_)) => Err(InputDataError::InvalidParameter(
                "one of quantum yield and photon flux must be unknown",
            )),
            (None, None) => Err(InputDataError::InvalidParameter(
                "one of quantum yield and photon flux must be known",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::experiment_parameters;

    #[test]
    fn unknown_is_the_missing_value() {
        let params = experiment_parameters();
        assert_eq!(params.validate(), Ok(Unknown::QuantumYield));

        let params = ExperimentParameters {
            quantum_yield: Some(0.3),
            photon_flux: None,
            ..experiment_parameters()
        };
        assert_eq!(params.validate(), Ok(Unknown::PhotonFlux));
    }

    #[test]
    fn both_or_none_fixed_is_rejected() {
        let both = ExperimentParameters {
            quantum_yield: Some(0.3),
            ..experiment_parameters()
        };
        assert!(matches!(
            both.validate(),
            Err(InputDataError::InvalidParameter(_))
        ));

        let none = ExperimentParameters {
            photon_flux: None,
            ..experiment_parameters()
        };
        assert!(matches!(
            none.validate(),
            Err(InputDataError::InvalidParameter(_))
        ));
    }

    #[test]
    fn single_seed_point_is_rejected() {
        let params = ExperimentParameters {
            seed_points: 1,
            ..experiment_parameters()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn window_range() {
        assert_eq!(AnalysisWindow::new(2, None).range(10), Ok(2..10));
        assert_eq!(AnalysisWindow::new(0, Some(5)).range(10), Ok(0..5));
        assert_eq!(
            AnalysisWindow::new(5, Some(5)).range(10),
            Err(InputDataError::WindowOutOfRange {
                start: 5,
                end: 5,
                len: 10
            })
        );
        assert!(AnalysisWindow::new(0, Some(11)).range(10).is_err());
    }

    #[test]
    fn json_deserialization_fills_defaults() {
        let json = r#"{
            "quantum_yield": null,
            "photon_flux": 5e14,
            "starting_concentration": 5e-5,
            "path_length": 1.0,
            "volume": 0.001,
            "wavelengths": {"excitation": 365.0, "analysis": 320.0, "zero_reference": 700.0},
            "seed_points": 20
        }"#;
        let params: ExperimentParameters = serde_json::from_str(json).unwrap();
        assert_eq!(params.window, AnalysisWindow::default());
        assert_eq!(params.product_epsilon_analysis, 0.0);
        assert_eq!(params.thermal_rate, None);
        assert_eq!(params.validate(), Ok(Unknown::QuantumYield));

        let round_trip: ExperimentParameters =
            serde_json::from_str(&serde_json::to_string(&params).unwrap()).unwrap();
        assert_eq!(round_trip, params);
    }
}
