use crate::data::{KineticTrace, SpectralDataset};
use crate::error::AnalysisError;
use crate::joint::{JointFit, JointOptimizer, JointOptimizerTrait, JointStart};
use crate::parameters::{ExperimentParameters, Unknown};
use crate::primary_fit::{PrimaryFit, PrimaryFitter};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

/// Supplied versus apparent reactant extinction coefficient at one wavelength
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EpsilonCheck {
    /// Axis wavelength the comparison was made at, nm
    pub wavelength: f64,
    pub supplied: f64,
    pub apparent: f64,
    /// `(apparent - supplied) / supplied`
    pub relative_difference: f64,
}

impl EpsilonCheck {
    /// Relative difference above which the coefficients disagree
    pub const TOLERANCE: f64 = 0.1;

    pub fn is_mismatch(&self) -> bool {
        !(self.relative_difference.abs() <= Self::TOLERANCE)
    }
}

/// Everything a single analysis produced
///
/// The primary result is always kept, also when a refinement ran.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisReport {
    pub trace: KineticTrace,
    pub primary: PrimaryFit,
    pub refined: Option<JointFit>,
    pub epsilon_check: Option<EpsilonCheck>,
    /// Photon flux per unit LED current, when flux is the unknown and the current is given
    pub flux_per_current: Option<f64>,
}

/// Extraction, primary fit and an optional joint refinement
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Analysis {
    #[serde(default)]
    pub primary: PrimaryFitter,
    #[serde(default)]
    pub refinement: Option<JointOptimizer>,
}

impl Analysis {
    pub fn new(primary: PrimaryFitter, refinement: Option<JointOptimizer>) -> Self {
        Self {
            primary,
            refinement,
        }
    }

    pub fn run(
        &self,
        dataset: &SpectralDataset,
        params: &ExperimentParameters,
    ) -> Result<AnalysisReport, AnalysisError> {
        let unknown = params.validate()?;
        let trace = KineticTrace::extract(dataset, params)?;
        let epsilon_check = check_epsilon(dataset, &trace, params);

        let primary = self.primary.fit(&trace, params)?;
        let flux_per_current = match (unknown, params.led_current) {
            (Unknown::PhotonFlux, Some(current)) if current > 0.0 => {
                Some(primary.photon_flux / current)
            }
            _ => None,
        };

        let refined = self
            .refinement
            .as_ref()
            .map(|optimizer| {
                let start = JointStart::from_primary(params, &primary);
                optimizer.optimize(&trace, params, &start)
            })
            .transpose()?;
        if let Some(refined) = &refined {
            log::info!(
                "refined {} = {:.6e}, {} = {:.6e} after {} iterations: {}",
                refined.names[0],
                refined.parameters[0],
                refined.names[1],
                refined.parameters[1],
                refined.niterations,
                refined.tier,
            );
        }

        Ok(AnalysisReport {
            trace,
            primary,
            refined,
            epsilon_check,
            flux_per_current,
        })
    }

    /// Parse a measurement file and analyze it
    pub fn run_reader<R: BufRead>(
        &self,
        reader: R,
        params: &ExperimentParameters,
    ) -> Result<AnalysisReport, AnalysisError> {
        let dataset = SpectralDataset::from_reader(reader)?;
        self.run(&dataset, params)
    }
}

/// Analyze with the default primary fitter
pub fn analyze(
    dataset: &SpectralDataset,
    params: &ExperimentParameters,
    refinement: Option<JointOptimizer>,
) -> Result<AnalysisReport, AnalysisError> {
    Analysis::new(PrimaryFitter::default(), refinement).run(dataset, params)
}

fn check_epsilon(
    dataset: &SpectralDataset,
    trace: &KineticTrace,
    params: &ExperimentParameters,
) -> Option<EpsilonCheck> {
    let reference = params.reactant_epsilon?;
    let wavelength = dataset.wavelengths()[dataset.nearest_wavelength_index(reference.wavelength)];
    let apparent = if wavelength == trace.analysis_wavelength {
        trace.apparent_epsilon_analysis
    } else if wavelength == trace.excitation_wavelength {
        trace.apparent_epsilon_excitation
    } else {
        log::info!(
            "reference extinction coefficient at {} nm is not at a monitored wavelength",
            reference.wavelength
        );
        return None;
    };
    let check = EpsilonCheck {
        wavelength,
        supplied: reference.value,
        apparent,
        relative_difference: (apparent - reference.value) / reference.value,
    };
    if check.is_mismatch() {
        log::warn!(
            "apparent extinction coefficient {:.4e} differs from the supplied {:.4e} \
             at {} nm by {:.1}%",
            check.apparent,
            check.supplied,
            check.wavelength,
            100.0 * check.relative_difference,
        );
    }
    Some(check)
}
