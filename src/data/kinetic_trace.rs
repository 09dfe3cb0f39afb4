use crate::data::SpectralDataset;
use crate::error::InputDataError;
use crate::parameters::ExperimentParameters;
use crate::types::{Array1f, ArrayView1f};

use ndarray::{Zip, s};
use std::ops::Range;

/// Baseline-corrected absorbance time series at the monitored wavelengths
///
/// Time is measured from the first sample of the analysis window. The apparent extinction
/// coefficients are calibrated from the first corrected sample rather than taken from the
/// literature, so the models reproduce the measured starting absorbance exactly.
#[derive(Clone, Debug, PartialEq)]
pub struct KineticTrace {
    pub t: Array1f,
    pub analysis: Array1f,
    pub excitation: Array1f,
    /// Axis wavelength actually used for the analysis column, nm
    pub analysis_wavelength: f64,
    /// Axis wavelength actually used for the excitation column, nm
    pub excitation_wavelength: f64,
    /// Apparent reactant extinction coefficient at the analysis wavelength, M⁻¹cm⁻¹
    pub apparent_epsilon_analysis: f64,
    /// Apparent reactant extinction coefficient at the excitation wavelength, M⁻¹cm⁻¹
    pub apparent_epsilon_excitation: f64,
    pub path_length: f64,
}

impl KineticTrace {
    /// Minimum number of samples a trace needs to be fitted
    pub const MIN_LENGTH: usize = 2;

    pub fn extract(
        dataset: &SpectralDataset,
        params: &ExperimentParameters,
    ) -> Result<Self, InputDataError> {
        let window = params.window.range(dataset.lenu())?;
        if window.len() < Self::MIN_LENGTH {
            return Err(InputDataError::ShortTrace {
                actual: window.len(),
                minimum: Self::MIN_LENGTH,
            });
        }

        let zero_index = dataset.nearest_wavelength_index(params.wavelengths.zero_reference);
        let analysis_index = dataset.nearest_wavelength_index(params.wavelengths.analysis);
        let excitation_index = dataset.nearest_wavelength_index(params.wavelengths.excitation);
        let analysis_wavelength = dataset.wavelengths()[analysis_index];
        let excitation_wavelength = dataset.wavelengths()[excitation_index];

        let analysis = Self::extract_column(dataset, analysis_index, zero_index, window.clone());
        let excitation =
            Self::extract_column(dataset, excitation_index, zero_index, window.clone());

        let t0 = dataset.time()[window.start];
        let t = dataset.time().slice(s![window]).mapv(|t| t - t0);

        let calibration = params.starting_concentration * params.path_length;
        let apparent_epsilon_analysis =
            Self::apparent_epsilon(analysis[0], calibration, analysis_wavelength)?;
        let apparent_epsilon_excitation =
            Self::apparent_epsilon(excitation[0], calibration, excitation_wavelength)?;

        Ok(Self {
            t,
            analysis,
            excitation,
            analysis_wavelength,
            excitation_wavelength,
            apparent_epsilon_analysis,
            apparent_epsilon_excitation,
            path_length: params.path_length,
        })
    }

    /// Absorbance of column `index` minus the zero-reference column at the same timestamp
    pub fn extract_column(
        dataset: &SpectralDataset,
        index: usize,
        zero_index: usize,
        window: Range<usize>,
    ) -> Array1f {
        let column = dataset.column(index);
        let zero = dataset.column(zero_index);
        Zip::from(column.slice(s![window.clone()]))
            .and(zero.slice(s![window]))
            .map_collect(|&a, &a0| a - a0)
    }

    fn apparent_epsilon(
        first: f64,
        calibration: f64,
        wavelength: f64,
    ) -> Result<f64, InputDataError> {
        if first > 0.0 {
            Ok(first / calibration)
        } else {
            Err(InputDataError::NonPositiveFirstSample {
                wavelength,
                value: first,
            })
        }
    }

    #[inline]
    pub fn lenu(&self) -> usize {
        self.t.len()
    }

    /// Decadic absorbance per mol/L of reactant at the analysis wavelength
    #[inline]
    pub fn absorptivity_analysis(&self) -> f64 {
        self.apparent_epsilon_analysis * self.path_length
    }

    /// Decadic absorbance per mol/L of reactant at the excitation wavelength
    #[inline]
    pub fn absorptivity_excitation(&self) -> f64 {
        self.apparent_epsilon_excitation * self.path_length
    }

    /// First `n` samples of time and analysis absorbance
    pub fn head(&self, n: usize) -> (ArrayView1f<'_>, ArrayView1f<'_>) {
        let n = n.min(self.lenu());
        (self.t.slice(s![..n]), self.analysis.slice(s![..n]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{AnalysisWindow, Wavelengths};
    use crate::tests::experiment_parameters;

    use approx::assert_relative_eq;

    fn dataset() -> SpectralDataset {
        // drifting zero reference at 700 nm
        "\
meta
1 1 1 1
300 320 365 700
10.0 0 0.61 0.55 1.05 0.05
11.0 0 0.58 0.52 0.99 0.06
12.0 0 0.56 0.49 0.95 0.08
13.0 0 0.55 0.47 0.92 0.09
"
        .parse()
        .unwrap()
    }

    fn params() -> ExperimentParameters {
        ExperimentParameters {
            starting_concentration: 5e-5,
            path_length: 1.0,
            wavelengths: Wavelengths {
                excitation: 366.0,
                analysis: 321.0,
                zero_reference: 690.0,
            },
            ..experiment_parameters()
        }
    }

    #[test]
    fn baseline_is_subtracted() {
        let trace = KineticTrace::extract(&dataset(), &params()).unwrap();
        assert_eq!(trace.analysis_wavelength, 320.0);
        assert_eq!(trace.excitation_wavelength, 365.0);
        assert_eq!(trace.t.to_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        let expected_analysis = [0.50, 0.46, 0.41, 0.38];
        for (actual, desired) in trace.analysis.iter().zip(expected_analysis) {
            assert_relative_eq!(*actual, desired, epsilon = 1e-12);
        }
        assert_relative_eq!(trace.excitation[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn apparent_epsilon_from_first_sample() {
        let trace = KineticTrace::extract(&dataset(), &params()).unwrap();
        assert_relative_eq!(trace.apparent_epsilon_analysis, 0.5 / 5e-5, max_relative = 1e-12);
        assert_relative_eq!(trace.apparent_epsilon_excitation, 1.0 / 5e-5, max_relative = 1e-12);
        assert_relative_eq!(trace.absorptivity_analysis(), 1e4, max_relative = 1e-12);
    }

    #[test]
    fn window_shifts_time_origin() {
        let params = ExperimentParameters {
            window: AnalysisWindow::new(1, Some(3)),
            ..params()
        };
        let trace = KineticTrace::extract(&dataset(), &params).unwrap();
        assert_eq!(trace.lenu(), 2);
        assert_eq!(trace.t.to_vec(), vec![0.0, 1.0]);
        assert_relative_eq!(trace.analysis[0], 0.46, epsilon = 1e-12);
    }

    #[test]
    fn too_short_window() {
        let params = ExperimentParameters {
            window: AnalysisWindow::new(3, None),
            ..params()
        };
        assert_eq!(
            KineticTrace::extract(&dataset(), &params),
            Err(InputDataError::ShortTrace {
                actual: 1,
                minimum: 2
            })
        );
    }

    #[test]
    fn non_positive_first_sample() {
        let params = ExperimentParameters {
            wavelengths: Wavelengths {
                analysis: 700.0,
                ..params().wavelengths
            },
            ..params()
        };
        assert!(matches!(
            KineticTrace::extract(&dataset(), &params),
            Err(InputDataError::NonPositiveFirstSample { .. })
        ));
    }

    #[test]
    fn head_is_clipped() {
        let trace = KineticTrace::extract(&dataset(), &params()).unwrap();
        let (t, a) = trace.head(10);
        assert_eq!(t.len(), 4);
        assert_eq!(a.len(), 4);
        let (t, _) = trace.head(2);
        assert_eq!(t.to_vec(), vec![0.0, 1.0]);
    }
}
