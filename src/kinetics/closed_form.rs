use crate::data::KineticTrace;
use crate::error::NumericalDegeneracy;
use crate::parameters::{AVOGADRO, ExperimentParameters};
use crate::types::{Array1f, ArrayView1f};

use macro_const::macro_const;
use num_complex::Complex64;
use std::f64::consts::{LN_10, PI};

/// Branch of the complex logarithm used for the integration constant
pub const BRANCH_INDEX: i32 = 1;

macro_const! {
    const DOC: &str = r#"
Closed-form photoisomerization decay

Reactant concentration under photon-flux-limited kinetics with Beer–Lambert self-shadowing
obeys

$$
\frac{dc}{dt} = -a \left(1 - 10^{-b_\mathrm{ex} c}\right), \qquad a = \frac{\Phi I}{V N_A},
$$

whose solution, in absorbance units at the analysis wavelength, is

$$
A(t) = \frac{b}{b_\mathrm{ex}} \lg\left(1 - e^{\ln 10\, b_\mathrm{ex} (c_1 - a t)}\right),
\qquad
c_1 = \frac{\ln\left(1 - 10^{b_\mathrm{ex} c_0}\right) + 2\pi i n}{b_\mathrm{ex} \ln 10}.
$$

$c_1$ is complex because $1 - 10^{b_\mathrm{ex} c_0} < 0$; the logarithm argument is real again
and only the real part of the result is returned.
"#;
}

#[doc = DOC!()]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClosedFormDecay {
    /// Decadic absorbance per mol/L at the analysis wavelength, `b`
    absorptivity_analysis: f64,
    /// Decadic absorbance per mol/L at the excitation wavelength, `b_ex`
    absorptivity_excitation: f64,
    volume: f64,
    c1: Complex64,
}

impl ClosedFormDecay {
    pub fn new(
        absorptivity_analysis: f64,
        absorptivity_excitation: f64,
        starting_concentration: f64,
        volume: f64,
    ) -> Self {
        let b_ex = absorptivity_excitation;
        let boundary = Complex64::new(1.0 - f64::powf(10.0, b_ex * starting_concentration), 0.0);
        let branch = Complex64::new(0.0, 2.0 * PI * f64::from(BRANCH_INDEX));
        let c1 = (boundary.ln() + branch) / (b_ex * LN_10);
        Self {
            absorptivity_analysis,
            absorptivity_excitation,
            volume,
            c1,
        }
    }

    /// Model calibrated on the apparent absorptivities of the trace
    pub fn from_trace(trace: &KineticTrace, params: &ExperimentParameters) -> Self {
        Self::new(
            trace.absorptivity_analysis(),
            trace.absorptivity_excitation(),
            params.starting_concentration,
            params.volume,
        )
    }

    pub fn doc() -> &'static str {
        DOC
    }

    /// Complex integration constant `c₁`
    pub fn integration_constant(&self) -> Complex64 {
        self.c1
    }

    /// Predicted analysis-wavelength absorbance at time `t`, s
    pub fn absorbance(
        &self,
        t: f64,
        quantum_yield: f64,
        photon_flux: f64,
    ) -> Result<f64, NumericalDegeneracy> {
        let b_ex = self.absorptivity_excitation;
        let a = quantum_yield * photon_flux / (self.volume * AVOGADRO);
        let exponent = LN_10 * b_ex * self.c1 - LN_10 * a * b_ex * t;
        let argument = Complex64::new(1.0, 0.0) - exponent.exp();
        if !(argument.re > 0.0) {
            return if argument.re.is_nan() {
                Err(NumericalDegeneracy::NonFinitePrediction)
            } else {
                Err(NumericalDegeneracy::NonPositiveLogArgument)
            };
        }
        let value = self.absorptivity_analysis / b_ex * argument.log10().re;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(NumericalDegeneracy::NonFinitePrediction)
        }
    }

    pub fn predict(
        &self,
        t: ArrayView1f,
        quantum_yield: f64,
        photon_flux: f64,
    ) -> Result<Array1f, NumericalDegeneracy> {
        t.iter()
            .map(|&t| self.absorbance(t, quantum_yield, photon_flux))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn decay() -> ClosedFormDecay {
        ClosedFormDecay::new(0.5 / 5e-5, 1.0 / 5e-5, 5e-5, 1e-3)
    }

    #[test]
    fn starts_at_measured_absorbance() {
        assert_relative_eq!(
            decay().absorbance(0.0, 0.3, 5e14).unwrap(),
            0.5,
            max_relative = 1e-10
        );
    }

    #[test]
    fn integration_constant_is_complex() {
        let c1 = decay().integration_constant();
        // ln of a negative number contributes iπ, the branch adds 2πn
        assert_relative_eq!(
            c1.im * (1.0 / 5e-5) * LN_10,
            PI * (2.0 * f64::from(BRANCH_INDEX) + 1.0),
            max_relative = 1e-12
        );
    }

    #[test]
    fn decays_monotonically_towards_zero() {
        let t = Array1::linspace(0.0, 2000.0, 51);
        let a = decay().predict(t.view(), 0.3, 5e14).unwrap();
        assert!(a.windows(2).into_iter().all(|w| w[1] < w[0]));
        assert!(a[50] < 1e-3);
    }

    #[test]
    fn satisfies_rate_equation() {
        // dA/dt = b·dc/dt = -b·a·(1 - 10^(-b_ex·A/b))
        let model = decay();
        let (b, b_ex) = (1e4, 2e4);
        let a = 0.3 * 5e14 / (1e-3 * AVOGADRO);
        let h = 1e-3;
        for t in [0.0, 50.0, 200.0, 700.0] {
            let derivative = (model.absorbance(t + h, 0.3, 5e14).unwrap()
                - model.absorbance(t - h, 0.3, 5e14).unwrap())
                / (2.0 * h);
            let c = model.absorbance(t, 0.3, 5e14).unwrap() / b;
            let desired = -b * a * (1.0 - f64::powf(10.0, -b_ex * c));
            assert_relative_eq!(derivative, desired, max_relative = 1e-5);
        }
    }

    #[test]
    fn zero_rate_is_constant() {
        let model = decay();
        for t in [0.0, 10.0, 1e4] {
            assert_relative_eq!(model.absorbance(t, 0.0, 5e14).unwrap(), 0.5, max_relative = 1e-10);
        }
    }

    #[test]
    fn overflow_is_degenerate() {
        // 10^(b_ex·c₀) overflows
        let model = ClosedFormDecay::new(1.0, 1e4, 1.0, 1e-3);
        assert_eq!(
            model.absorbance(1.0, 0.3, 5e14),
            Err(NumericalDegeneracy::NonFinitePrediction)
        );
    }
}
