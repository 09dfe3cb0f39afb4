use crate::data::KineticTrace;
use crate::error::NumericalDegeneracy;
use crate::kinetics::{FixedStepIntegrator, JointModel};
use crate::parameters::{AVOGADRO, ExperimentParameters};
use crate::types::{Array1f, ArrayView1f};

use std::f64::consts::LN_10;

/// Total excitation absorbance below which photons cannot be apportioned between species
pub const MIN_TOTAL_ABSORBANCE: f64 = 1e-12;

/// Reactant/photoproduct system where both species absorb the excitation light
///
/// The absorbed photon flux is shared in proportion to each species' excitation absorbance:
///
/// ```text
/// dc/dt = I/(V·Nₐ) · (1 - 10^-A_ex)/A_ex · (Φp·cp·bp_ex - Φr·c·br_ex) + k·cp
/// A_ex = c·br_ex + cp·bp_ex,  cp = c_total - c
/// ```
///
/// The analysis signal is `c·br + cp·bp`. Absorptivities are decadic absorbance per mol/L.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProductAbsorptionModel {
    pub reactant_absorptivity_excitation: f64,
    pub product_absorptivity_excitation: f64,
    pub reactant_absorptivity_analysis: f64,
    pub product_absorptivity_analysis: f64,
    pub total_concentration: f64,
    pub volume: f64,
    pub photon_flux: f64,
    pub thermal_rate: f64,
    pub integrator: FixedStepIntegrator,
}

impl ProductAbsorptionModel {
    /// Model for the experiment, reactant coefficients default to the apparent ones of the trace
    pub fn from_trace(
        trace: &KineticTrace,
        params: &ExperimentParameters,
        photon_flux: f64,
        integrator: FixedStepIntegrator,
    ) -> Self {
        let l = params.path_length;
        Self {
            reactant_absorptivity_excitation: params
                .reactant_epsilon_excitation
                .map_or(trace.absorptivity_excitation(), |eps| eps * l),
            product_absorptivity_excitation: params.product_epsilon_excitation * l,
            reactant_absorptivity_analysis: params
                .reactant_epsilon_analysis
                .map_or(trace.absorptivity_analysis(), |eps| eps * l),
            product_absorptivity_analysis: params.product_epsilon_analysis * l,
            total_concentration: params.starting_concentration,
            volume: params.volume,
            photon_flux,
            thermal_rate: params.thermal_rate.unwrap_or(0.0),
            integrator,
        }
    }

    /// Rate of change of the reactant concentration
    pub fn rate(
        &self,
        reactant: f64,
        reactant_quantum_yield: f64,
        product_quantum_yield: f64,
    ) -> Result<f64, NumericalDegeneracy> {
        let product = self.total_concentration - reactant;
        let reactant_absorbance = reactant * self.reactant_absorptivity_excitation;
        let product_absorbance = product * self.product_absorptivity_excitation;
        let total = reactant_absorbance + product_absorbance;
        if !(total > MIN_TOTAL_ABSORBANCE) {
            return Err(NumericalDegeneracy::VanishingAbsorption(total));
        }
        // (1 - 10^-A) / A
        let share = -f64::exp_m1(-LN_10 * total) / total;
        let photons = self.photon_flux / (AVOGADRO * self.volume);
        Ok(photons
            * share
            * (product_quantum_yield * product_absorbance
                - reactant_quantum_yield * reactant_absorbance)
            + self.thermal_rate * product)
    }

    /// Analysis-wavelength absorbance of the mixture
    #[inline]
    pub fn absorbance(&self, reactant: f64) -> f64 {
        let product = self.total_concentration - reactant;
        reactant * self.reactant_absorptivity_analysis
            + product * self.product_absorptivity_analysis
    }

    pub fn predict(
        &self,
        t: ArrayView1f,
        reactant_quantum_yield: f64,
        product_quantum_yield: f64,
    ) -> Result<Array1f, NumericalDegeneracy> {
        let reactant = self.integrator.solve(self.total_concentration, t, |c| {
            self.rate(c, reactant_quantum_yield, product_quantum_yield)
        })?;
        let absorbance = reactant.mapv(|c| self.absorbance(c));
        if absorbance.iter().all(|a| a.is_finite()) {
            Ok(absorbance)
        } else {
            Err(NumericalDegeneracy::NonFinitePrediction)
        }
    }
}

impl JointModel for ProductAbsorptionModel {
    const PARAMETER_NAMES: [&'static str; 2] = ["qy", "qy_prod"];

    fn evaluate(
        &self,
        t: ArrayView1f,
        parameters: [f64; 2],
    ) -> Result<Array1f, NumericalDegeneracy> {
        self.predict(t, parameters[0], parameters[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetics::ClosedFormDecay;

    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn model(
        product_excitation: f64,
        product_analysis: f64,
        thermal_rate: f64,
    ) -> ProductAbsorptionModel {
        ProductAbsorptionModel {
            reactant_absorptivity_excitation: 2e4,
            product_absorptivity_excitation: product_excitation,
            reactant_absorptivity_analysis: 1e4,
            product_absorptivity_analysis: product_analysis,
            total_concentration: 5e-5,
            volume: 1e-3,
            photon_flux: 5e14,
            thermal_rate,
            integrator: FixedStepIntegrator::new(1.0),
        }
    }

    #[test]
    fn transparent_product_matches_closed_form() {
        let t = Array1::linspace(0.0, 600.0, 61);
        let integrated = model(0.0, 0.0, 0.0).predict(t.view(), 0.3, 0.7).unwrap();
        let closed = ClosedFormDecay::new(1e4, 2e4, 5e-5, 1e-3)
            .predict(t.view(), 0.3, 5e14)
            .unwrap();
        for (a, b) in integrated.iter().zip(closed.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-6, epsilon = 1e-9);
        }
    }

    #[test]
    fn absorbing_product_reaches_photostationary_state() {
        let m = model(2e4, 0.0, 0.0);
        // equal absorptivities: Φr·c = Φp·(c_total - c)
        let t = Array1::linspace(0.0, 20_000.0, 3);
        let a = m.predict(t.view(), 0.3, 0.1).unwrap();
        let c_pss = 0.1 / (0.3 + 0.1) * 5e-5;
        assert_relative_eq!(a[2], c_pss * 1e4, max_relative = 1e-4);
    }

    #[test]
    fn product_signal_is_added() {
        let m = model(0.0, 4e3, 0.0);
        assert_relative_eq!(m.absorbance(5e-5), 0.5);
        assert_relative_eq!(m.absorbance(0.0), 0.2);
        assert_relative_eq!(m.absorbance(2.5e-5), 0.35);
    }

    #[test]
    fn thermal_reversion_repopulates_reactant() {
        let m = model(0.0, 0.0, 1e-2);
        // no light-driven change at zero quantum yield, pure first-order return from product
        let rate = m.rate(3e-5, 0.0, 0.0).unwrap();
        assert_relative_eq!(rate, 1e-2 * 2e-5, max_relative = 1e-12);
    }

    #[test]
    fn vanishing_absorbance_is_degenerate() {
        let m = ProductAbsorptionModel {
            reactant_absorptivity_excitation: 0.0,
            ..model(0.0, 0.0, 0.0)
        };
        let t = Array1::linspace(0.0, 10.0, 3);
        assert!(matches!(
            m.predict(t.view(), 0.3, 0.5),
            Err(NumericalDegeneracy::VanishingAbsorption(_))
        ));
    }
}
