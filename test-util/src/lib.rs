//! Synthetic spectral time series in the whitespace-delimited measurement format
//!
//! Concentrations are produced independently of the engine: the photobleaching decay uses the
//! real-valued solution and the integrated kinetics use a fine fixed-step RK4.

use itertools::Itertools;
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::fmt::Write;

pub const AVOGADRO: f64 = 6.022_140_76e23;

/// Wavelength axis of every scenario, nm
pub const WAVELENGTHS: [f64; 5] = [300.0, 320.0, 365.0, 450.0, 700.0];
pub const ANALYSIS_INDEX: usize = 1;
pub const EXCITATION_INDEX: usize = 2;
pub const ZERO_REFERENCE_INDEX: usize = 4;

const INTEGRATION_STEP: f64 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Kinetics {
    /// Non-absorbing photoproduct, no back reaction
    Photobleaching,
    /// Photoproduct absorbs at `WAVELENGTHS` with the given coefficients and reacts back
    ProductAbsorption {
        product_quantum_yield: f64,
        product_epsilon: [f64; 5],
    },
    /// First-order thermal back reaction, 1/s
    ThermalReversion { rate: f64 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Scenario {
    pub kinetics: Kinetics,
    pub quantum_yield: f64,
    /// photons/s
    pub photon_flux: f64,
    /// mol/L
    pub concentration: f64,
    /// cm
    pub path_length: f64,
    /// L
    pub volume: f64,
    /// Reactant extinction coefficients at `WAVELENGTHS`, M⁻¹cm⁻¹
    pub epsilon: [f64; 5],
    pub npoints: usize,
    /// s
    pub interval: f64,
    /// Timestamp of the first sample, s
    pub start: f64,
    /// Baseline at the first sample and its growth rate per second, added to every column
    pub baseline: (f64, f64),
    /// Gaussian noise sigma and RNG seed
    pub noise: Option<(f64, u64)>,
}

impl Scenario {
    pub fn new(kinetics: Kinetics, quantum_yield: f64) -> Self {
        Self {
            kinetics,
            quantum_yield,
            photon_flux: 5e14,
            concentration: 5e-5,
            path_length: 1.0,
            volume: 1e-3,
            epsilon: [5e3, 1e4, 2e4, 2e3, 0.0],
            npoints: 20,
            interval: 10.0,
            start: 5.0,
            baseline: (0.01, 1e-5),
            noise: None,
        }
    }

    pub fn photobleaching(quantum_yield: f64) -> Self {
        Self::new(Kinetics::Photobleaching, quantum_yield)
    }

    pub fn product_absorption(quantum_yield: f64, product_quantum_yield: f64) -> Self {
        Self::new(
            Kinetics::ProductAbsorption {
                product_quantum_yield,
                product_epsilon: [0.0, 3e3, 1e4, 0.0, 0.0],
            },
            quantum_yield,
        )
        .with_points(60, 10.0)
    }

    pub fn thermal_reversion(quantum_yield: f64, rate: f64) -> Self {
        Self::new(Kinetics::ThermalReversion { rate }, quantum_yield).with_points(60, 10.0)
    }

    pub fn with_points(self, npoints: usize, interval: f64) -> Self {
        Self {
            npoints,
            interval,
            ..self
        }
    }

    pub fn with_noise(self, sigma: f64, seed: u64) -> Self {
        Self {
            noise: Some((sigma, seed)),
            ..self
        }
    }

    /// Elapsed illumination time of every sample
    pub fn elapsed(&self) -> Vec<f64> {
        (0..self.npoints)
            .map(|i| i as f64 * self.interval)
            .collect()
    }

    fn photons(&self) -> f64 {
        self.photon_flux / (self.volume * AVOGADRO)
    }

    /// Reactant concentration at every sample
    pub fn reactant(&self) -> Vec<f64> {
        let b_ex = self.epsilon[EXCITATION_INDEX] * self.path_length;
        let c0 = self.concentration;
        match self.kinetics {
            Kinetics::Photobleaching => {
                let a = self.quantum_yield * self.photons();
                let excess = f64::powf(10.0, b_ex * c0) - 1.0;
                self.elapsed()
                    .into_iter()
                    .map(|t| (1.0 + excess * f64::powf(10.0, -a * b_ex * t)).log10() / b_ex)
                    .collect()
            }
            Kinetics::ProductAbsorption {
                product_quantum_yield,
                product_epsilon,
            } => {
                let bp_ex = product_epsilon[EXCITATION_INDEX] * self.path_length;
                self.integrate(|c| {
                    let cp = c0 - c;
                    let total = c * b_ex + cp * bp_ex;
                    let share = (1.0 - f64::powf(10.0, -total)) / total;
                    self.photons()
                        * share
                        * (product_quantum_yield * cp * bp_ex - self.quantum_yield * c * b_ex)
                })
            }
            Kinetics::ThermalReversion { rate } => self.integrate(|c| {
                -self.quantum_yield * self.photons() * (1.0 - f64::powf(10.0, -b_ex * c))
                    + rate * (c0 - c)
            }),
        }
    }

    fn integrate(&self, rhs: impl Fn(f64) -> f64) -> Vec<f64> {
        let substeps = (self.interval / INTEGRATION_STEP).round() as usize;
        let h = self.interval / substeps as f64;
        let mut c = self.concentration;
        let mut output = Vec::with_capacity(self.npoints);
        for i in 0..self.npoints {
            if i > 0 {
                for _ in 0..substeps {
                    let k1 = rhs(c);
                    let k2 = rhs(c + 0.5 * h * k1);
                    let k3 = rhs(c + 0.5 * h * k2);
                    let k4 = rhs(c + h * k3);
                    c += h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
                }
            }
            output.push(c);
        }
        output
    }

    /// Absorbance matrix, one row per sample, without baseline and noise
    pub fn absorbance(&self) -> Vec<[f64; 5]> {
        let product_epsilon = match self.kinetics {
            Kinetics::ProductAbsorption {
                product_epsilon, ..
            } => product_epsilon,
            _ => [0.0; 5],
        };
        self.reactant()
            .into_iter()
            .map(|c| {
                let cp = self.concentration - c;
                let mut row = [0.0; 5];
                for (j, a) in row.iter_mut().enumerate() {
                    *a = (c * self.epsilon[j] + cp * product_epsilon[j]) * self.path_length;
                }
                row
            })
            .collect()
    }

    /// Text of a measurement file
    ///
    /// The zero-reference column carries only the baseline, all others get the noise too.
    pub fn to_text(&self) -> String {
        let mut rng = self.noise.map(|(_, seed)| StdRng::seed_from_u64(seed));
        let sigma = self.noise.map_or(0.0, |(sigma, _)| sigma);

        let mut text = String::new();
        let _ = writeln!(
            text,
            "synthetic {:?}, qy = {}, flux = {} photons/s",
            self.kinetics, self.quantum_yield, self.photon_flux
        );
        let reference = WAVELENGTHS.iter().map(|wl| {
            let x: f64 = (wl - 365.0) / 15.0;
            1e4 * f64::exp(-0.5 * x * x)
        });
        let _ = writeln!(text, "{}", reference.format(" "));
        let _ = writeln!(text, "{}", WAVELENGTHS.iter().format(" "));

        let elapsed = self.elapsed();
        for (t, row) in elapsed.iter().zip(self.absorbance()) {
            let baseline = self.baseline.0 + self.baseline.1 * t;
            let values = row.iter().enumerate().map(|(j, a)| {
                let noise = match rng.as_mut() {
                    Some(rng) if j != ZERO_REFERENCE_INDEX => {
                        sigma * rng.sample::<f64, _>(StandardNormal)
                    }
                    _ => 0.0,
                };
                a + baseline + noise
            });
            let _ = writeln!(text, "{} 0 {}", self.start + t, values.format(" "));
        }
        text
    }
}
