use crate::data::{KineticTrace, SpectralDataset};
use crate::parameters::{AnalysisWindow, ExperimentParameters, Wavelengths};

pub use qy_kinetics_test_util::Scenario;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parameters matching the default synthetic scenario, quantum yield unknown
pub fn experiment_parameters() -> ExperimentParameters {
    ExperimentParameters {
        quantum_yield: None,
        photon_flux: Some(5e14),
        starting_concentration: 5e-5,
        path_length: 1.0,
        volume: 1e-3,
        led_current: None,
        wavelengths: Wavelengths {
            excitation: 365.0,
            analysis: 320.0,
            zero_reference: 700.0,
        },
        reactant_epsilon: None,
        reactant_epsilon_excitation: None,
        reactant_epsilon_analysis: None,
        product_epsilon_excitation: 0.0,
        product_epsilon_analysis: 0.0,
        seed_points: 20,
        window: AnalysisWindow::default(),
        thermal_rate: None,
    }
}

/// Parameters of [product_scenario]
pub fn product_parameters() -> ExperimentParameters {
    ExperimentParameters {
        product_epsilon_excitation: 1e4,
        product_epsilon_analysis: 3e3,
        seed_points: 10,
        ..experiment_parameters()
    }
}

/// Parameters of [thermal_scenario], rate constant unknown
pub fn thermal_parameters() -> ExperimentParameters {
    ExperimentParameters {
        seed_points: 10,
        ..experiment_parameters()
    }
}

/// Twenty samples every 10 s of a non-absorbing photoproduct
pub fn closed_form_scenario(quantum_yield: f64) -> Scenario {
    Scenario::photobleaching(quantum_yield)
}

/// Sixty samples every 10 s of a back-reacting, absorbing photoproduct
pub fn product_scenario(quantum_yield: f64, product_quantum_yield: f64) -> Scenario {
    Scenario::product_absorption(quantum_yield, product_quantum_yield)
}

/// Sixty samples every 10 s with thermal back-conversion
pub fn thermal_scenario(quantum_yield: f64, thermal_rate: f64) -> Scenario {
    Scenario::thermal_reversion(quantum_yield, thermal_rate)
}

pub fn trace_from(text: &str, params: &ExperimentParameters) -> KineticTrace {
    init_logger();
    let dataset: SpectralDataset = text.parse().unwrap();
    KineticTrace::extract(&dataset, params).unwrap()
}
