mod kinetic_trace;
pub use kinetic_trace::KineticTrace;

mod spectral_dataset;
pub use spectral_dataset::SpectralDataset;
