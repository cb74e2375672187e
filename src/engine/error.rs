use thiserror::Error;

/// Engine error kinds.
///
/// `Transient` drops the current frame and lets the next one proceed;
/// `DeviceLost` is terminal and equivalent to destroying the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no compatible GPU adapter or device available: {0}")]
    UnsupportedDevice(String),

    #[error("snapshot does not fit this device: {particles} particles / {beams} beams exceed capacity {max_particles} / {max_beams}")]
    CapacityExceeded {
        particles: usize,
        beams: usize,
        max_particles: usize,
        max_beams: usize,
    },

    #[error("invalid engine configuration: {0}")]
    InvalidConfiguration(String),

    #[error("device submission failed, frame dropped: {0}")]
    Transient(String),

    #[error("GPU device lost")]
    DeviceLost,
}
