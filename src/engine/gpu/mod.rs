//! Device-side resources for the simulation: typed buffers and the
//! compute pipelines that operate on them.

pub mod buffers;
pub mod pipelines;

pub use self::buffers::{SimParams, SimulationBuffers};
pub use self::pipelines::SimulationPipelines;
