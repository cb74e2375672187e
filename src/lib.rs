//! # Beambox: GPU-Accelerated 2D Softbody Sandbox
//!
//! Beambox simulates a square world of rigid circular **particles** joined
//! by **beams** - spring-damper links with plastic yield and fracture - and
//! renders it in real time. Each frame the engine advances the state by a
//! fixed number of GPU compute sub-steps, compacts away fractured beams,
//! and draws the live entities with indirect draws.
//!
//! ## Architecture
//!
//! ### Engine core ([`engine`])
//!
//! - [`engine::layout`] - the packed binary layouts shared by host, kernels
//!   and snapshots, with a slot-addressed codec
//! - [`engine::scene`] - the host-side editing store and its compaction
//!   to/from packed buffers
//! - [`engine::gpu`] - typed device buffers (double-buffered particles,
//!   mapping table, metadata, atomic force scratch, delete bitmap) and the
//!   update/delete compute pipelines
//! - [`engine::cpu_sim`] - a CPU twin of the kernels for tests and
//!   headless previews
//! - [`engine::snapshot`] - framed save/load of the live device state
//! - [`engine::channel`] - the typed host <-> engine message channel
//! - [`engine::SoftbodyEngine`] - the per-frame orchestrator
//!
//! ### Rendering ([`rendering`])
//!
//! Instanced particle billboards with an SDF circle fragment stage, and
//! stress-colored beam lines. Both draws are indirect: the instance counts
//! live in the metadata buffer and shrink when the delete pass compacts
//! the mapping table, so the host never reads counts back to draw.
//!
//! ### Host shell ([`app`])
//!
//! A winit window and wgpu surface that translate input events into typed
//! engine requests and drive one frame per redraw.
//!
//! ## Key design points
//!
//! - **Arena + mapping indirection**: entities are addressed by physical
//!   slot; logical identity lives only in the mapping table, which is also
//!   what the render shaders walk. Deletion rewrites the mapping, never
//!   the records, so beam endpoint slots stay stable.
//! - **Alternating double buffers**: particle updates read one buffer and
//!   write the other, swapping every sub-tick; the even sub-tick count
//!   keeps the primary buffer authoritative at frame end and removes
//!   first-mover bias from pair collisions.
//! - **Atomics + fixed point**: beam lanes commit forces as `i32` atomics
//!   scaled by 65536; particle lanes drain them with an atomic exchange.
//!
//! ## Dependencies
//!
//! - **Graphics**: `wgpu` (GPU abstraction), `winit` (windowing)
//! - **Math / layout**: `glam`, `bytemuck`
//! - **Messaging**: `crossbeam-channel`
//! - **Serialization**: `serde` for the config types
//! - **Diagnostics**: `log` + `env_logger`, `thiserror` for error kinds

pub mod app;
pub mod engine;
pub mod rendering;

pub use engine::config::{EngineOptions, PhysicsConstants};
pub use engine::error::EngineError;
pub use engine::SoftbodyEngine;
