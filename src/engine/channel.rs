//! Typed host <-> engine message channel.
//!
//! The host pushes requests at any time; the engine drains them at frame
//! boundaries, under the device lock, and pushes responses back. INIT and
//! DESTROY are the engine's constructor and [`Destroy`](EngineRequest::Destroy)
//! request respectively.

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec2;

use crate::engine::config::PhysicsConstants;

#[derive(Debug, Clone)]
pub enum EngineRequest {
    /// Replace all physics constants. Echoes the applied constants.
    PhysicsConstants(PhysicsConstants),
    /// Ask for the current constants.
    GetPhysicsConstants,
    /// Per-frame user input: keyboard force, cursor position in simulation
    /// coordinates, cursor-drag active flag. Acked.
    Input {
        force: Vec2,
        cursor_pos: Vec2,
        cursor_active: bool,
    },
    VisibilityChange { hidden: bool },
    /// Serialize the live device state. Answered with `Snapshot`.
    SnapshotSave,
    /// Replace the live device state. Answered with `SnapshotLoaded`.
    SnapshotLoad(Vec<u8>),
    /// Debug: clobber random particle-buffer bytes.
    CorruptBuffers,
    /// Stop the engine; echoed with `Destroyed` on shutdown.
    Destroy,
}

#[derive(Debug, Clone)]
pub enum EngineResponse {
    PhysicsConstants(PhysicsConstants),
    InputAck,
    Snapshot(Vec<u8>),
    SnapshotLoaded(bool),
    Framerate(f32),
    Destroyed,
}

/// Host-side endpoints.
pub struct HostChannel {
    pub requests: Sender<EngineRequest>,
    pub responses: Receiver<EngineResponse>,
}

/// Engine-side endpoints.
pub struct EngineEndpoint {
    pub requests: Receiver<EngineRequest>,
    pub responses: Sender<EngineResponse>,
}

pub fn channel() -> (HostChannel, EngineEndpoint) {
    let (request_tx, request_rx) = unbounded();
    let (response_tx, response_rx) = unbounded();
    (
        HostChannel {
            requests: request_tx,
            responses: response_rx,
        },
        EngineEndpoint {
            requests: request_rx,
            responses: response_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_and_responses_flow_both_ways() {
        let (host, engine) = channel();
        host.requests.send(EngineRequest::GetPhysicsConstants).unwrap();
        assert!(matches!(
            engine.requests.try_recv(),
            Ok(EngineRequest::GetPhysicsConstants)
        ));

        engine.responses.send(EngineResponse::Framerate(60.0)).unwrap();
        assert!(matches!(
            host.responses.try_recv(),
            Ok(EngineResponse::Framerate(fps)) if fps == 60.0
        ));
    }
}
