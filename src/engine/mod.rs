//! The simulation engine core.
//!
//! [`SoftbodyEngine`] owns the GPU device state and runs one frame at a
//! time: it drains host requests, pushes the latest input record into the
//! metadata buffer, dispatches `subticks` update passes with alternating
//! read/write particle buffers, runs the delete-compaction pass, then draws
//! particles and beams with indirect draws whose counts come from the
//! metadata buffer.
//!
//! Every path that mutates device buffers (frame, scene write, snapshot
//! save/load, corruption) runs under a single mutex; the host is a single
//! cooperative thread, so the lock is never contended, but it makes the
//! mutation discipline explicit.

pub mod channel;
pub mod config;
pub mod cpu_sim;
pub mod error;
pub mod gpu;
pub mod layout;
pub mod scene;
pub mod snapshot;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use glam::Vec2;
use rand::Rng;

use crate::rendering::{BeamRenderer, ParticleRenderer};
use self::channel::{EngineEndpoint, EngineRequest, EngineResponse};
use self::config::{EngineOptions, PhysicsConstants};
use self::error::EngineError;
use self::gpu::{SimulationBuffers, SimulationPipelines};
use self::layout::{
    Metadata, BEAM_STRIDE, MAPPING_LEN, MAX_BEAMS, MAX_PARTICLES, METADATA_CONSTANTS_OFFSET,
    METADATA_INPUT_OFFSET, METADATA_SIZE, PARTICLE_STRIDE,
};
use self::scene::SceneStore;
use self::snapshot::Snapshot;

/// Alpha of the per-frame clear color; low alpha leaves motion trails.
const BLUR: f64 = 0.4;

const WORKGROUP_SIZE: u32 = 64;

/// Request a high-performance adapter and device for a surface.
pub fn request_device(
    instance: &wgpu::Instance,
    surface: &wgpu::Surface,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue), EngineError> {
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(surface),
        force_fallback_adapter: false,
    }))
    .map_err(|e| EngineError::UnsupportedDevice(e.to_string()))?;

    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: None,
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: Default::default(),
        trace: Default::default(),
    }))
    .map_err(|e| EngineError::UnsupportedDevice(e.to_string()))?;

    Ok((adapter, device, queue))
}

#[derive(Debug, Default, Clone, Copy)]
struct InputState {
    key_force: Vec2,
    cursor_pos: Vec2,
    prev_cursor_pos: Vec2,
    cursor_active: bool,
}

pub struct SoftbodyEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    options: EngineOptions,
    constants: PhysicsConstants,
    buffers: SimulationBuffers,
    pipelines: SimulationPipelines,
    compute_groups: [wgpu::BindGroup; 2],
    particle_renderer: ParticleRenderer,
    beam_renderer: BeamRenderer,
    endpoint: EngineEndpoint,
    device_gate: Mutex<()>,
    input: InputState,
    frame_window: VecDeque<Instant>,
    hidden: bool,
    shutdown: bool,
}

impl SoftbodyEngine {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        options: EngineOptions,
        constants: PhysicsConstants,
        endpoint: EngineEndpoint,
    ) -> Result<Self, EngineError> {
        let options = options.validated()?;

        let buffers = SimulationBuffers::new(&device, &queue, &options);
        let pipelines = SimulationPipelines::new(&device);
        let compute_groups = pipelines.create_bind_groups(&device, &buffers);

        let particle_renderer =
            ParticleRenderer::new(&device, &queue, surface_format, &buffers, &options);
        let beam_renderer = BeamRenderer::new(&device, &queue, surface_format, &buffers, &options);

        // Empty world at full capacity until the host writes a scene.
        let metadata = Metadata::new(&constants);
        queue.write_buffer(&buffers.metadata, 0, bytemuck::bytes_of(&metadata));

        Ok(Self {
            device,
            queue,
            options,
            constants,
            buffers,
            pipelines,
            compute_groups,
            particle_renderer,
            beam_renderer,
            endpoint,
            device_gate: Mutex::new(()),
            input: InputState::default(),
            frame_window: VecDeque::new(),
            hidden: false,
            shutdown: false,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn constants(&self) -> &PhysicsConstants {
        &self.constants
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Frames inside the trailing one-second window.
    pub fn fps(&self) -> f32 {
        self.frame_window.len() as f32
    }

    /// Stop the engine. Equivalent to receiving a DESTROY request; the
    /// device is released when the engine is dropped.
    pub fn destroy(&mut self) {
        if !self.shutdown {
            self.shutdown = true;
            let _ = self.endpoint.responses.send(EngineResponse::Destroyed);
        }
    }

    /// Replace the device state with a compacted scene.
    pub fn write_scene(&mut self, scene: &SceneStore) {
        let _gate = self.device_gate.lock().unwrap();
        let packed = scene.write_state();
        let mut metadata = Metadata::new(&self.constants);
        metadata.set_counts(packed.particle_count, packed.beam_count);
        self.buffers.upload_scene(&self.queue, &packed, &metadata);
        log::info!(
            "scene written: {} particles, {} beams",
            packed.particle_count,
            packed.beam_count
        );
    }

    pub fn snapshot_save(&mut self) -> Vec<u8> {
        drop(self.device_gate.lock().unwrap());
        self.save_locked()
    }

    pub fn snapshot_load(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        drop(self.device_gate.lock().unwrap());
        self.load_locked(bytes)
    }

    pub fn apply_constants(&mut self, constants: PhysicsConstants) {
        drop(self.device_gate.lock().unwrap());
        self.apply_constants_locked(constants);
    }

    /// Advance the simulation by one frame and draw it into `view`.
    ///
    /// `dt_wall` is the wall-clock time since the previous frame, used only
    /// to scale the cursor velocity estimate.
    pub fn frame(&mut self, view: &wgpu::TextureView, dt_wall: f32) -> Result<(), EngineError> {
        if self.shutdown {
            return Ok(());
        }
        drop(self.device_gate.lock().unwrap());

        self.pump_requests();
        if self.shutdown {
            return Ok(());
        }

        self.write_input_record(dt_wall);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let lanes = MAX_PARTICLES.max(MAX_BEAMS) as u32;
        let workgroups = (lanes + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE;
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Simulation Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipelines.update);
            for tick in 0..self.options.subticks {
                pass.set_bind_group(0, &self.compute_groups[(tick % 2) as usize], &[]);
                pass.dispatch_workgroups(workgroups, 1, 1);
            }
            pass.set_pipeline(&self.pipelines.delete);
            pass.set_bind_group(0, &self.compute_groups[0], &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.0,
                            g: 0.0,
                            b: 0.0,
                            a: BLUR,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.particle_renderer.draw(&mut pass, &self.buffers.metadata);
            self.beam_renderer.draw(&mut pass, &self.buffers.metadata);
        }

        self.queue.submit(Some(encoder.finish()));

        if self
            .device
            .poll(wgpu::PollType::Wait)
            .is_err()
        {
            self.shutdown = true;
            return Err(EngineError::DeviceLost);
        }

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(EngineError::Transient(error.to_string()));
        }

        let now = Instant::now();
        self.frame_window.push_back(now);
        while let Some(&front) = self.frame_window.front() {
            if now.duration_since(front) > Duration::from_secs(1) {
                self.frame_window.pop_front();
            } else {
                break;
            }
        }
        let _ = self
            .endpoint
            .responses
            .send(EngineResponse::Framerate(self.fps()));

        Ok(())
    }

    fn pump_requests(&mut self) {
        while let Ok(request) = self.endpoint.requests.try_recv() {
            match request {
                EngineRequest::PhysicsConstants(constants) => {
                    self.apply_constants_locked(constants);
                    let _ = self
                        .endpoint
                        .responses
                        .send(EngineResponse::PhysicsConstants(self.constants));
                }
                EngineRequest::GetPhysicsConstants => {
                    let _ = self
                        .endpoint
                        .responses
                        .send(EngineResponse::PhysicsConstants(self.constants));
                }
                EngineRequest::Input {
                    force,
                    cursor_pos,
                    cursor_active,
                } => {
                    self.input.key_force = force;
                    self.input.cursor_pos = cursor_pos;
                    self.input.cursor_active = cursor_active;
                    let _ = self.endpoint.responses.send(EngineResponse::InputAck);
                }
                EngineRequest::VisibilityChange { hidden } => {
                    self.hidden = hidden;
                }
                EngineRequest::SnapshotSave => {
                    let bytes = self.save_locked();
                    let _ = self.endpoint.responses.send(EngineResponse::Snapshot(bytes));
                }
                EngineRequest::SnapshotLoad(bytes) => {
                    let ok = match self.load_locked(&bytes) {
                        Ok(()) => true,
                        Err(error) => {
                            log::warn!("snapshot load failed: {error}");
                            false
                        }
                    };
                    let _ = self
                        .endpoint
                        .responses
                        .send(EngineResponse::SnapshotLoaded(ok));
                }
                EngineRequest::CorruptBuffers => {
                    self.corrupt_locked();
                }
                EngineRequest::Destroy => {
                    self.shutdown = true;
                    let _ = self.endpoint.responses.send(EngineResponse::Destroyed);
                }
            }
        }
    }

    fn write_input_record(&mut self, dt_wall: f32) {
        let cursor_vel =
            (self.input.cursor_pos - self.input.prev_cursor_pos) * self.fps() * dt_wall;
        self.input.prev_cursor_pos = self.input.cursor_pos;

        let mut shadow = Metadata::new(&self.constants);
        shadow.cursor_active = self.input.cursor_active as u32;
        shadow.cursor_pos = self.input.cursor_pos.to_array();
        shadow.cursor_vel = cursor_vel.to_array();
        shadow.key_force = self.input.key_force.to_array();
        self.queue.write_buffer(
            &self.buffers.metadata,
            METADATA_INPUT_OFFSET,
            shadow.input_bytes(),
        );
    }

    fn apply_constants_locked(&mut self, constants: PhysicsConstants) {
        self.constants = constants;
        let shadow = Metadata::new(&self.constants);
        self.queue.write_buffer(
            &self.buffers.metadata,
            METADATA_CONSTANTS_OFFSET,
            shadow.constants_bytes(),
        );
    }

    fn save_locked(&self) -> Vec<u8> {
        let metadata_bytes = SimulationBuffers::read_back(
            &self.device,
            &self.queue,
            &self.buffers.metadata,
            METADATA_SIZE as u64,
        );
        let metadata: Metadata = bytemuck::pod_read_unaligned(&metadata_bytes);

        let mapping_bytes = SimulationBuffers::read_back(
            &self.device,
            &self.queue,
            &self.buffers.mapping,
            (MAPPING_LEN * 2) as u64,
        );
        let particle_bytes = SimulationBuffers::read_back(
            &self.device,
            &self.queue,
            &self.buffers.particles[0],
            (MAX_PARTICLES * PARTICLE_STRIDE) as u64,
        );
        let beam_bytes = SimulationBuffers::read_back(
            &self.device,
            &self.queue,
            &self.buffers.beams,
            (MAX_BEAMS * BEAM_STRIDE) as u64,
        );

        Snapshot::capture(&metadata, &mapping_bytes, &particle_bytes, &beam_bytes).encode()
    }

    fn load_locked(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let snapshot = Snapshot::parse(bytes)?;
        let images = snapshot.device_images();

        self.constants = snapshot.constants(self.constants.user_strength);
        let mut metadata = Metadata::new(&self.constants);
        metadata.set_counts(images.particle_count, images.beam_count);

        self.queue
            .write_buffer(&self.buffers.particles[0], 0, &images.particle_bytes);
        self.queue
            .write_buffer(&self.buffers.beams, 0, &images.beam_bytes);
        self.queue
            .write_buffer(&self.buffers.mapping, 0, &images.mapping_bytes);
        self.queue
            .write_buffer(&self.buffers.metadata, 0, bytemuck::bytes_of(&metadata));
        self.buffers.clear_scratch(&self.queue);

        log::info!(
            "snapshot loaded: {} particles, {} beams",
            images.particle_count,
            images.beam_count
        );
        Ok(())
    }

    fn corrupt_locked(&self) {
        let mut rng = rand::rng();
        for _ in 0..32 {
            let offset = rng.random_range(0..MAX_PARTICLES * PARTICLE_STRIDE / 4) * 4;
            let noise: [u8; 4] = rng.random();
            self.queue
                .write_buffer(&self.buffers.particles[0], offset as u64, &noise);
        }
        log::warn!("particle buffer corrupted at 32 random offsets");
    }
}
