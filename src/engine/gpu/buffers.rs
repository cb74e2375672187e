//! GPU buffer set for the simulation.
//!
//! ## Buffer layout
//!
//! - `particles[2]`: double-buffered particle storage (24 bytes each).
//!   The compute bindings alternate read/write roles every sub-tick; with
//!   an even sub-tick count, `particles[0]` is authoritative at frame end
//!   and is what the render pass reads.
//! - `beams`: beam records (40 bytes each), single-buffered.
//! - `mapping`: u16 logical-id -> physical-slot table, particle section
//!   then beam section. Also read by the render shaders.
//! - `metadata`: the 112-byte metadata record; doubles as the
//!   indirect-draw argument source.
//! - `forces`: per-particle force scratch, `MAX_PARTICLES * 2` atomic i32
//!   in 65536 fixed point.
//! - `delete_bitmap`: one bit per mapping entry, cleared by the delete
//!   pass after use.
//! - `sim_params`: small uniform with the per-engine constants the
//!   kernels need (radius, world size, sub-tick dt).

use bytemuck::{Pod, Zeroable};

use crate::engine::config::{EngineOptions, WORLD_SIZE};
use crate::engine::layout::{
    Metadata, BEAM_STRIDE, DELETE_BITMAP_WORDS, MAPPING_LEN, MAX_BEAMS, MAX_PARTICLES,
    METADATA_SIZE, PARTICLE_STRIDE,
};
use crate::engine::scene::PackedScene;

/// Per-engine constants uniform. Must match `SimParams` in the WGSL
/// kernels and render shaders.
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct SimParams {
    pub radius: f32,
    pub bounds: f32,
    pub dt: f32,
    pub _pad: f32,
}

const _: () = assert!(std::mem::size_of::<SimParams>() == 16);

pub struct SimulationBuffers {
    pub particles: [wgpu::Buffer; 2],
    pub beams: wgpu::Buffer,
    pub mapping: wgpu::Buffer,
    pub metadata: wgpu::Buffer,
    pub forces: wgpu::Buffer,
    pub delete_bitmap: wgpu::Buffer,
    pub sim_params: wgpu::Buffer,
}

impl SimulationBuffers {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, options: &EngineOptions) -> Self {
        let particle_size = (MAX_PARTICLES * PARTICLE_STRIDE) as u64;
        let particles = [
            Self::create_storage_buffer(device, particle_size, "Particle Buffer 0"),
            Self::create_storage_buffer(device, particle_size, "Particle Buffer 1"),
        ];

        let beams =
            Self::create_storage_buffer(device, (MAX_BEAMS * BEAM_STRIDE) as u64, "Beam Buffer");
        let mapping =
            Self::create_storage_buffer(device, (MAPPING_LEN * 2) as u64, "Mapping Table");

        let metadata = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Metadata Buffer"),
            size: METADATA_SIZE as u64,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let forces =
            Self::create_storage_buffer(device, (MAX_PARTICLES * 2 * 4) as u64, "Force Scratch");
        let delete_bitmap =
            Self::create_storage_buffer(device, (DELETE_BITMAP_WORDS * 4) as u64, "Delete Bitmap");

        let sim_params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Sim Params Uniform"),
            size: std::mem::size_of::<SimParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params = SimParams {
            radius: options.particle_radius,
            bounds: WORLD_SIZE,
            dt: options.dt(),
            _pad: 0.0,
        };
        queue.write_buffer(&sim_params, 0, bytemuck::bytes_of(&params));

        Self {
            particles,
            beams,
            mapping,
            metadata,
            forces,
            delete_bitmap,
            sim_params,
        }
    }

    fn create_storage_buffer(device: &wgpu::Device, size: u64, label: &str) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Upload a compacted scene, replacing the whole device state.
    pub fn upload_scene(&self, queue: &wgpu::Queue, packed: &PackedScene, metadata: &Metadata) {
        if !packed.particle_bytes.is_empty() {
            queue.write_buffer(&self.particles[0], 0, &packed.particle_bytes);
        }
        if !packed.beam_bytes.is_empty() {
            queue.write_buffer(&self.beams, 0, &packed.beam_bytes);
        }
        queue.write_buffer(&self.mapping, 0, bytemuck::cast_slice(&packed.mapping));
        queue.write_buffer(&self.metadata, 0, bytemuck::bytes_of(metadata));
        self.clear_scratch(queue);
    }

    /// Zero the write buffer, the force scratch and the delete bitmap.
    pub fn clear_scratch(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.particles[1],
            0,
            &vec![0u8; MAX_PARTICLES * PARTICLE_STRIDE],
        );
        queue.write_buffer(&self.forces, 0, &vec![0u8; MAX_PARTICLES * 2 * 4]);
        queue.write_buffer(&self.delete_bitmap, 0, &vec![0u8; DELETE_BITMAP_WORDS * 4]);
    }

    /// Blocking copy of a device buffer into host memory through a
    /// MAP_READ staging buffer. Only used on the snapshot path.
    pub fn read_back(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffer: &wgpu::Buffer,
        size: u64,
    ) -> Vec<u8> {
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = device.poll(wgpu::PollType::Wait);

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        data
    }
}
