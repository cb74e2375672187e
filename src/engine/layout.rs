//! Packed binary layouts shared by the host, the compute kernels and the
//! snapshot codec.
//!
//! Every struct here mirrors a WGSL struct byte-for-byte; the layouts are
//! little-endian and fixed:
//!
//! - `GpuParticle`: 24 bytes - position, velocity, acceleration (vec2 each)
//! - `GpuBeam`: 40 bytes - packed u16 endpoint slots in one u32, then nine f32
//! - `Metadata`: 112 bytes - two 5-word indirect-draw tuples, capacities,
//!   physics constants, input record
//!
//! The mapping table is an array of u16 entries: the particle section covers
//! `[0, MAX_PARTICLES)`, the beam section `[MAX_PARTICLES, MAPPING_LEN)`.
//! A logical id is a position within its section; the entry is the physical
//! slot in the particle/beam data buffer. Physical slots never move while an
//! entity is alive, so beam endpoint slots stay valid across deletions.

use bytemuck::{Pod, Zeroable};

use crate::engine::config::PhysicsConstants;

/// Particle capacity. Bounded by the u16 snapshot section sizes
/// (2048 * 24 bytes must fit in a u16).
pub const MAX_PARTICLES: usize = 2048;

/// Beam capacity (1024 * 40 bytes must fit in a u16).
pub const MAX_BEAMS: usize = 1024;

/// Total mapping-table entries (particle section then beam section).
pub const MAPPING_LEN: usize = MAX_PARTICLES + MAX_BEAMS;

/// u32 words in the delete bitmap (one bit per mapping entry).
pub const DELETE_BITMAP_WORDS: usize = (MAPPING_LEN + 31) / 32;

/// Fixed-point scale for the atomic i32 beam-force accumulator.
pub const FORCE_FIXED_SCALE: f32 = 65536.0;

/// Scale applied to the raw beam force before it is stored as `stress`.
pub const STRESS_SCALE: f32 = 1.0 / 20.0;

pub const PARTICLE_STRIDE: usize = 24;
pub const BEAM_STRIDE: usize = 40;
pub const METADATA_SIZE: usize = 112;

/// Byte offset of the physics-constants region inside [`Metadata`]
/// (gravity through user force magnitude).
pub const METADATA_CONSTANTS_OFFSET: u64 = 48;

/// Byte offset of the per-frame input region inside [`Metadata`]
/// (cursor-active flag through keyboard force).
pub const METADATA_INPUT_OFFSET: u64 = 84;

/// One particle record. All physical particles have implicit unit mass;
/// acceleration is the per-tick accumulator, reset after integration.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct GpuParticle {
    pub position: [f32; 2],
    pub velocity: [f32; 2],
    pub acceleration: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<GpuParticle>() == PARTICLE_STRIDE);

/// One beam record.
///
/// `particles` packs the two endpoint *physical slots* as u16s, low half
/// then high half. `original_len` is immutable and is the strain
/// denominator; `target_len` mutates under plastic yield.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBeam {
    pub particles: u32,     // offset 0
    pub original_len: f32,  // offset 4
    pub target_len: f32,    // offset 8
    pub last_len: f32,      // offset 12
    pub spring: f32,        // offset 16
    pub damp: f32,          // offset 20
    pub yield_strain: f32,  // offset 24
    pub break_limit: f32,   // offset 28
    pub strain: f32,        // offset 32
    pub stress: f32,        // offset 36
}

const _: () = assert!(std::mem::size_of::<GpuBeam>() == BEAM_STRIDE);

impl GpuBeam {
    pub fn pack_slots(a: u16, b: u16) -> u32 {
        (a as u32) | ((b as u32) << 16)
    }

    pub fn slot_a(&self) -> u16 {
        (self.particles & 0xffff) as u16
    }

    pub fn slot_b(&self) -> u16 {
        (self.particles >> 16) as u16
    }
}

/// Five-word indirect-draw tuple, one per primitive type.
/// `instance_count` doubles as the live entity count.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub base_vertex: u32,
    pub first_instance: u32,
}

const _: () = assert!(std::mem::size_of::<DrawArgs>() == 20);

/// The metadata record: read by the compute kernels, written by the host
/// queue for inputs and constants, consumed by the render pass as the
/// indirect-draw argument source.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, PartialEq, Pod, Zeroable)]
pub struct Metadata {
    pub particle_draw: DrawArgs, // offset 0
    pub beam_draw: DrawArgs,     // offset 20
    pub max_particles: u32,      // offset 40
    pub max_beams: u32,          // offset 44
    pub gravity: [f32; 2],       // offset 48
    pub border_elasticity: f32,  // offset 56
    pub border_friction: f32,    // offset 60
    pub pair_elasticity: f32,    // offset 64
    pub pair_friction: f32,      // offset 68
    pub drag_coeff: f32,         // offset 72
    pub drag_exp: f32,           // offset 76
    pub user_strength: f32,      // offset 80
    pub cursor_active: u32,      // offset 84
    pub cursor_pos: [f32; 2],    // offset 88
    pub cursor_vel: [f32; 2],    // offset 96
    pub key_force: [f32; 2],     // offset 104
}

const _: () = assert!(std::mem::size_of::<Metadata>() == METADATA_SIZE);

impl Metadata {
    /// Fresh metadata for an empty world at full capacity.
    pub fn new(constants: &PhysicsConstants) -> Self {
        let mut meta = Self {
            particle_draw: DrawArgs {
                vertex_count: 3,
                ..Default::default()
            },
            beam_draw: DrawArgs {
                vertex_count: 2,
                ..Default::default()
            },
            max_particles: MAX_PARTICLES as u32,
            max_beams: MAX_BEAMS as u32,
            ..Default::default()
        };
        meta.apply_constants(constants);
        meta
    }

    pub fn particle_count(&self) -> usize {
        self.particle_draw.instance_count as usize
    }

    pub fn beam_count(&self) -> usize {
        self.beam_draw.instance_count as usize
    }

    pub fn set_counts(&mut self, particles: usize, beams: usize) {
        self.particle_draw.instance_count = particles as u32;
        self.beam_draw.instance_count = beams as u32;
    }

    pub fn apply_constants(&mut self, constants: &PhysicsConstants) {
        self.gravity = constants.gravity.to_array();
        self.border_elasticity = constants.border_elasticity;
        self.border_friction = constants.border_friction;
        self.pair_elasticity = constants.elasticity;
        self.pair_friction = constants.friction;
        self.drag_coeff = constants.drag_coeff;
        self.drag_exp = constants.drag_exp;
        self.user_strength = constants.user_strength;
    }

    pub fn constants(&self) -> PhysicsConstants {
        PhysicsConstants {
            gravity: self.gravity.into(),
            border_elasticity: self.border_elasticity,
            border_friction: self.border_friction,
            elasticity: self.pair_elasticity,
            friction: self.pair_friction,
            drag_coeff: self.drag_coeff,
            drag_exp: self.drag_exp,
            user_strength: self.user_strength,
        }
    }

    /// The constants region bytes (queue-written at
    /// [`METADATA_CONSTANTS_OFFSET`]).
    pub fn constants_bytes(&self) -> &[u8] {
        let all = bytemuck::bytes_of(self);
        &all[METADATA_CONSTANTS_OFFSET as usize..METADATA_INPUT_OFFSET as usize]
    }

    /// The input region bytes (queue-written at [`METADATA_INPUT_OFFSET`]).
    pub fn input_bytes(&self) -> &[u8] {
        let all = bytemuck::bytes_of(self);
        &all[METADATA_INPUT_OFFSET as usize..]
    }
}

/// Logical endpoint ids of a beam (positions within the live particle
/// prefix of the mapping table).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BeamEndpoints {
    pub a: u16,
    pub b: u16,
}

/// Write a particle record at `slot` in a raw particle buffer.
pub fn write_particle(buf: &mut [u8], slot: usize, particle: &GpuParticle) {
    let start = slot * PARTICLE_STRIDE;
    buf[start..start + PARTICLE_STRIDE].copy_from_slice(bytemuck::bytes_of(particle));
}

/// Read the particle record at `slot` from a raw particle buffer.
pub fn read_particle(buf: &[u8], slot: usize) -> GpuParticle {
    let start = slot * PARTICLE_STRIDE;
    bytemuck::pod_read_unaligned(&buf[start..start + PARTICLE_STRIDE])
}

/// Write a beam record at `slot`, translating the logical endpoint ids to
/// physical slots through the particle section of the mapping table.
pub fn write_beam(
    buf: &mut [u8],
    slot: usize,
    beam: &GpuBeam,
    endpoints: BeamEndpoints,
    mapping: &[u16],
) {
    let mut record = *beam;
    record.particles = GpuBeam::pack_slots(
        mapping[endpoints.a as usize],
        mapping[endpoints.b as usize],
    );
    let start = slot * BEAM_STRIDE;
    buf[start..start + BEAM_STRIDE].copy_from_slice(bytemuck::bytes_of(&record));
}

/// Read the beam record at `slot` without endpoint translation.
pub fn read_beam_raw(buf: &[u8], slot: usize) -> GpuBeam {
    let start = slot * BEAM_STRIDE;
    bytemuck::pod_read_unaligned(&buf[start..start + BEAM_STRIDE])
}

/// Read the beam record at `slot`, reconstructing logical endpoint ids by
/// linear scan of the live particle mapping prefix.
///
/// The scan is O(ParticleCount) per endpoint; it is only used while
/// loading a packed state back into the editing store.
pub fn read_beam(
    buf: &[u8],
    slot: usize,
    mapping: &[u16],
    particle_count: usize,
) -> Option<(GpuBeam, BeamEndpoints)> {
    let start = slot * BEAM_STRIDE;
    let record: GpuBeam = bytemuck::pod_read_unaligned(&buf[start..start + BEAM_STRIDE]);
    let find = |phys: u16| {
        mapping[..particle_count]
            .iter()
            .position(|&entry| entry == phys)
    };
    let a = find(record.slot_a())? as u16;
    let b = find(record.slot_b())? as u16;
    Some((record, BeamEndpoints { a, b }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn metadata_offsets_match_wgsl() {
        assert_eq!(offset_of!(Metadata, beam_draw), 20);
        assert_eq!(offset_of!(Metadata, max_particles), 40);
        assert_eq!(offset_of!(Metadata, gravity), 48);
        assert_eq!(offset_of!(Metadata, user_strength), 80);
        assert_eq!(offset_of!(Metadata, cursor_active), 84);
        assert_eq!(offset_of!(Metadata, cursor_pos), 88);
        assert_eq!(offset_of!(Metadata, cursor_vel), 96);
        assert_eq!(offset_of!(Metadata, key_force), 104);
        assert_eq!(
            METADATA_CONSTANTS_OFFSET as usize,
            offset_of!(Metadata, gravity)
        );
        assert_eq!(
            METADATA_INPUT_OFFSET as usize,
            offset_of!(Metadata, cursor_active)
        );
    }

    #[test]
    fn beam_slot_packing_round_trips() {
        let packed = GpuBeam::pack_slots(7, 1023);
        let beam = GpuBeam {
            particles: packed,
            ..Default::default()
        };
        assert_eq!(beam.slot_a(), 7);
        assert_eq!(beam.slot_b(), 1023);
    }

    #[test]
    fn particle_codec_round_trips() {
        let mut buf = vec![0u8; PARTICLE_STRIDE * 4];
        let p = GpuParticle {
            position: [12.5, -3.0],
            velocity: [0.25, 1.0],
            acceleration: [0.0, -0.5],
        };
        write_particle(&mut buf, 2, &p);
        assert_eq!(read_particle(&buf, 2), p);
        assert_eq!(read_particle(&buf, 0), GpuParticle::default());
    }

    #[test]
    fn beam_codec_translates_through_mapping() {
        // logical 0 -> slot 5, logical 1 -> slot 3
        let mut mapping = vec![0u16; MAPPING_LEN];
        mapping[0] = 5;
        mapping[1] = 3;

        let beam = GpuBeam {
            original_len: 100.0,
            target_len: 100.0,
            last_len: 100.0,
            spring: 10.0,
            damp: 1.0,
            yield_strain: 0.1,
            break_limit: 0.5,
            ..Default::default()
        };
        let mut buf = vec![0u8; BEAM_STRIDE];
        write_beam(&mut buf, 0, &beam, BeamEndpoints { a: 0, b: 1 }, &mapping);

        let (record, endpoints) = read_beam(&buf, 0, &mapping, 2).unwrap();
        assert_eq!(record.slot_a(), 5);
        assert_eq!(record.slot_b(), 3);
        assert_eq!(endpoints, BeamEndpoints { a: 0, b: 1 });
        assert_eq!(record.spring, 10.0);
    }

    #[test]
    fn applying_constants_twice_is_idempotent() {
        let constants = PhysicsConstants::default();
        let mut once = Metadata::new(&constants);
        once.apply_constants(&constants);
        let mut twice = once;
        twice.apply_constants(&constants);
        assert_eq!(once, twice);
    }

    #[test]
    fn constants_region_covers_the_slab() {
        let constants = PhysicsConstants::default();
        let meta = Metadata::new(&constants);
        assert_eq!(meta.constants_bytes().len(), 36);
        assert_eq!(meta.input_bytes().len(), 28);
        assert_eq!(meta.constants(), constants);
    }
}
