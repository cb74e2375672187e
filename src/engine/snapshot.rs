//! Snapshot codec: framed save/load of the live GPU-resident state.
//!
//! A snapshot is a self-describing binary blob:
//!
//! ```text
//! u16[6]  header: [header bytes, constants bytes, particle-mapping bytes,
//!                  particle-data bytes, beam-mapping bytes, beam-data bytes]
//! f32[8]  constants slab: gravity x/y, border elasticity, border friction,
//!         pair elasticity, pair friction, drag coefficient, drag exponent
//! u16[n]  live particle mapping (logical order)
//! 24B[n]  live particle records (logical order)
//! u16[m]  live beam mapping (logical order)
//! 40B[m]  live beam records (logical order)
//! ```
//!
//! Particle and beam records are stored in logical order but keep their
//! recorded physical slots in the mapping sections, so beam endpoint slots
//! stay valid after a load scatters the records back. Beyond the capacity
//! fit check there is no semantic validation: a malformed snapshot yields
//! bounded, implementation-defined state (truncated sections are clipped,
//! out-of-range slots are skipped).

use crate::engine::config::PhysicsConstants;
use crate::engine::error::EngineError;
use crate::engine::layout::{
    self, GpuBeam, GpuParticle, Metadata, BEAM_STRIDE, MAPPING_LEN, MAX_BEAMS, MAX_PARTICLES,
    PARTICLE_STRIDE,
};

const HEADER_WORDS: usize = 6;
const HEADER_BYTES: usize = HEADER_WORDS * 2;
const CONSTANTS_BYTES: usize = 8 * 4;

/// A decoded snapshot: the physics-constants slab plus the live entities
/// in logical order with their physical slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub constants_slab: [f32; 8],
    pub particle_mapping: Vec<u16>,
    pub particles: Vec<GpuParticle>,
    pub beam_mapping: Vec<u16>,
    pub beams: Vec<GpuBeam>,
}

/// Full-size buffer images ready to queue-write to the device.
pub struct DeviceImages {
    pub particle_bytes: Vec<u8>,
    pub beam_bytes: Vec<u8>,
    pub mapping_bytes: Vec<u8>,
    pub particle_count: usize,
    pub beam_count: usize,
}

impl Snapshot {
    /// Build a snapshot from full device-buffer contents.
    pub fn capture(
        metadata: &Metadata,
        mapping_bytes: &[u8],
        particle_bytes: &[u8],
        beam_bytes: &[u8],
    ) -> Self {
        let mapping: Vec<u16> = mapping_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let particle_count = metadata.particle_count().min(MAX_PARTICLES);
        let beam_count = metadata.beam_count().min(MAX_BEAMS);

        let particle_mapping = mapping[..particle_count].to_vec();
        let beam_mapping = mapping[MAX_PARTICLES..MAX_PARTICLES + beam_count].to_vec();

        let particles = particle_mapping
            .iter()
            .map(|&slot| layout::read_particle(particle_bytes, slot as usize))
            .collect();
        let beams = beam_mapping
            .iter()
            .map(|&slot| layout::read_beam_raw(beam_bytes, slot as usize))
            .collect();

        let constants = metadata.constants();
        Self {
            constants_slab: [
                constants.gravity.x,
                constants.gravity.y,
                constants.border_elasticity,
                constants.border_friction,
                constants.elasticity,
                constants.friction,
                constants.drag_coeff,
                constants.drag_exp,
            ],
            particle_mapping,
            particles,
            beam_mapping,
            beams,
        }
    }

    /// The constants slab as [`PhysicsConstants`]. The user force magnitude
    /// is not part of the slab and is carried over from the caller.
    pub fn constants(&self, user_strength: f32) -> PhysicsConstants {
        let s = &self.constants_slab;
        PhysicsConstants {
            gravity: glam::Vec2::new(s[0], s[1]),
            border_elasticity: s[2],
            border_friction: s[3],
            elasticity: s[4],
            friction: s[5],
            drag_coeff: s[6],
            drag_exp: s[7],
            user_strength,
        }
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn beam_count(&self) -> usize {
        self.beams.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let header: [u16; HEADER_WORDS] = [
            HEADER_BYTES as u16,
            CONSTANTS_BYTES as u16,
            (self.particle_mapping.len() * 2) as u16,
            (self.particles.len() * PARTICLE_STRIDE) as u16,
            (self.beam_mapping.len() * 2) as u16,
            (self.beams.len() * BEAM_STRIDE) as u16,
        ];

        let mut out = Vec::with_capacity(
            HEADER_BYTES
                + CONSTANTS_BYTES
                + header[2] as usize
                + header[3] as usize
                + header[4] as usize
                + header[5] as usize,
        );
        out.extend_from_slice(bytemuck::cast_slice(&header));
        out.extend_from_slice(bytemuck::cast_slice(&self.constants_slab));
        out.extend_from_slice(bytemuck::cast_slice(&self.particle_mapping));
        out.extend_from_slice(bytemuck::cast_slice(&self.particles));
        out.extend_from_slice(bytemuck::cast_slice(&self.beam_mapping));
        out.extend_from_slice(bytemuck::cast_slice(&self.beams));
        out
    }

    /// Parse a snapshot. Fails with [`EngineError::CapacityExceeded`] when
    /// either declared mapping section exceeds the device capacities;
    /// anything else malformed is clipped, never rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self, EngineError> {
        let mut header = [0u16; HEADER_WORDS];
        for (i, word) in header.iter_mut().enumerate() {
            let lo = bytes.get(i * 2).copied().unwrap_or(0);
            let hi = bytes.get(i * 2 + 1).copied().unwrap_or(0);
            *word = u16::from_le_bytes([lo, hi]);
        }

        let declared_particles = header[2] as usize / 2;
        let declared_beams = header[4] as usize / 2;
        if declared_particles > MAX_PARTICLES || declared_beams > MAX_BEAMS {
            return Err(EngineError::CapacityExceeded {
                particles: declared_particles,
                beams: declared_beams,
                max_particles: MAX_PARTICLES,
                max_beams: MAX_BEAMS,
            });
        }

        fn section<'a>(bytes: &'a [u8], offset: &mut usize, len: usize) -> &'a [u8] {
            let start = (*offset).min(bytes.len());
            let end = (*offset + len).min(bytes.len());
            *offset += len;
            &bytes[start..end]
        }
        let mut offset = header[0] as usize;

        let constants_raw = section(bytes, &mut offset, header[1] as usize);
        let mut constants_slab = [0.0f32; 8];
        for (i, value) in constants_slab.iter_mut().enumerate() {
            if let Some(chunk) = constants_raw.get(i * 4..i * 4 + 4) {
                *value = f32::from_le_bytes(chunk.try_into().unwrap());
            }
        }

        let pmap_raw = section(bytes, &mut offset, header[2] as usize);
        let particle_mapping: Vec<u16> = pmap_raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        let pdata_raw = section(bytes, &mut offset, header[3] as usize);
        let particles: Vec<GpuParticle> = pdata_raw
            .chunks_exact(PARTICLE_STRIDE)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        let bmap_raw = section(bytes, &mut offset, header[4] as usize);
        let beam_mapping: Vec<u16> = bmap_raw
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        let bdata_raw = section(bytes, &mut offset, header[5] as usize);
        let beams: Vec<GpuBeam> = bdata_raw
            .chunks_exact(BEAM_STRIDE)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        Ok(Self {
            constants_slab,
            particle_mapping,
            particles,
            beam_mapping,
            beams,
        })
    }

    /// Scatter the records back into full-size device buffer images.
    /// Records whose recorded slot is out of range are skipped.
    pub fn device_images(&self) -> DeviceImages {
        let mut particle_bytes = vec![0u8; MAX_PARTICLES * PARTICLE_STRIDE];
        let mut beam_bytes = vec![0u8; MAX_BEAMS * BEAM_STRIDE];
        let mut mapping = vec![0u16; MAPPING_LEN];

        let mut particle_count = 0;
        for (&slot, particle) in self.particle_mapping.iter().zip(&self.particles) {
            if (slot as usize) >= MAX_PARTICLES {
                continue;
            }
            layout::write_particle(&mut particle_bytes, slot as usize, particle);
            mapping[particle_count] = slot;
            particle_count += 1;
        }

        let mut beam_count = 0;
        for (&slot, beam) in self.beam_mapping.iter().zip(&self.beams) {
            if (slot as usize) >= MAX_BEAMS {
                continue;
            }
            let start = slot as usize * BEAM_STRIDE;
            beam_bytes[start..start + BEAM_STRIDE].copy_from_slice(bytemuck::bytes_of(beam));
            mapping[MAX_PARTICLES + beam_count] = slot;
            beam_count += 1;
        }

        DeviceImages {
            particle_bytes,
            beam_bytes,
            mapping_bytes: bytemuck::cast_slice(&mapping).to_vec(),
            particle_count,
            beam_count,
        }
    }
}
