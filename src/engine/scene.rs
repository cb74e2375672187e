//! Host-side mutable scene store.
//!
//! The store is the editing representation: particles and beams keyed by
//! stable ids, with a per-particle beam index for O(1) attached-beam lookup
//! during editing and cascading deletion. [`SceneStore::write_state`]
//! compacts the scene into the packed device buffers (physical slot =
//! insertion order at write time); [`SceneStore::load_state`] rebuilds the
//! maps from packed buffers.
//!
//! Ids are stable during an editing session but NOT across a write/load
//! cycle: loading renumbers entities by their logical order.

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec2;
use thiserror::Error;

use crate::engine::layout::{
    self, BeamEndpoints, GpuBeam, GpuParticle, BEAM_STRIDE, MAPPING_LEN, MAX_BEAMS, MAX_PARTICLES,
    PARTICLE_STRIDE,
};

pub type ParticleId = u16;
pub type BeamId = u16;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SceneError {
    #[error("id {0} is already in use")]
    DuplicateId(u16),
    #[error("scene capacity exhausted")]
    CapacityExhausted,
    #[error("beam endpoint {0} does not exist")]
    MissingParticle(ParticleId),
}

/// A particle as edited on the host.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
}

impl Particle {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    fn to_gpu(self) -> GpuParticle {
        GpuParticle {
            position: self.position.to_array(),
            velocity: self.velocity.to_array(),
            acceleration: self.acceleration.to_array(),
        }
    }

    fn from_gpu(gpu: &GpuParticle) -> Self {
        Self {
            position: gpu.position.into(),
            velocity: gpu.velocity.into(),
            acceleration: gpu.acceleration.into(),
        }
    }
}

/// A beam as edited on the host. Endpoints are particle ids; the packed
/// physical-slot form only exists in the device buffers.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Beam {
    pub particle_a: ParticleId,
    pub particle_b: ParticleId,
    pub original_len: f32,
    pub target_len: f32,
    pub last_len: f32,
    pub spring: f32,
    pub damp: f32,
    pub yield_strain: f32,
    pub break_limit: f32,
    pub strain: f32,
    pub stress: f32,
}

impl Beam {
    /// A relaxed beam between two particles with the given rest length.
    pub fn relaxed(
        a: ParticleId,
        b: ParticleId,
        rest_len: f32,
        spring: f32,
        damp: f32,
        yield_strain: f32,
        break_limit: f32,
    ) -> Self {
        Self {
            particle_a: a,
            particle_b: b,
            original_len: rest_len,
            target_len: rest_len,
            last_len: rest_len,
            spring,
            damp,
            yield_strain,
            break_limit,
            strain: 0.0,
            stress: 0.0,
        }
    }

    fn to_gpu(self) -> GpuBeam {
        GpuBeam {
            particles: 0,
            original_len: self.original_len,
            target_len: self.target_len,
            last_len: self.last_len,
            spring: self.spring,
            damp: self.damp,
            yield_strain: self.yield_strain,
            break_limit: self.break_limit,
            strain: self.strain,
            stress: self.stress,
        }
    }

    fn from_gpu(gpu: &GpuBeam, endpoints: BeamEndpoints) -> Self {
        Self {
            particle_a: endpoints.a,
            particle_b: endpoints.b,
            original_len: gpu.original_len,
            target_len: gpu.target_len,
            last_len: gpu.last_len,
            spring: gpu.spring,
            damp: gpu.damp,
            yield_strain: gpu.yield_strain,
            break_limit: gpu.break_limit,
            strain: gpu.strain,
            stress: gpu.stress,
        }
    }
}

/// The scene compacted into packed device-buffer form.
///
/// Data buffers hold the live prefix only (slot-indexed, slots assigned in
/// insertion order); the mapping table is full length with identity
/// prefixes in both sections.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedScene {
    pub particle_bytes: Vec<u8>,
    pub beam_bytes: Vec<u8>,
    pub mapping: Vec<u16>,
    pub particle_count: usize,
    pub beam_count: usize,
}

/// Mutable in-memory scene.
#[derive(Debug, Clone, Default)]
pub struct SceneStore {
    particles: BTreeMap<ParticleId, Particle>,
    beams: BTreeMap<BeamId, Beam>,
    attached: BTreeMap<ParticleId, BTreeSet<BeamId>>,
    particle_order: Vec<ParticleId>,
    beam_order: Vec<BeamId>,
}

impl SceneStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn beam_count(&self) -> usize {
        self.beams.len()
    }

    pub fn add_particle(&mut self, id: ParticleId, particle: Particle) -> Result<(), SceneError> {
        if self.particles.len() >= MAX_PARTICLES {
            return Err(SceneError::CapacityExhausted);
        }
        if self.particles.contains_key(&id) {
            return Err(SceneError::DuplicateId(id));
        }
        self.particles.insert(id, particle);
        self.particle_order.push(id);
        Ok(())
    }

    pub fn add_beam(&mut self, id: BeamId, beam: Beam) -> Result<(), SceneError> {
        if self.beams.len() >= MAX_BEAMS {
            return Err(SceneError::CapacityExhausted);
        }
        if self.beams.contains_key(&id) {
            return Err(SceneError::DuplicateId(id));
        }
        for endpoint in [beam.particle_a, beam.particle_b] {
            if !self.particles.contains_key(&endpoint) {
                return Err(SceneError::MissingParticle(endpoint));
            }
        }
        self.attached.entry(beam.particle_a).or_default().insert(id);
        self.attached.entry(beam.particle_b).or_default().insert(id);
        self.beams.insert(id, beam);
        self.beam_order.push(id);
        Ok(())
    }

    /// Remove a particle and every beam attached to it. Idempotent.
    pub fn remove_particle(&mut self, id: ParticleId) {
        if self.particles.remove(&id).is_none() {
            return;
        }
        self.particle_order.retain(|&p| p != id);
        if let Some(attached) = self.attached.remove(&id) {
            for beam_id in attached {
                self.remove_beam(beam_id);
            }
        }
    }

    /// Remove a beam. Idempotent.
    pub fn remove_beam(&mut self, id: BeamId) {
        let Some(beam) = self.beams.remove(&id) else {
            return;
        };
        self.beam_order.retain(|&b| b != id);
        for endpoint in [beam.particle_a, beam.particle_b] {
            if let Some(set) = self.attached.get_mut(&endpoint) {
                set.remove(&id);
            }
        }
    }

    pub fn particle(&self, id: ParticleId) -> Option<&Particle> {
        self.particles.get(&id)
    }

    pub fn particle_mut(&mut self, id: ParticleId) -> Option<&mut Particle> {
        self.particles.get_mut(&id)
    }

    pub fn beam(&self, id: BeamId) -> Option<&Beam> {
        self.beams.get(&id)
    }

    pub fn particles(&self) -> impl Iterator<Item = (ParticleId, &Particle)> {
        self.particles.iter().map(|(&id, p)| (id, p))
    }

    pub fn beams(&self) -> impl Iterator<Item = (BeamId, &Beam)> {
        self.beams.iter().map(|(&id, b)| (id, b))
    }

    /// Beams attached to a particle, in id order.
    pub fn beams_attached(&self, id: ParticleId) -> impl Iterator<Item = BeamId> + '_ {
        self.attached.get(&id).into_iter().flatten().copied()
    }

    pub fn first_empty_particle_id(&self) -> Option<ParticleId> {
        (0..MAX_PARTICLES as u16).find(|id| !self.particles.contains_key(id))
    }

    pub fn first_empty_beam_id(&self) -> Option<BeamId> {
        (0..MAX_BEAMS as u16).find(|id| !self.beams.contains_key(id))
    }

    /// Compact the scene into packed buffers, assigning physical slots in
    /// insertion order.
    pub fn write_state(&self) -> PackedScene {
        let particle_count = self.particle_order.len();
        let beam_count = self.beam_order.len();

        let mut mapping = vec![0u16; MAPPING_LEN];
        for i in 0..particle_count {
            mapping[i] = i as u16;
        }
        for i in 0..beam_count {
            mapping[MAX_PARTICLES + i] = i as u16;
        }

        // particle id -> logical index (= physical slot at write time)
        let logical: BTreeMap<ParticleId, u16> = self
            .particle_order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i as u16))
            .collect();

        let mut particle_bytes = vec![0u8; particle_count * PARTICLE_STRIDE];
        for (slot, &id) in self.particle_order.iter().enumerate() {
            layout::write_particle(&mut particle_bytes, slot, &self.particles[&id].to_gpu());
        }

        let mut beam_bytes = vec![0u8; beam_count * BEAM_STRIDE];
        for (slot, &id) in self.beam_order.iter().enumerate() {
            let beam = &self.beams[&id];
            let endpoints = BeamEndpoints {
                a: logical[&beam.particle_a],
                b: logical[&beam.particle_b],
            };
            layout::write_beam(&mut beam_bytes, slot, &beam.to_gpu(), endpoints, &mapping);
        }

        PackedScene {
            particle_bytes,
            beam_bytes,
            mapping,
            particle_count,
            beam_count,
        }
    }

    /// Rebuild a store from packed buffers. Entities are renumbered: the
    /// particle at logical index `i` gets id `i`, likewise for beams.
    pub fn load_state(packed: &PackedScene) -> Self {
        let mut store = Self::new();
        for i in 0..packed.particle_count {
            let slot = packed.mapping[i] as usize;
            let gpu = layout::read_particle(&packed.particle_bytes, slot);
            store
                .add_particle(i as u16, Particle::from_gpu(&gpu))
                .expect("fresh store cannot reject compacted ids");
        }
        for i in 0..packed.beam_count {
            let slot = packed.mapping[MAX_PARTICLES + i] as usize;
            if let Some((gpu, endpoints)) = layout::read_beam(
                &packed.beam_bytes,
                slot,
                &packed.mapping,
                packed.particle_count,
            ) {
                store
                    .add_beam(i as u16, Beam::from_gpu(&gpu, endpoints))
                    .expect("fresh store cannot reject compacted ids");
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beam(a: ParticleId, b: ParticleId) -> Beam {
        Beam::relaxed(a, b, 100.0, 10.0, 1.0, 0.1, 0.5)
    }

    #[test]
    fn add_rejects_duplicates_and_overflow() {
        let mut store = SceneStore::new();
        store
            .add_particle(3, Particle::at(Vec2::new(1.0, 2.0)))
            .unwrap();
        assert_eq!(
            store.add_particle(3, Particle::default()),
            Err(SceneError::DuplicateId(3))
        );

        let mut full = SceneStore::new();
        for id in 0..MAX_PARTICLES as u16 {
            full.add_particle(id, Particle::default()).unwrap();
        }
        assert_eq!(
            full.add_particle(u16::MAX, Particle::default()),
            Err(SceneError::CapacityExhausted)
        );
    }

    #[test]
    fn add_beam_requires_endpoints() {
        let mut store = SceneStore::new();
        store.add_particle(0, Particle::default()).unwrap();
        assert_eq!(
            store.add_beam(0, beam(0, 9)),
            Err(SceneError::MissingParticle(9))
        );
    }

    #[test]
    fn remove_particle_cascades_to_attached_beams() {
        let mut store = SceneStore::new();
        for id in 0..3 {
            store.add_particle(id, Particle::default()).unwrap();
        }
        store.add_beam(0, beam(0, 1)).unwrap();
        store.add_beam(1, beam(1, 2)).unwrap();
        store.add_beam(2, beam(0, 2)).unwrap();

        assert_eq!(store.beams_attached(1).collect::<Vec<_>>(), vec![0, 1]);

        store.remove_particle(1);
        assert_eq!(store.particle_count(), 2);
        assert_eq!(store.beam_count(), 1);
        assert!(store.beam(2).is_some());

        // idempotent
        store.remove_particle(1);
        store.remove_beam(0);
        store.remove_beam(0);
        assert_eq!(store.beam_count(), 1);
    }

    #[test]
    fn first_empty_ids_skip_used_slots() {
        let mut store = SceneStore::new();
        store.add_particle(0, Particle::default()).unwrap();
        store.add_particle(1, Particle::default()).unwrap();
        store.add_particle(3, Particle::default()).unwrap();
        assert_eq!(store.first_empty_particle_id(), Some(2));
        assert_eq!(store.first_empty_beam_id(), Some(0));
    }

    #[test]
    fn write_state_assigns_slots_in_insertion_order() {
        let mut store = SceneStore::new();
        // inserted out of id order on purpose
        store
            .add_particle(7, Particle::at(Vec2::new(70.0, 0.0)))
            .unwrap();
        store
            .add_particle(2, Particle::at(Vec2::new(20.0, 0.0)))
            .unwrap();
        store.add_beam(0, beam(7, 2)).unwrap();

        let packed = store.write_state();
        assert_eq!(packed.particle_count, 2);
        assert_eq!(layout::read_particle(&packed.particle_bytes, 0).position[0], 70.0);
        assert_eq!(layout::read_particle(&packed.particle_bytes, 1).position[0], 20.0);

        let (gpu, _) = layout::read_beam(&packed.beam_bytes, 0, &packed.mapping, 2).unwrap();
        assert_eq!(gpu.slot_a(), 0); // particle 7 was inserted first
        assert_eq!(gpu.slot_b(), 1);
    }

    #[test]
    fn write_load_cycle_renumbers_but_preserves_content() {
        let mut store = SceneStore::new();
        store
            .add_particle(5, Particle::at(Vec2::new(400.0, 500.0)))
            .unwrap();
        store
            .add_particle(9, Particle::at(Vec2::new(500.0, 500.0)))
            .unwrap();
        store.add_beam(4, beam(5, 9)).unwrap();

        let reloaded = SceneStore::load_state(&store.write_state());

        // ids were renumbered by logical order
        assert!(reloaded.particle(0).is_some());
        assert!(reloaded.particle(5).is_none());
        assert_eq!(reloaded.particle_count(), 2);
        assert_eq!(reloaded.beam_count(), 1);

        let loaded_beam = reloaded.beam(0).unwrap();
        assert_eq!(loaded_beam.particle_a, 0);
        assert_eq!(loaded_beam.particle_b, 1);
        assert_eq!(loaded_beam.original_len, 100.0);

        // positions survive the cycle
        let positions: Vec<Vec2> = reloaded.particles().map(|(_, p)| p.position).collect();
        assert_eq!(
            positions,
            vec![Vec2::new(400.0, 500.0), Vec2::new(500.0, 500.0)]
        );
    }
}
