//! Compute pipelines for the simulation kernels.
//!
//! Both kernels share one bind group layout:
//!
//! | Binding | Type | Buffer |
//! |---------|------|--------|
//! | 0 | Storage (read_write) | metadata |
//! | 1 | Storage (read) | particles (read side) |
//! | 2 | Storage (read_write) | particles (write side) |
//! | 3 | Storage (read_write) | beams |
//! | 4 | Storage (read_write) | mapping (atomic u32 words) |
//! | 5 | Storage (read_write) | forces (atomic i32, fixed point) |
//! | 6 | Storage (read_write) | delete bitmap (atomic u32) |
//! | 7 | Uniform | sim params |
//!
//! The bind groups come in two variants: A reads `particles[0]` and writes
//! `particles[1]`, B swaps the roles. The orchestrator alternates A/B each
//! sub-tick so a pair of colliding particles is never updated in place
//! within one sub-step.

use super::buffers::SimulationBuffers;

pub struct SimulationPipelines {
    pub update: wgpu::ComputePipeline,
    pub delete: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
}

impl SimulationPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = Self::create_bind_group_layout(device);

        let update = Self::create_compute_pipeline(
            device,
            include_str!("../../../shaders/update.wgsl"),
            "main",
            &[&layout],
            "Update",
        );
        let delete = Self::create_compute_pipeline(
            device,
            include_str!("../../../shaders/delete.wgsl"),
            "main",
            &[&layout],
            "Delete",
        );

        Self {
            update,
            delete,
            layout,
        }
    }

    /// Bind group variants A (even sub-ticks) and B (odd sub-ticks).
    pub fn create_bind_groups(
        &self,
        device: &wgpu::Device,
        buffers: &SimulationBuffers,
    ) -> [wgpu::BindGroup; 2] {
        [
            self.create_bind_group(device, buffers, 0, 1, "Compute Bind Group A"),
            self.create_bind_group(device, buffers, 1, 0, "Compute Bind Group B"),
        ]
    }

    fn create_bind_group(
        &self,
        device: &wgpu::Device,
        buffers: &SimulationBuffers,
        read: usize,
        write: usize,
        label: &str,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffers.metadata.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: buffers.particles[read].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffers.particles[write].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: buffers.beams.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: buffers.mapping.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: buffers.forces.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: buffers.delete_bitmap.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: buffers.sim_params.as_entire_binding(),
                },
            ],
        })
    }

    fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Simulation Bind Group Layout"),
            entries: &[
                storage(0, false), // metadata
                storage(1, true),  // particles read
                storage(2, false), // particles write
                storage(3, false), // beams
                storage(4, false), // mapping
                storage(5, false), // forces
                storage(6, false), // delete bitmap
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        })
    }

    fn create_compute_pipeline(
        device: &wgpu::Device,
        shader_source: &str,
        entry_point: &str,
        bind_group_layouts: &[&wgpu::BindGroupLayout],
        label: &str,
    ) -> wgpu::ComputePipeline {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("{} Shader", label)),
            source: wgpu::ShaderSource::Wgsl(shader_source.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} Pipeline Layout", label)),
            bind_group_layouts,
            push_constant_ranges: &[],
        });

        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(&format!("{} Pipeline", label)),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        })
    }
}
