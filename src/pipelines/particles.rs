use crate::{
    data_structures::model::{ParticleInstance, Vertex},
    pipelines::{depth_state, mk_render_pipeline},
};

/// Camera facing quads, one instance per particle, six vertices each.
pub fn mk_particle_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    scene_layout: &wgpu::BindGroupLayout,
    object_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Pipeline Layout"),
        bind_group_layouts: &[scene_layout, object_layout],
        immediate_size: 0,
    });

    mk_render_pipeline(
        device,
        "Particle Pipeline",
        &layout,
        color_format,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        depth_state(false, wgpu::CompareFunction::Less),
        None,
        &[ParticleInstance::desc()],
        wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("particles.wgsl").into()),
        },
    )
}
