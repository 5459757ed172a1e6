use crate::{
    data_structures::model::{ModelVertex, Vertex},
    pipelines::{depth_state, mk_render_pipeline},
};

fn layout(
    device: &wgpu::Device,
    scene_layout: &wgpu::BindGroupLayout,
    object_layout: &wgpu::BindGroupLayout,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Mesh Pipeline Layout"),
        bind_group_layouts: &[scene_layout, object_layout],
        immediate_size: 0,
    })
}

/// Opaque lit meshes: the ground and every model mesh.
pub fn mk_mesh_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    scene_layout: &wgpu::BindGroupLayout,
    object_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    mk_render_pipeline(
        device,
        "Mesh Pipeline",
        &layout(device, scene_layout, object_layout),
        color_format,
        Some(wgpu::BlendState::REPLACE),
        depth_state(true, wgpu::CompareFunction::Less),
        Some(wgpu::Face::Back),
        &[ModelVertex::desc()],
        wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("mesh.wgsl").into()),
        },
    )
}

/// Meshes flattened onto the ground along the key light.
pub fn mk_shadow_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    scene_layout: &wgpu::BindGroupLayout,
    object_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    mk_render_pipeline(
        device,
        "Shadow Pipeline",
        &layout(device, scene_layout, object_layout),
        color_format,
        Some(wgpu::BlendState::ALPHA_BLENDING),
        depth_state(false, wgpu::CompareFunction::LessEqual),
        // flattening flips the winding of half the faces
        None,
        &[ModelVertex::desc()],
        wgpu::ShaderModuleDescriptor {
            label: Some("Shadow Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shadow.wgsl").into()),
        },
    )
}
