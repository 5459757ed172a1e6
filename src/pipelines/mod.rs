//! Render pipelines of the wgpu backend.
//!
//! All pipelines share one render pass over the surface and its depth
//! buffer. They are drawn in this order: background, opaque meshes, planar
//! shadows, particles.

use bytemuck::{Pod, Zeroable};

use crate::data_structures::texture::Texture;

pub mod background;
pub mod mesh;
pub mod particles;

/// Per-frame values shared by every pipeline (bind group 0).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct SceneUniform {
    pub view_proj: [[f32; 4]; 4],
    /// w: exponential fog density
    pub camera_position: [f32; 4],
    pub camera_right: [f32; 4],
    pub camera_up: [f32; 4],
    /// Unit vector towards the key light, w: its intensity.
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    /// w: hemisphere intensity
    pub sky_color: [f32; 4],
    pub ground_color: [f32; 4],
    pub fog_color: [f32; 4],
    /// x: height of the shadow plane, y: shadow opacity
    pub shadow: [f32; 4],
}

/// Per-object values (bind group 1).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
    /// mesh: metalness, roughness; particles: size, rotation
    pub params: [f32; 4],
}

/// Everything the backend draws with, created once per device.
#[derive(Debug)]
pub struct Pipelines {
    pub scene_layout: wgpu::BindGroupLayout,
    pub object_layout: wgpu::BindGroupLayout,
    pub texture_layout: wgpu::BindGroupLayout,
    pub background: wgpu::RenderPipeline,
    pub mesh: wgpu::RenderPipeline,
    pub shadow: wgpu::RenderPipeline,
    pub particles: wgpu::RenderPipeline,
}

impl Pipelines {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let scene_layout = uniform_layout(device, "scene_bind_group_layout");
        let object_layout = uniform_layout(device, "object_bind_group_layout");
        let texture_layout = background::texture_layout(device);
        Self {
            background: background::mk_background_pipeline(device, color_format, &texture_layout),
            mesh: mesh::mk_mesh_pipeline(device, color_format, &scene_layout, &object_layout),
            shadow: mesh::mk_shadow_pipeline(device, color_format, &scene_layout, &object_layout),
            particles: particles::mk_particle_pipeline(
                device,
                color_format,
                &scene_layout,
                &object_layout,
            ),
            scene_layout,
            object_layout,
            texture_layout,
        }
    }
}

fn uniform_layout(device: &wgpu::Device, label: &str) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }],
        label: Some(label),
    })
}

/// Depth test against the shared depth buffer.
pub fn depth_state(write: bool, compare: wgpu::CompareFunction) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: Texture::DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn mk_render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
    depth: wgpu::DepthStencilState,
    cull_mode: Option<wgpu::Face>,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    shader: wgpu::ShaderModuleDescriptor,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(shader);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(depth),
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniforms_keep_uniform_buffer_alignment() {
        assert_eq!(std::mem::size_of::<SceneUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<ObjectUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<SceneUniform>(), 64 + 9 * 16);
    }
}
