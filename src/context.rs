//! The wgpu rendering backend.
//!
//! [`WgpuBackend`] owns the surface, device, queue, pipelines and every GPU
//! object the scene allocates. Native builds use the primary backends
//! (Vulkan, Metal, DX12); the browser build goes through WebGL2.

use std::{collections::HashMap, iter, sync::Arc};

use bytemuck::Zeroable;
use cgmath::{EuclideanSpace, InnerSpace};
use log::{debug, info, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    backend::{FrameView, Geometry, Light, Material, RenderBackend, ResourceId, Viewport},
    data_structures::{
        model::ParticleInstance,
        scene_graph::SceneGraph,
        texture::{DecodedImage, Texture},
    },
    error::SceneError,
    pipelines::{ObjectUniform, Pipelines, SceneUniform},
};

/// Opacity of the planar shadows under the model.
const SHADOW_OPACITY: f32 = 0.35;
/// Lift of the shadow plane above the ground against z-fighting.
const SHADOW_LIFT: f32 = 0.01;

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(srgb_to_linear)
}

#[derive(Debug)]
struct UniformBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformBinding {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, label: &str) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&ObjectUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(label),
        });
        Self { buffer, bind_group }
    }
}

#[derive(Debug)]
enum GpuResource {
    Mesh {
        vertices: wgpu::Buffer,
        indices: wgpu::Buffer,
        index_count: u32,
    },
    Points {
        instances: wgpu::Buffer,
        count: u32,
    },
    Material {
        material: Material,
        lit: UniformBinding,
        /// Used by the shadow pass, only for standard materials.
        shadow: UniformBinding,
    },
    Texture {
        texture: Texture,
        bind_group: wgpu::BindGroup,
    },
    Light(Light),
}

impl GpuResource {
    fn destroy(self) {
        match self {
            GpuResource::Mesh {
                vertices, indices, ..
            } => {
                vertices.destroy();
                indices.destroy();
            }
            GpuResource::Points { instances, .. } => instances.destroy(),
            GpuResource::Material { lit, shadow, .. } => {
                lit.buffer.destroy();
                shadow.buffer.destroy();
            }
            GpuResource::Texture { texture, .. } => texture.texture.destroy(),
            GpuResource::Light(_) => (),
        }
    }
}

#[derive(Debug)]
struct Gpu {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_texture: Texture,
    pipelines: Pipelines,
    scene: wgpu::Buffer,
    scene_bind_group: wgpu::BindGroup,
}

impl Gpu {
    fn configure(&mut self, width: u32, height: u32) {
        let max = self.device.limits().max_texture_dimension_2d;
        self.config.width = width.clamp(1, max);
        self.config.height = height.clamp(1, max);
        self.surface.configure(&self.device, &self.config);
        self.depth_texture = Texture::create_depth_texture(
            &self.device,
            [self.config.width, self.config.height],
            "depth_texture",
        );
    }
}

/// A mesh draw collected from the scene graph.
struct MeshDraw {
    geometry: ResourceId,
    material: ResourceId,
    model: cgmath::Matrix4<f32>,
    cast_shadow: bool,
}

#[derive(Debug)]
pub struct WgpuBackend {
    window: Arc<Window>,
    gpu: Option<Gpu>,
    resources: HashMap<ResourceId, GpuResource>,
    next_id: u64,
    shadows: bool,
    clear_color: [f32; 3],
    fog_density: f32,
    background: Option<ResourceId>,
}

impl WgpuBackend {
    const TARGET: ResourceId = ResourceId(0);

    fn gpu(&self) -> Result<&Gpu, SceneError> {
        self.gpu
            .as_ref()
            .ok_or_else(|| SceneError::backend("the graphics context was lost"))
    }

    fn insert(&mut self, resource: GpuResource) -> ResourceId {
        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.resources.insert(id, resource);
        id
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    fn scene_uniform(&self, scene: &SceneGraph, view: &FrameView<'_>) -> (SceneUniform, bool) {
        let camera = view.camera;
        let forward = (camera.target - camera.position).normalize();
        let right = forward.cross(cgmath::Vector3::unit_y()).normalize();
        let up = right.cross(forward);

        let mut uniform = SceneUniform::zeroed();
        uniform.view_proj = camera.view_proj().into();
        uniform.camera_position = camera.position.to_vec().extend(self.fog_density).into();
        uniform.camera_right = right.extend(0.0).into();
        uniform.camera_up = up.extend(0.0).into();
        let [r, g, b] = linear(self.clear_color);
        uniform.fog_color = [r, g, b, 1.0];
        uniform.light_direction = [0.0, 1.0, 0.0, 0.0];

        let mut casting = false;
        for source in scene.lights() {
            match &source.light {
                Light::Hemisphere {
                    sky,
                    ground,
                    intensity,
                } => {
                    let [r, g, b] = linear(*sky);
                    uniform.sky_color = [r, g, b, *intensity];
                    let [r, g, b] = linear(*ground);
                    uniform.ground_color = [r, g, b, 1.0];
                }
                Light::Directional {
                    color,
                    intensity,
                    position,
                    ..
                } => {
                    let direction = cgmath::Vector3::from(*position).normalize();
                    uniform.light_direction = direction.extend(*intensity).into();
                    let [r, g, b] = linear(*color);
                    uniform.light_color = [r, g, b, 1.0];
                    casting |= source.cast_shadow;
                }
            }
        }
        let plane = scene
            .ground()
            .map_or(0.0, |ground| ground.transform.position.y)
            + SHADOW_LIFT;
        uniform.shadow = [plane, SHADOW_OPACITY, 0.0, 0.0];
        (uniform, casting && self.shadows)
    }

    fn mesh_draws(scene: &SceneGraph) -> Vec<MeshDraw> {
        let mut draws = Vec::new();
        if let Some(ground) = scene.ground() {
            draws.push(MeshDraw {
                geometry: ground.geometry.id,
                material: ground.material.id,
                model: ground.transform.to_matrix(),
                cast_shadow: false,
            });
        }
        for root in scene.models() {
            for mesh in &root.meshes {
                draws.push(MeshDraw {
                    geometry: mesh.geometry.id,
                    material: mesh.material.id,
                    model: root.world_matrix(mesh),
                    cast_shadow: mesh.cast_shadow,
                });
            }
        }
        draws
    }
}

impl RenderBackend for WgpuBackend {
    type Surface = Arc<Window>;

    async fn acquire(window: Arc<Window>) -> Result<Self, SceneError> {
        let size = window.inner_size();

        info!("wgpu setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| SceneError::backend(format!("no surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| SceneError::backend(format!("no suitable adapter: {e}")))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("backdrop_device"),
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features, so if
                // we're building for the web we'll have to disable some.
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
                } else {
                    wgpu::Limits::default()
                },
                memory_hints: Default::default(),
                experimental_features: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|e| SceneError::backend(format!("no device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour and expect an sRGB surface.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| SceneError::backend("surface is incompatible with the adapter"))?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let pipelines = Pipelines::new(&device, config.format);
        let scene = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Buffer"),
            contents: bytemuck::bytes_of(&SceneUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &pipelines.scene_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: scene.as_entire_binding(),
            }],
            label: Some("scene_bind_group"),
        });
        let depth_texture =
            Texture::create_depth_texture(&device, [config.width, config.height], "depth_texture");

        info!(
            "rendering with {:?} into {:?}",
            adapter.get_info().backend,
            config.format
        );

        Ok(Self {
            window,
            gpu: Some(Gpu {
                surface,
                device,
                queue,
                config,
                depth_texture,
                pipelines,
                scene,
                scene_bind_group,
            }),
            resources: HashMap::new(),
            next_id: Self::TARGET.0 + 1,
            shadows: false,
            clear_color: [0.0; 3],
            fog_density: 0.0,
            background: None,
        })
    }

    fn surface_size(&self) -> (u32, u32) {
        let size: winit::dpi::LogicalSize<u32> =
            self.window.inner_size().to_logical(self.window.scale_factor());
        (size.width.max(1), size.height.max(1))
    }

    fn device_pixel_ratio(&self) -> f32 {
        self.window.scale_factor() as f32
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        let (width, height) = viewport.physical_size();
        if let Some(gpu) = self.gpu.as_mut() {
            debug!("surface {width}x{height} at ratio {}", viewport.pixel_ratio);
            gpu.configure(width, height);
        }
    }

    fn set_shadows_enabled(&mut self, enabled: bool) {
        self.shadows = enabled;
    }

    fn set_environment(&mut self, clear_color: [f32; 3], fog_density: f32) {
        self.clear_color = clear_color;
        self.fog_density = fog_density;
    }

    fn create_geometry(&mut self, geometry: Geometry<'_>) -> Result<ResourceId, SceneError> {
        let gpu = self.gpu()?;
        let resource = match geometry {
            Geometry::Mesh(mesh) => GpuResource::Mesh {
                vertices: gpu
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("{} Vertex Buffer", mesh.name)),
                        contents: bytemuck::cast_slice(&mesh.vertices()),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                indices: gpu
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("{} Index Buffer", mesh.name)),
                        contents: bytemuck::cast_slice(&mesh.indices),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                index_count: mesh.indices.len() as u32,
            },
            Geometry::Points(points) => {
                let instances: Vec<ParticleInstance> = points
                    .iter()
                    .map(|&position| ParticleInstance { position })
                    .collect();
                GpuResource::Points {
                    instances: gpu
                        .device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("Particle Instance Buffer"),
                            contents: bytemuck::cast_slice(&instances),
                            usage: wgpu::BufferUsages::VERTEX,
                        }),
                    count: instances.len() as u32,
                }
            }
        };
        Ok(self.insert(resource))
    }

    fn create_material(&mut self, material: &Material) -> Result<ResourceId, SceneError> {
        let gpu = self.gpu()?;
        let layout = &gpu.pipelines.object_layout;
        let resource = GpuResource::Material {
            material: material.clone(),
            lit: UniformBinding::new(&gpu.device, layout, "material_bind_group"),
            shadow: UniformBinding::new(&gpu.device, layout, "shadow_bind_group"),
        };
        Ok(self.insert(resource))
    }

    fn update_material(&mut self, id: ResourceId, material: &Material) -> Result<(), SceneError> {
        match self.resources.get_mut(&id) {
            Some(GpuResource::Material { material: current, .. }) => {
                *current = material.clone();
                Ok(())
            }
            _ => Err(SceneError::backend(format!("{id:?} is not a live material"))),
        }
    }

    fn create_texture(&mut self, image: &DecodedImage) -> Result<ResourceId, SceneError> {
        let gpu = self.gpu()?;
        let texture = Texture::from_decoded(&gpu.device, &gpu.queue, image)
            .map_err(|e| SceneError::backend(format!("{e:#}")))?;
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &gpu.pipelines.texture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
            label: Some(&image.source),
        });
        Ok(self.insert(GpuResource::Texture {
            texture,
            bind_group,
        }))
    }

    fn create_light(&mut self, light: &Light) -> Result<ResourceId, SceneError> {
        self.gpu()?;
        Ok(self.insert(GpuResource::Light(light.clone())))
    }

    fn set_background(&mut self, texture: Option<ResourceId>) {
        self.background = texture;
    }

    fn draw(&mut self, scene: &SceneGraph, view: FrameView<'_>) -> anyhow::Result<()> {
        let (uniform, shadows) = self.scene_uniform(scene, &view);
        let meshes = Self::mesh_draws(scene);
        let Some(gpu) = self.gpu.as_mut() else {
            anyhow::bail!("draw after the graphics context was lost");
        };

        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                let (width, height) = (gpu.config.width, gpu.config.height);
                gpu.configure(width, height);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        let gpu = &*gpu;

        gpu.queue
            .write_buffer(&gpu.scene, 0, bytemuck::bytes_of(&uniform));
        for draw in &meshes {
            if let Some(GpuResource::Material {
                material: Material::Standard {
                    color,
                    metalness,
                    roughness,
                },
                lit,
                shadow,
            }) = self.resources.get(&draw.material)
            {
                let [r, g, b] = linear([color[0], color[1], color[2]]);
                let object = ObjectUniform {
                    model: draw.model.into(),
                    color: [r, g, b, color[3]],
                    params: [*metalness, *roughness, 0.0, 0.0],
                };
                gpu.queue
                    .write_buffer(&lit.buffer, 0, bytemuck::bytes_of(&object));
                gpu.queue
                    .write_buffer(&shadow.buffer, 0, bytemuck::bytes_of(&object));
            }
        }
        let particles = scene.particle_field().and_then(|field| {
            match (
                self.resources.get(&field.geometry.id),
                self.resources.get(&field.material.id),
            ) {
                (
                    Some(GpuResource::Points { instances, count }),
                    Some(GpuResource::Material {
                        material: Material::Points {
                            color,
                            size,
                            opacity,
                        },
                        lit,
                        ..
                    }),
                ) if *count > 0 => {
                    let [r, g, b] = linear(*color);
                    let object = ObjectUniform {
                        model: cgmath::Matrix4::from_scale(1.0).into(),
                        color: [r, g, b, *opacity],
                        params: [*size, view.particle_rotation, 0.0, 0.0],
                    };
                    gpu.queue
                        .write_buffer(&lit.buffer, 0, bytemuck::bytes_of(&object));
                    Some((instances, *count, &lit.bind_group))
                }
                _ => None,
            }
        });

        let target = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let [r, g, b] = linear(self.clear_color);
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Backdrop Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(GpuResource::Texture { bind_group, .. }) =
                self.background.and_then(|id| self.resources.get(&id))
            {
                render_pass.set_pipeline(&gpu.pipelines.background);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.draw(0..3, 0..1);
            }

            render_pass.set_bind_group(0, &gpu.scene_bind_group, &[]);
            let resolved: Vec<_> = meshes
                .iter()
                .filter_map(|draw| {
                    match (
                        self.resources.get(&draw.geometry),
                        self.resources.get(&draw.material),
                    ) {
                        (
                            Some(GpuResource::Mesh {
                                vertices,
                                indices,
                                index_count,
                            }),
                            Some(GpuResource::Material { lit, shadow, .. }),
                        ) if *index_count > 0 => Some((draw, vertices, indices, *index_count, lit, shadow)),
                        _ => None,
                    }
                })
                .collect();

            render_pass.set_pipeline(&gpu.pipelines.mesh);
            for (_, vertices, indices, index_count, lit, _) in &resolved {
                render_pass.set_bind_group(1, &lit.bind_group, &[]);
                render_pass.set_vertex_buffer(0, vertices.slice(..));
                render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..*index_count, 0, 0..1);
            }

            if shadows {
                render_pass.set_pipeline(&gpu.pipelines.shadow);
                for (draw, vertices, indices, index_count, _, shadow) in &resolved {
                    if !draw.cast_shadow {
                        continue;
                    }
                    render_pass.set_bind_group(1, &shadow.bind_group, &[]);
                    render_pass.set_vertex_buffer(0, vertices.slice(..));
                    render_pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..*index_count, 0, 0..1);
                }
            }

            if let Some((instances, count, bind_group)) = particles {
                render_pass.set_pipeline(&gpu.pipelines.particles);
                render_pass.set_bind_group(1, bind_group, &[]);
                render_pass.set_vertex_buffer(0, instances.slice(..));
                render_pass.draw(0..6, 0..count);
            }
        }

        gpu.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }

    fn dispose(&mut self, id: ResourceId) -> Result<(), SceneError> {
        match self.resources.remove(&id) {
            Some(resource) => {
                if self.background == Some(id) {
                    self.background = None;
                }
                resource.destroy();
            }
            None => debug!("{id:?} already disposed"),
        }
        Ok(())
    }

    fn render_target(&self) -> ResourceId {
        Self::TARGET
    }

    fn lose_context(&mut self) {
        if !self.resources.is_empty() {
            warn!(
                "dropping {} GPU resources with the context",
                self.resources.len()
            );
        }
        for (_, resource) in self.resources.drain() {
            resource.destroy();
        }
        if let Some(gpu) = self.gpu.take() {
            gpu.device.destroy();
            info!("graphics context released");
        }
    }
}
