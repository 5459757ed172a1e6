//! Mesh data as produced by the model loaders.
//!
//! [`MeshData`] is plain CPU-side geometry: it is what loaders return and what
//! backends copy into their own buffers. Nothing in here touches the GPU apart
//! from the vertex layout description.

use cgmath::{InnerSpace, SquareMatrix};

/// A single triangle mesh with a flat PBR colour.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub color: [f32; 4],
    pub metalness: f32,
    pub roughness: f32,
    /// Transform relative to the model root.
    pub transform: cgmath::Matrix4<f32>,
}

impl MeshData {
    /// Builds a mesh, filling in sequential indices and computed normals when
    /// the source had none.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<[f32; 3]>,
        normals: Option<Vec<[f32; 3]>>,
        indices: Option<Vec<u32>>,
    ) -> Self {
        let indices = indices.unwrap_or_else(|| (0..positions.len() as u32).collect());
        let normals = match normals {
            Some(normals) if normals.len() == positions.len() => normals,
            _ => compute_normals(&positions, &indices),
        };
        Self {
            name: name.into(),
            positions,
            normals,
            indices,
            color: [0.8, 0.8, 0.8, 1.0],
            metalness: 0.0,
            roughness: 1.0,
            transform: cgmath::Matrix4::identity(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Interleaved vertices ready for upload.
    pub fn vertices(&self) -> Vec<ModelVertex> {
        self.positions
            .iter()
            .zip(self.normals.iter())
            .map(|(position, normal)| ModelVertex {
                position: *position,
                normal: *normal,
            })
            .collect()
    }
}

/// All meshes of one loaded model file.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelData {
    pub source: String,
    pub meshes: Vec<MeshData>,
}

/// Smooth vertex normals from triangle faces. Vertices without any face
/// contribution point up.
pub fn compute_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut acc = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); positions.len()];
    for tri in indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if a >= positions.len() || b >= positions.len() || c >= positions.len() {
            continue;
        }
        let pa: cgmath::Vector3<f32> = positions[a].into();
        let pb: cgmath::Vector3<f32> = positions[b].into();
        let pc: cgmath::Vector3<f32> = positions[c].into();
        let face = (pb - pa).cross(pc - pa);
        acc[a] += face;
        acc[b] += face;
        acc[c] += face;
    }
    acc.into_iter()
        .map(|n| {
            if n.magnitude2() > f32::EPSILON {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Per-instance particle position; particles are drawn as instanced quads.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
}

impl Vertex for ParticleInstance {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
            // one position per quad, not per corner
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_indices_become_sequential() {
        let mesh = MeshData::new(
            "tri",
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],
            None,
            None,
        );
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn computed_normals_follow_winding() {
        let normals = compute_normals(
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]],
            &[0, 1, 2],
        );
        for n in normals {
            assert!((n[1] - 1.0).abs() < 1e-6, "{n:?}");
        }
    }

    #[test]
    fn isolated_vertices_point_up() {
        let normals = compute_normals(&[[3.0, 1.0, 2.0]], &[]);
        assert_eq!(normals, vec![[0.0, 1.0, 0.0]]);
    }
}
