use std::rc::Rc;

use anyhow::{Context as _, anyhow};

use crate::{
    data_structures::{
        instance::Transform,
        model::{MeshData, ModelData},
    },
    resources::{AssetSource, resolve_relative},
};

/// Loads a glTF 2.0 model (.gltf or .glb) into flat mesh data.
///
/// Node hierarchies are flattened: every mesh carries its transform relative
/// to the model root. Only triangle primitives are kept and materials are
/// reduced to their PBR factors.
pub async fn load_gltf(
    bytes: &[u8],
    file_name: &str,
    source: Rc<dyn AssetSource>,
) -> anyhow::Result<ModelData> {
    let gltf = gltf::Gltf::from_slice(bytes)
        .with_context(|| format!("`{file_name}` is not a valid glTF file"))?;

    let mut buffer_data: Vec<Vec<u8>> = Vec::new();
    let mut embedded = false;
    for buffer in gltf.buffers() {
        match buffer.source() {
            gltf::buffer::Source::Bin => {
                let blob = gltf
                    .blob
                    .as_deref()
                    .ok_or_else(|| anyhow!("`{file_name}` references a missing binary chunk"))?;
                buffer_data.push(blob.into());
            }
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                embedded = true;
                break;
            }
            gltf::buffer::Source::Uri(uri) => {
                let path = resolve_relative(file_name, uri);
                let bin = source
                    .fetch(&path)
                    .await
                    .with_context(|| format!("buffer `{path}` of `{file_name}`"))?;
                buffer_data.push(bin);
            }
        }
    }
    if embedded {
        // base64 data uris are decoded by the gltf importer itself
        let (_, buffers, _) = gltf::import_slice(bytes)?;
        buffer_data = buffers.into_iter().map(|b| b.0).collect();
    }

    let scene = gltf
        .default_scene()
        .or_else(|| gltf.scenes().next())
        .ok_or_else(|| anyhow!("`{file_name}` contains no scene"))?;

    let mut meshes = Vec::new();
    for node in scene.nodes() {
        collect_meshes(node, &Transform::new(), &buffer_data, &mut meshes)?;
    }

    Ok(ModelData {
        source: file_name.to_string(),
        meshes,
    })
}

fn collect_meshes(
    node: gltf::Node<'_>,
    parent: &Transform,
    buffers: &[Vec<u8>],
    out: &mut Vec<MeshData>,
) -> anyhow::Result<()> {
    let world = parent * &Transform::from(node.transform());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "skipping {:?} primitive of mesh `{}`",
                    primitive.mode(),
                    mesh.name().unwrap_or("unnamed")
                );
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(Vec::as_slice));
            let positions: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| anyhow!("primitive without positions"))?
                .collect();
            let normals = reader.read_normals().map(|n| n.collect());
            let indices = reader.read_indices().map(|i| i.into_u32().collect());

            let name = mesh.name().unwrap_or("mesh").to_string();
            let mut data = MeshData::new(name, positions, normals, indices);
            let pbr = primitive.material().pbr_metallic_roughness();
            data.color = pbr.base_color_factor();
            data.metalness = pbr.metallic_factor();
            data.roughness = pbr.roughness_factor();
            data.transform = world.to_matrix();
            out.push(data);
        }
    }

    for child in node.children() {
        collect_meshes(child, &world, buffers, out)?;
    }
    Ok(())
}
