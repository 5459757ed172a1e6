use std::{
    io::{BufReader, Cursor},
    rc::Rc,
};

use crate::{
    data_structures::model::{MeshData, ModelData},
    resources::{AssetSource, resolve_relative},
};

/// Loads a Wavefront .obj model. Referenced .mtl files are fetched through the
/// same source; only their diffuse colour and opacity are used.
pub async fn load_obj(
    bytes: &[u8],
    file_name: &str,
    source: Rc<dyn AssetSource>,
) -> anyhow::Result<ModelData> {
    let mut obj_reader = BufReader::new(Cursor::new(bytes));
    let base = file_name.to_string();

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| {
            let source = source.clone();
            let path = resolve_relative(&base, &p);
            async move {
                let mat_bytes = source.fetch(&path).await.map_err(|e| {
                    log::warn!("material library `{path}` unavailable: {e}");
                    tobj::LoadError::OpenFileFailed
                })?;
                tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mat_bytes)))
            }
        },
    )
    .await?;

    let materials = obj_materials.unwrap_or_else(|e| {
        log::warn!("{file_name}: materials ignored ({e})");
        Vec::new()
    });

    let meshes = models
        .into_iter()
        .filter(|m| !m.mesh.indices.is_empty())
        .map(|m| {
            let positions: Vec<[f32; 3]> = m
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let normals = (!m.mesh.normals.is_empty()).then(|| {
                m.mesh
                    .normals
                    .chunks_exact(3)
                    .map(|n| [n[0], n[1], n[2]])
                    .collect()
            });
            let mut mesh = MeshData::new(m.name, positions, normals, Some(m.mesh.indices));
            if let Some(material) = m.mesh.material_id.and_then(|id| materials.get(id)) {
                if let Some([r, g, b]) = material.diffuse {
                    mesh.color = [r, g, b, material.dissolve.unwrap_or(1.0)];
                }
            }
            mesh
        })
        .collect();

    Ok(ModelData {
        source: file_name.to_string(),
        meshes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::MemoryAssets;

    const QUAD: &str = "\
mtllib quad.mtl
o quad
v 0 0 0
v 1 0 0
v 1 0 -1
v 0 0 -1
usemtl red
f 1 2 3 4
";

    #[tokio::test]
    async fn triangulates_and_picks_up_diffuse() {
        let assets = MemoryAssets::new()
            .with("models/quad.mtl", b"newmtl red\nKd 1 0 0\n".to_vec());
        let model = load_obj(QUAD.as_bytes(), "models/quad.obj", Rc::new(assets))
            .await
            .unwrap();
        assert_eq!(model.meshes.len(), 1);
        let mesh = &model.meshes[0];
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(mesh.normals.len(), mesh.positions.len());
    }

    #[tokio::test]
    async fn missing_material_library_is_not_fatal() {
        let model = load_obj(QUAD.as_bytes(), "quad.obj", Rc::new(MemoryAssets::new()))
            .await
            .unwrap();
        assert_eq!(model.meshes[0].color, [0.8, 0.8, 0.8, 1.0]);
    }
}
