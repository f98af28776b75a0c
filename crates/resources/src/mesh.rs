//! Mesh loading from glTF files.
//!
//! Only the simplest document shape is accepted: one mesh with one
//! primitive, a `POSITION` attribute and unsigned 16-bit indices. `NORMAL`
//! is optional and zero-filled when absent. Everything else in the
//! document is ignored.

use std::path::Path;

use glam::Vec3;
use gltf::mesh::util::ReadIndices;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// Bytes per interleaved vertex: position then normal, three floats each.
pub const MESH_VERTEX_STRIDE: usize = 24;

/// Decoded mesh geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    /// Same length as `positions` when present.
    pub normals: Option<Vec<[f32; 3]>>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Loads the single mesh of a `.gltf` or `.glb` file.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if the file does not exist
    /// - [`ResourceError::Gltf`] if the document or its buffers fail to load
    /// - [`ResourceError::InvalidMesh`] if the mesh shape is not supported
    pub fn load(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::NotFound(path.to_path_buf()));
        }

        let (document, buffers, _) = gltf::import(path).map_err(|source| ResourceError::Gltf {
            path: path.to_path_buf(),
            source,
        })?;

        let invalid = |reason: String| ResourceError::InvalidMesh {
            path: path.to_path_buf(),
            reason,
        };

        if document.meshes().len() != 1 {
            return Err(invalid(format!(
                "expected 1 mesh, found {}",
                document.meshes().len()
            )));
        }
        let Some(mesh) = document.meshes().next() else {
            return Err(invalid("no mesh".to_string()));
        };
        if mesh.primitives().len() != 1 {
            return Err(invalid(format!(
                "expected 1 primitive, found {}",
                mesh.primitives().len()
            )));
        }
        let Some(primitive) = mesh.primitives().next() else {
            return Err(invalid("no primitive".to_string()));
        };

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));

        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| invalid("missing POSITION attribute".to_string()))?
            .collect();

        let normals: Option<Vec<[f32; 3]>> = reader.read_normals().map(Iterator::collect);

        let indices = match reader.read_indices() {
            Some(ReadIndices::U16(iter)) => iter.collect(),
            Some(other) => {
                let width = match other {
                    ReadIndices::U8(_) => "u8",
                    ReadIndices::U32(_) => "u32",
                    ReadIndices::U16(_) => "u16",
                };
                return Err(invalid(format!("indices are {}, expected u16", width)));
            }
            None => return Err(invalid("primitive is not indexed".to_string())),
        };

        let data = Self {
            positions,
            normals,
            indices,
        };
        data.validate().map_err(invalid)?;

        info!(
            "Loaded mesh '{}' from {:?}: {} vertices, {} indices, normals {}",
            mesh.name().unwrap_or("unnamed"),
            path,
            data.vertex_count(),
            data.indices.len(),
            if data.normals.is_some() { "present" } else { "absent" }
        );
        Ok(data)
    }

    /// Checks attribute lengths and index range.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(normals) = &self.normals
            && normals.len() != self.positions.len()
        {
            return Err(format!(
                "{} normals for {} positions",
                normals.len(),
                self.positions.len()
            ));
        }
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&index| usize::from(index) >= self.positions.len())
        {
            return Err(format!(
                "index {} out of range for {} vertices",
                bad,
                self.positions.len()
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Interleaved position + normal vertices, [`MESH_VERTEX_STRIDE`] bytes each.
    pub fn vertex_bytes(&self) -> Vec<u8> {
        let vertices = interleave(&self.positions, self.normals.as_deref());
        bytemuck::cast_slice(&vertices).to_vec()
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Axis-aligned bounds as (min, max); both zero for an empty mesh.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        let mut points = self.positions.iter().map(|&p| Vec3::from(p));
        let Some(first) = points.next() else {
            return (Vec3::ZERO, Vec3::ZERO);
        };
        points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)))
    }
}

/// Interleaves positions with normals, writing zero normals when `normals`
/// is `None` or shorter than `positions`.
pub fn interleave(positions: &[[f32; 3]], normals: Option<&[[f32; 3]]>) -> Vec<[f32; 6]> {
    let out: Vec<[f32; 6]> = positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let n = normals.and_then(|n| n.get(i)).copied().unwrap_or([0.0; 3]);
            [p[0], p[1], p[2], n[0], n[1], n[2]]
        })
        .collect();
    debug!("Interleaved {} vertices", out.len());
    out
}
