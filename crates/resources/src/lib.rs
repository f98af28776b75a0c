//! Asset decoding.
//!
//! Turns files on disk into plain data ready for upload:
//! - [`mesh`]: glTF meshes interleaved into position + normal vertices
//! - [`texture`]: images decoded to tightly packed RGBA8

mod error;

pub mod mesh;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use mesh::{MeshData, MESH_VERTEX_STRIDE};
pub use texture::TextureData;
