//! Integration tests for asset loading.

use std::path::Path;

use harness_resources::{MESH_VERTEX_STRIDE, MeshData, ResourceError, TextureData};

#[test]
fn test_load_gltf_mesh() {
    let model_path = Path::new("../../assets/models/mesh.gltf");

    // Assets are not checked in everywhere
    if !model_path.exists() {
        println!("Skipping test: model file not found at {:?}", model_path);
        return;
    }

    let mesh = MeshData::load(model_path).expect("Failed to load glTF mesh");

    assert!(mesh.vertex_count() > 0, "Mesh should have positions");
    assert!(!mesh.indices.is_empty(), "Mesh should be indexed");
    assert_eq!(
        mesh.vertex_bytes().len(),
        mesh.vertex_count() * MESH_VERTEX_STRIDE
    );
    assert!(mesh.validate().is_ok());
}

#[test]
fn test_load_forest_texture() {
    let texture_path = Path::new("../../assets/textures/forest.png");

    if !texture_path.exists() {
        println!("Skipping test: texture not found at {:?}", texture_path);
        return;
    }

    let texture = TextureData::load_rgba8(texture_path).expect("Failed to load texture");
    assert!(texture.width > 0 && texture.height > 0);
    assert_eq!(texture.pixels.len(), texture.byte_len());
}

#[test]
fn test_invalid_gltf_reports_path() {
    let dir = std::env::temp_dir().join("harness_resources_invalid_gltf");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("broken.gltf");
    std::fs::write(&path, b"{ not json").unwrap();

    match MeshData::load(&path) {
        Err(ResourceError::Gltf { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected glTF error, got {:?}", other.map(|m| m.vertex_count())),
    }
}

#[test]
fn test_document_without_meshes_is_rejected() {
    let dir = std::env::temp_dir().join("harness_resources_no_mesh");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("empty.gltf");
    std::fs::write(&path, br#"{"asset":{"version":"2.0"}}"#).unwrap();

    let err = MeshData::load(&path).unwrap_err();
    assert!(matches!(err, ResourceError::InvalidMesh { .. }), "{}", err);
}
