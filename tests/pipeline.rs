//! End-to-end pipeline checks: import, mesh, reduce, export.

use std::path::Path;

use voxmill_formats::{FormatKind, VoxelFormat};
use voxmill_math::IVec3;
use voxmill_mesh::{Mesher, MesherKind, VertexReducer};
use voxmill_voxel::{TextureType, Visibility, VoxelScene};

/// A minimal MagicaVoxel file: a 2x2x1 slab of palette color 1.
fn slab_vox() -> Vec<u8> {
    let mut body: Vec<u8> = Vec::new();

    body.extend_from_slice(b"SIZE");
    body.extend_from_slice(&12u32.to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    for dim in [2i32, 2, 1] {
        body.extend_from_slice(&dim.to_le_bytes());
    }

    body.extend_from_slice(b"XYZI");
    body.extend_from_slice(&(4u32 + 16).to_le_bytes());
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&4i32.to_le_bytes());
    for (x, y) in [(0u8, 0u8), (1, 0), (0, 1), (1, 1)] {
        body.extend_from_slice(&[x, y, 0, 1]);
    }

    let mut file: Vec<u8> = Vec::new();
    file.extend_from_slice(b"VOX ");
    file.extend_from_slice(&150i32.to_le_bytes());
    file.extend_from_slice(b"MAIN");
    file.extend_from_slice(&0u32.to_le_bytes());
    file.extend_from_slice(&(body.len() as u32).to_le_bytes());
    file.extend_from_slice(&body);
    file
}

fn load_slab() -> VoxelScene {
    let mut codec = FormatKind::from_path(Path::new("slab.vox")).unwrap().create();
    codec.load(&slab_vox()).unwrap()
}

#[test]
fn import_meshes_into_a_single_greedy_quad_per_side() {
    let scene = load_slab();
    assert_eq!(scene.models.len(), 1);
    assert_eq!(scene.models[0].voxel_count(), 4);

    let mesher = MesherKind::Greedy.create();
    let meshes = mesher.generate_scene(&scene.root);
    assert_eq!(meshes.len(), 1);

    // A 2x2x1 slab greedy-meshes to 6 quads.
    assert_eq!(meshes[0].triangle_count(), 12);
}

#[test]
fn every_mesher_produces_the_same_surface_area() {
    let scene = load_slab();

    let mut areas = Vec::new();
    for kind in [
        MesherKind::Simple,
        MesherKind::Greedy,
        MesherKind::GreedyChunked,
        MesherKind::GreedyTextured,
    ] {
        let meshes = kind.create().generate_scene(&scene.root);
        let area: f32 = meshes
            .iter()
            .flat_map(|mesh| mesh.surfaces.iter())
            .flat_map(|surface| surface.indices.chunks_exact(3).map(move |t| (surface, t)))
            .map(|(surface, t)| {
                let a = surface.vertices[t[0] as usize].pos;
                let b = surface.vertices[t[1] as usize].pos;
                let c = surface.vertices[t[2] as usize].pos;
                (b - a).cross(c - a).length() / 2.0
            })
            .sum();
        areas.push(area);
    }

    // 2x2x1 slab: 2*(2*2) top/bottom + 4*(2*1) sides = 16.
    for area in areas {
        assert!((area - 16.0).abs() < 1e-3, "surface area was {area}");
    }
}

#[test]
fn visibility_masks_satisfy_the_exposure_invariant() {
    let scene = load_slab();
    let model = &scene.models[0];

    for (pos, voxel) in model.voxels().iter() {
        assert!(voxel.is_visible());
        // Slab voxels always expose their up face.
        assert!(voxel.visibility.contains(Visibility::UP), "at {pos:?}");
        assert!(model.voxels().find(pos + IVec3::Y).is_none());
    }
}

#[test]
fn vedit_roundtrip_preserves_the_imported_scene() {
    let scene = load_slab();

    let mut vedit = FormatKind::VEdit.create();
    let bytes = vedit.save(&scene).unwrap();
    let restored = vedit.load(&bytes).unwrap();

    assert_eq!(restored.models.len(), scene.models.len());
    let original = &scene.models[0];
    let loaded = &restored.models[0];

    assert_eq!(loaded.voxel_count(), original.voxel_count());
    for (pos, voxel) in original.voxels().iter() {
        let restored_voxel = loaded.get_voxel(pos).expect("voxel survived the roundtrip");
        assert_eq!(restored_voxel.color, voxel.color);
        assert_eq!(restored_voxel.visibility, voxel.visibility);
    }

    let palette = loaded.palette(TextureType::Diffuse).unwrap();
    assert_eq!(
        palette.pixels(),
        original.palette(TextureType::Diffuse).unwrap().pixels()
    );
}

#[test]
fn reduction_after_meshing_never_grows() {
    let scene = load_slab();
    let meshes = MesherKind::Simple.create().generate_scene(&scene.root);

    for mesh in &meshes {
        let reduced = VertexReducer::reduce(mesh);
        assert!(reduced.triangle_count() <= mesh.triangle_count());
        assert!(!reduced.is_empty());
    }
}

#[test]
fn exporting_the_scene_writes_all_sidecars() {
    use voxmill_export::{ExporterKind, ExportSettings};

    let scene = load_slab();
    let meshes = MesherKind::Greedy.create().generate_scene(&scene.root);

    let dir = std::env::temp_dir().join("voxmill_pipeline_test");
    std::fs::create_dir_all(&dir).unwrap();

    for (name, kind) in [
        ("slab.glb", ExporterKind::Glb),
        ("slab.gltf", ExporterKind::Gltf),
        ("slab.obj", ExporterKind::Obj),
        ("slab.ply", ExporterKind::Ply),
        ("slab.fbx", ExporterKind::Fbx),
        ("slab.escn", ExporterKind::Escn),
    ] {
        let path = dir.join(name);
        kind.create(ExportSettings::default())
            .save(&path, &meshes)
            .unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    // The text formats reference the palette sidecar.
    assert!(dir.join("slab.albedo.png").exists());
    assert!(dir.join("slab.bin").exists());
}
