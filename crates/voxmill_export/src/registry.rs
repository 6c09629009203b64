//! Exporter registry and shared settings.

use std::path::Path;

use crate::escn::EscnExporter;
use crate::fbx::FbxExporter;
use crate::gltf::GltfExporter;
use crate::obj::ObjExporter;
use crate::ply::PlyExporter;
use crate::{Error, MeshExporter, Result};

/// Options common to all exporters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportSettings {
    /// Bake node transforms into vertex positions instead of emitting them
    /// as node matrices.
    pub world_space: bool,
}

/// Every supported output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterKind {
    Gltf,
    Glb,
    Obj,
    Ply,
    Fbx,
    Escn,
}

impl ExporterKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "gltf" => Ok(Self::Gltf),
            "glb" => Ok(Self::Glb),
            "obj" => Ok(Self::Obj),
            "ply" => Ok(Self::Ply),
            "fbx" => Ok(Self::Fbx),
            "escn" => Ok(Self::Escn),
            _ => Err(Error::InvalidArgument(format!(
                "unsupported output format: {}",
                path.display()
            ))),
        }
    }

    pub fn create(self, settings: ExportSettings) -> Box<dyn MeshExporter> {
        match self {
            Self::Gltf => Box::new(GltfExporter::new(settings, false)),
            Self::Glb => Box::new(GltfExporter::new(settings, true)),
            Self::Obj => Box::new(ObjExporter::new(settings)),
            Self::Ply => Box::new(PlyExporter::new(settings)),
            Self::Fbx => Box::new(FbxExporter::new(settings)),
            Self::Escn => Box::new(EscnExporter::new(settings)),
        }
    }

    /// Extensions accepted as outputs.
    pub const OUTPUT_EXTENSIONS: [&'static str; 6] = ["gltf", "glb", "obj", "ply", "fbx", "escn"];
}
