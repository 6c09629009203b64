//! The codec registry: extension sniffing and codec construction.

use std::path::Path;

use crate::goxel::GoxelFormat;
use crate::kenshape::KenshapeFormat;
use crate::magicavoxel::MagicaVoxelFormat;
use crate::qubicle::{
    QubicleBinaryFormat, QubicleExchangeFormat, QubicleProjectFormat, QubicleTreeFormat,
};
use crate::vedit::VEditFormat;
use crate::{Error, Result, VoxelFormat};

/// Every supported voxel file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    /// MagicaVoxel `.vox`.
    MagicaVoxel,
    /// Goxel `.gox`.
    Goxel,
    /// Qubicle binary `.qb`.
    QubicleBinary,
    /// Qubicle binary tree `.qbt`.
    QubicleTree,
    /// Qubicle exchange `.qef`.
    QubicleExchange,
    /// Qubicle project `.qbcl`.
    QubicleProject,
    /// Kenney Shape `.kenshape`.
    Kenshape,
    /// The editor-native round-trip format `.vedit`.
    VEdit,
}

impl FormatKind {
    /// Determines the format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match ext.as_str() {
            "vox" => Ok(Self::MagicaVoxel),
            "gox" => Ok(Self::Goxel),
            "qb" => Ok(Self::QubicleBinary),
            "qbt" => Ok(Self::QubicleTree),
            "qef" => Ok(Self::QubicleExchange),
            "qbcl" => Ok(Self::QubicleProject),
            "kenshape" => Ok(Self::Kenshape),
            "vedit" => Ok(Self::VEdit),
            _ => Err(Error::FormatUnknown(path.display().to_string())),
        }
    }

    /// Instantiates the codec for this format.
    pub fn create(self) -> Box<dyn VoxelFormat> {
        match self {
            Self::MagicaVoxel => Box::new(MagicaVoxelFormat::default()),
            Self::Goxel => Box::new(GoxelFormat::default()),
            Self::QubicleBinary => Box::new(QubicleBinaryFormat::default()),
            Self::QubicleTree => Box::new(QubicleTreeFormat::default()),
            Self::QubicleExchange => Box::new(QubicleExchangeFormat::default()),
            Self::QubicleProject => Box::new(QubicleProjectFormat::default()),
            Self::Kenshape => Box::new(KenshapeFormat::default()),
            Self::VEdit => Box::new(VEditFormat::default()),
        }
    }

    /// Extensions accepted as inputs.
    pub const INPUT_EXTENSIONS: [&'static str; 8] = [
        "vox", "gox", "qb", "qbt", "qef", "qbcl", "kenshape", "vedit",
    ];
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extensions_map_to_formats() {
        assert_eq!(
            FormatKind::from_path(Path::new("scene.vox")).unwrap(),
            FormatKind::MagicaVoxel
        );
        assert_eq!(
            FormatKind::from_path(Path::new("a/b/model.QBCL")).unwrap(),
            FormatKind::QubicleProject
        );
        assert_eq!(
            FormatKind::from_path(Path::new("work.vedit")).unwrap(),
            FormatKind::VEdit
        );
    }

    #[test]
    fn unknown_extensions_are_rejected() {
        assert!(matches!(
            FormatKind::from_path(Path::new("mesh.obj")),
            Err(Error::FormatUnknown(_))
        ));
        assert!(FormatKind::from_path(Path::new("noext")).is_err());
    }
}
