//! The voxmill command line tool: converts voxel scene files into meshes or
//! repacked voxel scenes.

use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voxmill_export::{ExportSettings, ExporterKind};
use voxmill_formats::{FormatKind, VoxelFormat};
use voxmill_mesh::{Mesh, MesherKind, VertexReducer};

/// Converts voxel files (MagicaVoxel, Goxel, Qubicle, Kenney Shape, VEdit)
/// into meshes (glTF/GLB, OBJ, PLY, FBX, ESCN) or a repacked voxel scene.
#[derive(Parser)]
#[clap(name = "voxmill", version)]
struct Args {
    /// Input files or directories.
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Output path pattern. `*` is replaced by the input file stem, `{0}` by
    /// a running counter. Missing directories are created.
    #[clap(short, long)]
    output: PathBuf,

    /// The mesher used to turn voxels into triangles.
    #[clap(short, long, arg_enum, default_value = "simple")]
    mesher: MesherArg,

    /// Bake node transforms into the vertices.
    #[clap(short, long)]
    worldspace: bool,

    /// Run the vertex reduction pass over every generated mesh.
    #[clap(long)]
    reduce: bool,
}

#[derive(Clone, Copy, clap::ArgEnum)]
#[clap(rename_all = "snake_case")]
enum MesherArg {
    Simple,
    Greedy,
    GreedyChunked,
    GreedyTextured,
}

impl From<MesherArg> for MesherKind {
    fn from(arg: MesherArg) -> Self {
        match arg {
            MesherArg::Simple => MesherKind::Simple,
            MesherArg::Greedy => MesherKind::Greedy,
            MesherArg::GreedyChunked => MesherKind::GreedyChunked,
            MesherArg::GreedyTextured => MesherKind::GreedyTextured,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Format(#[from] voxmill_formats::Error),
    #[error("{0}")]
    Export(#[from] voxmill_export::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Usage(String),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(error) = run(&args) {
        eprintln!("{error}");
        exit(-1);
    }
}

fn run(args: &Args) -> Result<(), CliError> {
    let inputs = resolve_inputs(&args.inputs)?;
    if inputs.is_empty() {
        return Err(CliError::Usage("no supported input files found".into()));
    }

    // A `.vedit` output repacks the voxel scene instead of meshing it.
    let vedit_output = args
        .output
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("vedit"))
        .unwrap_or(false);
    if !vedit_output {
        ExporterKind::from_path(&args.output)?;
    }

    let mesher = MesherKind::from(args.mesher).create();
    let settings = ExportSettings {
        world_space: args.worldspace,
    };

    let mut counter = 0;
    for input in inputs {
        let output = resolve_output(&args.output, &input, &mut counter);
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(input = %input.display(), output = %output.display(), "converting");

        let data = std::fs::read(&input)?;
        let mut codec = FormatKind::from_path(&input)?.create();
        let scene = codec.load(&data)?;

        if vedit_output {
            let mut writer = voxmill_formats::vedit::VEditFormat::default();
            std::fs::write(&output, writer.save(&scene)?)?;
            continue;
        }

        let mut meshes: Vec<Mesh> = mesher.generate_scene(&scene.root);
        if args.reduce {
            meshes = meshes.iter().map(VertexReducer::reduce).collect();
        }
        if meshes.iter().all(Mesh::is_empty) {
            return Err(CliError::Usage(format!(
                "{} contains no visible voxels",
                input.display()
            )));
        }

        let mut exporter = ExporterKind::from_path(&output)?.create(settings);
        exporter.save(&output, &meshes)?;
    }

    Ok(())
}

/// Expands directories into their supported files; plain files must carry a
/// supported extension.
fn resolve_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, CliError> {
    let mut resolved = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_file() && is_supported_input(path))
                .collect();
            entries.sort();
            resolved.extend(entries);
        } else {
            // Unregistered extensions are an error for explicit files.
            FormatKind::from_path(input)?;
            resolved.push(input.clone());
        }
    }

    Ok(resolved)
}

fn is_supported_input(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            FormatKind::INPUT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Applies the output pattern: `*` becomes the input stem, `{0}` the counter
/// (incremented per use).
fn resolve_output(pattern: &Path, input: &Path, counter: &mut usize) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let file_name = pattern
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("output");

    let mut name = file_name.replace('*', stem);
    if name.contains("{0}") {
        name = name.replace("{0}", &counter.to_string());
        *counter += 1;
    }

    pattern.with_file_name(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn star_is_replaced_by_the_input_stem() {
        let mut counter = 0;
        let out = resolve_output(
            Path::new("out/*.glb"),
            Path::new("voxels/windmill.vox"),
            &mut counter,
        );
        assert_eq!(out, Path::new("out/windmill.glb"));
        assert_eq!(counter, 0);
    }

    #[test]
    fn counter_substitution_increments() {
        let mut counter = 0;
        let a = resolve_output(Path::new("Mesh{0}.glb"), Path::new("a.vox"), &mut counter);
        let b = resolve_output(Path::new("Mesh{0}.glb"), Path::new("b.vox"), &mut counter);
        assert_eq!(a, Path::new("Mesh0.glb"));
        assert_eq!(b, Path::new("Mesh1.glb"));
    }

    #[test]
    fn fixed_names_pass_through() {
        let mut counter = 0;
        let out = resolve_output(Path::new("dir/fixed.obj"), Path::new("in.vox"), &mut counter);
        assert_eq!(out, Path::new("dir/fixed.obj"));
    }

    #[test]
    fn supported_inputs_are_detected() {
        assert!(is_supported_input(Path::new("a.vox")));
        assert!(is_supported_input(Path::new("b.QBCL")));
        assert!(!is_supported_input(Path::new("c.png")));
        assert!(!is_supported_input(Path::new("noext")));
    }
}
