//! Mesh export and archive bundling.
//!
//! Provides STL writers (binary and ASCII) for relabeled meshes and a zip
//! bundler that packages every processed output together with the label
//! ledger for download or transfer.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::loaders::TriangleMesh;

/// Errors that can occur during write operations.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to create or open a file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to write data to a file.
    #[error("failed to write to '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Zip archive error.
    #[error("archive error for '{path}': {source}")]
    Zip {
        path: String,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write a mesh to an STL file.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories are created if needed)
/// * `mesh` - The mesh to write
/// * `binary` - If true, write binary STL; if false, ASCII
///
/// # Errors
///
/// Returns an error if directories or the file cannot be created, or if a
/// write fails.
pub fn write_stl(path: &Path, mesh: &TriangleMesh, binary: bool) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    let result = if binary {
        write_stl_binary(&mut writer, mesh)
    } else {
        write_stl_ascii(&mut writer, mesh)
    };
    result
        .and_then(|()| writer.flush())
        .map_err(|e| WriteError::WriteFile {
            path: path_str,
            source: e,
        })
}

/// Unit normal of a face from its winding, or zero for degenerate triangles.
fn face_normal(mesh: &TriangleMesh, face: [u32; 3]) -> [f64; 3] {
    let a = mesh.vertices[face[0] as usize];
    let b = mesh.vertices[face[1] as usize];
    let c = mesh.vertices[face[2] as usize];

    let n = (b - a).cross(&(c - a));
    let len = n.norm();
    if len > f64::EPSILON {
        [n.x / len, n.y / len, n.z / len]
    } else {
        [0.0, 0.0, 0.0]
    }
}

fn write_stl_binary<W: Write>(writer: &mut W, mesh: &TriangleMesh) -> io::Result<()> {
    // 80-byte header padded with spaces.
    let mut header = [b' '; 80];
    let tag = b"Binary STL written by impression-pipeline";
    header[..tag.len()].copy_from_slice(tag);
    writer.write_all(&header)?;
    writer.write_all(&(mesh.faces.len() as u32).to_le_bytes())?;

    for &face in &mesh.faces {
        for c in face_normal(mesh, face) {
            writer.write_all(&(c as f32).to_le_bytes())?;
        }
        for idx in face {
            let v = mesh.vertices[idx as usize];
            writer.write_all(&(v.x as f32).to_le_bytes())?;
            writer.write_all(&(v.y as f32).to_le_bytes())?;
            writer.write_all(&(v.z as f32).to_le_bytes())?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

fn write_stl_ascii<W: Write>(writer: &mut W, mesh: &TriangleMesh) -> io::Result<()> {
    writeln!(writer, "solid scan")?;
    for &face in &mesh.faces {
        let [nx, ny, nz] = face_normal(mesh, face);
        writeln!(writer, "  facet normal {nx:.6e} {ny:.6e} {nz:.6e}")?;
        writeln!(writer, "    outer loop")?;
        for idx in face {
            let v = mesh.vertices[idx as usize];
            writeln!(writer, "      vertex {:.6e} {:.6e} {:.6e}", v.x, v.y, v.z)?;
        }
        writeln!(writer, "    endloop")?;
        writeln!(writer, "  endfacet")?;
    }
    writeln!(writer, "endsolid scan")?;
    Ok(())
}

/// Bundle every file in `processed_dir` plus the ledger into a zip archive.
///
/// Files are added in name order so archives are reproducible. The ledger is
/// stored under its own file name at the archive root. A missing ledger file
/// is tolerated (nothing was saved yet).
///
/// # Returns
///
/// The number of entries written to the archive.
///
/// # Errors
///
/// Returns an error if the archive cannot be created or an entry cannot be
/// written.
pub fn write_bundle(archive_path: &Path, processed_dir: &Path, ledger_path: &Path) -> Result<usize> {
    ensure_parent_dirs(archive_path)?;
    let archive_str = archive_path.display().to_string();

    let file = File::create(archive_path).map_err(|e| WriteError::CreateFile {
        path: archive_str.clone(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let mut outputs: Vec<_> = fs::read_dir(processed_dir)
        .map_err(|e| WriteError::WriteFile {
            path: processed_dir.display().to_string(),
            source: e,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    outputs.sort();

    let mut entries = 0;
    for output in &outputs {
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        add_zip_entry(&mut zip, &archive_str, &name, output)?;
        entries += 1;
    }

    if ledger_path.is_file() {
        let name = ledger_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "labels.csv".to_string());
        add_zip_entry(&mut zip, &archive_str, &name, ledger_path)?;
        entries += 1;
    }

    zip.finish().map_err(|e| WriteError::Zip {
        path: archive_str,
        source: e,
    })?;
    Ok(entries)
}

fn add_zip_entry<W: Write + io::Seek>(
    zip: &mut ZipWriter<W>,
    archive_str: &str,
    name: &str,
    source: &Path,
) -> Result<()> {
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    zip.start_file(name, options).map_err(|e| WriteError::Zip {
        path: archive_str.to_string(),
        source: e,
    })?;
    let bytes = fs::read(source).map_err(|e| WriteError::WriteFile {
        path: source.display().to_string(),
        source: e,
    })?;
    zip.write_all(&bytes).map_err(|e| WriteError::WriteFile {
        path: archive_str.to_string(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::load_stl;
    use nalgebra::Point3;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn test_mesh() -> TriangleMesh {
        TriangleMesh {
            vertices: vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            faces: vec![[0, 1, 2]],
        }
    }

    #[test]
    fn test_binary_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.stl");

        write_stl(&path, &test_mesh(), true).unwrap();
        let loaded = load_stl(&path).unwrap();

        assert_eq!(loaded.face_count(), 1);
        assert_eq!(loaded.vertices[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_ascii_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out_ascii.stl");

        write_stl(&path, &test_mesh(), false).unwrap();
        let loaded = load_stl(&path).unwrap();

        assert_eq!(loaded.face_count(), 1);
        assert!((loaded.vertices[2].y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/out.stl");

        write_stl(&path, &test_mesh(), true).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_bundle_contains_outputs_and_ledger() {
        let dir = TempDir::new().unwrap();
        let processed = dir.path().join("processed");
        fs::create_dir(&processed).unwrap();

        write_stl(&processed.join("1L_1.stl"), &test_mesh(), true).unwrap();
        write_stl(&processed.join("2R_0.stl"), &test_mesh(), true).unwrap();
        let ledger = dir.path().join("labels.csv");
        fs::write(&ledger, "original_filename,new_filename\n").unwrap();

        let archive_path = dir.path().join("bundle.zip");
        let entries = write_bundle(&archive_path, &processed, &ledger).unwrap();
        assert_eq!(entries, 3);

        let mut archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);
        assert!(archive.by_name("labels.csv").is_ok());
        assert!(archive.by_name("1L_1.stl").is_ok());
    }

    #[test]
    fn test_bundle_without_ledger() {
        let dir = TempDir::new().unwrap();
        let processed = dir.path().join("processed");
        fs::create_dir(&processed).unwrap();
        write_stl(&processed.join("1L_1.stl"), &test_mesh(), true).unwrap();

        let archive_path = dir.path().join("bundle.zip");
        let entries =
            write_bundle(&archive_path, &processed, &dir.path().join("labels.csv")).unwrap();
        assert_eq!(entries, 1);
    }
}
