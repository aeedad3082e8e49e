//! Mesh loading for STL impression scans.
//!
//! Supports both ASCII and binary STL. The format is detected automatically:
//! ASCII files begin with `solid` and contain no null bytes in the first 80
//! bytes, while binary files carry an 80-byte header followed by a little
//! endian face count and 50-byte triangle records.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use nalgebra::Point3;
use thiserror::Error;

/// Binary STL header size in bytes.
const STL_HEADER_LEN: usize = 80;

/// Size of one binary STL triangle record (normal + 3 vertices + attribute).
const STL_TRIANGLE_LEN: usize = 50;

/// Errors that can occur while loading a mesh file.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid STL content: {0}")]
    InvalidStl(String),

    #[error("truncated binary STL: expected {expected} faces, got {got}")]
    TruncatedBody { expected: u32, got: u32 },

    #[error("mesh contains no geometry: {0}")]
    EmptyMesh(PathBuf),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// An in-memory triangulated surface.
///
/// Vertices are stored in f64 for transform precision; STL files carry f32
/// coordinates and are widened on load.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub vertices: Vec<Point3<f64>>,
    /// Triangular faces as triples of vertex indices.
    pub faces: Vec<[u32; 3]>,
}

impl TriangleMesh {
    /// Creates an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mesh with pre-allocated capacity.
    pub fn with_capacity(vertices: usize, faces: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            faces: Vec::with_capacity(faces),
        }
    }

    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Returns the number of faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Returns true if the mesh has no vertices or no faces.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Axis-aligned bounding box as (min, max), or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.vertices.first()?;
        let mut min = first;
        let mut max = first;
        for v in &self.vertices[1..] {
            for i in 0..3 {
                min[i] = min[i].min(v[i]);
                max[i] = max[i].max(v[i]);
            }
        }
        Some((min, max))
    }
}

/// Load a mesh from an STL file, detecting ASCII vs binary format.
///
/// # Arguments
///
/// * `path` - Path to the STL file
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not valid STL, or
/// describes no geometry at all.
pub fn load_stl<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoaderError::FileNotFound(path.to_path_buf())
        } else {
            LoaderError::Io(e)
        }
    })?;
    let mut reader = BufReader::new(file);

    // Read enough to decide the format.
    let mut head = [0u8; STL_HEADER_LEN + 4];
    let head_len = read_up_to(&mut reader, &mut head)?;
    if head_len < 6 {
        return Err(LoaderError::InvalidStl(
            "file too small to be valid STL".to_string(),
        ));
    }

    let head_text = String::from_utf8_lossy(&head[..head_len.min(STL_HEADER_LEN)]);
    let looks_ascii =
        head_text.trim_start().starts_with("solid") && !head[..head_len].contains(&0);

    let mesh = if looks_ascii {
        // Re-open: the ASCII parser wants the file from the start.
        drop(reader);
        let reader = BufReader::new(File::open(path)?);
        parse_stl_ascii(reader)?
    } else {
        parse_stl_binary(&head[..head_len], reader)?
    };

    if mesh.is_empty() {
        return Err(LoaderError::EmptyMesh(path.to_path_buf()));
    }
    Ok(mesh)
}

/// Fill `buf` as far as the reader allows, returning the number of bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Parse ASCII STL from a buffered reader.
///
/// Facet normals are ignored; normals are recomputed on export from face
/// winding.
fn parse_stl_ascii<R: BufRead>(reader: R) -> Result<TriangleMesh> {
    let mut mesh = TriangleMesh::new();
    let mut pending: Vec<Point3<f64>> = Vec::with_capacity(3);

    for line in reader.lines() {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        match keyword.to_ascii_lowercase().as_str() {
            "outer" => pending.clear(),
            "vertex" => {
                let coords: Vec<f64> = tokens
                    .take(3)
                    .map(|t| {
                        t.parse::<f64>().map_err(|e| {
                            LoaderError::InvalidStl(format!("bad vertex coordinate '{t}': {e}"))
                        })
                    })
                    .collect::<Result<_>>()?;
                if coords.len() != 3 {
                    return Err(LoaderError::InvalidStl(
                        "vertex line with fewer than 3 coordinates".to_string(),
                    ));
                }
                pending.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            "endfacet" => {
                if pending.len() == 3 {
                    let base = mesh.vertices.len() as u32;
                    mesh.vertices.append(&mut pending);
                    mesh.faces.push([base, base + 1, base + 2]);
                } else if !pending.is_empty() {
                    return Err(LoaderError::InvalidStl(format!(
                        "facet with {} vertices, expected 3",
                        pending.len()
                    )));
                }
            }
            "endsolid" => break,
            _ => {}
        }
    }

    Ok(mesh)
}

/// Parse binary STL given the already-consumed header bytes.
fn parse_stl_binary<R: Read>(head: &[u8], mut reader: R) -> Result<TriangleMesh> {
    if head.len() < STL_HEADER_LEN + 4 {
        return Err(LoaderError::InvalidStl(format!(
            "binary header truncated at {} bytes",
            head.len()
        )));
    }

    let face_count = u32::from_le_bytes([
        head[STL_HEADER_LEN],
        head[STL_HEADER_LEN + 1],
        head[STL_HEADER_LEN + 2],
        head[STL_HEADER_LEN + 3],
    ]);

    let mut mesh = TriangleMesh::with_capacity(face_count as usize * 3, face_count as usize);
    let mut record = [0u8; STL_TRIANGLE_LEN];

    for i in 0..face_count {
        let n = read_up_to(&mut reader, &mut record)?;
        if n < STL_TRIANGLE_LEN {
            return Err(LoaderError::TruncatedBody {
                expected: face_count,
                got: i,
            });
        }

        // Skip the 12-byte normal; read the three vertices.
        let base = mesh.vertices.len() as u32;
        for v in 0..3 {
            let off = 12 + v * 12;
            mesh.vertices.push(read_point(&record[off..off + 12]));
        }
        mesh.faces.push([base, base + 1, base + 2]);
    }

    Ok(mesh)
}

/// Decode 12 bytes as three little-endian f32 coordinates.
fn read_point(buf: &[u8]) -> Point3<f64> {
    let x = f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let y = f32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let z = f32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    Point3::new(f64::from(x), f64::from(y), f64::from(z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const ASCII_TRIANGLE: &str = "solid scan\n\
          facet normal 0 0 1\n\
            outer loop\n\
              vertex 0 0 0\n\
              vertex 1 0 0\n\
              vertex 0 1 0\n\
            endloop\n\
          endfacet\n\
        endsolid scan\n";

    fn binary_triangle_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; STL_HEADER_LEN];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        // Normal
        for _ in 0..3 {
            bytes.extend_from_slice(&0f32.to_le_bytes());
        }
        // Vertices
        for v in [[0f32, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]] {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes
    }

    #[test]
    fn test_parse_ascii_triangle() {
        let mesh = parse_stl_ascii(BufReader::new(ASCII_TRIANGLE.as_bytes())).unwrap();

        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.vertices[1], Point3::new(1.0, 0.0, 0.0));
        assert_eq!(mesh.faces[0], [0, 1, 2]);
    }

    #[test]
    fn test_load_ascii_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tri.stl");
        File::create(&path)
            .unwrap()
            .write_all(ASCII_TRIANGLE.as_bytes())
            .unwrap();

        let mesh = load_stl(&path).unwrap();
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_load_binary_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tri.stl");
        File::create(&path)
            .unwrap()
            .write_all(&binary_triangle_bytes())
            .unwrap();

        let mesh = load_stl(&path).unwrap();
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.vertices[1], Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_load_truncated_binary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.stl");
        let mut bytes = binary_triangle_bytes();
        // Claim two faces but provide one.
        bytes[STL_HEADER_LEN..STL_HEADER_LEN + 4].copy_from_slice(&2u32.to_le_bytes());
        File::create(&path).unwrap().write_all(&bytes).unwrap();

        match load_stl(&path) {
            Err(LoaderError::TruncatedBody { expected: 2, got: 1 }) => {}
            other => panic!("expected TruncatedBody, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        match load_stl("does_not_exist_0421.stl") {
            Err(LoaderError::FileNotFound(_)) => {}
            other => panic!("expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_load_empty_solid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.stl");
        File::create(&path)
            .unwrap()
            .write_all(b"solid nothing\nendsolid nothing\n")
            .unwrap();

        match load_stl(&path) {
            Err(LoaderError::EmptyMesh(_)) => {}
            other => panic!("expected EmptyMesh, got {other:?}"),
        }
    }

    #[test]
    fn test_bounds() {
        let mesh = parse_stl_ascii(BufReader::new(ASCII_TRIANGLE.as_bytes())).unwrap();
        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, Point3::new(0.0, 0.0, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 0.0));
    }
}
