//! Geometric transforms for impression meshes.
//!
//! Rotation is expressed as three axis rotations composed in the fixed order
//! `Rx · (Ry · Rz)`. Recentering translates the mesh so its center of mass
//! lands at the origin. Per-vertex application is parallelized with Rayon;
//! the reductions stay sequential so results are reproducible.

use nalgebra::{Matrix4, Point3, Rotation3, Vector3};
use rayon::prelude::*;
use thiserror::Error;

use super::loaders::TriangleMesh;

/// Errors raised for meshes that cannot support a geometric operation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("mesh has no vertices")]
    NoVertices,

    #[error("mesh has no faces")]
    NoFaces,

    #[error("mesh has zero surface area; center of mass is undefined")]
    ZeroArea,
}

/// Build the combined rotation matrix for angles in degrees.
///
/// Each angle produces a rotation about one fixed axis (X, Y, Z). The
/// matrices are composed as `Rx · (Ry · Rz)`, so the Z rotation is applied
/// to a vertex first and the X rotation last. Angles are caller-validated to
/// [-180, 180]; no clamping happens here.
pub fn rotation_matrix(rx_deg: f64, ry_deg: f64, rz_deg: f64) -> Matrix4<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), rx_deg.to_radians()).to_homogeneous();
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), ry_deg.to_radians()).to_homogeneous();
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), rz_deg.to_radians()).to_homogeneous();
    rx * (ry * rz)
}

/// Rotate every vertex of the mesh in place by the composed transform.
pub fn rotate(mesh: &mut TriangleMesh, rx_deg: f64, ry_deg: f64, rz_deg: f64) {
    let m = rotation_matrix(rx_deg, ry_deg, rz_deg);
    mesh.vertices
        .par_iter_mut()
        .for_each(|v| *v = m.transform_point(v));
}

/// Return a rotated copy, leaving the input mesh untouched.
///
/// Used for previews so repeated angle edits stay idempotent against the
/// canonical loaded mesh.
pub fn rotated(mesh: &TriangleMesh, rx_deg: f64, ry_deg: f64, rz_deg: f64) -> TriangleMesh {
    let mut copy = mesh.clone();
    rotate(&mut copy, rx_deg, ry_deg, rz_deg);
    copy
}

/// Compute the mesh's center of mass.
///
/// Uses the area-weighted mean of triangle centroids, which is well defined
/// for open surfaces like impression scans.
///
/// # Errors
///
/// Returns `GeometryError` for meshes with no vertices, no faces, or zero
/// total surface area.
pub fn center_of_mass(mesh: &TriangleMesh) -> Result<Point3<f64>, GeometryError> {
    if mesh.vertices.is_empty() {
        return Err(GeometryError::NoVertices);
    }
    if mesh.faces.is_empty() {
        return Err(GeometryError::NoFaces);
    }

    let mut weighted = Vector3::zeros();
    let mut total_area = 0.0;

    for &[i0, i1, i2] in &mesh.faces {
        let a = mesh.vertices[i0 as usize];
        let b = mesh.vertices[i1 as usize];
        let c = mesh.vertices[i2 as usize];

        let area = 0.5 * (b - a).cross(&(c - a)).norm();
        let centroid = (a.coords + b.coords + c.coords) / 3.0;

        weighted += centroid * area;
        total_area += area;
    }

    if total_area <= f64::EPSILON {
        return Err(GeometryError::ZeroArea);
    }

    Ok(Point3::from(weighted / total_area))
}

/// Translate the mesh so its center of mass sits at the origin.
///
/// Only the mass centroid is guaranteed to land on the origin; the bounding
/// box center generally does not.
pub fn recenter(mesh: &mut TriangleMesh) -> Result<(), GeometryError> {
    let center = center_of_mass(mesh)?.coords;
    mesh.vertices.par_iter_mut().for_each(|v| *v -= center);
    Ok(())
}
