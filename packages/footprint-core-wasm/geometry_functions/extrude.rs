use earcutr::earcut;
use geo_types::Coord;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Color, PlanarPoint};

const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FaceKind {
    BottomCap,
    TopCap,
    Side,
}

/// One polygonal face of a solid. `vertices` walks the face boundary counter-clockwise
/// when seen from outside; `triangles` covers it with the same winding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Face {
    pub kind: FaceKind,
    pub vertices: Vec<u32>,
    pub triangles: Vec<[u32; 3]>,
}

impl Face {
    /// Outward unit normal, from the first non-degenerate triangle.
    pub fn normal(&self, positions: &[Point3<f64>]) -> Vector3<f64> {
        for [a, b, c] in &self.triangles {
            let pa = positions[*a as usize];
            let pb = positions[*b as usize];
            let pc = positions[*c as usize];
            let n = (pb - pa).cross(&(pc - pa));
            let len = n.norm();
            if len > EPSILON {
                return n / len;
            }
        }
        // Flat caps fall back to the extrusion axis
        match self.kind {
            FaceKind::BottomCap => -Vector3::z(),
            _ => Vector3::z(),
        }
    }
}

/// A building: a planar ring swept from z = 0 to z = height.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtrudedSolid {
    base_ring: Vec<PlanarPoint>,
    height: f64,
    positions: Vec<Point3<f64>>,
    faces: Vec<Face>,
}

impl ExtrudedSolid {
    /// The cleaned ring, counter-clockwise, without a repeated closing point.
    pub fn base_ring(&self) -> &[PlanarPoint] {
        &self.base_ring
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Bottom ring vertices first, then the top ring (absent for flat footprints).
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    pub fn faces_of(&self, kind: FaceKind) -> impl Iterator<Item = &Face> {
        self.faces.iter().filter(move |f| f.kind == kind)
    }

    pub fn triangle_count(&self) -> usize {
        self.faces.iter().map(|f| f.triangles.len()).sum()
    }

    /// Flat-shaded triangle soup: every triangle gets its own three vertices and the
    /// normal of the face it belongs to.
    pub fn to_buffer_geometry(&self, color: Option<Color>) -> BufferGeometry {
        let mut vertices: Vec<f32> = Vec::with_capacity(self.triangle_count() * 9);
        let mut normals: Vec<f32> = Vec::with_capacity(self.triangle_count() * 9);
        let mut indices: Vec<u32> = Vec::with_capacity(self.triangle_count() * 3);

        for face in &self.faces {
            let normal = face.normal(&self.positions);
            for triangle in &face.triangles {
                for &idx in triangle {
                    let p = self.positions[idx as usize];
                    indices.push((vertices.len() / 3) as u32);
                    vertices.extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
                    normals.extend_from_slice(&[normal.x as f32, normal.y as f32, normal.z as f32]);
                }
            }
        }

        let colors = color.map(|c| {
            std::iter::repeat([c.r, c.g, c.b])
                .take(vertices.len() / 3)
                .flatten()
                .collect()
        });

        BufferGeometry {
            has_data: !vertices.is_empty(),
            vertices,
            normals,
            indices,
            colors,
        }
    }
}

// Output struct handed to the JS side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferGeometry {
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub colors: Option<Vec<f32>>,
    pub has_data: bool,
}

/// Twice the signed area; positive for counter-clockwise rings.
fn signed_area2(points: &[PlanarPoint]) -> f64 {
    let Some(&first) = points.first() else {
        return 0.0;
    };
    // Relative to the first vertex to keep cancellation error small far from the origin
    let mut area = 0.0;
    for i in 0..points.len() {
        let a = points[i] - first;
        let b = points[(i + 1) % points.len()] - first;
        area += a.x * b.y - b.x * a.y;
    }
    area
}

/// Larger side of the ring's bounding box.
fn extent(points: &[PlanarPoint]) -> f64 {
    let (min, max) = points.iter().fold(
        (Coord { x: f64::INFINITY, y: f64::INFINITY }, Coord { x: f64::NEG_INFINITY, y: f64::NEG_INFINITY }),
        |(min, max), p| {
            (
                Coord { x: min.x.min(p.x), y: min.y.min(p.y) },
                Coord { x: max.x.max(p.x), y: max.y.max(p.y) },
            )
        },
    );
    (max.x - min.x).max(max.y - min.y)
}

// Threshold relative to coordinate magnitude, so tiny normalized rings still dedup correctly
fn same_point(a: PlanarPoint, b: PlanarPoint) -> bool {
    let magnitude = f64::max(f64::max(a.x.abs(), a.y.abs()), f64::max(b.x.abs(), b.y.abs())).max(1.0);
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy <= EPSILON * EPSILON * magnitude * magnitude
}

/// Merge consecutive duplicate points, including a repeated closing point
fn merge_overlapping_points(points: &[PlanarPoint]) -> Vec<PlanarPoint> {
    let mut merged: Vec<PlanarPoint> = Vec::with_capacity(points.len());
    for &p in points {
        if merged.last().map_or(true, |&last| !same_point(last, p)) {
            merged.push(p);
        }
    }
    while merged.len() > 1 && same_point(merged[0], merged[merged.len() - 1]) {
        merged.pop();
    }
    merged
}

// Cross product of (b - a) and (c - a)
fn orientation(a: PlanarPoint, b: PlanarPoint, c: PlanarPoint) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn is_point_on_segment(a: PlanarPoint, b: PlanarPoint, p: PlanarPoint) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

fn segments_intersect(p1: PlanarPoint, p2: PlanarPoint, p3: PlanarPoint, p4: PlanarPoint) -> bool {
    let d1 = orientation(p3, p4, p1);
    let d2 = orientation(p3, p4, p2);
    let d3 = orientation(p1, p2, p3);
    let d4 = orientation(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0)) && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0)) {
        return true;
    }

    (d1 == 0.0 && is_point_on_segment(p3, p4, p1))
        || (d2 == 0.0 && is_point_on_segment(p3, p4, p2))
        || (d3 == 0.0 && is_point_on_segment(p1, p2, p3))
        || (d4 == 0.0 && is_point_on_segment(p1, p2, p4))
}

/// A ring is simple when no two edges meet except consecutive edges at their shared vertex.
fn is_simple(ring: &[PlanarPoint]) -> bool {
    let n = ring.len();
    for i in 0..n {
        let a1 = ring[i];
        let a2 = ring[(i + 1) % n];
        for j in (i + 1)..n {
            let b1 = ring[j];
            let b2 = ring[(j + 1) % n];

            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            if adjacent {
                // Consecutive edges share a vertex; they only overlap when the ring doubles back
                let (shared, a_far, b_far) = if j == i + 1 { (a2, a1, b2) } else { (a1, a2, b1) };
                if orientation(shared, a_far, b_far) == 0.0 {
                    let da = a_far - shared;
                    let db = b_far - shared;
                    if da.x * db.x + da.y * db.y > 0.0 {
                        return false;
                    }
                }
                continue;
            }

            if segments_intersect(a1, a2, b1, b2) {
                return false;
            }
        }
    }
    true
}

/// Clean and validate a footprint ring, returning it counter-clockwise.
///
/// Self-intersecting rings are rejected rather than triangulated with artifacts, so every
/// solid that reaches the scene is closed and consistently wound.
pub fn prepare_ring(points: &[PlanarPoint]) -> PipelineResult<Vec<PlanarPoint>> {
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(PipelineError::DegenerateGeometry("ring contains non-finite coordinates".to_string()));
    }

    let mut ring = merge_overlapping_points(points);
    if ring.len() < 3 {
        return Err(PipelineError::DegenerateGeometry(format!(
            "ring has {} distinct points, at least 3 are required",
            ring.len()
        )));
    }

    let area2 = signed_area2(&ring);
    // Measured against the ring's own size, so small footprints in scene units survive
    let size = extent(&ring);
    if area2.abs() <= EPSILON * size * size {
        return Err(PipelineError::DegenerateGeometry("ring encloses no area".to_string()));
    }

    if !is_simple(&ring) {
        return Err(PipelineError::DegenerateGeometry("ring is self-intersecting".to_string()));
    }

    if area2 < 0.0 {
        ring.reverse();
    }
    Ok(ring)
}

// Triangulate a counter-clockwise ring, returning counter-clockwise triangles
fn triangulate(ring: &[PlanarPoint]) -> PipelineResult<Vec<[u32; 3]>> {
    let data: Vec<f64> = ring.iter().flat_map(|p| [p.x, p.y]).collect();
    let indices = earcut(&data, &[], 2)
        .map_err(|e| PipelineError::DegenerateGeometry(format!("triangulation failed: {:?}", e)))?;

    if indices.len() < 3 {
        return Err(PipelineError::DegenerateGeometry("triangulation produced no triangles".to_string()));
    }

    Ok(indices
        .chunks_exact(3)
        .map(|t| {
            let (a, b, c) = (t[0], t[1], t[2]);
            if orientation(ring[a], ring[b], ring[c]) < 0.0 {
                [a as u32, c as u32, b as u32]
            } else {
                [a as u32, b as u32, c as u32]
            }
        })
        .collect())
}

/// Sweep a planar ring along +Z into a closed solid.
///
/// The ring may repeat its first point at the end. A height of zero yields a flat
/// footprint with only the bottom cap.
pub fn extrude(ring_points: &[PlanarPoint], height: f64) -> PipelineResult<ExtrudedSolid> {
    if !height.is_finite() || height < 0.0 {
        return Err(PipelineError::DegenerateGeometry(format!("invalid extrusion height {}", height)));
    }

    let ring = prepare_ring(ring_points)?;
    let cap_triangles = triangulate(&ring)?;
    let n = ring.len() as u32;

    let mut positions: Vec<Point3<f64>> = ring.iter().map(|p| Point3::new(p.x, p.y, 0.0)).collect();
    let mut faces = Vec::with_capacity(ring.len() + 2);

    // Bottom cap faces down, so it walks the ring backwards
    faces.push(Face {
        kind: FaceKind::BottomCap,
        vertices: std::iter::once(0).chain((1..n).rev()).collect(),
        triangles: cap_triangles.iter().map(|&[a, b, c]| [a, c, b]).collect(),
    });

    if height > 0.0 {
        positions.extend(ring.iter().map(|p| Point3::new(p.x, p.y, height)));

        faces.push(Face {
            kind: FaceKind::TopCap,
            vertices: (n..2 * n).collect(),
            triangles: cap_triangles.iter().map(|&[a, b, c]| [a + n, b + n, c + n]).collect(),
        });

        for i in 0..n {
            let j = (i + 1) % n;
            faces.push(Face {
                kind: FaceKind::Side,
                vertices: vec![i, j, j + n, i + n],
                triangles: vec![[i, j, j + n], [i, j + n, i + n]],
            });
        }
    }

    Ok(ExtrudedSolid {
        base_ring: ring,
        height,
        positions,
        faces,
    })
}

/// Extrude a single footprint from JS. `ring` is an array of `[x, y]` pairs already in
/// scene units. Returns a flat-shaded `BufferGeometry`.
#[wasm_bindgen]
pub fn extrude_footprint(ring: JsValue, height: f64) -> Result<JsValue, JsValue> {
    let raw: Vec<[f64; 2]> = serde_wasm_bindgen::from_value(ring)
        .map_err(|e| JsValue::from_str(&format!("Invalid ring: {}", e)))?;
    let points: Vec<PlanarPoint> = raw.iter().map(|p| Coord { x: p[0], y: p[1] }).collect();

    let solid = extrude(&points, height)?;
    Ok(serde_wasm_bindgen::to_value(&solid.to_buffer_geometry(None))?)
}
