//! Polygon triangulation and point-in-triangle queries
//!
//! Polygons are flattened `(x, y)` pairs. Triangles are returned as vertex
//! indices into that list, three per triangle.

use nalgebra::Vector2;
use tracing::{debug, warn};

/// Polygon triangulation service.
pub trait Triangulator: Send + Sync {
    fn triangulate(&self, polygon: &[f32]) -> Vec<usize>;
}

/// Ear clipping for simple polygons of either winding.
///
/// A repeated closing vertex and consecutive duplicates are ignored.
/// Collinear vertices are dropped without emitting a triangle. When no ear
/// can be found (self-intersecting input) the rest is fanned.
#[derive(Debug, Default, Clone, Copy)]
pub struct EarClipTriangulator;

fn cross(o: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn signed_area(points: &[Vector2<f64>], order: &[usize]) -> f64 {
    let n = order.len();
    (0..n)
        .map(|i| {
            let p = points[order[i]];
            let q = points[order[(i + 1) % n]];
            p.x * q.y - q.x * p.y
        })
        .sum::<f64>()
        * 0.5
}

impl EarClipTriangulator {
    fn is_ear(
        points: &[Vector2<f64>],
        remaining: &[usize],
        prev: usize,
        curr: usize,
        next: usize,
        orientation: f64,
    ) -> bool {
        let (a, b, c) = (points[prev], points[curr], points[next]);
        if cross(a, b, c) * orientation <= 0.0 {
            return false;
        }
        remaining.iter().all(|&other| {
            if other == prev || other == curr || other == next {
                return true;
            }
            let p = points[other];
            if p == a || p == b || p == c {
                return true;
            }
            !point_in_triangle_f64(p, a, b, c)
        })
    }
}

impl Triangulator for EarClipTriangulator {
    fn triangulate(&self, polygon: &[f32]) -> Vec<usize> {
        let points: Vec<Vector2<f64>> = polygon
            .chunks_exact(2)
            .map(|p| Vector2::new(p[0] as f64, p[1] as f64))
            .collect();

        let mut remaining: Vec<usize> = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            if remaining.last().map_or(false, |&last| points[last] == *point) {
                continue;
            }
            remaining.push(index);
        }
        while remaining.len() > 1 {
            let (first, last) = (remaining[0], remaining[remaining.len() - 1]);
            if points[first] != points[last] {
                break;
            }
            remaining.pop();
        }
        if remaining.len() < 3 {
            return Vec::new();
        }

        let orientation = signed_area(&points, &remaining).signum();
        if orientation == 0.0 {
            debug!(vertices = remaining.len(), "zero-area polygon, nothing to triangulate");
            return Vec::new();
        }

        let mut triangles = Vec::with_capacity((remaining.len() - 2) * 3);

        while remaining.len() > 3 {
            let n = remaining.len();
            let mut clipped = false;

            for i in 0..n {
                let prev = remaining[(i + n - 1) % n];
                let curr = remaining[i];
                let next = remaining[(i + 1) % n];

                if cross(points[prev], points[curr], points[next]) == 0.0 {
                    remaining.remove(i);
                    clipped = true;
                    break;
                }

                if Self::is_ear(&points, &remaining, prev, curr, next, orientation) {
                    triangles.extend_from_slice(&[prev, curr, next]);
                    remaining.remove(i);
                    clipped = true;
                    break;
                }
            }

            if !clipped {
                warn!(
                    "Ear clipping stuck with {} vertices remaining, using fan triangulation",
                    remaining.len()
                );
                break;
            }
        }

        if remaining.len() == 3 {
            if cross(points[remaining[0]], points[remaining[1]], points[remaining[2]]) != 0.0 {
                triangles.extend_from_slice(&remaining);
            }
        } else if remaining.len() > 3 {
            let center = remaining[0];
            for i in 1..remaining.len() - 1 {
                triangles.extend_from_slice(&[center, remaining[i], remaining[i + 1]]);
            }
        }

        triangles
    }
}

fn edge_sign(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    (p.x - b.x) * (a.y - b.y) - (a.x - b.x) * (p.y - b.y)
}

fn point_in_triangle_f64(p: Vector2<f64>, a: Vector2<f64>, b: Vector2<f64>, c: Vector2<f64>) -> bool {
    let d1 = edge_sign(p, a, b);
    let d2 = edge_sign(p, b, c);
    let d3 = edge_sign(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Inclusive point-in-triangle test, independent of triangle winding.
pub fn point_in_triangle(p: Vector2<f32>, a: Vector2<f32>, b: Vector2<f32>, c: Vector2<f32>) -> bool {
    point_in_triangle_f64(p.cast(), a.cast(), b.cast(), c.cast())
}

/// Triangle lookup that starts from the last hit.
///
/// Neighboring pixels usually fall into the same triangle, so scanning from
/// the previous hit and wrapping around keeps rasterization close to linear.
#[derive(Debug, Clone)]
pub struct TriangleHitCache<'a> {
    polygon: &'a [f32],
    triangles: &'a [usize],
    hint: usize,
}

impl<'a> TriangleHitCache<'a> {
    pub fn new(polygon: &'a [f32], triangles: &'a [usize]) -> Self {
        Self {
            polygon,
            triangles,
            hint: 0,
        }
    }

    fn vertex(&self, index: usize) -> Vector2<f32> {
        Vector2::new(self.polygon[index * 2], self.polygon[index * 2 + 1])
    }

    /// Index of the triangle containing `(x, y)`, if any.
    pub fn find(&mut self, x: f32, y: f32) -> Option<usize> {
        let count = self.triangles.len() / 3;
        let p = Vector2::new(x, y);
        for step in 0..count {
            let t = (self.hint + step) % count;
            let a = self.vertex(self.triangles[t * 3]);
            let b = self.vertex(self.triangles[t * 3 + 1]);
            let c = self.vertex(self.triangles[t * 3 + 2]);
            if point_in_triangle(p, a, b, c) {
                self.hint = t;
                return Some(t);
            }
        }
        None
    }

    pub fn contains(&mut self, x: f32, y: f32) -> bool {
        self.find(x, y).is_some()
    }
}
