//! Polygon morphing between two closed slice contours

use crate::slice::{PolyContour, Winding};
use nalgebra::Vector2;

/// Shape at parameter `t` in `[0, 1]` as flattened `(x, y)` pairs.
pub type Interpolant = Box<dyn Fn(f32) -> Vec<f32> + Send + Sync>;

/// Polygon morphing service.
pub trait PolygonMorpher: Send + Sync {
    /// Interpolator with `f(0) ~ from` and `f(1) ~ to`.
    fn interpolator(&self, from: &[f32], to: &[f32]) -> Interpolant;
}

/// Resamples both polygons to the same vertex count by arc length, matches
/// their winding and starting vertex, then blends linearly.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResampleMorpher {
    /// Fixed sample count; `None` uses the larger vertex count.
    pub samples: Option<usize>,
}

fn to_points(flat: &[f32]) -> Vec<Vector2<f32>> {
    let mut points: Vec<Vector2<f32>> = flat
        .chunks_exact(2)
        .map(|p| Vector2::new(p[0], p[1]))
        .collect();
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

/// `count` points spaced evenly along the closed perimeter, starting at the
/// first vertex.
fn resample(points: &[Vector2<f32>], count: usize) -> Vec<Vector2<f32>> {
    let n = points.len();
    if n == 0 || count == 0 {
        return Vec::new();
    }
    let edge = |i: usize| (points[(i + 1) % n] - points[i]).norm();
    let perimeter: f32 = (0..n).map(edge).sum();
    if n == 1 || perimeter <= f32::EPSILON {
        return vec![points[0]; count];
    }

    let step = perimeter / count as f32;
    let mut out = Vec::with_capacity(count);
    let mut seg = 0usize;
    let mut seg_start = 0.0f32;
    let mut seg_len = edge(0);
    for s in 0..count {
        let target = s as f32 * step;
        while seg_start + seg_len < target && seg + 1 < n {
            seg_start += seg_len;
            seg += 1;
            seg_len = edge(seg);
        }
        let a = points[seg];
        let b = points[(seg + 1) % n];
        let t = if seg_len > f32::EPSILON {
            ((target - seg_start) / seg_len).clamp(0.0, 1.0)
        } else {
            0.0
        };
        out.push(a + (b - a) * t);
    }
    out
}

fn best_offset(a: &[Vector2<f32>], b: &[Vector2<f32>]) -> usize {
    let n = a.len();
    (0..n)
        .map(|offset| {
            let cost: f32 = (0..n).map(|i| (a[i] - b[(i + offset) % n]).norm_squared()).sum();
            (offset, cost)
        })
        .min_by(|x, y| x.1.total_cmp(&y.1))
        .map(|(offset, _)| offset)
        .unwrap_or(0)
}

fn flatten(points: &[Vector2<f32>]) -> Vec<f32> {
    points.iter().flat_map(|p| [p.x, p.y]).collect()
}

impl PolygonMorpher for ResampleMorpher {
    fn interpolator(&self, from: &[f32], to: &[f32]) -> Interpolant {
        let a = to_points(from);
        let mut b = to_points(to);

        if a.is_empty() || b.is_empty() {
            let fallback = if a.is_empty() { flatten(&b) } else { flatten(&a) };
            return Box::new(move |_| fallback.clone());
        }

        let count = self.samples.unwrap_or_else(|| a.len().max(b.len())).max(3);

        let wa = PolyContour::detect_winding(&a);
        let wb = PolyContour::detect_winding(&b);
        if wa != Winding::Unknown && wb != Winding::Unknown && wa != wb {
            b.reverse();
        }

        let a = resample(&a, count);
        let b = resample(&b, count);
        let offset = best_offset(&a, &b);
        let b: Vec<_> = (0..count).map(|i| b[(i + offset) % count]).collect();

        Box::new(move |t| {
            let t = t.clamp(0.0, 1.0);
            a.iter()
                .zip(&b)
                .flat_map(|(p, q)| {
                    let v = p + (q - p) * t;
                    [v.x, v.y]
                })
                .collect()
        })
    }
}
