//! Slice outlines: marching squares over a binary slice mask and the
//! contour linker that turns cell segments into closed polygons

use nalgebra::Vector2;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    Unknown,
    Clockwise,
    CounterClockwise,
}

/// Closed 2D polygon in slice-local coordinates.
#[derive(Debug, Clone)]
pub struct PolyContour {
    vertices: Vec<Vector2<f32>>,
    winding: Winding,
}

impl PolyContour {
    pub fn detect_winding(vertices: &[Vector2<f32>]) -> Winding {
        let area = Self::signed_area(vertices);
        if area > 0.0 {
            Winding::CounterClockwise
        } else if area < 0.0 {
            Winding::Clockwise
        } else {
            Winding::Unknown
        }
    }

    /// Shoelace area, positive for counter-clockwise in a y-up frame.
    pub fn signed_area(vertices: &[Vector2<f32>]) -> f32 {
        if vertices.len() < 3 {
            return 0.0;
        }
        let mut area = 0.0f32;
        for i in 0..vertices.len() {
            let j = (i + 1) % vertices.len();
            area += vertices[i].x * vertices[j].y - vertices[j].x * vertices[i].y;
        }
        area * 0.5
    }

    pub fn new(vertices: Vec<Vector2<f32>>) -> Option<Self> {
        if vertices.len() < 3 {
            return None;
        }
        let winding = Self::detect_winding(&vertices);
        Some(Self { vertices, winding })
    }

    pub fn from_flat(points: &[f32]) -> Option<Self> {
        Self::new(
            points
                .chunks_exact(2)
                .map(|p| Vector2::new(p[0], p[1]))
                .collect(),
        )
    }

    pub fn winding(&self) -> Winding {
        self.winding
    }

    pub fn vertices(&self) -> &[Vector2<f32>] {
        &self.vertices
    }

    pub fn area(&self) -> f32 {
        Self::signed_area(&self.vertices).abs()
    }

    /// Repeat the first vertex at the end unless already closed.
    pub fn close(&mut self) {
        let (Some(first), Some(last)) = (self.vertices.first().copied(), self.vertices.last().copied())
        else {
            return;
        };
        if (first - last).norm() > f32::EPSILON {
            self.vertices.push(first);
        }
    }

    pub fn translate(&mut self, offset: Vector2<f32>) {
        for v in &mut self.vertices {
            *v += offset;
        }
    }

    pub fn to_flat(&self) -> Vec<f32> {
        self.vertices.iter().flat_map(|v| [v.x, v.y]).collect()
    }
}

/// All closed contours of one slice.
#[derive(Debug, Clone, Default)]
pub struct PolySlice {
    contours: Vec<PolyContour>,
}

impl PolySlice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contours(&self) -> &[PolyContour] {
        &self.contours
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    /// Contour enclosing the largest area.
    pub fn largest(&self) -> Option<&PolyContour> {
        self.contours
            .iter()
            .max_by(|a, b| a.area().total_cmp(&b.area()))
    }

    /// Trace the zero level of a `width x height` field. Negative values are
    /// inside. Vertices are `offset + grid * scale`.
    pub fn from_field<F>(width: usize, height: usize, field: F, offset: Vector2<f32>, scale: f32) -> Self
    where
        F: Fn(usize, usize) -> f32,
    {
        let mut slice = PolySlice::new();
        if width < 2 || height < 2 {
            return slice;
        }

        let mut segments: Vec<Segment> = Vec::new();

        for y in 0..(height - 1) {
            for x in 0..(width - 1) {
                let corners = [field(x, y), field(x + 1, y), field(x + 1, y + 1), field(x, y + 1)];

                let lut_index = corners
                    .iter()
                    .enumerate()
                    .filter(|(_, &v)| v < 0.0)
                    .fold(0usize, |acc, (bit, _)| acc | (1 << bit));

                let edges_crossed = EDGE_LUT[lut_index][0];
                if edges_crossed == 0 {
                    continue;
                }

                let (fx, fy) = (x as f32, y as f32);
                let mut crossings = [Vector2::zeros(); 4];
                if (edges_crossed & 1) != 0 {
                    crossings[0] = Vector2::new(fx + zero_crossing(corners[0], corners[1]), fy);
                }
                if (edges_crossed & 2) != 0 {
                    crossings[1] = Vector2::new(fx + 1.0, fy + zero_crossing(corners[1], corners[2]));
                }
                if (edges_crossed & 4) != 0 {
                    crossings[2] = Vector2::new(fx + zero_crossing(corners[3], corners[2]), fy + 1.0);
                }
                if (edges_crossed & 8) != 0 {
                    crossings[3] = Vector2::new(fx, fy + zero_crossing(corners[0], corners[3]));
                }

                let mut seg_index = 1;
                while seg_index < 5 {
                    let start_idx = EDGE_LUT[lut_index][seg_index];
                    if start_idx < 0 {
                        break;
                    }
                    let end_idx = EDGE_LUT[lut_index][seg_index + 1];
                    let start = offset + crossings[start_idx as usize] * scale;
                    let end = offset + crossings[end_idx as usize] * scale;
                    segments.push(Segment::new(start, end));
                    seg_index += 2;
                }
            }
        }

        slice.link(segments);
        slice
    }

    /// Outline of the non-zero cells of a `width x height` mask (`x`
    /// fastest). The mask is padded by one cell so shapes touching the
    /// border still close; vertices lie on cell-center coordinates.
    pub fn from_mask(mask: &[u8], width: usize, height: usize) -> Self {
        let field = |px: usize, py: usize| -> f32 {
            if px == 0 || py == 0 || px > width || py > height {
                return 0.5;
            }
            if mask[(px - 1) + (py - 1) * width] != 0 {
                -0.5
            } else {
                0.5
            }
        };
        Self::from_field(width + 2, height + 2, field, Vector2::new(-1.0, -1.0), 1.0)
    }

    fn link(&mut self, mut segments: Vec<Segment>) {
        let mut segments_left = segments.len();
        let mut curr_start: Option<usize> = None;
        let mut curr_end: Option<usize> = None;
        let mut unused = 0usize;
        let mut contour = VecDeque::new();

        while segments_left > 0 {
            if curr_start.is_none() {
                let Some(start_idx) = segments
                    .iter()
                    .enumerate()
                    .skip(unused)
                    .find(|(_, seg)| !seg.used)
                    .map(|(idx, _)| idx)
                else {
                    break;
                };

                curr_start = Some(start_idx);
                curr_end = Some(start_idx);
                unused = start_idx + 1;

                contour.push_back(segments[start_idx].start);
                contour.push_back(segments[start_idx].end);
                segments[start_idx].used = true;
                segments_left -= 1;
            }

            let (Some(start_idx), Some(end_idx)) = (curr_start, curr_end) else {
                break;
            };

            let mut best_start: Option<usize> = None;
            let mut best_end: Option<usize> = None;
            let mut best_sqr_start = 1.0f32;
            let mut best_sqr_end = 1.0f32;

            if end_idx != start_idx {
                let sqr = (segments[start_idx].start - segments[end_idx].end).norm_squared();
                if sqr < 1.0 {
                    best_sqr_start = sqr;
                    best_sqr_end = sqr;
                    best_start = Some(end_idx);
                    best_end = Some(start_idx);
                }
            }

            let f_min = segments[start_idx].min_y.min(segments[end_idx].min_y).floor() - 1.0;
            let f_max = segments[start_idx].max_y.max(segments[end_idx].max_y).ceil() + 1.0;

            let mut search_from = start_idx.min(end_idx);
            while search_from > 0 && segments[search_from - 1].max_y >= f_min {
                search_from -= 1;
            }

            for idx in search_from..segments.len() {
                if segments[idx].used {
                    continue;
                }
                if segments[idx].min_y > f_max {
                    break;
                }

                let sqr = (segments[start_idx].start - segments[idx].end).norm_squared();
                if sqr < best_sqr_start {
                    best_sqr_start = sqr;
                    best_start = Some(idx);
                }

                let sqr = (segments[end_idx].end - segments[idx].start).norm_squared();
                if sqr < best_sqr_end {
                    best_sqr_end = sqr;
                    best_end = Some(idx);
                }
            }

            if best_end.is_none() && best_start.is_none() {
                contour.clear();
                curr_start = None;
                curr_end = None;
            } else if best_start == best_end
                || best_start == Some(end_idx)
                || best_end == Some(start_idx)
            {
                if best_start == best_end {
                    if let Some(idx) = best_end {
                        segments[idx].used = true;
                        segments_left -= 1;
                    }
                }

                if contour.len() > 2 {
                    if let Some(closed) = PolyContour::new(contour.iter().copied().collect()) {
                        self.contours.push(closed);
                    }
                }

                contour.clear();
                curr_start = None;
                curr_end = None;
            } else {
                if let Some(idx) = best_end {
                    contour.push_back(segments[idx].end);
                    segments[idx].used = true;
                    segments_left -= 1;
                    curr_end = Some(idx);
                }
                if let Some(idx) = best_start {
                    contour.push_front(segments[idx].start);
                    segments[idx].used = true;
                    segments_left -= 1;
                    curr_start = Some(idx);
                }
            }
        }
    }
}

struct Segment {
    start: Vector2<f32>,
    end: Vector2<f32>,
    min_y: f32,
    max_y: f32,
    used: bool,
}

impl Segment {
    fn new(start: Vector2<f32>, end: Vector2<f32>) -> Self {
        Self {
            start,
            end,
            min_y: start.y.min(end.y),
            max_y: start.y.max(end.y),
            used: false,
        }
    }
}

/// Per corner-sign case: crossed-edge bitmask, then up to two segments as
/// `(start edge, end edge)` pairs.
const EDGE_LUT: [[i32; 5]; 16] = [
    [0, -1, -1, -1, -1],
    [9, 0, 3, -1, -1],
    [3, 1, 0, -1, -1],
    [10, 1, 3, -1, -1],
    [6, 2, 1, -1, -1],
    [15, 0, 1, 2, 3],
    [5, 2, 0, -1, -1],
    [12, 2, 3, -1, -1],
    [12, 3, 2, -1, -1],
    [5, 0, 2, -1, -1],
    [15, 3, 0, 1, 2],
    [6, 1, 2, -1, -1],
    [10, 3, 1, -1, -1],
    [3, 0, 1, -1, -1],
    [9, 3, 0, -1, -1],
    [0, -1, -1, -1, -1],
];

fn zero_crossing(a: f32, b: f32) -> f32 {
    (a.abs() / (a.abs() + b.abs())) + 1e-6
}

/// Outline extraction service: closed boundary of a binary slice mask.
pub trait OutlineExtractor: Send + Sync {
    /// Largest closed outline of `mask` as flattened `(x, y)` pairs with the
    /// first vertex repeated at the end. Empty when the mask is empty.
    fn extract_outline(&self, mask: &[u8], width: usize, height: usize) -> Vec<f32>;
}

/// Marching-squares outline of the largest region.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarchingSquaresOutline;

impl OutlineExtractor for MarchingSquaresOutline {
    fn extract_outline(&self, mask: &[u8], width: usize, height: usize) -> Vec<f32> {
        if mask.len() < width * height || mask.iter().all(|&v| v == 0) {
            return Vec::new();
        }
        let slice = PolySlice::from_mask(mask, width, height);
        match slice.largest() {
            Some(contour) => {
                let mut contour = contour.clone();
                contour.close();
                contour.to_flat()
            }
            None => Vec::new(),
        }
    }
}
