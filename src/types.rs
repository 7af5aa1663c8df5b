//! Basic types shared by the segmentation components

use nalgebra::Vector3;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Projection axis of a slice view.
///
/// The canonical integer mapping is `I = 0` (sagittal), `J = 1` (coronal),
/// `K = 2` (axial).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    I,
    J,
    K,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::I, Axis::J, Axis::K];

    pub fn index(self) -> usize {
        match self {
            Axis::I => 0,
            Axis::J => 1,
            Axis::K => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Axis::I),
            1 => Some(Axis::J),
            2 => Some(Axis::K),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Axis::I => "i",
            Axis::J => "j",
            Axis::K => "k",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "i" | "I" => Some(Axis::I),
            "j" | "J" => Some(Axis::J),
            "k" | "K" => Some(Axis::K),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive integer voxel box.
///
/// The empty box has `min = i32::MAX` and `max = i32::MIN` on every axis so
/// that folding any point into it yields that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelBox {
    pub min: Vector3<i32>,
    pub max: Vector3<i32>,
}

impl VoxelBox {
    pub fn new(min: Vector3<i32>, max: Vector3<i32>) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: Vector3::new(i32::MAX, i32::MAX, i32::MAX),
            max: Vector3::new(i32::MIN, i32::MIN, i32::MIN),
        }
    }

    /// Box of half-width `radius` around `center`. The k extent collapses to
    /// the center plane when `single_slice` is set.
    pub fn around(center: Vector3<i32>, radius: i32, single_slice: bool) -> Self {
        let r = Vector3::new(radius, radius, if single_slice { 0 } else { radius });
        Self::new(
            center.zip_map(&r, |c, r| c.saturating_sub(r)),
            center.zip_map(&r, |c, r| c.saturating_add(r)),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn contains(&self, point: Vector3<i32>) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    pub fn contains_box(&self, other: &VoxelBox) -> bool {
        other.is_empty() || (self.contains(other.min) && self.contains(other.max))
    }

    pub fn include_point(&mut self, point: Vector3<i32>) {
        self.min = self.min.inf(&point);
        self.max = self.max.sup(&point);
    }

    pub fn include_box(&mut self, other: &VoxelBox) {
        if other.is_empty() {
            return;
        }
        self.include_point(other.min);
        self.include_point(other.max);
    }

    /// Grow by `amount` on every side. Empty stays empty.
    pub fn padded(&self, amount: i32) -> Self {
        if self.is_empty() {
            return *self;
        }
        let pad = Vector3::new(amount, amount, amount);
        Self::new(self.min - pad, self.max + pad)
    }

    /// Intersect with `[0, D-1]` on every axis.
    pub fn clamped(&self, dims: &crate::Dimensions) -> Self {
        if self.is_empty() {
            return *self;
        }
        let upper = Vector3::new(dims.di as i32 - 1, dims.dj as i32 - 1, dims.dk as i32 - 1);
        let clamped = Self::new(self.min.sup(&Vector3::zeros()), self.max.inf(&upper));
        if clamped.is_empty() {
            Self::empty()
        } else {
            clamped
        }
    }

    /// Extent per axis, zero for an empty box.
    pub fn size(&self) -> Vector3<usize> {
        if self.is_empty() {
            return Vector3::zeros();
        }
        (self.max - self.min).map(|v| v as usize + 1)
    }

    pub fn voxel_count(&self) -> usize {
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Box-local linear offset of a global coordinate.
    pub fn local_index(&self, i: i32, j: i32, k: i32) -> usize {
        let size = self.size();
        crate::box_linear_index(
            (i - self.min.x) as usize,
            (j - self.min.y) as usize,
            (k - self.min.z) as usize,
            size.x,
            size.y,
        )
    }

    /// All coordinates in the box, `i` fastest.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, i32)> {
        let (min, max) = (self.min, self.max);
        (min.z..=max.z).flat_map(move |k| {
            (min.y..=max.y).flat_map(move |j| (min.x..=max.x).map(move |i| (i, j, k)))
        })
    }
}

impl Default for VoxelBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for VoxelBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<empty>");
        }
        write!(
            f,
            "i[{}..{}] j[{}..{}] k[{}..{}]",
            self.min.x, self.max.x, self.min.y, self.max.y, self.min.z, self.max.z
        )
    }
}

/// Integer bounding rectangle of a polygon in slice-local coordinates.
///
/// Built from the floor of the minimum and the ceiling of the maximum
/// coordinates. Pixels strictly between the bounds are "inside".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SliceRect {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

impl SliceRect {
    pub fn new(x_min: i32, x_max: i32, y_min: i32, y_max: i32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Rectangle of a flattened `(x, y)` polygon, `None` without vertices.
    pub fn from_polygon(polygon: &[f32]) -> Option<Self> {
        if polygon.len() < 2 {
            return None;
        }
        let mut x_min = f32::MAX;
        let mut x_max = f32::MIN;
        let mut y_min = f32::MAX;
        let mut y_max = f32::MIN;
        for point in polygon.chunks_exact(2) {
            x_min = x_min.min(point[0]);
            x_max = x_max.max(point[0]);
            y_min = y_min.min(point[1]);
            y_max = y_max.max(point[1]);
        }
        if !(x_min.is_finite() && x_max.is_finite() && y_min.is_finite() && y_max.is_finite()) {
            return None;
        }
        Some(Self::new(
            x_min.floor() as i32,
            x_max.ceil() as i32,
            y_min.floor() as i32,
            y_max.ceil() as i32,
        ))
    }

    pub fn width(&self) -> usize {
        (self.x_max - self.x_min).max(0) as usize
    }

    pub fn height(&self) -> usize {
        (self.y_max - self.y_min).max(0) as usize
    }

    /// Strictly inside, as used by rasterization.
    pub fn contains_strict(&self, x: i32, y: i32) -> bool {
        x > self.x_min && x < self.x_max && y > self.y_min && y < self.y_max
    }

    /// Intersect with a `width x height` slice, keeping the half-open form
    /// `[min, max)` valid for indexing.
    pub fn clamped(&self, width: usize, height: usize) -> Self {
        Self::new(
            self.x_min.clamp(0, width as i32),
            self.x_max.clamp(0, width as i32),
            self.y_min.clamp(0, height as i32),
            self.y_max.clamp(0, height as i32),
        )
    }
}

impl fmt::Display for SliceRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x[{}..{}] y[{}..{}]",
            self.x_min, self.x_max, self.y_min, self.y_max
        )
    }
}
