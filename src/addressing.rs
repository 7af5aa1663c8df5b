//! Voxel addressing: 3D coordinates, linear offsets and slice projections

use crate::types::Axis;
use nalgebra::Vector3;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Volume extents `(Di, Dj, Dk)`. Linear offsets run `i` fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Dimensions {
    pub di: usize,
    pub dj: usize,
    pub dk: usize,
}

/// Linear offset inside a local box of extent `box_i x box_j x _`.
#[inline]
pub fn box_linear_index(i: usize, j: usize, k: usize, box_i: usize, box_j: usize) -> usize {
    i + j * box_i + k * box_i * box_j
}

impl Dimensions {
    pub fn new(di: usize, dj: usize, dk: usize) -> Self {
        Self { di, dj, dk }
    }

    pub fn as_vector(&self) -> Vector3<usize> {
        Vector3::new(self.di, self.dj, self.dk)
    }

    pub fn voxel_count(&self) -> usize {
        self.di * self.dj * self.dk
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }

    /// `i + j*Di + k*Di*Dj`. No bounds checks.
    #[inline]
    pub fn linear_index(&self, i: usize, j: usize, k: usize) -> usize {
        box_linear_index(i, j, k, self.di, self.dj)
    }

    /// Inverse of [`Dimensions::linear_index`].
    pub fn coords(&self, linear: usize) -> (usize, usize, usize) {
        let plane = self.di * self.dj;
        let k = linear / plane;
        let rest = linear % plane;
        (rest % self.di, rest / self.di, k)
    }

    pub fn contains(&self, i: i32, j: i32, k: i32) -> bool {
        i >= 0
            && j >= 0
            && k >= 0
            && (i as usize) < self.di
            && (j as usize) < self.dj
            && (k as usize) < self.dk
    }

    /// Slice view extents `(width, height, depth)` for a projection axis.
    pub fn projection_dims(&self, axis: Axis) -> (usize, usize, usize) {
        match axis {
            Axis::I => (self.dj, self.dk, self.di),
            Axis::J => (self.dk, self.di, self.dj),
            Axis::K => (self.di, self.dj, self.dk),
        }
    }

    /// Volume coordinate of slice pixel `(x, y)` on slice `slice`.
    #[inline]
    pub fn slice_voxel(&self, axis: Axis, slice: usize, x: usize, y: usize) -> (usize, usize, usize) {
        match axis {
            Axis::I => (slice, x, y),
            Axis::J => (y, slice, x),
            Axis::K => (x, y, slice),
        }
    }

    /// Inverse of [`Dimensions::slice_voxel`]: `(slice, x, y)`.
    pub fn voxel_slice(&self, axis: Axis, i: usize, j: usize, k: usize) -> (usize, usize, usize) {
        match axis {
            Axis::I => (i, j, k),
            Axis::J => (j, k, i),
            Axis::K => (k, i, j),
        }
    }

    #[inline]
    pub fn slice_voxel_index(&self, axis: Axis, slice: usize, x: usize, y: usize) -> usize {
        let (i, j, k) = self.slice_voxel(axis, slice, x, y);
        self.linear_index(i, j, k)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.di, self.dj, self.dk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_index() {
        let dims = Dimensions::new(4, 3, 2);
        assert_eq!(dims.linear_index(0, 0, 0), 0);
        assert_eq!(dims.linear_index(1, 0, 0), 1);
        assert_eq!(dims.linear_index(0, 1, 0), 4);
        assert_eq!(dims.linear_index(0, 0, 1), 12);
        assert_eq!(dims.linear_index(3, 2, 1), 23);

        for n in 0..dims.voxel_count() {
            let (i, j, k) = dims.coords(n);
            assert_eq!(dims.linear_index(i, j, k), n);
        }
    }

    #[test]
    fn test_box_linear_index() {
        assert_eq!(box_linear_index(1, 2, 3, 5, 7), 1 + 2 * 5 + 3 * 35);
    }

    #[test]
    fn test_projection_dims() {
        let dims = Dimensions::new(10, 20, 30);
        assert_eq!(dims.projection_dims(Axis::K), (10, 20, 30));
        assert_eq!(dims.projection_dims(Axis::I), (20, 30, 10));
        assert_eq!(dims.projection_dims(Axis::J), (30, 10, 20));
    }

    #[test]
    fn test_slice_voxel_roundtrip() {
        let dims = Dimensions::new(5, 6, 7);
        for axis in Axis::ALL {
            let (w, h, d) = dims.projection_dims(axis);
            for slice in [0, d - 1] {
                for (x, y) in [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)] {
                    let (i, j, k) = dims.slice_voxel(axis, slice, x, y);
                    assert!(i < dims.di && j < dims.dj && k < dims.dk);
                    assert_eq!(dims.voxel_slice(axis, i, j, k), (slice, x, y));
                }
            }
        }
    }
}
