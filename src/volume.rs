//! Read-only scalar volume sources

use crate::{Dimensions, Error, Result};
use nalgebra::Vector3;

/// Scalar image the segmentation is drawn over.
///
/// Implementations must be immutable for the lifetime of an engine: every
/// component reads intensities through this trait and never writes them.
pub trait ScalarVolume: Send + Sync {
    fn dimensions(&self) -> Dimensions;

    /// Physical voxel size, forwarded to surface extraction.
    fn spacing(&self) -> Vector3<f32> {
        Vector3::new(1.0, 1.0, 1.0)
    }

    /// Full buffer in `i + j*Di + k*Di*Dj` order.
    fn scalars(&self) -> &[f32];

    fn scalar_at(&self, i: usize, j: usize, k: usize) -> f32 {
        self.scalars()[self.dimensions().linear_index(i, j, k)]
    }

    /// `(min, max)` over all voxels. `(0, 0)` for an empty volume.
    fn data_range(&self) -> (f32, f32) {
        scalar_range(self.scalars())
    }
}

pub(crate) fn scalar_range(values: &[f32]) -> (f32, f32) {
    let mut iter = values.iter().copied().filter(|v| v.is_finite());
    let Some(first) = iter.next() else {
        return (0.0, 0.0);
    };
    iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// In-memory volume.
#[derive(Debug, Clone)]
pub struct DenseVolume {
    dims: Dimensions,
    spacing: Vector3<f32>,
    data: Vec<f32>,
    range: (f32, f32),
}

impl DenseVolume {
    pub fn new(dims: Dimensions, data: Vec<f32>) -> Result<Self> {
        if dims.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "Volume dimensions must be non-zero, got {}",
                dims
            )));
        }
        if data.len() != dims.voxel_count() {
            return Err(Error::DimensionMismatch {
                expected: dims.voxel_count(),
                actual: data.len(),
            });
        }
        let range = scalar_range(&data);
        Ok(Self {
            dims,
            spacing: Vector3::new(1.0, 1.0, 1.0),
            data,
            range,
        })
    }

    pub fn filled(dims: Dimensions, value: f32) -> Result<Self> {
        Self::new(dims, vec![value; dims.voxel_count()])
    }

    /// Build from a function of `(i, j, k)`.
    pub fn from_fn<F>(dims: Dimensions, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(dims.voxel_count());
        for k in 0..dims.dk {
            for j in 0..dims.dj {
                for i in 0..dims.di {
                    data.push(f(i, j, k));
                }
            }
        }
        Self::new(dims, data)
    }

    pub fn with_spacing(mut self, spacing: Vector3<f32>) -> Result<Self> {
        if spacing.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(Error::InvalidParameter(format!(
                "Voxel spacing must be positive, got {:?}",
                spacing
            )));
        }
        self.spacing = spacing;
        Ok(self)
    }
}

impl ScalarVolume for DenseVolume {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn spacing(&self) -> Vector3<f32> {
        self.spacing
    }

    fn scalars(&self) -> &[f32] {
        &self.data
    }

    fn data_range(&self) -> (f32, f32) {
        self.range
    }
}
