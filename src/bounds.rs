//! Dirty-region tracking over the label volume

use crate::{Dimensions, VoxelBox};
use nalgebra::Vector3;

/// Accumulated box of every voxel an edit may have touched.
///
/// Folding only ever grows the box, so it stays a superset of the labeled
/// voxels until [`DirtyRegion::recompute`] tightens it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirtyRegion {
    bbox: VoxelBox,
}

impl DirtyRegion {
    pub fn new() -> Self {
        Self {
            bbox: VoxelBox::empty(),
        }
    }

    pub fn bbox(&self) -> VoxelBox {
        self.bbox
    }

    pub fn is_empty(&self) -> bool {
        self.bbox.is_empty()
    }

    /// Fold inclusive ranges into the region.
    pub fn expand(
        &mut self,
        i_min: i32,
        i_max: i32,
        j_min: i32,
        j_max: i32,
        k_min: i32,
        k_max: i32,
    ) {
        self.expand_box(&VoxelBox::new(
            Vector3::new(i_min, j_min, k_min),
            Vector3::new(i_max, j_max, k_max),
        ));
    }

    pub fn expand_box(&mut self, other: &VoxelBox) {
        self.bbox.include_box(other);
    }

    pub fn reset(&mut self) {
        self.bbox = VoxelBox::empty();
    }

    /// Replace with the tight box over all non-zero labels.
    pub fn recompute(&mut self, labels: &[u8], dims: &Dimensions) {
        let mut bbox = VoxelBox::empty();
        for k in 0..dims.dk {
            for j in 0..dims.dj {
                let row = dims.linear_index(0, j, k);
                let cells = &labels[row..row + dims.di];
                let Some(first) = cells.iter().position(|&v| v != 0) else {
                    continue;
                };
                let last = cells.iter().rposition(|&v| v != 0).unwrap_or(first);
                bbox.include_point(Vector3::new(first as i32, j as i32, k as i32));
                bbox.include_point(Vector3::new(last as i32, j as i32, k as i32));
            }
        }
        self.bbox = bbox;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_and_reset() {
        let mut region = DirtyRegion::new();
        assert!(region.is_empty());

        region.expand(2, 4, 1, 1, 0, 3);
        region.expand(0, 1, 5, 6, 2, 2);
        let bbox = region.bbox();
        assert_eq!(bbox.min, Vector3::new(0, 1, 0));
        assert_eq!(bbox.max, Vector3::new(4, 6, 3));

        region.reset();
        assert!(region.is_empty());
    }

    #[test]
    fn test_recompute_is_tight() {
        let dims = Dimensions::new(6, 5, 4);
        let mut labels = vec![0u8; dims.voxel_count()];
        labels[dims.linear_index(1, 2, 3)] = 2;
        labels[dims.linear_index(4, 0, 1)] = 3;

        let mut region = DirtyRegion::new();
        region.expand(0, 5, 0, 4, 0, 3);
        region.recompute(&labels, &dims);
        assert_eq!(region.bbox().min, Vector3::new(1, 0, 1));
        assert_eq!(region.bbox().max, Vector3::new(4, 2, 3));

        labels.fill(0);
        region.recompute(&labels, &dims);
        assert!(region.is_empty());
    }
}
