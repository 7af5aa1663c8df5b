//! Spherical paint/erase brush with incremental preview diffing

use crate::labels::{Label, LabelVolume, UNLABELED};
use crate::{Dimensions, DirtyRegion, VoxelBox};
use nalgebra::Vector3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Preview value of a voxel under the brush that will be (or was) written.
pub const PREVIEW_ACTIVE: f32 = 1.0;
/// Preview value of an already labeled voxel under a hovering brush.
pub const PREVIEW_HOVER_LABELED: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BrushMode {
    /// Write the active label inside the sphere.
    Draw,
    /// Clear labels inside the sphere.
    Erase,
    /// Only highlight the sphere.
    Hover,
}

impl BrushMode {
    /// Whether this mode changes labels and must be folded into the dirty
    /// region.
    pub fn persists(self) -> bool {
        !matches!(self, BrushMode::Hover)
    }
}

/// Boxes touched by one cursor update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrushFrame {
    /// Previous cursor box whose preview was restored, if any.
    pub restored: Option<VoxelBox>,
    /// Box painted at the new cursor position.
    pub painted: VoxelBox,
    /// Labels actually changed inside `painted`.
    pub changed: usize,
}

#[derive(Debug, Clone)]
pub struct Brush {
    radius: i32,
    single_slice: bool,
    last_box: Option<VoxelBox>,
}

impl Brush {
    pub fn new(radius: u32, single_slice: bool) -> Self {
        Self {
            radius: radius.min(i32::MAX as u32) as i32,
            single_slice,
            last_box: None,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius as u32
    }

    pub fn set_radius(&mut self, radius: u32) {
        self.radius = radius.min(i32::MAX as u32) as i32;
    }

    pub fn single_slice(&self) -> bool {
        self.single_slice
    }

    pub fn set_single_slice(&mut self, single_slice: bool) {
        self.single_slice = single_slice;
    }

    /// Cursor box of the last update, if the cursor is over the volume.
    pub fn last_box(&self) -> Option<VoxelBox> {
        self.last_box
    }

    /// Half-width `r` box around `center`, clamped to the volume.
    pub fn bounding_box_for(&self, center: Vector3<i32>, dims: &Dimensions) -> VoxelBox {
        VoxelBox::around(center, self.radius, self.single_slice).clamped(dims)
    }

    fn inside(&self, center: Vector3<i32>, i: i32, j: i32, k: i32) -> bool {
        let d = Vector3::new(i, j, k).cast::<f64>() - center.cast::<f64>();
        d.norm() <= self.radius as f64
    }

    /// Apply `mode` to every voxel of `bbox` inside the sphere and refresh
    /// the preview of the rest. Returns the number of labels changed.
    pub fn paint(
        &self,
        center: Vector3<i32>,
        bbox: &VoxelBox,
        mode: BrushMode,
        label: Label,
        live: &mut LabelVolume,
    ) -> usize {
        let dims = live.dims();
        let bbox = bbox.clamped(&dims);
        let mut changed = 0;
        for (i, j, k) in bbox.iter() {
            let index = dims.linear_index(i as usize, j as usize, k as usize);
            let current = live.labels()[index];
            if !self.inside(center, i, j, k) {
                live.preview_mut()[index] = current as f32;
                continue;
            }
            let preview = match mode {
                BrushMode::Draw => {
                    if current != label {
                        live.labels_mut()[index] = label;
                        changed += 1;
                    }
                    PREVIEW_ACTIVE
                }
                BrushMode::Erase => {
                    if current != UNLABELED {
                        live.labels_mut()[index] = UNLABELED;
                        changed += 1;
                    }
                    PREVIEW_ACTIVE
                }
                BrushMode::Hover => {
                    if current != UNLABELED {
                        PREVIEW_HOVER_LABELED
                    } else {
                        PREVIEW_ACTIVE
                    }
                }
            };
            live.preview_mut()[index] = preview;
        }
        changed
    }

    /// Move the cursor: restore the previous box, paint the new one and fold
    /// it into `region` when the mode persists.
    pub fn stroke(
        &mut self,
        center: Vector3<i32>,
        mode: BrushMode,
        label: Label,
        live: &mut LabelVolume,
        region: &mut DirtyRegion,
    ) -> BrushFrame {
        let restored = self.leave(live);
        let painted = self.bounding_box_for(center, &live.dims());
        let changed = self.paint(center, &painted, mode, label, live);
        if mode.persists() {
            region.expand_box(&painted);
        }
        self.last_box = if painted.is_empty() {
            None
        } else {
            Some(painted)
        };
        BrushFrame {
            restored,
            painted,
            changed,
        }
    }

    /// Cursor left the view: restore the preview under the last box.
    pub fn leave(&mut self, live: &mut LabelVolume) -> Option<VoxelBox> {
        let last = self.last_box.take()?;
        live.restore_preview(&last);
        Some(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live() -> LabelVolume {
        LabelVolume::new(Dimensions::new(16, 16, 16))
    }

    #[test]
    fn test_draw_sphere() {
        let mut live = live();
        let mut region = DirtyRegion::new();
        let mut brush = Brush::new(2, false);
        let center = Vector3::new(8, 8, 8);

        let frame = brush.stroke(center, BrushMode::Draw, 2, &mut live, &mut region);
        assert_eq!(frame.painted.size(), Vector3::new(5, 5, 5));
        assert!(frame.restored.is_none());
        // 33 lattice points with |d| <= 2
        assert_eq!(frame.changed, 33);
        assert_eq!(live.count(2), 33);
        assert_eq!(live.get(8, 8, 8), 2);
        assert_eq!(live.get(10, 10, 8), 0);
        assert_eq!(region.bbox(), frame.painted);
    }

    #[test]
    fn test_huge_radius_is_clamped() {
        let mut live = live();
        let mut region = DirtyRegion::new();
        let mut brush = Brush::new(u32::MAX, false);
        assert_eq!(brush.radius(), i32::MAX as u32);

        let frame = brush.stroke(Vector3::new(8, 8, 8), BrushMode::Draw, 2, &mut live, &mut region);
        assert_eq!(frame.painted.size(), Vector3::new(16, 16, 16));
        assert_eq!(frame.changed, 16 * 16 * 16);
    }

    #[test]
    fn test_draw_is_idempotent() {
        let mut live = live();
        let mut region = DirtyRegion::new();
        let mut brush = Brush::new(3, false);
        let center = Vector3::new(5, 6, 7);
        brush.stroke(center, BrushMode::Draw, 2, &mut live, &mut region);
        let first = live.labels().to_vec();
        let frame = brush.stroke(center, BrushMode::Draw, 2, &mut live, &mut region);
        assert_eq!(frame.changed, 0);
        assert_eq!(live.labels(), first.as_slice());
    }

    #[test]
    fn test_hover_preview_and_restore() {
        let mut live = live();
        let mut region = DirtyRegion::new();
        let mut brush = Brush::new(1, false);
        live.set(4, 4, 4, 3);
        live.restore_preview(&VoxelBox::new(Vector3::zeros(), Vector3::new(15, 15, 15)));

        brush.stroke(Vector3::new(4, 4, 4), BrushMode::Hover, 2, &mut live, &mut region);
        let dims = live.dims();
        assert_eq!(live.preview()[dims.linear_index(4, 4, 4)], PREVIEW_HOVER_LABELED);
        assert_eq!(live.preview()[dims.linear_index(5, 4, 4)], PREVIEW_ACTIVE);
        assert!(region.is_empty());
        assert_eq!(live.get(4, 4, 4), 3);

        let frame = brush.stroke(Vector3::new(10, 10, 10), BrushMode::Hover, 2, &mut live, &mut region);
        assert!(frame.restored.is_some());
        assert_eq!(live.preview()[dims.linear_index(4, 4, 4)], 3.0);
        assert_eq!(live.preview()[dims.linear_index(5, 4, 4)], 0.0);
    }

    #[test]
    fn test_single_slice_and_clamp() {
        let mut live = live();
        let mut region = DirtyRegion::new();
        let mut brush = Brush::new(3, true);
        let frame = brush.stroke(Vector3::new(0, 0, 5), BrushMode::Draw, 2, &mut live, &mut region);
        assert_eq!(frame.painted.min, Vector3::new(0, 0, 5));
        assert_eq!(frame.painted.max, Vector3::new(3, 3, 5));
        assert_eq!(live.get(0, 0, 4), 0);
        assert_eq!(live.get(0, 0, 5), 2);
    }

    #[test]
    fn test_erase() {
        let mut live = live();
        let mut region = DirtyRegion::new();
        let mut brush = Brush::new(2, false);
        let center = Vector3::new(8, 8, 8);
        brush.stroke(center, BrushMode::Draw, 2, &mut live, &mut region);
        let frame = brush.stroke(center, BrushMode::Erase, 2, &mut live, &mut region);
        assert_eq!(frame.changed, 33);
        assert_eq!(live.count(2), 0);
    }
}
