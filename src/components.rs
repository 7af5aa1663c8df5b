//! Connected-component labeling and binary mask morphology
//!
//! Masks are dense `u8` buffers over a box of `shape = (sx, sy, sz)`, `x`
//! fastest. A 2D image is a box with `sz = 1`, where face connectivity
//! reduces to 4-connectivity.

use nalgebra::Vector3;
use std::collections::VecDeque;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Component ids per cell (`0` = background) and component sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labeling {
    shape: Vector3<usize>,
    ids: Vec<u32>,
    sizes: Vec<usize>,
}

impl Labeling {
    pub fn shape(&self) -> Vector3<usize> {
        self.shape
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn component_count(&self) -> usize {
        self.sizes.len()
    }

    pub fn size(&self, id: u32) -> usize {
        match id {
            0 => 0,
            id => self.sizes.get(id as usize - 1).copied().unwrap_or(0),
        }
    }

    /// Id of the largest component; the lowest id wins ties.
    pub fn largest(&self) -> Option<u32> {
        let mut best: Option<(u32, usize)> = None;
        for (n, &size) in self.sizes.iter().enumerate() {
            if best.map_or(true, |(_, s)| size > s) {
                best = Some((n as u32 + 1, size));
            }
        }
        best.map(|(id, _)| id)
    }

    pub fn component_at(&self, x: usize, y: usize, z: usize) -> Option<u32> {
        if x >= self.shape.x || y >= self.shape.y || z >= self.shape.z {
            return None;
        }
        match self.ids[x + y * self.shape.x + z * self.shape.x * self.shape.y] {
            0 => None,
            id => Some(id),
        }
    }

    /// Binary mask of a single component.
    pub fn keep(&self, id: u32) -> Vec<u8> {
        self.ids.iter().map(|&v| u8::from(v == id && id != 0)).collect()
    }
}

/// Connected-component labeling service.
pub trait ComponentLabeler: Send + Sync {
    /// Label face-connected regions of non-zero cells.
    fn label(&self, mask: &[u8], shape: Vector3<usize>) -> Labeling;
}

/// Breadth-first flood fill labeler.
#[derive(Debug, Default, Clone, Copy)]
pub struct FloodFillLabeler;

impl ComponentLabeler for FloodFillLabeler {
    fn label(&self, mask: &[u8], shape: Vector3<usize>) -> Labeling {
        let (sx, sy, sz) = (shape.x, shape.y, shape.z);
        let n = (sx * sy * sz).min(mask.len());
        let mut ids = vec![0u32; sx * sy * sz];
        let mut sizes = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..n {
            if mask[start] == 0 || ids[start] != 0 {
                continue;
            }
            let id = sizes.len() as u32 + 1;
            let mut size = 0usize;
            ids[start] = id;
            queue.push_back(start);

            while let Some(index) = queue.pop_front() {
                size += 1;
                let x = index % sx;
                let y = (index / sx) % sy;
                let z = index / (sx * sy);

                let mut visit = |neighbor: usize| {
                    if neighbor < n && mask[neighbor] != 0 && ids[neighbor] == 0 {
                        ids[neighbor] = id;
                        queue.push_back(neighbor);
                    }
                };
                if x > 0 {
                    visit(index - 1);
                }
                if x + 1 < sx {
                    visit(index + 1);
                }
                if y > 0 {
                    visit(index - sx);
                }
                if y + 1 < sy {
                    visit(index + sx);
                }
                if z > 0 {
                    visit(index - sx * sy);
                }
                if z + 1 < sz {
                    visit(index + sx * sy);
                }
            }
            sizes.push(size);
        }

        Labeling { shape, ids, sizes }
    }
}

/// Binary morphology step applied to a threshold mask before component
/// extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MaskOp {
    /// Keep a cell only if every in-box 26-neighbor is set.
    Erode,
    /// Set an empty cell if any in-plane 8-neighbor is set.
    Dilate,
}

impl MaskOp {
    pub fn apply(self, mask: &[u8], shape: Vector3<usize>) -> Vec<u8> {
        match self {
            MaskOp::Erode => erode(mask, shape),
            MaskOp::Dilate => dilate(mask, shape),
        }
    }
}

fn neighbors(
    shape: Vector3<usize>,
    x: usize,
    y: usize,
    z: usize,
    planar: bool,
) -> impl Iterator<Item = usize> {
    let dz: &'static [i64] = if planar { &[0] } else { &[-1, 0, 1] };
    dz.iter().flat_map(move |&oz| {
        [-1i64, 0, 1].into_iter().flat_map(move |oy| {
            [-1i64, 0, 1].into_iter().filter_map(move |ox| {
                if ox == 0 && oy == 0 && oz == 0 {
                    return None;
                }
                let nx = x as i64 + ox;
                let ny = y as i64 + oy;
                let nz = z as i64 + oz;
                if nx < 0
                    || ny < 0
                    || nz < 0
                    || nx >= shape.x as i64
                    || ny >= shape.y as i64
                    || nz >= shape.z as i64
                {
                    return None;
                }
                Some(nx as usize + ny as usize * shape.x + nz as usize * shape.x * shape.y)
            })
        })
    })
}

pub fn erode(mask: &[u8], shape: Vector3<usize>) -> Vec<u8> {
    let mut out = mask.to_vec();
    for z in 0..shape.z {
        for y in 0..shape.y {
            for x in 0..shape.x {
                let index = x + y * shape.x + z * shape.x * shape.y;
                if mask[index] == 0 {
                    continue;
                }
                if neighbors(shape, x, y, z, false).any(|n| mask[n] == 0) {
                    out[index] = 0;
                }
            }
        }
    }
    out
}

pub fn dilate(mask: &[u8], shape: Vector3<usize>) -> Vec<u8> {
    let mut out = mask.to_vec();
    for z in 0..shape.z {
        for y in 0..shape.y {
            for x in 0..shape.x {
                let index = x + y * shape.x + z * shape.x * shape.y;
                if mask[index] != 0 {
                    continue;
                }
                if let Some(n) = neighbors(shape, x, y, z, true).find(|&n| mask[n] != 0) {
                    out[index] = mask[n];
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_2d_four_connected() {
        // Diagonal cells are separate components under 4-connectivity.
        #[rustfmt::skip]
        let mask = [
            1, 1, 0, 0,
            1, 0, 0, 0,
            0, 0, 1, 0,
            0, 0, 0, 1,
        ];
        let labeling = FloodFillLabeler.label(&mask, Vector3::new(4, 4, 1));
        assert_eq!(labeling.component_count(), 3);
        assert_eq!(labeling.largest(), Some(1));
        assert_eq!(labeling.size(1), 3);
        assert_eq!(labeling.component_at(0, 1, 0), Some(1));
        assert_eq!(labeling.component_at(3, 0, 0), None);
        assert_eq!(labeling.keep(1).iter().filter(|&&v| v == 1).count(), 3);
    }

    #[test]
    fn test_label_3d_six_connected() {
        let shape = Vector3::new(3, 3, 3);
        let mut mask = vec![0u8; 27];
        mask[0] = 1;
        mask[9] = 1; // (0, 0, 1)
        mask[18] = 1; // (0, 0, 2)
        mask[26] = 1; // (2, 2, 2)
        let labeling = FloodFillLabeler.label(&mask, shape);
        assert_eq!(labeling.component_count(), 2);
        assert_eq!(labeling.component_at(0, 0, 2), Some(1));
        assert_eq!(labeling.size(labeling.largest().unwrap()), 3);
    }

    #[test]
    fn test_empty_labeling() {
        let labeling = FloodFillLabeler.label(&[0; 8], Vector3::new(2, 2, 2));
        assert_eq!(labeling.component_count(), 0);
        assert_eq!(labeling.largest(), None);
    }

    #[test]
    fn test_erode_dilate() {
        let shape = Vector3::new(5, 5, 1);
        let mut mask = vec![0u8; 25];
        for y in 1..4 {
            for x in 1..4 {
                mask[x + y * 5] = 1;
            }
        }
        let eroded = MaskOp::Erode.apply(&mask, shape);
        assert_eq!(eroded.iter().filter(|&&v| v == 1).count(), 1);
        assert_eq!(eroded[12], 1);

        let dilated = MaskOp::Dilate.apply(&eroded, shape);
        assert_eq!(dilated, mask);
    }
}
