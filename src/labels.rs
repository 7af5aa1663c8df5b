//! Label volume and the bank of saved segmentations
//!
//! Cell values: `0` unlabeled, `1` transient sentinel written by contour
//! rasterization, `segment + 2` committed label of segmentation `segment`.

use crate::{DirtyRegion, Dimensions, Error, Result, Utils, VoxelBox};
use tracing::debug;

/// Per-voxel label value.
pub type Label = u8;

pub const UNLABELED: Label = 0;
pub const SENTINEL: Label = 1;
pub const FIRST_SEGMENT_LABEL: Label = 2;

/// Number of segmentations that fit in the label value range.
pub const MAX_SEGMENTATIONS: usize = (Label::MAX - FIRST_SEGMENT_LABEL) as usize + 1;

/// Committed label value of a segmentation index.
pub fn segment_label(segment: usize) -> Result<Label> {
    if segment >= MAX_SEGMENTATIONS {
        return Err(Error::InvalidParameter(format!(
            "Segmentation index {} exceeds label range ({} max)",
            segment, MAX_SEGMENTATIONS
        )));
    }
    Ok(FIRST_SEGMENT_LABEL + segment as Label)
}

/// Live buffers of the active segmentation.
///
/// `labels` is the committed mask, `active` the scratch 0/1 mask used by
/// threshold passes, `preview` the brush overlay mirrored to the display.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    dims: Dimensions,
    labels: Vec<Label>,
    active: Vec<u8>,
    preview: Vec<f32>,
}

impl LabelVolume {
    pub fn new(dims: Dimensions) -> Self {
        let n = dims.voxel_count();
        Self {
            dims,
            labels: vec![UNLABELED; n],
            active: vec![0; n],
            preview: vec![0.0; n],
        }
    }

    pub fn dims(&self) -> Dimensions {
        self.dims
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn labels_mut(&mut self) -> &mut [Label] {
        &mut self.labels
    }

    pub fn active(&self) -> &[u8] {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut [u8] {
        &mut self.active
    }

    pub fn preview(&self) -> &[f32] {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut [f32] {
        &mut self.preview
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Label {
        self.labels[self.dims.linear_index(i, j, k)]
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, label: Label) {
        let index = self.dims.linear_index(i, j, k);
        self.labels[index] = label;
    }

    pub fn clear(&mut self) {
        self.labels.fill(UNLABELED);
        self.active.fill(0);
        self.preview.fill(0.0);
    }

    /// Zero the active mask inside `bbox` only.
    pub fn clear_active(&mut self, bbox: &VoxelBox) {
        let bbox = bbox.clamped(&self.dims);
        if bbox.is_empty() {
            return;
        }
        let (i0, i1) = (bbox.min.x as usize, bbox.max.x as usize);
        for k in bbox.min.z..=bbox.max.z {
            for j in bbox.min.y..=bbox.max.y {
                let row = self.dims.linear_index(0, j as usize, k as usize);
                self.active[row + i0..=row + i1].fill(0);
            }
        }
    }

    /// OR the active mask into the labels as `label`, then consume the mask.
    /// Already labeled voxels are never changed. Returns the number of
    /// newly labeled voxels.
    pub fn merge_active(&mut self, bbox: &VoxelBox, label: Label) -> usize {
        let bbox = bbox.clamped(&self.dims);
        let mut changed = 0;
        for (i, j, k) in bbox.iter() {
            let index = self.dims.linear_index(i as usize, j as usize, k as usize);
            if self.active[index] != 0 && self.labels[index] == UNLABELED {
                self.labels[index] = label;
                self.preview[index] = label as f32;
                changed += 1;
            }
            self.active[index] = 0;
        }
        changed
    }

    /// Copy labels into the preview over `bbox`.
    pub fn restore_preview(&mut self, bbox: &VoxelBox) {
        let bbox = bbox.clamped(&self.dims);
        for (i, j, k) in bbox.iter() {
            let index = self.dims.linear_index(i as usize, j as usize, k as usize);
            self.preview[index] = self.labels[index] as f32;
        }
    }

    /// Dense copy of the labels inside `bbox`, `i` fastest.
    pub fn sub_labels(&self, bbox: &VoxelBox) -> Vec<Label> {
        let bbox = bbox.clamped(&self.dims);
        bbox.iter()
            .map(|(i, j, k)| self.labels[self.dims.linear_index(i as usize, j as usize, k as usize)])
            .collect()
    }

    pub fn sub_preview(&self, bbox: &VoxelBox) -> Vec<f32> {
        let bbox = bbox.clamped(&self.dims);
        bbox.iter()
            .map(|(i, j, k)| self.preview[self.dims.linear_index(i as usize, j as usize, k as usize)])
            .collect()
    }

    /// Replace every `from` cell with `to`. Returns the number of cells.
    pub fn promote(&mut self, from: Label, to: Label) -> usize {
        let mut count = 0;
        for (label, preview) in self.labels.iter_mut().zip(self.preview.iter_mut()) {
            if *label == from {
                *label = to;
                *preview = to as f32;
                count += 1;
            }
        }
        count
    }

    pub fn count(&self, label: Label) -> usize {
        self.labels.iter().filter(|&&v| v == label).count()
    }

    /// Overwrite labels from an external buffer and resync the preview.
    pub fn replace_labels(&mut self, labels: &[Label]) -> Result<()> {
        if labels.len() != self.labels.len() {
            return Err(Error::DimensionMismatch {
                expected: self.labels.len(),
                actual: labels.len(),
            });
        }
        self.labels.copy_from_slice(labels);
        for (preview, &label) in self.preview.iter_mut().zip(labels) {
            *preview = label as f32;
        }
        self.active.fill(0);
        Ok(())
    }
}

/// One saved label set.
#[derive(Debug, Clone)]
pub struct Segmentation {
    name: String,
    labels: Vec<Label>,
    active: Vec<u8>,
    aux: Vec<f32>,
}

impl Segmentation {
    fn new(name: String, dims: &Dimensions) -> Self {
        let n = dims.voxel_count();
        Self {
            name,
            labels: vec![UNLABELED; n],
            active: vec![0; n],
            aux: vec![0.0; n],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Saved labels. Stale for the active segmentation, whose state lives in
    /// the engine's [`LabelVolume`].
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    fn save_from(&mut self, live: &LabelVolume) {
        self.labels.copy_from_slice(&live.labels);
        self.active.copy_from_slice(&live.active);
        self.aux.copy_from_slice(&live.preview);
    }

    fn load_into(&self, live: &mut LabelVolume) {
        live.labels.copy_from_slice(&self.labels);
        live.active.copy_from_slice(&self.active);
        live.preview.copy_from_slice(&self.aux);
    }
}

/// Bounded bank of segmentations with exactly one active slot once the
/// first one is added.
#[derive(Debug, Clone)]
pub struct SegmentationStore {
    series: String,
    max_count: usize,
    slots: Vec<Segmentation>,
    current: Option<usize>,
}

impl SegmentationStore {
    pub fn new(series: impl Into<String>, max_count: usize) -> Result<Self> {
        if max_count == 0 || max_count > MAX_SEGMENTATIONS {
            return Err(Error::InvalidParameter(format!(
                "Segmentation limit must be in 1..={}, got {}",
                MAX_SEGMENTATIONS, max_count
            )));
        }
        Ok(Self {
            series: series.into(),
            max_count,
            slots: Vec::new(),
            current: None,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    /// Label written by edits of the active segmentation.
    pub fn current_label(&self) -> Result<Label> {
        let current = self
            .current
            .ok_or_else(|| Error::OperationFailed("No active segmentation".to_string()))?;
        segment_label(current)
    }

    pub fn get(&self, index: usize) -> Option<&Segmentation> {
        self.slots.get(index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name())
    }

    pub fn rename(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(Error::SegmentationNotFound(index))?;
        slot.name = name.into();
        Ok(())
    }

    /// Register a zero-filled segmentation. The default name is
    /// `"{series} {index}"`.
    pub fn add(&mut self, name: Option<&str>, dims: &Dimensions) -> Result<usize> {
        if self.slots.len() >= self.max_count {
            return Err(Error::CapacityExceeded {
                limit: self.max_count,
            });
        }
        let index = self.slots.len();
        let name = match name {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => Utils::segmentation_name(&self.series, index),
        };
        debug!(index, name = %name, "segmentation added");
        self.slots.push(Segmentation::new(name, dims));
        Ok(index)
    }

    /// Save the live buffers into the current slot, load `index` and
    /// recompute the dirty region. Nothing changes on error.
    pub fn activate(
        &mut self,
        index: usize,
        live: &mut LabelVolume,
        region: &mut DirtyRegion,
    ) -> Result<()> {
        if index >= self.slots.len() {
            return Err(Error::SegmentationNotFound(index));
        }
        if let Some(current) = self.current {
            self.slots[current].save_from(live);
        }
        self.slots[index].load_into(live);
        self.current = Some(index);
        region.recompute(live.labels(), &live.dims());
        debug!(index, bbox = %region.bbox(), "segmentation activated");
        Ok(())
    }
}
