//! Display sink for incremental label and preview updates

use crate::VoxelBox;
use std::sync::{Arc, Mutex};

/// Dense values of a voxel box, `i` fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct SubVolume<T> {
    pub region: VoxelBox,
    pub values: Vec<T>,
}

impl<T: Copy> SubVolume<T> {
    pub fn new(region: VoxelBox, values: Vec<T>) -> Self {
        debug_assert_eq!(region.voxel_count(), values.len());
        Self { region, values }
    }

    pub fn get(&self, i: i32, j: i32, k: i32) -> Option<T> {
        if !self.region.contains(nalgebra::Vector3::new(i, j, k)) {
            return None;
        }
        self.values.get(self.region.local_index(i, j, k)).copied()
    }
}

/// Receiver of changed sub-volumes. Rendering is out of scope for the
/// engine; a viewer implements this to upload only what changed.
pub trait DisplaySink: Send {
    fn labels_updated(&mut self, update: &SubVolume<u8>);
    fn preview_updated(&mut self, update: &SubVolume<f32>);
}

/// Sink that drops every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DisplaySink for NullSink {
    fn labels_updated(&mut self, _update: &SubVolume<u8>) {}
    fn preview_updated(&mut self, _update: &SubVolume<f32>) {}
}

/// Sink that keeps every update, shared so a caller can inspect it after
/// handing the sink to the engine.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recorded>>,
}

#[derive(Debug, Default)]
struct Recorded {
    labels: Vec<SubVolume<u8>>,
    previews: Vec<SubVolume<f32>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label_updates(&self) -> Vec<SubVolume<u8>> {
        let rec = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rec.labels.clone()
    }

    pub fn preview_updates(&self) -> Vec<SubVolume<f32>> {
        let rec = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rec.previews.clone()
    }

    pub fn clear(&self) {
        let mut rec = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rec.labels.clear();
        rec.previews.clear();
    }
}

impl DisplaySink for RecordingSink {
    fn labels_updated(&mut self, update: &SubVolume<u8>) {
        let mut rec = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rec.labels.push(update.clone());
    }

    fn preview_updated(&mut self, update: &SubVolume<f32>) {
        let mut rec = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        rec.previews.push(update.clone());
    }
}
