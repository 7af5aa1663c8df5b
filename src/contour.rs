//! Slice contours: storage, rasterization into the label volume and
//! main-object cleanup

use crate::components::ComponentLabeler;
use crate::labels::{LabelVolume, SENTINEL, UNLABELED};
use crate::slice::OutlineExtractor;
use crate::triangulate::{TriangleHitCache, Triangulator};
use crate::{Axis, Error, Result, ScalarVolume, SliceRect, VoxelBox};
use nalgebra::Vector3;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Closed polygon drawn on one slice of one viewport.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub viewport: usize,
    pub axis: Axis,
    /// Slice index in volume coordinates.
    pub slice_index: usize,
    /// Slice index as the viewport reports it; viewports may count slices
    /// in reverse.
    pub slice_index_viewport: usize,
    /// Flattened `(x, y)` pairs in slice-local coordinates.
    pub polygon: Vec<f32>,
    pub rect: SliceRect,
    pub iso_value: f32,
    pub iso_value2: f32,
    /// Cleaned outline of the main object once segmented.
    pub outline: Option<Vec<f32>>,
}

impl Contour {
    pub fn new(
        viewport: usize,
        axis: Axis,
        slice_index: usize,
        slice_index_viewport: usize,
        polygon: Vec<f32>,
        iso_value: f32,
        iso_value2: f32,
    ) -> Result<Self> {
        if polygon.len() % 2 != 0 {
            return Err(Error::InvalidParameter(format!(
                "Polygon must hold (x, y) pairs, got {} values",
                polygon.len()
            )));
        }
        if polygon.len() < 6 {
            return Err(Error::DegenerateContour(format!(
                "{} vertices, need at least 3",
                polygon.len() / 2
            )));
        }
        let rect = SliceRect::from_polygon(&polygon)
            .ok_or_else(|| Error::DegenerateContour("non-finite vertex".to_string()))?;
        Ok(Self {
            viewport,
            axis,
            slice_index,
            slice_index_viewport,
            polygon,
            rect,
            iso_value,
            iso_value2,
            outline: None,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.polygon.len() / 2
    }

    /// Whether `value` lies in the inclusive iso band.
    pub fn in_band(&self, value: f32) -> bool {
        value >= self.iso_value && value <= self.iso_value2
    }
}

/// Contours keyed by `(viewport, slice)` twice: by volume slice index and by
/// viewport slice index. Redrawing a slice replaces its entry.
#[derive(Debug, Clone, Default)]
pub struct ContourStore {
    by_slice: BTreeMap<(usize, usize), Contour>,
    by_viewport_slice: BTreeMap<(usize, usize), Contour>,
}

impl ContourStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contour: Contour) {
        if let Some(old) = self
            .by_slice
            .get(&(contour.viewport, contour.slice_index))
            .map(|c| (c.viewport, c.slice_index_viewport))
        {
            self.by_viewport_slice.remove(&old);
        }
        self.by_viewport_slice.insert(
            (contour.viewport, contour.slice_index_viewport),
            contour.clone(),
        );
        self.by_slice
            .insert((contour.viewport, contour.slice_index), contour);
    }

    pub fn get(&self, viewport: usize, slice_index: usize) -> Option<&Contour> {
        self.by_slice.get(&(viewport, slice_index))
    }

    pub fn get_by_viewport_slice(&self, viewport: usize, slice_index_viewport: usize) -> Option<&Contour> {
        self.by_viewport_slice.get(&(viewport, slice_index_viewport))
    }

    /// Drawn volume slice indices of a viewport, ascending.
    pub fn slices(&self, viewport: usize) -> Vec<usize> {
        self.by_slice
            .range((viewport, 0)..=(viewport, usize::MAX))
            .map(|(&(_, slice), _)| slice)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contour> {
        self.by_slice.values()
    }

    pub fn len(&self) -> usize {
        self.by_slice.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slice.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_slice.clear();
        self.by_viewport_slice.clear();
    }
}

/// Copy of one slice's intensities and labels, `x` fastest.
///
/// Contour work runs on these snapshots so it can happen off the engine
/// thread; [`SliceBuffer::commit`] writes the labels back.
#[derive(Debug, Clone)]
pub struct SliceBuffer {
    axis: Axis,
    slice: usize,
    width: usize,
    height: usize,
    intensities: Vec<f32>,
    labels: Vec<u8>,
}

/// Result of writing a slice buffer back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceCommit {
    pub changed: usize,
    /// Box of the changed voxels.
    pub bbox: VoxelBox,
}

impl SliceBuffer {
    pub fn capture(
        volume: &dyn ScalarVolume,
        live: &LabelVolume,
        axis: Axis,
        slice: usize,
    ) -> Result<Self> {
        let dims = live.dims();
        let (width, height, depth) = dims.projection_dims(axis);
        if slice >= depth {
            return Err(Error::InvalidParameter(format!(
                "Slice {} out of range for axis {} (depth {})",
                slice, axis, depth
            )));
        }
        let scalars = volume.scalars();
        let mut intensities = Vec::with_capacity(width * height);
        let mut labels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let index = dims.slice_voxel_index(axis, slice, x, y);
                intensities.push(scalars[index]);
                labels.push(live.labels()[index]);
            }
        }
        Ok(Self {
            axis,
            slice,
            width,
            height,
            intensities,
            labels,
        })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn slice(&self) -> usize {
        self.slice
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn intensity(&self, x: usize, y: usize) -> f32 {
        self.intensities[x + y * self.width]
    }

    pub fn label(&self, x: usize, y: usize) -> u8 {
        self.labels[x + y * self.width]
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn set_label(&mut self, x: usize, y: usize, label: u8) {
        self.labels[x + y * self.width] = label;
    }

    /// Write labels back into the live volume.
    pub fn commit(&self, live: &mut LabelVolume) -> SliceCommit {
        let dims = live.dims();
        let mut changed = 0;
        let mut bbox = VoxelBox::empty();
        for y in 0..self.height {
            for x in 0..self.width {
                let (i, j, k) = dims.slice_voxel(self.axis, self.slice, x, y);
                let index = dims.linear_index(i, j, k);
                let label = self.labels[x + y * self.width];
                if live.labels()[index] != label {
                    live.labels_mut()[index] = label;
                    live.preview_mut()[index] = label as f32;
                    bbox.include_point(Vector3::new(i as i32, j as i32, k as i32));
                    changed += 1;
                }
            }
        }
        SliceCommit { changed, bbox }
    }
}

/// Turns contours into sentinel masks on slice buffers.
#[derive(Clone)]
pub struct ContourSegmenter {
    triangulator: Arc<dyn Triangulator>,
    labeler: Arc<dyn ComponentLabeler>,
    outliner: Arc<dyn OutlineExtractor>,
}

impl ContourSegmenter {
    pub fn new(
        triangulator: Arc<dyn Triangulator>,
        labeler: Arc<dyn ComponentLabeler>,
        outliner: Arc<dyn OutlineExtractor>,
    ) -> Self {
        Self {
            triangulator,
            labeler,
            outliner,
        }
    }

    /// Mark pixels strictly inside the rectangle, inside the polygon and in
    /// the iso band as sentinel; clear other pixels inside the rectangle.
    /// Outside the rectangle only stale sentinels are cleared. Returns the
    /// number of sentinel pixels written.
    pub fn rasterize(&self, contour: &Contour, buf: &mut SliceBuffer) -> Result<usize> {
        let triangles = self.triangulator.triangulate(&contour.polygon);
        if triangles.is_empty() {
            return Err(Error::DegenerateContour(format!(
                "polygon with {} vertices has no area",
                contour.vertex_count()
            )));
        }
        let mut hits = TriangleHitCache::new(&contour.polygon, &triangles);
        let rect = contour.rect;
        let mut inside = 0;

        for x in 0..buf.width {
            for y in 0..buf.height {
                let (xi, yi) = (x as i32, y as i32);
                let current = buf.label(x, y);
                if !rect.contains_strict(xi, yi) {
                    if current == SENTINEL {
                        buf.set_label(x, y, UNLABELED);
                    }
                    continue;
                }
                let hit = hits.contains(x as f32, y as f32) && contour.in_band(buf.intensity(x, y));
                if hit {
                    inside += 1;
                    buf.set_label(x, y, SENTINEL);
                } else {
                    buf.set_label(x, y, UNLABELED);
                }
            }
        }
        Ok(inside)
    }

    /// Keep the largest 4-connected sentinel region inside the rectangle and
    /// return its closed outline in slice coordinates. Committed labels are
    /// left alone. The buffer is untouched on error.
    pub fn find_main_object(&self, contour: &Contour, buf: &mut SliceBuffer) -> Result<Vec<f32>> {
        let rect = contour.rect.clamped(buf.width, buf.height);
        let (rw, rh) = (rect.width(), rect.height());
        if rw == 0 || rh == 0 {
            return Err(Error::DegenerateContour(format!(
                "bounding rectangle {} is empty on the slice",
                rect
            )));
        }
        let (x0, y0) = (rect.x_min as usize, rect.y_min as usize);

        let mut mask = vec![0u8; rw * rh];
        for y in 0..rh {
            for x in 0..rw {
                mask[x + y * rw] = u8::from(buf.label(x0 + x, y0 + y) == SENTINEL);
            }
        }

        let labeling = self.labeler.label(&mask, Vector3::new(rw, rh, 1));
        let Some(main) = labeling.largest() else {
            return Err(Error::DegenerateContour("no object inside contour".to_string()));
        };
        let kept = labeling.keep(main);

        let outline = self.outliner.extract_outline(&kept, rw, rh);
        if outline.is_empty() {
            return Err(Error::DegenerateContour("no outline found".to_string()));
        }

        for y in 0..rh {
            for x in 0..rw {
                if mask[x + y * rw] == 1 && kept[x + y * rw] == 0 {
                    buf.set_label(x0 + x, y0 + y, UNLABELED);
                }
            }
        }

        debug!(
            components = labeling.component_count(),
            kept = labeling.size(main),
            "main object selected"
        );

        Ok(outline
            .chunks_exact(2)
            .flat_map(|p| [p[0] + x0 as f32, p[1] + y0 as f32])
            .collect())
    }

    /// Rasterize then clean. On error the buffer holds a partial result and
    /// must be discarded.
    pub fn segment(&self, contour: &Contour, buf: &mut SliceBuffer) -> Result<Vec<f32>> {
        self.rasterize(contour, buf)?;
        self.find_main_object(contour, buf)
    }
}
