//! Segmentation engine: owns the live label state and routes every edit
//! through the dirty region, the display sink and the session log

use crate::brush::{Brush, BrushFrame, BrushMode};
use crate::components::{ComponentLabeler, FloodFillLabeler};
use crate::config::EngineConfig;
use crate::contour::{Contour, ContourSegmenter, ContourStore, SliceBuffer, SliceCommit};
use crate::display::{DisplaySink, NullSink, SubVolume};
use crate::interpolation::{InterpolationReport, SliceInterpolator};
use crate::labels::{Label, LabelVolume, SegmentationStore, SENTINEL, UNLABELED};
use crate::log::SessionLog;
use crate::morph::{PolygonMorpher, ResampleMorpher};
use crate::persist;
use crate::slice::{MarchingSquaresOutline, OutlineExtractor};
use crate::smart_brush::{GrowOutcome, SmartBrush, SmartBrushParams};
use crate::surface::{ExtractionRequest, PendingSurface, SurfaceExtractor, SurfaceHandoff, VoxelFaceExtractor};
use crate::triangulate::{EarClipTriangulator, Triangulator};
use crate::{Axis, Dimensions, DirtyRegion, Error, Result, ScalarVolume, VoxelBox};
use nalgebra::Vector3;
use std::io::{Read, Seek, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// Pluggable collaborators of the engine.
#[derive(Clone)]
pub struct Services {
    pub triangulator: Arc<dyn Triangulator>,
    pub labeler: Arc<dyn ComponentLabeler>,
    pub outliner: Arc<dyn OutlineExtractor>,
    pub morpher: Arc<dyn PolygonMorpher>,
    pub extractor: Arc<dyn SurfaceExtractor>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            triangulator: Arc::new(EarClipTriangulator),
            labeler: Arc::new(FloodFillLabeler),
            outliner: Arc::new(MarchingSquaresOutline),
            morpher: Arc::new(ResampleMorpher::default()),
            extractor: Arc::new(VoxelFaceExtractor::default()),
        }
    }
}

/// Interactive segmentation over one scalar volume.
///
/// Edits are not internally synchronized: callers serialize them, which
/// `&mut self` enforces within a thread.
pub struct SegmentationEngine {
    config: EngineConfig,
    volume: Arc<dyn ScalarVolume>,
    live: LabelVolume,
    region: DirtyRegion,
    segmentations: SegmentationStore,
    brush: Brush,
    smart_brush: SmartBrush,
    contours: ContourStore,
    segmenter: ContourSegmenter,
    interpolator: SliceInterpolator,
    surface: SurfaceHandoff,
    sink: Box<dyn DisplaySink>,
    log: Option<SessionLog>,
}

impl SegmentationEngine {
    pub fn new(volume: Arc<dyn ScalarVolume>, config: EngineConfig) -> Result<Self> {
        Self::with_services(volume, config, Services::default())
    }

    /// Build the engine and activate a first, empty segmentation.
    pub fn with_services(
        volume: Arc<dyn ScalarVolume>,
        config: EngineConfig,
        services: Services,
    ) -> Result<Self> {
        config.validate()?;
        let dims = volume.dimensions();
        if dims.is_empty() {
            return Err(Error::InvalidParameter(format!(
                "Volume has no voxels ({})",
                dims
            )));
        }
        if volume.scalars().len() != dims.voxel_count() {
            return Err(Error::DimensionMismatch {
                expected: dims.voxel_count(),
                actual: volume.scalars().len(),
            });
        }

        let segmenter = ContourSegmenter::new(
            services.triangulator,
            Arc::clone(&services.labeler),
            services.outliner,
        );
        let interpolator =
            SliceInterpolator::new(services.morpher, segmenter.clone(), config.interpolation)?;

        let mut engine = Self {
            live: LabelVolume::new(dims),
            region: DirtyRegion::new(),
            segmentations: SegmentationStore::new(
                config.series_name.clone(),
                config.max_segmentations,
            )?,
            brush: Brush::new(config.brush_radius, config.single_slice),
            smart_brush: SmartBrush::new(config.smart_brush.clone(), services.labeler),
            contours: ContourStore::new(),
            segmenter,
            interpolator,
            surface: SurfaceHandoff::new(services.extractor),
            sink: Box::new(NullSink),
            log: None,
            volume,
            config,
        };

        let first = engine.segmentations.add(None, &dims)?;
        engine
            .segmentations
            .activate(first, &mut engine.live, &mut engine.region)?;
        debug!(dims = %dims, "engine created");
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn volume(&self) -> &Arc<dyn ScalarVolume> {
        &self.volume
    }

    pub fn dimensions(&self) -> Dimensions {
        self.live.dims()
    }

    pub fn set_display_sink(&mut self, sink: Box<dyn DisplaySink>) {
        self.sink = sink;
    }

    /// Journal committed operations to `log` from now on.
    pub fn attach_log(&mut self, log: SessionLog) {
        log_line(Some(&log), format!("Attached to {} volume", self.live.dims()));
        self.log = Some(log);
    }

    pub fn detach_log(&mut self) -> Option<SessionLog> {
        self.log.take()
    }

    fn journal(&self, message: impl AsRef<str>) {
        log_line(self.log.as_ref(), message);
    }

    fn publish_labels(&mut self, bbox: &VoxelBox) {
        let bbox = bbox.clamped(&self.live.dims());
        if bbox.is_empty() {
            return;
        }
        let update = SubVolume::new(bbox, self.live.sub_labels(&bbox));
        self.sink.labels_updated(&update);
    }

    fn publish_preview(&mut self, bbox: &VoxelBox) {
        let bbox = bbox.clamped(&self.live.dims());
        if bbox.is_empty() {
            return;
        }
        let update = SubVolume::new(bbox, self.live.sub_preview(&bbox));
        self.sink.preview_updated(&update);
    }

    // Segmentations

    pub fn segmentation_count(&self) -> usize {
        self.segmentations.len()
    }

    pub fn current_segmentation(&self) -> Option<usize> {
        self.segmentations.current()
    }

    pub fn segmentations(&self) -> &SegmentationStore {
        &self.segmentations
    }

    pub fn rename_segmentation(&mut self, index: usize, name: &str) -> Result<()> {
        self.segmentations.rename(index, name)
    }

    /// Register a new empty segmentation without activating it.
    pub fn add_segmentation(&mut self, name: Option<&str>) -> Result<usize> {
        let index = self.segmentations.add(name, &self.live.dims())?;
        self.journal(format!("Added segmentation {}", index));
        Ok(index)
    }

    /// Swap the live buffers with segmentation `index`.
    pub fn activate(&mut self, index: usize) -> Result<()> {
        if self.segmentations.get(index).is_none() {
            return Err(Error::SegmentationNotFound(index));
        }
        let before = self.region.bbox();
        self.brush.leave(&mut self.live);
        self.segmentations
            .activate(index, &mut self.live, &mut self.region)?;
        self.contours.clear();
        self.smart_brush.end_stroke();

        let mut touched = before;
        touched.include_box(&self.region.bbox());
        self.publish_labels(&touched);
        self.publish_preview(&touched);
        self.journal(format!("Activated segmentation {}", index));
        Ok(())
    }

    /// Erase every label of the active segmentation and drop its contours.
    pub fn clear(&mut self) {
        let before = self.region.bbox();
        self.brush.leave(&mut self.live);
        self.live.clear();
        self.contours.clear();
        self.smart_brush.end_stroke();
        self.region.reset();
        self.publish_labels(&before);
        self.publish_preview(&before);
        self.journal("Cleared segmentation");
    }

    // Brush

    pub fn brush(&self) -> &Brush {
        &self.brush
    }

    pub fn set_brush_radius(&mut self, radius: u32) {
        self.brush.set_radius(radius);
    }

    pub fn set_single_slice(&mut self, single_slice: bool) {
        self.brush.set_single_slice(single_slice);
        self.smart_brush.params_mut().single_slice = single_slice;
    }

    /// Cursor update of the plain brush. Draw and erase modify labels,
    /// hover only changes the preview.
    pub fn brush_move(&mut self, center: Vector3<i32>, mode: BrushMode) -> Result<BrushFrame> {
        let label = self.segmentations.current_label()?;
        let frame = self
            .brush
            .stroke(center, mode, label, &mut self.live, &mut self.region);

        if let Some(restored) = frame.restored {
            self.publish_preview(&restored);
        }
        self.publish_preview(&frame.painted);
        if frame.changed > 0 {
            self.publish_labels(&frame.painted);
            self.journal(format!(
                "Brush {:?} at ({}, {}, {}): {} voxels",
                mode, center.x, center.y, center.z, frame.changed
            ));
        }
        Ok(frame)
    }

    /// Cursor left the viewport.
    pub fn brush_leave(&mut self) -> Option<VoxelBox> {
        let restored = self.brush.leave(&mut self.live)?;
        self.publish_preview(&restored);
        Some(restored)
    }

    // Smart brush

    pub fn smart_brush_params(&self) -> &SmartBrushParams {
        self.smart_brush.params()
    }

    pub fn set_smart_brush_params(&mut self, params: SmartBrushParams) {
        *self.smart_brush.params_mut() = params;
    }

    pub fn begin_stroke(&mut self) {
        self.smart_brush.begin_stroke();
    }

    pub fn end_stroke(&mut self) {
        self.smart_brush.end_stroke();
    }

    /// Grow a region around `center` and merge it into the active
    /// segmentation. Labeled voxels are never overwritten.
    pub fn smart_brush(&mut self, center: Vector3<i32>) -> Result<GrowOutcome> {
        let label = self.segmentations.current_label()?;
        let outcome = self.smart_brush.apply(
            self.volume.as_ref(),
            center,
            label,
            &mut self.live,
            &mut self.region,
        )?;
        if outcome.grown > 0 {
            self.publish_labels(&outcome.bbox);
            self.publish_preview(&outcome.bbox);
            self.journal(format!(
                "Smart brush at ({}, {}, {}): {} voxels, reference {:.3}",
                center.x, center.y, center.z, outcome.grown, outcome.reference
            ));
        }
        Ok(outcome)
    }

    // Contours

    pub fn contours(&self) -> &ContourStore {
        &self.contours
    }

    /// Segment the inside of a drawn polygon on one slice. The slice is
    /// written back only when segmentation succeeds.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_contour(
        &mut self,
        viewport: usize,
        axis: Axis,
        slice_index: usize,
        slice_index_viewport: usize,
        polygon: Vec<f32>,
        iso_value: f32,
        iso_value2: f32,
    ) -> Result<SliceCommit> {
        let contour = Contour::new(
            viewport,
            axis,
            slice_index,
            slice_index_viewport,
            polygon,
            iso_value,
            iso_value2,
        )?;
        let commit = self.segment_contour(contour)?;
        self.journal(format!(
            "Contour on viewport {} axis {} slice {}: {} voxels changed",
            viewport, axis, slice_index, commit.changed
        ));
        Ok(commit)
    }

    fn segment_contour(&mut self, mut contour: Contour) -> Result<SliceCommit> {
        let mut buffer =
            SliceBuffer::capture(self.volume.as_ref(), &self.live, contour.axis, contour.slice_index)?;
        let outline = self.segmenter.segment(&contour, &mut buffer)?;
        contour.outline = Some(outline);

        let commit = buffer.commit(&mut self.live);
        self.region.expand_box(&commit.bbox);
        self.publish_labels(&commit.bbox);
        self.contours.insert(contour);
        Ok(commit)
    }

    /// Morph between every pair of adjacent drawn slices of `viewport`.
    pub fn interpolate(&mut self, viewport: usize) -> Result<InterpolationReport> {
        let report = self.interpolator.interpolate(
            viewport,
            self.volume.as_ref(),
            &mut self.live,
            &mut self.region,
            &mut self.contours,
        )?;
        self.finish_report("Interpolated", viewport, &report);
        Ok(report)
    }

    /// Morph only between the lowest and highest drawn slice of `viewport`.
    pub fn interpolate_min_max(&mut self, viewport: usize) -> Result<InterpolationReport> {
        let report = self.interpolator.interpolate_min_max(
            viewport,
            self.volume.as_ref(),
            &mut self.live,
            &mut self.region,
            &mut self.contours,
        )?;
        self.finish_report("Interpolated (min/max)", viewport, &report);
        Ok(report)
    }

    fn finish_report(&mut self, what: &str, viewport: usize, report: &InterpolationReport) {
        for bbox in &report.updated {
            self.publish_labels(bbox);
        }
        for (slice, error) in &report.failed {
            warn!(viewport, slice, error = %error, "slice skipped");
        }
        self.journal(format!(
            "{} viewport {}: {} slices, {} failed",
            what,
            viewport,
            report.slices.len(),
            report.failed.len()
        ));
    }

    /// Re-run every stored contour with a new iso band. Contours that no
    /// longer yield an object keep their previous voxels.
    pub fn resegment_contours(&mut self, iso_value: f32, iso_value2: f32) -> Result<InterpolationReport> {
        let stored: Vec<Contour> = self.contours.iter().cloned().collect();
        let mut report = InterpolationReport::default();
        for mut contour in stored {
            contour.iso_value = iso_value;
            contour.iso_value2 = iso_value2;
            let slice = contour.slice_index;
            match self.segment_contour(contour) {
                Ok(commit) => {
                    report.slices.push(slice);
                    report.updated.push(commit.bbox);
                }
                Err(e) if e.is_recoverable() => report.failed.push((slice, e)),
                Err(e) => return Err(e),
            }
        }
        self.journal(format!(
            "Resegmented {} contours in [{}, {}], {} failed",
            report.slices.len(),
            iso_value,
            iso_value2,
            report.failed.len()
        ));
        Ok(report)
    }

    /// Turn every sentinel voxel into the active label and forget the drawn
    /// contours.
    pub fn commit_scene(&mut self) -> Result<usize> {
        let label = self.segmentations.current_label()?;
        let before = self.region.bbox();
        let promoted = self.live.promote(SENTINEL, label);
        self.contours.clear();
        self.region.recompute(self.live.labels(), &self.live.dims());
        if promoted > 0 {
            self.publish_labels(&before);
        }
        self.journal(format!("Committed scene: {} voxels", promoted));
        Ok(promoted)
    }

    // Dirty region and buffers

    pub fn dirty_region(&self) -> VoxelBox {
        self.region.bbox()
    }

    /// Tighten the dirty region to the labeled voxels.
    pub fn recompute_bounds(&mut self) -> VoxelBox {
        self.region.recompute(self.live.labels(), &self.live.dims());
        self.region.bbox()
    }

    pub fn labels(&self) -> &[Label] {
        self.live.labels()
    }

    pub fn active_mask(&self) -> &[u8] {
        self.live.active()
    }

    pub fn preview(&self) -> &[f32] {
        self.live.preview()
    }

    pub fn label_volume(&self) -> &LabelVolume {
        &self.live
    }

    // Surface

    /// Start surface extraction of the dirty region. `None` when the region
    /// is empty.
    pub fn request_extraction(&self) -> Result<Option<PendingSurface>> {
        let iso = self
            .config
            .surface_iso_value
            .unwrap_or_else(|| self.volume.data_range().0);
        let Some(request) = ExtractionRequest::package(
            self.volume.as_ref(),
            &self.live,
            &self.region.bbox(),
            iso,
            self.config.smoothing_iterations,
        ) else {
            return Ok(None);
        };
        debug!(region = %request.region, "surface extraction requested");
        self.surface.request(request).map(Some)
    }

    // Persistence

    pub fn save_segmentation<W: Write>(&self, writer: W) -> Result<()> {
        persist::save_raw(writer, &self.live)?;
        self.journal("Saved segmentation");
        Ok(())
    }

    /// Replace the active segmentation with a raw dump. Any non-zero byte
    /// becomes the active label.
    pub fn load_segmentation<R: Read>(&mut self, reader: R) -> Result<()> {
        let label = self.segmentations.current_label()?;
        let mut data = persist::load_raw(reader, &self.live.dims())?;
        for value in data.iter_mut() {
            if *value != UNLABELED {
                *value = label;
            }
        }
        let before = self.region.bbox();
        self.brush.leave(&mut self.live);
        self.live.replace_labels(&data)?;
        self.contours.clear();
        self.smart_brush.end_stroke();
        self.region.recompute(self.live.labels(), &self.live.dims());

        let mut touched = before;
        touched.include_box(&self.region.bbox());
        self.publish_labels(&touched);
        self.journal(format!("Loaded segmentation, box {}", self.region.bbox()));
        Ok(())
    }

    pub fn export_slices<W: Write + Seek>(&self, writer: W, axis: Axis) -> Result<W> {
        let writer = persist::export_slices_zip(writer, &self.live, axis)?;
        self.journal(format!("Exported slices along {}", axis));
        Ok(writer)
    }
}

fn log_line(log: Option<&SessionLog>, message: impl AsRef<str>) {
    if let Some(log) = log {
        if let Err(e) = log.log(message) {
            warn!(error = %e, "session log write failed");
        }
    }
}
