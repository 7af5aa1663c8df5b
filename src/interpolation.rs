//! Slice interpolation: synthesize contours between drawn slices and
//! segment them, sequentially or on a worker pool

use crate::contour::{Contour, ContourSegmenter, ContourStore, SliceBuffer};
use crate::labels::LabelVolume;
use crate::morph::PolygonMorpher;
use crate::worker_pool::{Job, WorkerPool};
use crate::{DirtyRegion, Error, Result, ScalarVolume, VoxelBox};
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InterpolationMode {
    Sequential,
    Parallel { workers: usize },
}

/// Outcome of an interpolation run.
#[derive(Debug, Default)]
pub struct InterpolationReport {
    /// Volume slice indices that received a synthesized contour.
    pub slices: Vec<usize>,
    /// Slices whose synthesized contour could not be segmented.
    pub failed: Vec<(usize, Error)>,
    /// Boxes of changed voxels, one per committed slice.
    pub updated: Vec<VoxelBox>,
}

impl InterpolationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

type SegmentedSlice = Result<(Contour, SliceBuffer)>;

/// Morphs contour pairs and segments the intermediate slices.
pub struct SliceInterpolator {
    morpher: Arc<dyn PolygonMorpher>,
    segmenter: ContourSegmenter,
    mode: InterpolationMode,
    pool: Option<WorkerPool<SegmentedSlice>>,
}

impl SliceInterpolator {
    pub fn new(
        morpher: Arc<dyn PolygonMorpher>,
        segmenter: ContourSegmenter,
        mode: InterpolationMode,
    ) -> Result<Self> {
        let pool = match mode {
            InterpolationMode::Sequential => None,
            InterpolationMode::Parallel { workers } => Some(WorkerPool::new(workers)?),
        };
        Ok(Self {
            morpher,
            segmenter,
            mode,
            pool,
        })
    }

    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    /// Contours for every slice strictly between `from` and `to`.
    ///
    /// The viewport slice index mirrors the volume index when `from` was
    /// drawn on a viewport that counts slices the same way, and is reversed
    /// otherwise.
    pub fn synthesize(&self, from: &Contour, to: &Contour, depth: usize) -> Vec<Result<Contour>> {
        let (a, b) = if from.slice_index <= to.slice_index {
            (from, to)
        } else {
            (to, from)
        };
        let span = b.slice_index - a.slice_index;
        if span < 2 {
            return Vec::new();
        }
        let shape = self.morpher.interpolator(&a.polygon, &b.polygon);
        let same_direction = a.slice_index == a.slice_index_viewport;

        (1..span)
            .map(|step| {
                let t = step as f32 / span as f32;
                let slice = a.slice_index + step;
                let slice_viewport = if same_direction {
                    slice
                } else {
                    depth.saturating_sub(slice + 1)
                };
                Contour::new(
                    a.viewport,
                    a.axis,
                    slice,
                    slice_viewport,
                    shape(t),
                    a.iso_value + (b.iso_value - a.iso_value) * t,
                    a.iso_value2 + (b.iso_value2 - a.iso_value2) * t,
                )
            })
            .collect()
    }

    /// Fill every gap between adjacent drawn slices of `viewport`.
    pub fn interpolate(
        &mut self,
        viewport: usize,
        volume: &dyn ScalarVolume,
        live: &mut LabelVolume,
        region: &mut DirtyRegion,
        store: &mut ContourStore,
    ) -> Result<InterpolationReport> {
        let slices = store.slices(viewport);
        let pairs: Vec<(Contour, Contour)> = slices
            .windows(2)
            .filter(|w| w[1] > w[0] + 1)
            .filter_map(|w| Some((store.get(viewport, w[0])?.clone(), store.get(viewport, w[1])?.clone())))
            .collect();
        self.run_pairs(&pairs, volume, live, region, store)
    }

    /// Fill only between the lowest and the highest drawn slice.
    pub fn interpolate_min_max(
        &mut self,
        viewport: usize,
        volume: &dyn ScalarVolume,
        live: &mut LabelVolume,
        region: &mut DirtyRegion,
        store: &mut ContourStore,
    ) -> Result<InterpolationReport> {
        let slices = store.slices(viewport);
        let pairs = match (slices.first(), slices.last()) {
            (Some(&lo), Some(&hi)) if hi > lo + 1 => match (store.get(viewport, lo), store.get(viewport, hi)) {
                (Some(a), Some(b)) => vec![(a.clone(), b.clone())],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        self.run_pairs(&pairs, volume, live, region, store)
    }

    fn run_pairs(
        &mut self,
        pairs: &[(Contour, Contour)],
        volume: &dyn ScalarVolume,
        live: &mut LabelVolume,
        region: &mut DirtyRegion,
        store: &mut ContourStore,
    ) -> Result<InterpolationReport> {
        let mut report = InterpolationReport::default();
        let mut tasks: Vec<(Contour, SliceBuffer)> = Vec::new();

        for (a, b) in pairs {
            let (_, _, depth) = live.dims().projection_dims(a.axis);
            let first = a.slice_index.min(b.slice_index) + 1;
            for (step, synthesized) in self.synthesize(a, b, depth).into_iter().enumerate() {
                match synthesized {
                    Ok(contour) => {
                        let buffer = SliceBuffer::capture(volume, live, contour.axis, contour.slice_index)?;
                        tasks.push((contour, buffer));
                    }
                    Err(e) => {
                        warn!(error = %e, "skipping degenerate interpolated contour");
                        report.failed.push((first + step, e));
                    }
                }
            }
        }

        let slice_ids: Vec<usize> = tasks.iter().map(|(c, _)| c.slice_index).collect();
        let results = self.execute(tasks);

        for (slice, result) in slice_ids.into_iter().zip(results) {
            match result {
                Ok((contour, buffer)) => {
                    let commit = buffer.commit(live);
                    region.expand_box(&commit.bbox);
                    report.updated.push(commit.bbox);
                    report.slices.push(slice);
                    store.insert(contour);
                }
                Err(e) => {
                    debug!(slice, error = %e, "interpolated slice not segmented");
                    report.failed.push((slice, e));
                }
            }
        }

        Ok(report)
    }

    fn execute(&mut self, tasks: Vec<(Contour, SliceBuffer)>) -> Vec<SegmentedSlice> {
        match self.pool.as_mut() {
            None => tasks
                .into_iter()
                .map(|(contour, buffer)| segment_task(&self.segmenter, contour, buffer))
                .collect(),
            Some(pool) => {
                let jobs: Vec<Job<SegmentedSlice>> = tasks
                    .into_iter()
                    .map(|(contour, buffer)| {
                        let segmenter = self.segmenter.clone();
                        Box::new(move || segment_task(&segmenter, contour, buffer)) as Job<SegmentedSlice>
                    })
                    .collect();
                pool.run_all(jobs)
                    .into_iter()
                    .map(|r| r.and_then(|inner| inner))
                    .collect()
            }
        }
    }
}

fn segment_task(segmenter: &ContourSegmenter, mut contour: Contour, mut buffer: SliceBuffer) -> SegmentedSlice {
    let outline = segmenter.segment(&contour, &mut buffer)?;
    contour.outline = Some(outline);
    Ok((contour, buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::FloodFillLabeler;
    use crate::labels::SENTINEL;
    use crate::morph::{Interpolant, ResampleMorpher};
    use crate::slice::MarchingSquaresOutline;
    use crate::triangulate::EarClipTriangulator;
    use crate::{Axis, DenseVolume, Dimensions};

    fn interpolator(mode: InterpolationMode) -> SliceInterpolator {
        let segmenter = ContourSegmenter::new(
            Arc::new(EarClipTriangulator),
            Arc::new(FloodFillLabeler),
            Arc::new(MarchingSquaresOutline),
        );
        SliceInterpolator::new(Arc::new(ResampleMorpher::default()), segmenter, mode).unwrap()
    }

    fn square(x0: f32, y0: f32, size: f32) -> Vec<f32> {
        vec![x0, y0, x0 + size, y0, x0 + size, y0 + size, x0, y0 + size]
    }

    #[test]
    fn test_synthesize_indices() {
        let interp = interpolator(InterpolationMode::Sequential);
        let a = Contour::new(0, Axis::K, 2, 2, square(2.0, 2.0, 6.0), 0.0, 1.0).unwrap();
        let b = Contour::new(0, Axis::K, 6, 6, square(4.0, 4.0, 6.0), 0.0, 1.0).unwrap();
        let contours: Vec<_> = interp
            .synthesize(&a, &b, 10)
            .into_iter()
            .map(|c| c.unwrap())
            .collect();
        assert_eq!(contours.len(), 3);
        assert_eq!(contours[0].slice_index, 3);
        assert_eq!(contours[2].slice_index_viewport, 5);

        let a_rev = Contour::new(0, Axis::K, 2, 7, square(2.0, 2.0, 6.0), 0.0, 1.0).unwrap();
        let reversed = interp.synthesize(&a_rev, &b, 10);
        assert_eq!(reversed[0].as_ref().unwrap().slice_index_viewport, 10 - 3 - 1);

        let adjacent = Contour::new(0, Axis::K, 3, 3, square(2.0, 2.0, 6.0), 0.0, 1.0).unwrap();
        assert!(interp.synthesize(&a, &adjacent, 10).is_empty());
    }

    fn run(mode: InterpolationMode) -> (LabelVolume, ContourStore, InterpolationReport) {
        let dims = Dimensions::new(16, 16, 8);
        let volume = DenseVolume::filled(dims, 10.0).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut store = ContourStore::new();
        store.insert(Contour::new(0, Axis::K, 0, 0, square(2.0, 2.0, 8.0), 0.0, 20.0).unwrap());
        store.insert(Contour::new(0, Axis::K, 4, 4, square(2.0, 2.0, 8.0), 0.0, 20.0).unwrap());

        let mut interp = interpolator(mode);
        let report = interp
            .interpolate(0, &volume, &mut live, &mut region, &mut store)
            .unwrap();
        (live, store, report)
    }

    #[test]
    fn test_interpolate_fills_gap() {
        let (live, store, report) = run(InterpolationMode::Sequential);
        assert!(report.is_complete());
        assert_eq!(report.slices, vec![1, 2, 3]);
        assert_eq!(store.len(), 5);
        assert!(store.get(0, 2).unwrap().outline.is_some());
        for k in 1..4 {
            assert_eq!(live.get(5, 5, k), SENTINEL);
            assert_eq!(live.get(1, 1, k), 0);
        }
        // drawn slices are not rasterized by interpolation
        assert_eq!(live.get(5, 5, 0), 0);
    }

    /// Collapses the shape halfway between the two drawn slices.
    struct CollapsingMorpher;

    impl PolygonMorpher for CollapsingMorpher {
        fn interpolator(&self, from: &[f32], _to: &[f32]) -> Interpolant {
            let shape = from.to_vec();
            Box::new(move |t| if t == 0.5 { Vec::new() } else { shape.clone() })
        }
    }

    #[test]
    fn test_degenerate_step_reports_its_slice() {
        let dims = Dimensions::new(16, 16, 8);
        let volume = DenseVolume::filled(dims, 10.0).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut store = ContourStore::new();
        store.insert(Contour::new(0, Axis::K, 0, 0, square(2.0, 2.0, 8.0), 0.0, 20.0).unwrap());
        store.insert(Contour::new(0, Axis::K, 4, 4, square(2.0, 2.0, 8.0), 0.0, 20.0).unwrap());

        let segmenter = ContourSegmenter::new(
            Arc::new(EarClipTriangulator),
            Arc::new(FloodFillLabeler),
            Arc::new(MarchingSquaresOutline),
        );
        let mut interp =
            SliceInterpolator::new(Arc::new(CollapsingMorpher), segmenter, InterpolationMode::Sequential).unwrap();
        let report = interp
            .interpolate(0, &volume, &mut live, &mut region, &mut store)
            .unwrap();

        assert_eq!(report.slices, vec![1, 3]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, 2);
        assert!(matches!(report.failed[0].1, Error::DegenerateContour(_)));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (seq_live, _, seq_report) = run(InterpolationMode::Sequential);
        let (par_live, _, par_report) = run(InterpolationMode::Parallel { workers: 2 });
        assert_eq!(seq_report.slices, par_report.slices);
        assert_eq!(seq_live.labels(), par_live.labels());
    }
}
