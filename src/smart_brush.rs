//! Smart brush: local blur, intensity-band threshold and seeded region
//! growing inside the brush sphere

use crate::components::{ComponentLabeler, MaskOp};
use crate::labels::{Label, LabelVolume};
use crate::{DirtyRegion, Result, ScalarVolume, VoxelBox};
use nalgebra::Vector3;
use rayon::prelude::*;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smoothing kernel of the blur pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlurKernel {
    /// In-plane 3x3: center 4, edge 2, corner 1, over 16.
    Planar,
    /// Center 4, six face neighbors 2, twelve edge neighbors 1, over 28.
    Volumetric,
}

struct Tap {
    offset: (i32, i32, i32),
    weight: f32,
}

const fn tap(x: i32, y: i32, z: i32, weight: f32) -> Tap {
    Tap {
        offset: (x, y, z),
        weight,
    }
}

const PLANAR_TAPS: [Tap; 9] = [
    tap(-1, -1, 0, 1.0),
    tap(0, -1, 0, 2.0),
    tap(1, -1, 0, 1.0),
    tap(-1, 0, 0, 2.0),
    tap(0, 0, 0, 4.0),
    tap(1, 0, 0, 2.0),
    tap(-1, 1, 0, 1.0),
    tap(0, 1, 0, 2.0),
    tap(1, 1, 0, 1.0),
];

const VOLUMETRIC_TAPS: [Tap; 19] = [
    tap(0, 0, 0, 4.0),
    tap(-1, 0, 0, 2.0),
    tap(1, 0, 0, 2.0),
    tap(0, -1, 0, 2.0),
    tap(0, 1, 0, 2.0),
    tap(0, 0, -1, 2.0),
    tap(0, 0, 1, 2.0),
    tap(-1, -1, 0, 1.0),
    tap(1, -1, 0, 1.0),
    tap(-1, 1, 0, 1.0),
    tap(1, 1, 0, 1.0),
    tap(-1, 0, -1, 1.0),
    tap(1, 0, -1, 1.0),
    tap(-1, 0, 1, 1.0),
    tap(1, 0, 1, 1.0),
    tap(0, -1, -1, 1.0),
    tap(0, 1, -1, 1.0),
    tap(0, -1, 1, 1.0),
    tap(0, 1, 1, 1.0),
];

impl BlurKernel {
    fn taps(self) -> &'static [Tap] {
        match self {
            BlurKernel::Planar => &PLANAR_TAPS,
            BlurKernel::Volumetric => &VOLUMETRIC_TAPS,
        }
    }

    fn divisor(self) -> f32 {
        self.taps().iter().map(|t| t.weight).sum()
    }
}

/// How blur passes are executed. Both strategies produce identical values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BlurExecution {
    Sequential,
    /// Split the `i` extent into `slabs` disjoint ranges per pass.
    Parallel { slabs: usize },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SmartBrushParams {
    pub radius: u32,
    pub single_slice: bool,
    /// Band half-width as a fraction of the volume's data range.
    pub threshold: f32,
    /// Number of blur passes; `0` thresholds raw intensities.
    pub blur_strength: u32,
    pub kernel: BlurKernel,
    pub execution: BlurExecution,
    /// Raw intensity window a voxel must also fall into.
    pub window: Option<(f32, f32)>,
    /// Morphology applied to the threshold mask before the seeded component
    /// is extracted.
    pub cleanup: Vec<MaskOp>,
}

impl Default for SmartBrushParams {
    fn default() -> Self {
        Self {
            radius: 5,
            single_slice: false,
            threshold: 0.05,
            blur_strength: 1,
            kernel: BlurKernel::Volumetric,
            execution: BlurExecution::Sequential,
            window: None,
            cleanup: Vec::new(),
        }
    }
}

/// What one smart-brush application did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowOutcome {
    /// Working box, folded into the dirty region.
    pub bbox: VoxelBox,
    /// Blurred intensity at the seed.
    pub seed_value: f32,
    /// Reference value the band was centered on.
    pub reference: f32,
    /// Voxels newly labeled.
    pub grown: usize,
}

/// Blurred values of `bbox`, box-local and `i` fastest.
///
/// The first pass reads the volume; later passes ping-pong between two
/// buffers. Neighbors outside the box are clamped to its faces.
pub fn blur_box(
    volume: &dyn ScalarVolume,
    bbox: &VoxelBox,
    kernel: BlurKernel,
    passes: u32,
    execution: BlurExecution,
) -> Vec<f32> {
    let dims = volume.dimensions();
    let scalars = volume.scalars();
    let mut src: Vec<f32> = bbox
        .iter()
        .map(|(i, j, k)| scalars[dims.linear_index(i as usize, j as usize, k as usize)])
        .collect();
    if passes == 0 || src.is_empty() {
        return src;
    }

    let size = bbox.size();
    let mut dst = vec![0.0f32; src.len()];
    for _ in 0..passes {
        match execution {
            BlurExecution::Sequential => {
                let values = blur_slab(&src, size, kernel, 0..size.x);
                scatter(&mut dst, size, 0..size.x, &values);
            }
            BlurExecution::Parallel { slabs } => {
                let ranges = slab_ranges(size.x, slabs);
                let results: Vec<(Range<usize>, Vec<f32>)> = ranges
                    .into_par_iter()
                    .map(|range| {
                        let values = blur_slab(&src, size, kernel, range.clone());
                        (range, values)
                    })
                    .collect();
                for (range, values) in results {
                    scatter(&mut dst, size, range, &values);
                }
            }
        }
        std::mem::swap(&mut src, &mut dst);
    }
    src
}

/// Partition `0..extent` into at most `slabs` contiguous ranges; the last
/// range takes the remainder.
fn slab_ranges(extent: usize, slabs: usize) -> Vec<Range<usize>> {
    let slabs = slabs.clamp(1, extent.max(1));
    let segment = extent / slabs;
    (0..slabs)
        .map(|s| {
            let start = s * segment;
            let end = if s + 1 == slabs { extent } else { start + segment };
            start..end
        })
        .collect()
}

/// Blur of the cells with `x` in `range`, ordered `x` fastest within the
/// slab.
fn blur_slab(src: &[f32], size: Vector3<usize>, kernel: BlurKernel, range: Range<usize>) -> Vec<f32> {
    let taps = kernel.taps();
    let divisor = kernel.divisor();
    let clamp = |v: i64, n: usize| v.clamp(0, n as i64 - 1) as usize;
    let mut out = Vec::with_capacity(range.len() * size.y * size.z);
    for z in 0..size.z {
        for y in 0..size.y {
            for x in range.clone() {
                let mut acc = 0.0f32;
                for t in taps {
                    let nx = clamp(x as i64 + t.offset.0 as i64, size.x);
                    let ny = clamp(y as i64 + t.offset.1 as i64, size.y);
                    let nz = clamp(z as i64 + t.offset.2 as i64, size.z);
                    acc += src[nx + ny * size.x + nz * size.x * size.y] * t.weight;
                }
                out.push(acc / divisor);
            }
        }
    }
    out
}

fn scatter(dst: &mut [f32], size: Vector3<usize>, range: Range<usize>, values: &[f32]) {
    let width = range.len();
    for z in 0..size.z {
        for y in 0..size.y {
            let row = (z * size.y + y) * width;
            let base = y * size.x + z * size.x * size.y;
            dst[base + range.start..base + range.end].copy_from_slice(&values[row..row + width]);
        }
    }
}

/// Region grower with a reference value that sticks for a whole stroke.
pub struct SmartBrush {
    params: SmartBrushParams,
    labeler: Arc<dyn ComponentLabeler>,
    stroke_reference: Option<f32>,
    in_stroke: bool,
}

impl SmartBrush {
    pub fn new(params: SmartBrushParams, labeler: Arc<dyn ComponentLabeler>) -> Self {
        Self {
            params,
            labeler,
            stroke_reference: None,
            in_stroke: false,
        }
    }

    pub fn params(&self) -> &SmartBrushParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut SmartBrushParams {
        &mut self.params
    }

    /// Calls until [`SmartBrush::end_stroke`] share one band reference.
    pub fn begin_stroke(&mut self) {
        self.stroke_reference = None;
        self.in_stroke = true;
    }

    pub fn end_stroke(&mut self) {
        self.stroke_reference = None;
        self.in_stroke = false;
    }

    pub fn in_stroke(&self) -> bool {
        self.in_stroke
    }

    pub fn stroke_reference(&self) -> Option<f32> {
        self.stroke_reference
    }

    /// Grow from `center` and merge the result as `label`.
    pub fn apply(
        &mut self,
        volume: &dyn ScalarVolume,
        center: Vector3<i32>,
        label: Label,
        live: &mut LabelVolume,
        region: &mut DirtyRegion,
    ) -> Result<GrowOutcome> {
        let dims = live.dims();
        let radius = self.params.radius.min(i32::MAX as u32) as i32;
        let bbox = VoxelBox::around(center, radius, self.params.single_slice).clamped(&dims);

        if !dims.contains(center.x, center.y, center.z) || bbox.is_empty() {
            return Ok(GrowOutcome {
                bbox: VoxelBox::empty(),
                seed_value: 0.0,
                reference: 0.0,
                grown: 0,
            });
        }

        let blurred = blur_box(
            volume,
            &bbox,
            self.params.kernel,
            self.params.blur_strength,
            self.params.execution,
        );
        let seed_local = bbox.local_index(center.x, center.y, center.z);
        let seed_value = blurred[seed_local];

        let (lo, hi) = volume.data_range();
        let band = (hi - lo) * self.params.threshold.max(0.0);

        // outside a stroke every call is centered on its own seed
        let reference = match self.stroke_reference {
            Some(reference) if self.in_stroke && (seed_value - reference).abs() > band => reference,
            _ => seed_value,
        };
        if self.in_stroke {
            self.stroke_reference = Some(reference);
        }

        let size = bbox.size();
        let scalars = volume.scalars();
        let mut mask = vec![0u8; blurred.len()];
        for (n, (i, j, k)) in bbox.iter().enumerate() {
            let d = Vector3::new(i, j, k).cast::<f64>() - center.cast::<f64>();
            if d.norm() > radius as f64 {
                continue;
            }
            if (blurred[n] - reference).abs() > band {
                continue;
            }
            if let Some((tmin, tmax)) = self.params.window {
                let raw = scalars[dims.linear_index(i as usize, j as usize, k as usize)];
                if raw < tmin || raw > tmax {
                    continue;
                }
            }
            mask[n] = 1;
        }

        for op in &self.params.cleanup {
            mask = op.apply(&mask, size);
        }

        live.clear_active(&bbox);

        let labeling = self.labeler.label(&mask, size);
        let (sx, sy) = (size.x, size.y);
        let seed = (seed_local % sx, (seed_local / sx) % sy, seed_local / (sx * sy));
        let Some(component) = labeling.component_at(seed.0, seed.1, seed.2) else {
            debug!(center = ?center, seed_value, reference, "seed outside band, nothing grown");
            return Ok(GrowOutcome {
                bbox,
                seed_value,
                reference,
                grown: 0,
            });
        };

        {
            let active = live.active_mut();
            for (n, (i, j, k)) in bbox.iter().enumerate() {
                if labeling.ids()[n] == component {
                    active[dims.linear_index(i as usize, j as usize, k as usize)] = 1;
                }
            }
        }

        let grown = live.merge_active(&bbox, label);
        region.expand_box(&bbox);

        debug!(
            center = ?center,
            seed_value,
            reference,
            component = labeling.size(component),
            grown,
            "smart brush applied"
        );

        Ok(GrowOutcome {
            bbox,
            seed_value,
            reference,
            grown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::FloodFillLabeler;
    use crate::{DenseVolume, Dimensions};

    fn brush(params: SmartBrushParams) -> SmartBrush {
        SmartBrush::new(params, Arc::new(FloodFillLabeler))
    }

    #[test]
    fn test_kernel_divisors() {
        assert_eq!(BlurKernel::Planar.divisor(), 16.0);
        assert_eq!(BlurKernel::Volumetric.divisor(), 28.0);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let dims = Dimensions::new(8, 8, 8);
        let volume = DenseVolume::filled(dims, 7.0).unwrap();
        let bbox = VoxelBox::new(Vector3::new(1, 1, 1), Vector3::new(6, 6, 6));
        for kernel in [BlurKernel::Planar, BlurKernel::Volumetric] {
            let values = blur_box(&volume, &bbox, kernel, 3, BlurExecution::Sequential);
            assert_eq!(values.len(), 216);
            assert!(values.iter().all(|v| (v - 7.0).abs() < 1e-5));
        }
    }

    #[test]
    fn test_parallel_blur_matches_sequential() {
        let dims = Dimensions::new(12, 10, 9);
        let volume = DenseVolume::from_fn(dims, |i, j, k| ((i * 7 + j * 3 + k * 11) % 17) as f32).unwrap();
        let bbox = VoxelBox::new(Vector3::new(0, 1, 2), Vector3::new(11, 8, 7));
        let seq = blur_box(&volume, &bbox, BlurKernel::Volumetric, 4, BlurExecution::Sequential);
        for slabs in [1, 3, 5, 64] {
            let par = blur_box(&volume, &bbox, BlurKernel::Volumetric, 4, BlurExecution::Parallel { slabs });
            assert_eq!(seq, par);
        }
    }

    #[test]
    fn test_zero_strength_is_raw() {
        let dims = Dimensions::new(4, 4, 4);
        let volume = DenseVolume::from_fn(dims, |i, j, k| (i + j + k) as f32).unwrap();
        let bbox = VoxelBox::new(Vector3::zeros(), Vector3::new(3, 3, 3));
        let raw = blur_box(&volume, &bbox, BlurKernel::Planar, 0, BlurExecution::Sequential);
        assert_eq!(raw, volume.scalars());
    }

    #[test]
    fn test_slab_ranges() {
        assert_eq!(slab_ranges(10, 3), vec![0..3, 3..6, 6..10]);
        assert_eq!(slab_ranges(2, 8), vec![0..1, 1..2]);
        assert_eq!(slab_ranges(5, 0), vec![0..5]);
    }

    #[test]
    fn test_uniform_volume_fills_sphere() {
        let dims = Dimensions::new(20, 20, 20);
        let volume = DenseVolume::filled(dims, 100.0).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut sb = brush(SmartBrushParams {
            radius: 2,
            blur_strength: 2,
            ..SmartBrushParams::default()
        });

        let outcome = sb
            .apply(&volume, Vector3::new(10, 10, 10), 2, &mut live, &mut region)
            .unwrap();
        assert_eq!(outcome.grown, 33);
        assert_eq!(live.count(2), 33);
        assert_eq!(region.bbox(), outcome.bbox);
        assert!(live.active().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_grows_only_connected_band() {
        // bright slab i < 10, dark elsewhere
        let dims = Dimensions::new(20, 20, 20);
        let volume = DenseVolume::from_fn(dims, |i, _, _| if i < 10 { 1000.0 } else { 0.0 }).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut sb = brush(SmartBrushParams {
            radius: 4,
            blur_strength: 0,
            threshold: 0.1,
            ..SmartBrushParams::default()
        });
        let outcome = sb
            .apply(&volume, Vector3::new(8, 10, 10), 3, &mut live, &mut region)
            .unwrap();
        assert!(outcome.grown > 0);
        assert_eq!(live.get(9, 10, 10), 3);
        assert_eq!(live.get(10, 10, 10), 0);
        assert_eq!(live.get(4, 10, 10), 3);
    }

    #[test]
    fn test_merge_never_overwrites() {
        let dims = Dimensions::new(10, 10, 10);
        let volume = DenseVolume::filled(dims, 5.0).unwrap();
        let mut live = LabelVolume::new(dims);
        live.set(5, 5, 5, 4);
        live.set(6, 5, 5, 4);
        let mut region = DirtyRegion::new();
        let mut sb = brush(SmartBrushParams {
            radius: 2,
            ..SmartBrushParams::default()
        });
        let outcome = sb
            .apply(&volume, Vector3::new(5, 5, 5), 2, &mut live, &mut region)
            .unwrap();
        assert_eq!(outcome.grown, 31);
        assert_eq!(live.get(5, 5, 5), 4);
        assert_eq!(live.get(6, 5, 5), 4);
    }

    #[test]
    fn test_sticky_reference_and_window() {
        let dims = Dimensions::new(30, 10, 10);
        let volume = DenseVolume::from_fn(dims, |i, _, _| if i < 15 { 100.0 } else { 200.0 }).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut sb = brush(SmartBrushParams {
            radius: 2,
            blur_strength: 0,
            threshold: 0.1,
            ..SmartBrushParams::default()
        });

        sb.begin_stroke();
        sb.apply(&volume, Vector3::new(5, 5, 5), 2, &mut live, &mut region).unwrap();
        assert_eq!(sb.stroke_reference(), Some(100.0));
        // seed on the other side is out of band for the stroke reference
        let outcome = sb
            .apply(&volume, Vector3::new(25, 5, 5), 2, &mut live, &mut region)
            .unwrap();
        assert_eq!(outcome.reference, 100.0);
        assert_eq!(outcome.grown, 0);
        sb.end_stroke();
        assert_eq!(sb.stroke_reference(), None);

        sb.params_mut().window = Some((150.0, 160.0));
        let outcome = sb
            .apply(&volume, Vector3::new(25, 5, 5), 2, &mut live, &mut region)
            .unwrap();
        assert_eq!(outcome.grown, 0);
        assert_eq!(live.get(25, 5, 5), 0);
    }

    #[test]
    fn test_reference_follows_seed_outside_stroke() {
        let dims = Dimensions::new(30, 10, 10);
        let volume = DenseVolume::from_fn(dims, |i, _, _| if i < 15 { 100.0 } else { 200.0 }).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut sb = brush(SmartBrushParams {
            radius: 2,
            blur_strength: 0,
            threshold: 0.1,
            ..SmartBrushParams::default()
        });

        let first = sb.apply(&volume, Vector3::new(5, 5, 5), 2, &mut live, &mut region).unwrap();
        let second = sb.apply(&volume, Vector3::new(25, 5, 5), 2, &mut live, &mut region).unwrap();
        assert_eq!(first.grown, 33);
        assert_eq!(second.reference, 200.0);
        assert_eq!(second.grown, 33);
        assert!(!sb.in_stroke());
        assert_eq!(sb.stroke_reference(), None);
    }

    #[test]
    fn test_outside_volume_is_noop() {
        let dims = Dimensions::new(4, 4, 4);
        let volume = DenseVolume::filled(dims, 1.0).unwrap();
        let mut live = LabelVolume::new(dims);
        let mut region = DirtyRegion::new();
        let mut sb = brush(SmartBrushParams::default());
        let outcome = sb
            .apply(&volume, Vector3::new(-3, 1, 1), 2, &mut live, &mut region)
            .unwrap();
        assert_eq!(outcome.grown, 0);
        assert!(region.is_empty());
    }
}
