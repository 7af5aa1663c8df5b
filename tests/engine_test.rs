//! Integration tests for the segmentation engine
//!
//! Brush, smart brush, segmentation bank and dirty-region behavior through
//! the public engine API.

use nalgebra::Vector3;
use std::sync::Arc;
use voxseg::{
    BrushMode, DenseVolume, Dimensions, EngineConfig, Error, RecordingSink, SegmentationEngine,
    SmartBrushParams, FIRST_SEGMENT_LABEL,
};

fn engine_with(volume: DenseVolume, config: EngineConfig) -> SegmentationEngine {
    SegmentationEngine::new(Arc::new(volume), config).expect("Failed to create engine")
}

fn uniform_engine(dims: Dimensions, value: f32) -> SegmentationEngine {
    let volume = DenseVolume::filled(dims, value).expect("Failed to create volume");
    engine_with(volume, EngineConfig::default())
}

/// Unit brush on a 4x4x4 volume labels the center and its six face neighbours
#[test]
fn test_brush_unit_sphere() {
    let mut engine = uniform_engine(Dimensions::new(4, 4, 4), 100.0);
    engine.set_brush_radius(1);
    engine
        .brush_move(Vector3::new(2, 2, 2), BrushMode::Draw)
        .expect("Failed to paint");

    let dims = engine.dimensions();
    let mut labeled = 0;
    for k in 0..4 {
        for j in 0..4 {
            for i in 0..4 {
                let label = engine.labels()[dims.linear_index(i, j, k)];
                let d = (i as i32 - 2).abs() + (j as i32 - 2).abs() + (k as i32 - 2).abs();
                if d <= 1 {
                    assert_eq!(label, FIRST_SEGMENT_LABEL, "voxel ({}, {}, {})", i, j, k);
                    labeled += 1;
                } else {
                    assert_eq!(label, 0, "voxel ({}, {}, {})", i, j, k);
                }
            }
        }
    }
    assert_eq!(labeled, 7);
    println!("✓ Unit brush labeled {} voxels", labeled);
}

/// Painting twice with the same mode changes nothing the second time
#[test]
fn test_brush_idempotent() {
    let mut engine = uniform_engine(Dimensions::new(10, 10, 10), 1.0);
    let center = Vector3::new(4, 5, 6);
    engine.brush_move(center, BrushMode::Draw).unwrap();
    let once = engine.labels().to_vec();
    let frame = engine.brush_move(center, BrushMode::Draw).unwrap();
    assert_eq!(frame.changed, 0);
    assert_eq!(engine.labels(), &once[..]);
}

/// Hovering never changes labels or the dirty region
#[test]
fn test_hover_has_no_side_effect() {
    let mut engine = uniform_engine(Dimensions::new(10, 10, 10), 1.0);
    engine
        .brush_move(Vector3::new(5, 5, 5), BrushMode::Hover)
        .unwrap();
    engine
        .brush_move(Vector3::new(6, 5, 5), BrushMode::Hover)
        .unwrap();
    assert!(engine.labels().iter().all(|&l| l == 0));
    assert!(engine.dirty_region().is_empty());
    engine.brush_leave();
    assert!(engine.preview().iter().all(|&p| p == 0.0));
}

/// The cursor box is clamped at the volume border instead of rejected
#[test]
fn test_brush_clamped_at_border() {
    let mut engine = uniform_engine(Dimensions::new(6, 6, 6), 1.0);
    let frame = engine
        .brush_move(Vector3::new(0, 0, 0), BrushMode::Draw)
        .expect("Border edit should be clamped");
    assert_eq!(frame.painted.min, Vector3::new(0, 0, 0));
    assert!(frame.changed > 0);
}

/// Erase clears whatever is labeled inside the sphere
#[test]
fn test_erase_after_draw() {
    let mut engine = uniform_engine(Dimensions::new(12, 12, 12), 1.0);
    engine.set_brush_radius(3);
    engine
        .brush_move(Vector3::new(6, 6, 6), BrushMode::Draw)
        .unwrap();
    engine.set_brush_radius(1);
    engine
        .brush_move(Vector3::new(6, 6, 6), BrushMode::Erase)
        .unwrap();
    assert_eq!(engine.labels()[engine.dimensions().linear_index(6, 6, 6)], 0);
    assert_eq!(engine.labels()[engine.dimensions().linear_index(6, 6, 9)], FIRST_SEGMENT_LABEL);
}

/// With the default limit the fourth segmentation is refused
#[test]
fn test_segmentation_capacity() {
    let mut engine = uniform_engine(Dimensions::new(4, 4, 4), 1.0);
    assert_eq!(engine.segmentation_count(), 1);
    engine.add_segmentation(Some("liver")).expect("Failed to add");
    engine.add_segmentation(None).expect("Failed to add");

    let err = engine.add_segmentation(None).unwrap_err();
    assert!(matches!(err, Error::CapacityExceeded { limit: 3 }));
    assert!(err.is_recoverable());
    assert_eq!(engine.segmentation_count(), 3);
    assert_eq!(
        engine.segmentations().names().collect::<Vec<_>>(),
        vec!["Series 0", "liver", "Series 2"]
    );
}

/// Switching A -> B -> A restores A's labels and active mask byte for byte
#[test]
fn test_activation_round_trip() {
    let mut engine = uniform_engine(Dimensions::new(12, 12, 12), 1.0);
    let b = engine.add_segmentation(None).unwrap();
    engine
        .brush_move(Vector3::new(3, 3, 3), BrushMode::Draw)
        .unwrap();
    engine.brush_leave();
    let labels_a = engine.labels().to_vec();
    let active_a = engine.active_mask().to_vec();
    let box_a = engine.dirty_region();

    engine.activate(b).expect("Failed to activate B");
    assert!(engine.labels().iter().all(|&l| l == 0));
    engine
        .brush_move(Vector3::new(8, 8, 8), BrushMode::Draw)
        .unwrap();
    let labels_b = engine.labels().to_vec();
    assert!(labels_b.contains(&(FIRST_SEGMENT_LABEL + 1)));

    engine.activate(0).expect("Failed to activate A");
    assert_eq!(engine.labels(), &labels_a[..]);
    assert_eq!(engine.active_mask(), &active_a[..]);
    assert_eq!(engine.dirty_region(), box_a);

    engine.activate(b).unwrap();
    assert_eq!(engine.labels(), &labels_b[..]);
    assert!(matches!(engine.activate(7), Err(Error::SegmentationNotFound(7))));
    assert_eq!(engine.current_segmentation(), Some(b));
    println!("✓ Activation round trip restored segmentation A");
}

/// Smart brush on a uniform neighbourhood fills the whole sphere
#[test]
fn test_smart_brush_uniform_fills_sphere() {
    let dims = Dimensions::new(16, 16, 16);
    let volume = DenseVolume::from_fn(dims, |i, j, k| {
        if (i, j, k) == (15, 15, 15) {
            1000.0
        } else {
            100.0
        }
    })
    .unwrap();
    let mut config = EngineConfig::default();
    config.smart_brush = SmartBrushParams {
        radius: 2,
        threshold: 0.01,
        ..SmartBrushParams::default()
    };
    let mut engine = engine_with(volume, config);

    let outcome = engine
        .smart_brush(Vector3::new(5, 5, 5))
        .expect("Failed to apply smart brush");
    // 33 lattice points within distance 2
    assert_eq!(outcome.grown, 33);
    assert!(engine.active_mask().iter().all(|&m| m == 0));
    assert_eq!(
        engine.labels().iter().filter(|&&l| l == FIRST_SEGMENT_LABEL).count(),
        33
    );
}

/// Smart brush never removes or relabels existing labels
#[test]
fn test_smart_brush_merge_monotonic() {
    let dims = Dimensions::new(16, 16, 16);
    let volume = DenseVolume::from_fn(dims, |i, _, _| if i < 8 { 10.0 } else { 90.0 }).unwrap();
    let mut engine = engine_with(volume, EngineConfig::default());
    let other = engine.add_segmentation(None).unwrap();

    engine.activate(other).unwrap();
    engine.set_brush_radius(2);
    engine
        .brush_move(Vector3::new(6, 8, 8), BrushMode::Draw)
        .unwrap();
    engine.brush_leave();
    let before = engine.labels().to_vec();

    engine.begin_stroke();
    engine.smart_brush(Vector3::new(4, 8, 8)).unwrap();
    engine.smart_brush(Vector3::new(5, 8, 8)).unwrap();
    engine.end_stroke();

    for (n, (&old, &new)) in before.iter().zip(engine.labels()).enumerate() {
        if old != 0 {
            assert_eq!(old, new, "voxel {} was relabeled", n);
        }
    }
    // the bright half is outside the band
    assert_eq!(engine.labels()[dims.linear_index(10, 8, 8)], 0);
}

/// Independent smart-brush calls each center the band on their own seed
#[test]
fn test_smart_brush_calls_without_stroke() {
    let dims = Dimensions::new(30, 10, 10);
    let volume = DenseVolume::from_fn(dims, |i, _, _| if i < 15 { 100.0 } else { 200.0 }).unwrap();
    let mut config = EngineConfig::default();
    config.smart_brush = SmartBrushParams {
        radius: 2,
        threshold: 0.1,
        blur_strength: 0,
        ..SmartBrushParams::default()
    };
    let mut engine = engine_with(volume, config);

    let a = engine.smart_brush(Vector3::new(5, 5, 5)).expect("Failed to apply smart brush");
    let b = engine.smart_brush(Vector3::new(25, 5, 5)).expect("Failed to apply smart brush");
    assert_eq!(a.grown, 33);
    assert_eq!(b.reference, b.seed_value);
    assert!(b.grown > 0);

    // a stroke left open does not leak into another segmentation
    let other = engine.add_segmentation(None).unwrap();
    engine.begin_stroke();
    engine.smart_brush(Vector3::new(5, 5, 5)).unwrap();
    engine.activate(other).unwrap();
    let c = engine.smart_brush(Vector3::new(25, 5, 5)).unwrap();
    assert_eq!(c.reference, 200.0);
    assert_eq!(c.grown, 33);
    println!("✓ Smart brush grew {} and {} voxels", a.grown, b.grown);
}

/// The incrementally tracked box always contains the exact box
#[test]
fn test_dirty_box_contains_exact_box() {
    let mut engine = uniform_engine(Dimensions::new(20, 20, 20), 50.0);
    engine.set_brush_radius(2);
    engine.brush_move(Vector3::new(3, 4, 5), BrushMode::Draw).unwrap();
    engine.brush_move(Vector3::new(15, 12, 10), BrushMode::Draw).unwrap();
    engine.brush_move(Vector3::new(15, 12, 10), BrushMode::Erase).unwrap();
    engine.smart_brush(Vector3::new(10, 10, 10)).unwrap();

    let tracked = engine.dirty_region();
    let exact = engine.recompute_bounds();
    assert!(tracked.contains_box(&exact));
    assert_eq!(engine.dirty_region(), exact);

    // every label is one of the reserved or committed values
    assert!(engine.labels().iter().all(|&l| l == 0 || l == FIRST_SEGMENT_LABEL));
}

/// Display sink receives only sub-boxes, never the whole volume
#[test]
fn test_display_updates_are_local() {
    let mut engine = uniform_engine(Dimensions::new(30, 30, 30), 1.0);
    let sink = RecordingSink::new();
    engine.set_display_sink(Box::new(sink.clone()));
    engine.set_brush_radius(2);

    engine.brush_move(Vector3::new(10, 10, 10), BrushMode::Draw).unwrap();
    engine.brush_move(Vector3::new(11, 10, 10), BrushMode::Draw).unwrap();

    let previews = sink.preview_updates();
    // first move: painted box; second: restored box and painted box
    assert_eq!(previews.len(), 3);
    assert!(previews.iter().all(|p| p.region.voxel_count() == 125));
    assert_eq!(sink.label_updates().len(), 2);
}

/// Clearing resets labels, the mask and the dirty box
#[test]
fn test_clear() {
    let mut engine = uniform_engine(Dimensions::new(8, 8, 8), 1.0);
    engine.brush_move(Vector3::new(4, 4, 4), BrushMode::Draw).unwrap();
    engine.clear();
    assert!(engine.labels().iter().all(|&l| l == 0));
    assert!(engine.active_mask().iter().all(|&m| m == 0));
    assert!(engine.dirty_region().is_empty());
    assert!(engine.request_extraction().unwrap().is_none());
}
