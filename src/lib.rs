//! # voxseg
//!
//! Interactive segmentation of scalar volumes (CT/MR style image stacks)
//! into labeled voxel sets.
//!
//! ## Features
//!
//! - **Brush editing**: spherical draw/erase with a hover preview
//! - **Smart brush**: blur, threshold and seeded region growing that never
//!   overwrites existing labels
//! - **Slice contours**: polygon rasterization with iso-band filtering and
//!   main-object cleanup
//! - **Interpolation**: morphing between drawn slices, optionally on a
//!   worker pool
//! - **Surface handoff**: packaging the dirty region for mesh extraction on
//!   a background thread
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voxseg::{BrushMode, DenseVolume, Dimensions, EngineConfig, SegmentationEngine};
//! use nalgebra::Vector3;
//!
//! let volume = DenseVolume::filled(Dimensions::new(64, 64, 32), 100.0)?;
//! let mut engine = SegmentationEngine::new(Arc::new(volume), EngineConfig::default())?;
//!
//! engine.brush_move(Vector3::new(32, 32, 16), BrushMode::Draw)?;
//! engine.smart_brush(Vector3::new(20, 20, 16))?;
//!
//! if let Some(pending) = engine.request_extraction()? {
//!     let mesh = pending.wait()?;
//!     println!("{} triangles", mesh.triangle_count());
//! }
//! # Ok::<(), voxseg::Error>(())
//! ```

pub mod addressing;
pub mod bounds;
pub mod brush;
pub mod components;
pub mod config;
pub mod contour;
pub mod display;
pub mod engine;
pub mod error;
pub mod interpolation;
pub mod labels;
pub mod log;
pub mod morph;
pub mod persist;
pub mod slice;
pub mod smart_brush;
pub mod surface;
pub mod triangulate;
pub mod types;
pub mod utils;
pub mod volume;
pub mod worker_pool;

/// Convenience imports for driving an engine.
pub mod prelude {
    pub use crate::{
        Axis, BrushMode, DenseVolume, Dimensions, EngineConfig, ScalarVolume, SegmentationEngine,
        VoxelBox,
    };
}

// Re-exports
pub use addressing::{box_linear_index, Dimensions};
pub use bounds::DirtyRegion;
pub use brush::{Brush, BrushFrame, BrushMode};
pub use components::{ComponentLabeler, FloodFillLabeler, Labeling, MaskOp};
pub use config::EngineConfig;
pub use contour::{Contour, ContourSegmenter, ContourStore, SliceBuffer, SliceCommit};
pub use display::{DisplaySink, NullSink, RecordingSink, SubVolume};
pub use engine::{SegmentationEngine, Services};
pub use error::{Error, Result};
pub use interpolation::{InterpolationMode, InterpolationReport, SliceInterpolator};
pub use labels::{
    segment_label, Label, LabelVolume, Segmentation, SegmentationStore, FIRST_SEGMENT_LABEL,
    MAX_SEGMENTATIONS, SENTINEL, UNLABELED,
};
pub use log::SessionLog;
pub use morph::{Interpolant, PolygonMorpher, ResampleMorpher};
pub use slice::{MarchingSquaresOutline, OutlineExtractor, PolyContour, PolySlice, Winding};
pub use smart_brush::{
    blur_box, BlurExecution, BlurKernel, GrowOutcome, SmartBrush, SmartBrushParams,
};
pub use surface::{
    ExtractionRequest, PendingSurface, SurfaceExtractor, SurfaceHandoff, SurfaceMesh,
    VoxelFaceExtractor,
};
pub use triangulate::{point_in_triangle, EarClipTriangulator, TriangleHitCache, Triangulator};
pub use types::{Axis, SliceRect, VoxelBox};
pub use utils::{TempFolder, Utils};
pub use volume::{DenseVolume, ScalarVolume};
pub use worker_pool::{Job, WorkerPool};
