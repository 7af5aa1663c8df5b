//! Surface extraction handoff: package the dirty sub-volume and build a
//! mesh off the engine thread

use crate::labels::LabelVolume;
use crate::{Error, Result, ScalarVolume, VoxelBox};
use nalgebra::Vector3;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Everything the surface stage needs, copied out of the engine.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Region in volume coordinates, already padded and clamped.
    pub region: VoxelBox,
    pub spacing: Vector3<f32>,
    /// Intensities of the region, zeroed where unlabeled, `i` fastest.
    pub intensities: Vec<f32>,
    pub labels: Vec<u8>,
    pub iso_value: f32,
    pub smoothing_iterations: u32,
}

impl ExtractionRequest {
    /// Copy the dirty region grown by one voxel. `None` for an empty
    /// region.
    pub fn package(
        volume: &dyn ScalarVolume,
        live: &LabelVolume,
        dirty: &VoxelBox,
        iso_value: f32,
        smoothing_iterations: u32,
    ) -> Option<Self> {
        let dims = live.dims();
        let region = dirty.padded(1).clamped(&dims);
        if region.is_empty() {
            return None;
        }
        let scalars = volume.scalars();
        let labels = live.sub_labels(&region);
        let intensities = region
            .iter()
            .zip(&labels)
            .map(|((i, j, k), &label)| {
                if label == 0 {
                    0.0
                } else {
                    scalars[dims.linear_index(i as usize, j as usize, k as usize)]
                }
            })
            .collect();
        Some(Self {
            region,
            spacing: volume.spacing(),
            intensities,
            labels,
            iso_value,
            smoothing_iterations,
        })
    }

    pub fn size(&self) -> Vector3<usize> {
        self.region.size()
    }
}

/// Triangle mesh with per-vertex greyscale colors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceMesh {
    pub vertices: Vec<Vector3<f32>>,
    pub colors: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

impl SurfaceMesh {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Surface extraction stage.
pub trait SurfaceExtractor: Send + Sync {
    fn extract(&self, request: &ExtractionRequest) -> Result<SurfaceMesh>;
}

/// Boundary faces between solid and empty voxels, smoothed.
///
/// A voxel is solid when labeled and its intensity reaches the iso value.
#[derive(Debug, Clone, Copy)]
pub struct VoxelFaceExtractor {
    /// Laplacian step per smoothing iteration.
    pub relaxation: f32,
}

impl Default for VoxelFaceExtractor {
    fn default() -> Self {
        Self { relaxation: 0.5 }
    }
}

// Corner offsets per face, counter-clockwise seen from outside.
const FACES: [((i32, i32, i32), [(i32, i32, i32); 4]); 6] = [
    ((1, 0, 0), [(1, 0, 0), (1, 1, 0), (1, 1, 1), (1, 0, 1)]),
    ((-1, 0, 0), [(0, 0, 0), (0, 0, 1), (0, 1, 1), (0, 1, 0)]),
    ((0, 1, 0), [(0, 1, 0), (0, 1, 1), (1, 1, 1), (1, 1, 0)]),
    ((0, -1, 0), [(0, 0, 0), (1, 0, 0), (1, 0, 1), (0, 0, 1)]),
    ((0, 0, 1), [(0, 0, 1), (1, 0, 1), (1, 1, 1), (0, 1, 1)]),
    ((0, 0, -1), [(0, 0, 0), (0, 1, 0), (1, 1, 0), (1, 0, 0)]),
];

impl VoxelFaceExtractor {
    fn smooth(&self, mesh: &mut SurfaceMesh, iterations: u32) {
        if iterations == 0 || mesh.vertices.is_empty() {
            return;
        }
        let mut neighbors: Vec<Vec<u32>> = vec![Vec::new(); mesh.vertices.len()];
        for tri in mesh.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                if !neighbors[a as usize].contains(&b) {
                    neighbors[a as usize].push(b);
                }
                if !neighbors[b as usize].contains(&a) {
                    neighbors[b as usize].push(a);
                }
            }
        }
        for _ in 0..iterations {
            let current = mesh.vertices.clone();
            for (v, adjacent) in mesh.vertices.iter_mut().zip(&neighbors) {
                if adjacent.is_empty() {
                    continue;
                }
                let centroid = adjacent
                    .iter()
                    .fold(Vector3::zeros(), |acc, &n| acc + current[n as usize])
                    / adjacent.len() as f32;
                *v += (centroid - *v) * self.relaxation;
            }
        }
    }
}

impl SurfaceExtractor for VoxelFaceExtractor {
    fn extract(&self, request: &ExtractionRequest) -> Result<SurfaceMesh> {
        let size = request.size();
        let count = size.x * size.y * size.z;
        if request.labels.len() != count || request.intensities.len() != count {
            return Err(Error::DimensionMismatch {
                expected: count,
                actual: request.labels.len().min(request.intensities.len()),
            });
        }

        let solid = |x: i32, y: i32, z: i32| -> bool {
            if x < 0 || y < 0 || z < 0 {
                return false;
            }
            let (x, y, z) = (x as usize, y as usize, z as usize);
            if x >= size.x || y >= size.y || z >= size.z {
                return false;
            }
            let n = x + y * size.x + z * size.x * size.y;
            request.labels[n] != 0 && request.intensities[n] >= request.iso_value
        };

        let (lo, hi) = request
            .intensities
            .iter()
            .zip(&request.labels)
            .filter(|(_, &l)| l != 0)
            .fold((f32::MAX, f32::MIN), |(lo, hi), (&v, _)| (lo.min(v), hi.max(v)));
        let grey = |v: f32| -> f32 {
            if hi > lo {
                ((v - lo) / (hi - lo)).clamp(0.0, 1.0)
            } else {
                1.0
            }
        };

        let origin = request.region.min;
        let mut mesh = SurfaceMesh::default();
        let mut corners: HashMap<(i32, i32, i32), u32> = HashMap::new();

        for z in 0..size.z as i32 {
            for y in 0..size.y as i32 {
                for x in 0..size.x as i32 {
                    if !solid(x, y, z) {
                        continue;
                    }
                    let value = request.intensities[x as usize + y as usize * size.x + z as usize * size.x * size.y];
                    for (dir, quad) in FACES {
                        if solid(x + dir.0, y + dir.1, z + dir.2) {
                            continue;
                        }
                        let mut ids = [0u32; 4];
                        for (slot, c) in quad.iter().enumerate() {
                            let key = (x + c.0, y + c.1, z + c.2);
                            ids[slot] = *corners.entry(key).or_insert_with(|| {
                                let p = Vector3::new(
                                    (origin.x + key.0) as f32 - 0.5,
                                    (origin.y + key.1) as f32 - 0.5,
                                    (origin.z + key.2) as f32 - 0.5,
                                )
                                .component_mul(&request.spacing);
                                mesh.vertices.push(p);
                                let g = grey(value);
                                mesh.colors.push([g, g, g]);
                                (mesh.vertices.len() - 1) as u32
                            });
                        }
                        mesh.indices
                            .extend_from_slice(&[ids[0], ids[1], ids[2], ids[0], ids[2], ids[3]]);
                    }
                }
            }
        }

        self.smooth(&mut mesh, request.smoothing_iterations);
        debug!(
            vertices = mesh.vertices.len(),
            triangles = mesh.triangle_count(),
            "surface extracted"
        );
        Ok(mesh)
    }
}

/// Result of an extraction still running on its own thread.
pub struct PendingSurface {
    region: VoxelBox,
    receiver: Receiver<Result<SurfaceMesh>>,
    handle: Option<JoinHandle<()>>,
}

impl PendingSurface {
    pub fn region(&self) -> VoxelBox {
        self.region
    }

    /// Non-blocking poll. `None` while the stage is still running.
    pub fn try_take(&mut self) -> Option<Result<SurfaceMesh>> {
        match self.receiver.try_recv() {
            Ok(result) => {
                self.join();
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(Error::WorkerFailed(
                    "surface extraction thread exited without a result".to_string(),
                )))
            }
        }
    }

    /// Block until the mesh arrives.
    pub fn wait(mut self) -> Result<SurfaceMesh> {
        let result = self.receiver.recv().map_err(|_| {
            Error::WorkerFailed("surface extraction thread exited without a result".to_string())
        });
        self.join();
        result?
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Dispatches requests to a [`SurfaceExtractor`] on background threads.
/// Requests are neither deduplicated nor cancelled.
#[derive(Clone)]
pub struct SurfaceHandoff {
    extractor: Arc<dyn SurfaceExtractor>,
}

impl SurfaceHandoff {
    pub fn new(extractor: Arc<dyn SurfaceExtractor>) -> Self {
        Self { extractor }
    }

    pub fn request(&self, request: ExtractionRequest) -> Result<PendingSurface> {
        let (tx, rx) = mpsc::channel();
        let extractor = Arc::clone(&self.extractor);
        let region = request.region;
        let handle = thread::Builder::new()
            .name("voxseg-surface".to_string())
            .spawn(move || {
                let _ = tx.send(extractor.extract(&request));
            })
            .map_err(|e| Error::OperationFailed(format!("Failed to spawn surface thread: {}", e)))?;
        Ok(PendingSurface {
            region,
            receiver: rx,
            handle: Some(handle),
        })
    }
}
