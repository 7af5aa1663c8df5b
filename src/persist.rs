//! Label buffer persistence: raw dumps and per-slice zip archives

use crate::labels::{Label, LabelVolume};
use crate::{Axis, Dimensions, Error, Result};
use std::io::{Read, Seek, Write};
use tracing::debug;
use zip::write::FileOptions;
use zip::CompressionMethod;

/// Write the label buffer as raw bytes, `i` fastest.
pub fn save_raw<W: Write>(mut writer: W, live: &LabelVolume) -> Result<()> {
    writer
        .write_all(live.labels())
        .map_err(|e| Error::FileSave(format!("Failed to write labels: {}", e)))?;
    writer.flush()?;
    Ok(())
}

/// Read a raw label dump. The byte count must match `dims`.
pub fn load_raw<R: Read>(mut reader: R, dims: &Dimensions) -> Result<Vec<Label>> {
    let mut data = Vec::with_capacity(dims.voxel_count());
    reader
        .read_to_end(&mut data)
        .map_err(|e| Error::FileLoad(format!("Failed to read labels: {}", e)))?;
    if data.len() != dims.voxel_count() {
        return Err(Error::DimensionMismatch {
            expected: dims.voxel_count(),
            actual: data.len(),
        });
    }
    Ok(data)
}

/// One zip entry per slice along `axis`, named `1`, `2`, ... Each entry
/// holds `width * height` label bytes indexed `y + x * height`.
pub fn export_slices_zip<W: Write + Seek>(writer: W, live: &LabelVolume, axis: Axis) -> Result<W> {
    let dims = live.dims();
    let (width, height, depth) = dims.projection_dims(axis);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = zip::ZipWriter::new(writer);
    let mut slice_data = vec![0u8; width * height];

    for slice in 0..depth {
        for x in 0..width {
            for y in 0..height {
                slice_data[y + x * height] = live.labels()[dims.slice_voxel_index(axis, slice, x, y)];
            }
        }
        zip.start_file((slice + 1).to_string(), options)
            .map_err(|e| Error::FileSave(format!("Failed to add slice {}: {}", slice + 1, e)))?;
        zip.write_all(&slice_data)
            .map_err(|e| Error::FileSave(format!("Failed to write slice {}: {}", slice + 1, e)))?;
    }

    debug!(axis = %axis, slices = depth, "slices exported");
    zip.finish()
        .map_err(|e| Error::FileSave(format!("Failed to finish zip: {}", e)))
}

/// Inverse of [`export_slices_zip`]: rebuild a full label buffer.
pub fn import_slices_zip<R: Read + Seek>(reader: R, dims: &Dimensions, axis: Axis) -> Result<Vec<Label>> {
    let (width, height, depth) = dims.projection_dims(axis);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| Error::FileLoad(format!("Failed to read zip: {}", e)))?;
    let mut labels = vec![0u8; dims.voxel_count()];
    let mut slice_data = Vec::with_capacity(width * height);

    for slice in 0..depth {
        let name = (slice + 1).to_string();
        let mut file = archive
            .by_name(&name)
            .map_err(|_| Error::FileLoad(format!("Slice {} not found in zip", name)))?;
        slice_data.clear();
        file.read_to_end(&mut slice_data)
            .map_err(|e| Error::FileLoad(format!("Failed to read slice {}: {}", name, e)))?;
        if slice_data.len() != width * height {
            return Err(Error::DimensionMismatch {
                expected: width * height,
                actual: slice_data.len(),
            });
        }
        for x in 0..width {
            for y in 0..height {
                labels[dims.slice_voxel_index(axis, slice, x, y)] = slice_data[y + x * height];
            }
        }
    }
    Ok(labels)
}
