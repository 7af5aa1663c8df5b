//! Filesystem helpers

use crate::{Error, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub struct Utils;

impl Utils {
    /// `prefix` + local timestamp + `postfix`, e.g. `voxseg_20240101_120000.log`.
    pub fn date_time_filename(prefix: &str, postfix: &str) -> String {
        let now = chrono::Local::now();
        format!("{}{}{}", prefix, now.format("%Y%m%d_%H%M%S"), postfix)
    }

    /// Name used for a default segmentation slot.
    pub fn segmentation_name(series: &str, index: usize) -> String {
        if series.is_empty() {
            format!("Segmentation {}", index)
        } else {
            format!("{} {}", series, index)
        }
    }
}

/// Scratch directory removed on drop.
pub struct TempFolder {
    path: PathBuf,
}

impl TempFolder {
    pub fn new() -> Result<Self> {
        let mut path = env::temp_dir();
        let unique = format!(
            "voxseg_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0)
        );
        path.push(unique);
        fs::create_dir_all(&path)
            .map_err(|e| Error::OperationFailed(format!("Failed to create temp dir: {}", e)))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempFolder {
    fn drop(&mut self) {
        if let Ok(entries) = fs::read_dir(&self.path) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() {
                    let _ = fs::remove_file(path);
                }
            }
        }
        let _ = fs::remove_dir(&self.path);
    }
}
