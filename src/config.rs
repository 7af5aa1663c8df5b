//! Engine configuration

use crate::interpolation::InterpolationMode;
use crate::labels::MAX_SEGMENTATIONS;
use crate::smart_brush::{BlurExecution, SmartBrushParams};
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Prefix of default segmentation names.
    pub series_name: String,
    pub max_segmentations: usize,
    pub brush_radius: u32,
    pub single_slice: bool,
    pub smart_brush: SmartBrushParams,
    pub interpolation: InterpolationMode,
    /// Iso value handed to surface extraction; `None` uses the volume minimum.
    pub surface_iso_value: Option<f32>,
    pub smoothing_iterations: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            series_name: "Series".to_string(),
            max_segmentations: 3,
            brush_radius: 5,
            single_slice: false,
            smart_brush: SmartBrushParams::default(),
            interpolation: InterpolationMode::Sequential,
            surface_iso_value: None,
            smoothing_iterations: 20,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_segmentations == 0 || self.max_segmentations > MAX_SEGMENTATIONS {
            return Err(Error::InvalidParameter(format!(
                "max_segmentations must be in 1..={}, got {}",
                MAX_SEGMENTATIONS, self.max_segmentations
            )));
        }
        let sb = &self.smart_brush;
        if !(sb.threshold.is_finite() && sb.threshold >= 0.0) {
            return Err(Error::InvalidParameter(format!(
                "Smart brush threshold must be a non-negative fraction, got {}",
                sb.threshold
            )));
        }
        if let Some((lo, hi)) = sb.window {
            if !(lo <= hi) {
                return Err(Error::InvalidParameter(format!(
                    "Intensity window is inverted: [{}, {}]",
                    lo, hi
                )));
            }
        }
        if let BlurExecution::Parallel { slabs: 0 } = sb.execution {
            return Err(Error::InvalidParameter(
                "Parallel blur needs at least one slab".to_string(),
            ));
        }
        if let InterpolationMode::Parallel { workers: 0 } = self.interpolation {
            return Err(Error::InvalidParameter(
                "Parallel interpolation needs at least one worker".to_string(),
            ));
        }
        if let Some(iso) = self.surface_iso_value {
            if !iso.is_finite() {
                return Err(Error::InvalidParameter(format!(
                    "Surface iso value must be finite, got {}",
                    iso
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.max_segmentations, 3);
        assert_eq!(config.smart_brush.radius, 5);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.max_segmentations = MAX_SEGMENTATIONS + 1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.smart_brush.window = Some((10.0, 1.0));
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.interpolation = InterpolationMode::Parallel { workers: 0 };
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.smart_brush.threshold = f32::NAN;
        assert!(config.validate().is_err());
    }
}
