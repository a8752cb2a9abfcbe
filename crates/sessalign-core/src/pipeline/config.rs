use serde::{Deserialize, Serialize};

use crate::align::{CropRegion, SearchSpace};
use crate::consts::DEFAULT_MEAN_FRAME_COUNT;
use crate::error::{Result, SessalignError};
use crate::repair::BlockDetectionConfig;

/// Everything the alignment front end can configure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Session held fixed; the first discovered session when unset.
    pub reference_session: Option<String>,
    /// Leading frames averaged into each session's mean frame.
    pub mean_frame_count: usize,
    /// Run blocked-row repair on every frame during export.
    pub interpolate_on_export: bool,
    pub search: SearchSpace,
    pub crop: CropRegion,
    pub blocked_rows: BlockDetectionConfig,
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            reference_session: None,
            mean_frame_count: DEFAULT_MEAN_FRAME_COUNT,
            interpolate_on_export: false,
            search: SearchSpace::default(),
            crop: CropRegion::default(),
            blocked_rows: BlockDetectionConfig::default(),
        }
    }
}

impl AlignConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mean_frame_count == 0 {
            return Err(SessalignError::InvalidParameters(
                "mean_frame_count must be at least 1".into(),
            ));
        }
        self.search.validate()?;
        self.blocked_rows.validate()?;
        Ok(())
    }

    /// Repair settings to use during export, if repair is switched on.
    pub fn export_repair(&self) -> Option<BlockDetectionConfig> {
        self.interpolate_on_export.then_some(self.blocked_rows)
    }
}
