use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::consts::PARAMETER_FILE_VERSION;
use crate::error::{Result, SessalignError};
use crate::session::ParameterSet;

/// Load/save boundary for persisted alignment parameters.
pub trait ParameterStore {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<ParameterSet>>;

    fn save(&self, params: &ParameterSet) -> Result<()>;
}

/// Parameters stored as a TOML file.
#[derive(Clone, Debug)]
pub struct TomlParameterStore {
    path: PathBuf,
}

impl TomlParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ParameterStore for TomlParameterStore {
    fn load(&self) -> Result<Option<ParameterSet>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No saved parameters found");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let params: ParameterSet = toml::from_str(&contents)
            .map_err(|e| SessalignError::ParameterFormat(e.to_string()))?;
        if params.version > PARAMETER_FILE_VERSION {
            return Err(SessalignError::ParameterFormat(format!(
                "file version {} is newer than supported version {}",
                params.version, PARAMETER_FILE_VERSION
            )));
        }
        info!(
            path = %self.path.display(),
            reference = %params.reference_session,
            "Alignment parameters loaded"
        );
        Ok(Some(params))
    }

    fn save(&self, params: &ParameterSet) -> Result<()> {
        let text = toml::to_string_pretty(params)
            .map_err(|e| SessalignError::ParameterFormat(e.to_string()))?;
        // Write beside the target, then swap it in.
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), "Alignment parameters saved");
        Ok(())
    }
}
