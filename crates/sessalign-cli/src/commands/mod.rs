pub mod align;
pub mod config;
pub mod export;
pub mod info;
pub mod mean;
pub mod params;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use sessalign_core::frame::SourceFormat;
use sessalign_core::io::params::{ParameterStore, TomlParameterStore};
use sessalign_core::pipeline::config::AlignConfig;
use sessalign_core::pipeline::prepare_parameters;
use sessalign_core::session::{discover_sessions, ParameterSet, Session};
use tracing::debug;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum FormatArg {
    Ser,
    Sbx,
    Tiff,
}

/// Arguments shared by every command that works on a session folder.
#[derive(Args)]
pub struct SessionArgs {
    /// Folder holding the session files (searched recursively)
    pub folder: PathBuf,

    /// Source file format
    #[arg(long, value_enum, default_value = "ser")]
    pub format: FormatArg,

    /// Frame width for SBX sources
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height for SBX sources
    #[arg(long)]
    pub height: Option<u32>,

    /// Alignment config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Parameter file [default: <folder>/params_all.toml]
    #[arg(long)]
    pub params: Option<PathBuf>,
}

impl SessionArgs {
    pub fn source_format(&self) -> Result<SourceFormat> {
        match self.format {
            FormatArg::Ser => Ok(SourceFormat::Ser),
            FormatArg::Sbx => match (self.width, self.height) {
                (Some(width), Some(height)) => Ok(SourceFormat::Sbx { width, height }),
                _ => bail!("SBX sources need --width and --height"),
            },
            FormatArg::Tiff => Ok(SourceFormat::Tiff),
        }
    }

    pub fn sessions(&self) -> Result<Vec<Session>> {
        let sessions = discover_sessions(&self.folder, self.source_format()?)
            .with_context(|| format!("Failed to list sessions in {}", self.folder.display()))?;
        if sessions.is_empty() {
            bail!("No sessions found in {}", self.folder.display());
        }
        Ok(sessions)
    }

    pub fn load_config(&self) -> Result<AlignConfig> {
        let config: AlignConfig = match self.config {
            Some(ref path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                let config = toml::from_str(&contents).context("Invalid alignment config")?;
                debug!(path = %path.display(), "Loaded alignment config");
                config
            }
            None => AlignConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn params_path(&self) -> PathBuf {
        self.params
            .clone()
            .unwrap_or_else(|| self.folder.join("params_all.toml"))
    }

    pub fn store(&self) -> TomlParameterStore {
        TomlParameterStore::new(self.params_path())
    }

    /// Saved parameters for the discovered sessions, or identities.
    pub fn load_params(&self, sessions: &[Session], config: &AlignConfig) -> Result<ParameterSet> {
        let store = self.store();
        prepare_parameters(&store, sessions, config)
            .with_context(|| format!("Failed to load parameters from {}", store.path().display()))
    }

    pub fn save_params(&self, params: &ParameterSet) -> Result<()> {
        let store = self.store();
        store
            .save(params)
            .with_context(|| format!("Failed to save parameters to {}", store.path().display()))
    }
}

/// Find a session by name, accepting a bare file name when it is unique.
pub fn find_session<'a>(sessions: &'a [Session], name: &str) -> Result<&'a Session> {
    if let Some(s) = sessions.iter().find(|s| s.name == name) {
        return Ok(s);
    }
    let by_file: Vec<&Session> = sessions
        .iter()
        .filter(|s| Path::new(&s.name).file_name().and_then(|f| f.to_str()) == Some(name))
        .collect();
    match by_file.as_slice() {
        [s] => Ok(s),
        [] => bail!("Unknown session {}", name),
        _ => bail!("Session name {} is ambiguous, use its relative path", name),
    }
}
