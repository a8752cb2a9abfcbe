use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::AlignmentParameters;
use crate::consts::PARAMETER_FILE_VERSION;
use crate::error::{Result, SessalignError};
use crate::frame::SourceFormat;

/// One recording file treated as a unit for alignment.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    /// Stable identity: the file path relative to the discovery root,
    /// with `/` separators.
    pub name: String,
    pub path: PathBuf,
    pub format: SourceFormat,
}

impl Session {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, format: SourceFormat) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            format,
        }
    }
}

/// Find every source file under `root` matching one of the format's
/// extensions, searching subdirectories, sorted by relative path.
pub fn discover_sessions(root: &Path, format: SourceFormat) -> Result<Vec<Session>> {
    let mut paths = Vec::new();
    collect_files(root, format.extensions(), &mut paths)?;
    paths.sort();

    let sessions: Vec<Session> = paths
        .into_iter()
        .map(|path| {
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Session::new(name, path, format)
        })
        .collect();

    debug!(root = %root.display(), count = sessions.len(), "Discovered sessions");
    Ok(sessions)
}

fn collect_files(dir: &Path, extensions: &[&str], out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extensions, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        {
            out.push(path);
        }
    }
    Ok(())
}

fn default_version() -> u32 {
    PARAMETER_FILE_VERSION
}

/// Per-session transforms plus the session they are relative to.
///
/// The reference session always resolves to the identity and cannot be
/// assigned a transform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default = "default_version")]
    pub version: u32,
    pub reference_session: String,
    #[serde(default)]
    pub sessions: BTreeMap<String, AlignmentParameters>,
}

impl ParameterSet {
    /// Identity transforms for every named session.
    pub fn new<I, S>(reference_session: impl Into<String>, sessions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: PARAMETER_FILE_VERSION,
            reference_session: reference_session.into(),
            sessions: sessions
                .into_iter()
                .map(|s| (s.into(), AlignmentParameters::identity()))
                .collect(),
        }
    }

    /// Identity for every session, with the first one as reference.
    pub fn for_sessions(sessions: &[Session]) -> Result<Self> {
        let first = sessions.first().ok_or(SessalignError::EmptySequence)?;
        Ok(Self::new(
            first.name.clone(),
            sessions.iter().map(|s| s.name.clone()),
        ))
    }

    pub fn is_reference(&self, session: &str) -> bool {
        self.reference_session == session
    }

    /// Transform for a session; identity for the reference or unknown names.
    pub fn get(&self, session: &str) -> AlignmentParameters {
        if self.is_reference(session) {
            return AlignmentParameters::identity();
        }
        self.sessions.get(session).copied().unwrap_or_default()
    }

    /// Store a transform for a non-reference session.
    pub fn set(&mut self, session: &str, params: AlignmentParameters) -> Result<()> {
        if self.is_reference(session) {
            return Err(SessalignError::InvalidParameters(format!(
                "{} is the reference session and stays fixed",
                session
            )));
        }
        params.validate()?;
        self.sessions.insert(session.to_string(), params);
        Ok(())
    }

    /// Make another session the reference. Stored transforms of the other
    /// sessions are kept as they are.
    pub fn set_reference(&mut self, session: impl Into<String>) {
        let session = session.into();
        self.sessions
            .entry(session.clone())
            .or_insert_with(AlignmentParameters::identity);
        self.reference_session = session;
    }

    /// Add identity entries for sessions that have none yet.
    pub fn ensure_sessions(&mut self, sessions: &[Session]) {
        for s in sessions {
            self.sessions
                .entry(s.name.clone())
                .or_insert_with(AlignmentParameters::identity);
        }
    }
}
