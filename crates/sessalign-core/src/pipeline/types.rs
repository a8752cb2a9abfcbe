use std::path::PathBuf;

use crate::io::source::AccessTier;
use crate::repair::BlockDetectionConfig;

/// Processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    Reading,
    Searching,
    Repairing,
    Writing,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reading => write!(f, "Reading sessions"),
            Self::Searching => write!(f, "Searching transform"),
            Self::Repairing => write!(f, "Detecting blocked rows"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// in this stage (grid points, frames), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// Work items completed so far within the current stage.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// Reporter that ignores every event.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// What an export writes and how.
#[derive(Clone, Debug)]
pub struct ExportOptions {
    pub output: PathBuf,
    /// Repair blocked rows before transforming, when set.
    pub repair: Option<BlockDetectionConfig>,
}

/// Observable source-access events.
#[derive(Clone, Debug, PartialEq)]
pub enum AccessEvent {
    /// Memory mapping failed; the session was read fully into memory.
    Degraded { session: String, reason: String },
}

/// Per-session summary of an export.
#[derive(Clone, Debug)]
pub struct SessionExport {
    pub session: String,
    pub frames: usize,
    pub tier: AccessTier,
    /// False for the reference session, which passes through unchanged.
    pub transformed: bool,
    pub repaired_rows: usize,
}

/// Result of a completed export.
#[derive(Clone, Debug)]
pub struct ExportReport {
    pub output: PathBuf,
    pub frames_written: usize,
    pub sessions: Vec<SessionExport>,
    pub events: Vec<AccessEvent>,
}

impl ExportReport {
    pub fn degraded(&self) -> bool {
        !self.events.is_empty()
    }
}
