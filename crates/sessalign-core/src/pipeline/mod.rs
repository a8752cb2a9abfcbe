pub mod config;
mod orchestrator;
mod types;

pub use orchestrator::{export_sessions, prepare_parameters};
pub use types::{
    AccessEvent, ExportOptions, ExportReport, NoOpReporter, PipelineStage, ProgressReporter,
    SessionExport,
};
