use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::align::transform_frame;
use crate::consts::PARTIAL_OUTPUT_SUFFIX;
use crate::error::{Result, SessalignError};
use crate::frame::SampleType;
use crate::io::params::ParameterStore;
use crate::io::source::{open_with_fallback, SourceOpener};
use crate::io::stack_writer::{create_stack_writer, OutputFormat, StackWriter};
use crate::repair::blocked_rows::{repair_frame, BlockedRowMask, NeighborCache};
use crate::session::{ParameterSet, Session};

use super::config::AlignConfig;
use super::types::{
    AccessEvent, ExportOptions, ExportReport, PipelineStage, ProgressReporter, SessionExport,
};

/// Load saved parameters or start from identities, then apply the
/// configured reference session.
pub fn prepare_parameters(
    store: &dyn ParameterStore,
    sessions: &[Session],
    config: &AlignConfig,
) -> Result<ParameterSet> {
    let mut params = match store.load()? {
        Some(params) => params,
        None => ParameterSet::for_sessions(sessions)?,
    };
    params.ensure_sessions(sessions);
    if let Some(ref reference) = config.reference_session {
        if !sessions.iter().any(|s| &s.name == reference) {
            return Err(SessalignError::InvalidParameters(format!(
                "reference session {} was not found",
                reference
            )));
        }
        params.set_reference(reference.clone());
    }
    Ok(params)
}

/// Shape shared by every session of an export.
struct StackShape {
    height: usize,
    width: usize,
    sample_type: SampleType,
}

/// Open every session once to check shapes and count frames. Sources are
/// released before returning.
fn plan_export(
    sessions: &[Session],
    params: &ParameterSet,
    opener: &dyn SourceOpener,
) -> Result<(StackShape, usize)> {
    let mut shape: Option<StackShape> = None;
    let mut total = 0usize;

    for session in sessions {
        params.get(&session.name).validate()?;
        let opened = open_with_fallback(opener, session)?;
        let source = opened.source.as_ref();
        let (h, w) = source.dims();
        match shape {
            None => {
                shape = Some(StackShape {
                    height: h,
                    width: w,
                    sample_type: source.sample_type(),
                })
            }
            Some(ref s) => {
                if (s.height, s.width) != (h, w) {
                    return Err(SessalignError::DimensionMismatch {
                        expected_width: s.width,
                        expected_height: s.height,
                        width: w,
                        height: h,
                    });
                }
                if s.sample_type != source.sample_type() {
                    return Err(SessalignError::UnsupportedSampleType(format!(
                        "{} is {}, earlier sessions are {}",
                        session.name,
                        source.sample_type(),
                        s.sample_type
                    )));
                }
            }
        }
        total += source.frame_count();
    }

    let shape = shape.ok_or(SessalignError::EmptySequence)?;
    Ok((shape, total))
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name: OsString = output.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_OUTPUT_SUFFIX);
    PathBuf::from(name)
}

/// Apply every session's stored transform to its full stack and write all
/// frames, in the given session order, to one stack file.
///
/// The output container follows the extension of `options.output`: a
/// multi-page BigTIFF for `.tif`/`.tiff`, SER for `.ser`.
///
/// The reference session passes through unmodified. With
/// `options.repair` set, each session's blocked rows are repaired first,
/// using neighbours from the same session only. Frames stream one at a
/// time from memory-mapped sources, falling back to full reads when the
/// map fails. Output goes to a `.partial` file that is renamed into place
/// only after the last frame is flushed, and removed on failure.
pub fn export_sessions(
    sessions: &[Session],
    params: &ParameterSet,
    options: &ExportOptions,
    opener: &dyn SourceOpener,
    reporter: &dyn ProgressReporter,
) -> Result<ExportReport> {
    if let Some(ref repair) = options.repair {
        repair.validate()?;
    }
    let format = OutputFormat::from_path(&options.output)?;
    if !sessions.iter().any(|s| params.is_reference(&s.name)) {
        return Err(SessalignError::InvalidParameters(format!(
            "reference session {} is not among the exported sessions",
            params.reference_session
        )));
    }

    let (shape, total_frames) = plan_export(sessions, params, opener)?;
    info!(
        sessions = sessions.len(),
        total_frames,
        width = shape.width,
        height = shape.height,
        sample_type = %shape.sample_type,
        format = %format,
        "Exporting aligned stack"
    );

    let partial = partial_path(&options.output);
    let written = create_stack_writer(
        format,
        &partial,
        shape.height,
        shape.width,
        shape.sample_type,
        total_frames,
    )
    .and_then(|mut writer| {
        let report = write_sessions(writer.as_mut(), sessions, params, options, opener, reporter)?;
        writer.finish()?;
        Ok(report)
    });

    match written {
        Ok((summaries, events)) => {
            std::fs::rename(&partial, &options.output)?;
            let frames_written = summaries.iter().map(|s| s.frames).sum();
            info!(
                output = %options.output.display(),
                frames_written,
                "Export complete"
            );
            Ok(ExportReport {
                output: options.output.clone(),
                frames_written,
                sessions: summaries,
                events,
            })
        }
        Err(e) => {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                debug!(error = %cleanup, "No partial output to remove");
            }
            Err(e)
        }
    }
}

fn write_sessions(
    writer: &mut dyn StackWriter,
    sessions: &[Session],
    params: &ParameterSet,
    options: &ExportOptions,
    opener: &dyn SourceOpener,
    reporter: &dyn ProgressReporter,
) -> Result<(Vec<SessionExport>, Vec<AccessEvent>)> {
    let mut summaries = Vec::with_capacity(sessions.len());
    let mut events = Vec::new();

    for session in sessions {
        let opened = open_with_fallback(opener, session)?;
        if let Some(reason) = opened.degraded_reason {
            events.push(AccessEvent::Degraded {
                session: session.name.clone(),
                reason,
            });
        }
        let source = opened.source.as_ref();
        let count = source.frame_count();
        let is_reference = params.is_reference(&session.name);
        let transform = params.get(&session.name);

        let mask = match options.repair {
            Some(ref repair) => {
                reporter.begin_stage(PipelineStage::Repairing, Some(count));
                let mask = BlockedRowMask::from_source(source, repair.threshold)?;
                reporter.finish_stage();
                Some(mask)
            }
            None => None,
        };
        let mut neighbors = options
            .repair
            .as_ref()
            .map(|repair| NeighborCache::new(source, repair));

        reporter.begin_stage(PipelineStage::Writing, Some(count));
        for i in 0..count {
            let mut frame = source.read_frame(i)?;
            if let (Some(repair), Some(mask), Some(cache)) =
                (options.repair.as_ref(), mask.as_ref(), neighbors.as_mut())
            {
                cache.advance_to(i);
                frame = repair_frame(i, &frame, mask, repair, |j, r| cache.row(j, r))?;
            }
            if !is_reference {
                frame = transform_frame(&frame, &transform)?;
            }
            writer.write_frame(&frame)?;
            reporter.advance(i + 1);
        }
        reporter.finish_stage();

        let repaired_rows = mask.as_ref().map_or(0, |m| m.blocked_count());
        if repaired_rows > 0 {
            debug!(session = %session.name, repaired_rows, "Blocked rows repaired");
        }
        info!(
            session = %session.name,
            frames = count,
            tier = %opened.tier,
            reference = is_reference,
            "Session written"
        );
        summaries.push(SessionExport {
            session: session.name.clone(),
            frames: count,
            tier: opened.tier,
            transformed: !is_reference,
            repaired_rows,
        });
    }

    Ok((summaries, events))
}
