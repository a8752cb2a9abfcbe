use ndarray::Array2;
use tracing::info;

use crate::error::{Result, SessalignError};
use crate::frame::{Frame, SampleType};
use crate::io::source::{open_with_fallback, FrameSource, SourceOpener};
use crate::pipeline::{PipelineStage, ProgressReporter};
use crate::session::Session;

/// Representative frame of a session used for alignment search.
#[derive(Clone, Debug)]
pub struct MeanFrame {
    pub session: String,
    pub data: Array2<f32>,
    pub frames_averaged: usize,
    pub total_frames: usize,
    /// Sample type of the session's source data.
    pub sample_type: SampleType,
}

/// Stack frames by computing the mean at each pixel.
pub fn mean_stack(frames: &[Frame]) -> Result<Frame> {
    if frames.is_empty() {
        return Err(SessalignError::EmptySequence);
    }

    let (h, w) = frames[0].data.dim();
    let mut sum = Array2::<f64>::zeros((h, w));

    for frame in frames {
        if frame.data.dim() != (h, w) {
            return Err(SessalignError::DimensionMismatch {
                expected_width: w,
                expected_height: h,
                width: frame.width(),
                height: frame.height(),
            });
        }
        sum.zip_mut_with(&frame.data, |s, &v| *s += v as f64);
    }

    let n = frames.len() as f64;
    Ok(Frame::new(sum.mapv(|v| (v / n) as f32), SampleType::F32))
}

/// Per-pixel mean over the first `max_frames` frames of a source.
pub fn mean_of_leading_frames(source: &dyn FrameSource, max_frames: usize) -> Result<Array2<f32>> {
    let count = source.frame_count().min(max_frames);
    if count == 0 {
        return Err(SessalignError::EmptySequence);
    }

    let mut sum = Array2::<f64>::zeros(source.dims());
    for i in 0..count {
        let frame = source.read_frame(i)?;
        sum.zip_mut_with(&frame.data, |s, &v| *s += v as f64);
    }

    let n = count as f64;
    Ok(sum.mapv(|v| (v / n) as f32))
}

/// Compute the mean frame of every session in order.
pub fn compute_mean_frames(
    sessions: &[Session],
    opener: &dyn SourceOpener,
    max_frames: usize,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<MeanFrame>> {
    reporter.begin_stage(PipelineStage::Reading, Some(sessions.len()));
    let mut means = Vec::with_capacity(sessions.len());
    for (i, session) in sessions.iter().enumerate() {
        let opened = open_with_fallback(opener, session)?;
        let source = opened.source.as_ref();
        let data = mean_of_leading_frames(source, max_frames)?;
        let frames_averaged = source.frame_count().min(max_frames);
        info!(
            session = %session.name,
            frames_averaged,
            total_frames = source.frame_count(),
            "Mean frame computed"
        );
        means.push(MeanFrame {
            session: session.name.clone(),
            data,
            frames_averaged,
            total_frames: source.frame_count(),
            sample_type: source.sample_type(),
        });
        reporter.advance(i + 1);
    }
    reporter.finish_stage();
    Ok(means)
}
