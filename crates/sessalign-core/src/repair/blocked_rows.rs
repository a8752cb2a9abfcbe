use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SessalignError};
use crate::frame::Frame;
use crate::io::source::FrameSource;

/// Settings for detecting and repairing shutter-blocked scan lines.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockDetectionConfig {
    /// Rows whose mean intensity falls below this value are blocked.
    pub threshold: f64,
    /// How many frames before and after are searched for a clean row.
    pub window: i64,
}

impl Default for BlockDetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 100.0,
            window: 3,
        }
    }
}

impl BlockDetectionConfig {
    pub fn new(threshold: f64, window: i64) -> Self {
        Self { threshold, window }
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold.is_nan() || self.threshold < 0.0 {
            return Err(SessalignError::InvalidThreshold(format!(
                "threshold must be non-negative, got {}",
                self.threshold
            )));
        }
        if self.window < 0 {
            return Err(SessalignError::InvalidThreshold(format!(
                "window must be non-negative, got {}",
                self.window
            )));
        }
        Ok(())
    }

    fn window_len(&self) -> usize {
        self.window.max(0) as usize
    }
}

impl std::fmt::Display for BlockDetectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "threshold {}, window \u{b1}{}", self.threshold, self.window)
    }
}

/// Mean intensity of every row.
pub fn row_means(data: &Array2<f32>) -> Vec<f64> {
    let w = data.ncols().max(1) as f64;
    data.rows()
        .into_iter()
        .map(|row| row.iter().map(|&v| v as f64).sum::<f64>() / w)
        .collect()
}

/// Which rows of which frames are blocked, for a whole session.
#[derive(Clone, Debug)]
pub struct BlockedRowMask {
    frames: usize,
    rows: usize,
    cols: usize,
    /// Frame-major: `blocked[frame * rows + row]`.
    blocked: Vec<bool>,
}

impl BlockedRowMask {
    fn empty() -> Self {
        Self {
            frames: 0,
            rows: 0,
            cols: 0,
            blocked: Vec::new(),
        }
    }

    fn push(&mut self, data: &Array2<f32>, threshold: f64) -> Result<()> {
        let (h, w) = data.dim();
        if self.frames > 0 && (h, w) != (self.rows, self.cols) {
            return Err(SessalignError::DimensionMismatch {
                expected_width: self.cols,
                expected_height: self.rows,
                width: w,
                height: h,
            });
        }
        self.rows = h;
        self.cols = w;
        self.blocked
            .extend(row_means(data).into_iter().map(|m| m < threshold));
        self.frames += 1;
        Ok(())
    }

    /// Build the mask from a stream of frames, holding one frame at a time.
    pub fn detect<I>(frames: I, threshold: f64) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Frame>>,
    {
        let mut mask = Self::empty();
        for frame in frames {
            mask.push(&frame?.data, threshold)?;
        }
        Ok(mask)
    }

    /// Build the mask for frames already in memory.
    pub fn from_frames(frames: &[Frame], threshold: f64) -> Result<Self> {
        let mut mask = Self::empty();
        for frame in frames {
            mask.push(&frame.data, threshold)?;
        }
        Ok(mask)
    }

    /// Build the mask by streaming every frame of a source.
    pub fn from_source(source: &dyn FrameSource, threshold: f64) -> Result<Self> {
        Self::detect(crate::io::source::frames(source), threshold)
    }

    pub fn frame_count(&self) -> usize {
        self.frames
    }

    pub fn is_blocked(&self, frame: usize, row: usize) -> bool {
        frame < self.frames && row < self.rows && self.blocked[frame * self.rows + row]
    }

    pub fn blocked_rows(&self, frame: usize) -> Vec<usize> {
        (0..self.rows).filter(|&r| self.is_blocked(frame, r)).collect()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.iter().filter(|&&b| b).count()
    }

    /// Nearest earlier frame within `window` whose `row` is clean.
    pub fn previous_clean(&self, frame: usize, row: usize, window: usize) -> Option<usize> {
        (1..=window)
            .take_while(|&d| d <= frame)
            .map(|d| frame - d)
            .find(|&j| !self.is_blocked(j, row))
    }

    /// Nearest later frame within `window` whose `row` is clean.
    pub fn next_clean(&self, frame: usize, row: usize, window: usize) -> Option<usize> {
        (1..=window)
            .map(|d| frame + d)
            .take_while(|&j| j < self.frames)
            .find(|&j| !self.is_blocked(j, row))
    }
}

/// Repair the blocked rows of frame `index`.
///
/// `neighbor_row(j, r)` returns row `r` of frame `j` as stored in the
/// input. Each blocked row becomes the mean of the nearest clean rows
/// before and after, the single clean row if only one side has one, or
/// zeros when none lies within the window. Values are snapped to the
/// frame's sample type.
pub fn repair_frame<F>(
    index: usize,
    frame: &Frame,
    mask: &BlockedRowMask,
    config: &BlockDetectionConfig,
    mut neighbor_row: F,
) -> Result<Frame>
where
    F: FnMut(usize, usize) -> Result<Vec<f32>>,
{
    let blocked = mask.blocked_rows(index);
    if blocked.is_empty() {
        return Ok(frame.clone());
    }

    let window = config.window_len();
    let sample_type = frame.sample_type;
    let mut data = frame.data.clone();

    for row in blocked {
        let prev = mask.previous_clean(index, row, window);
        let next = mask.next_clean(index, row, window);
        let mut target = data.row_mut(row);
        match (prev, next) {
            (Some(p), Some(n)) => {
                let before = neighbor_row(p, row)?;
                let after = neighbor_row(n, row)?;
                for ((t, &a), &b) in target.iter_mut().zip(&before).zip(&after) {
                    *t = sample_type.quantize(((a as f64 + b as f64) / 2.0) as f32);
                }
            }
            (Some(j), None) | (None, Some(j)) => {
                let source = neighbor_row(j, row)?;
                for (t, &v) in target.iter_mut().zip(&source) {
                    *t = v;
                }
            }
            (None, None) => target.fill(0.0),
        }
    }

    Ok(frame.with_data(data))
}

/// Repair blocked rows across a whole in-memory session.
///
/// Frames must be in acquisition order. Neighbours are only looked up
/// inside `frames`, so sessions never borrow rows from each other.
pub fn interpolate_blocked_rows(
    frames: &[Frame],
    config: &BlockDetectionConfig,
) -> Result<Vec<Frame>> {
    config.validate()?;
    let mask = BlockedRowMask::from_frames(frames, config.threshold)?;
    debug!(
        frames = frames.len(),
        blocked_rows = mask.blocked_count(),
        "Blocked rows detected"
    );

    frames
        .iter()
        .enumerate()
        .map(|(i, frame)| {
            repair_frame(i, frame, &mask, config, |j, r| {
                Ok(frames[j].data.row(r).to_vec())
            })
        })
        .collect()
}

/// Neighbour lookup over a source, keeping only the frames inside the
/// current repair window resident.
pub struct NeighborCache<'a> {
    source: &'a dyn FrameSource,
    window: usize,
    frames: HashMap<usize, Frame>,
}

impl<'a> NeighborCache<'a> {
    pub fn new(source: &'a dyn FrameSource, config: &BlockDetectionConfig) -> Self {
        Self {
            source,
            window: config.window_len(),
            frames: HashMap::new(),
        }
    }

    /// Drop cached frames that can no longer be a neighbour of `index`.
    pub fn advance_to(&mut self, index: usize) {
        let lo = index.saturating_sub(self.window);
        let hi = index + self.window;
        self.frames.retain(|&j, _| j >= lo && j <= hi);
    }

    pub fn row(&mut self, frame: usize, row: usize) -> Result<Vec<f32>> {
        if !self.frames.contains_key(&frame) {
            let loaded = self.source.read_frame(frame)?;
            self.frames.insert(frame, loaded);
        }
        Ok(self.frames[&frame].data.row(row).to_vec())
    }

    pub fn resident(&self) -> usize {
        self.frames.len()
    }
}
