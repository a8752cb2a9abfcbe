use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{GRID_STEP_EPSILON, MAX_GRID_POINTS, PARALLEL_GRID_THRESHOLD};
use crate::error::{Result, SessalignError};

use super::metric::{similarity, CropRegion};
use super::transform::{transform_array, AlignmentParameters};

/// Discretized range for one alignable parameter.
///
/// A disabled axis is not searched: it contributes the session's current
/// value for that parameter as its only point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchAxis {
    pub enabled: bool,
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl SearchAxis {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self {
            enabled: true,
            min,
            max,
            step,
        }
    }

    pub fn disabled(min: f64, max: f64, step: f64) -> Self {
        Self {
            enabled: false,
            min,
            max,
            step,
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.step.is_finite()) {
            return Err(SessalignError::InvalidParameters(format!(
                "{} axis has a non-finite bound or step",
                name
            )));
        }
        if self.step <= 0.0 {
            return Err(SessalignError::InvalidParameters(format!(
                "{} axis step must be positive, got {}",
                name, self.step
            )));
        }
        if self.point_count() > MAX_GRID_POINTS {
            return Err(SessalignError::InvalidParameters(format!(
                "{} axis has more than {} points",
                name, MAX_GRID_POINTS
            )));
        }
        Ok(())
    }

    /// Number of grid points, inclusive of both `min` and `max`.
    /// Zero when `min > max`; saturates at `usize::MAX`.
    pub fn point_count(&self) -> usize {
        if !self.enabled {
            return 1;
        }
        if self.min > self.max || self.step <= 0.0 {
            return 0;
        }
        let intervals = ((self.max - self.min) / self.step + GRID_STEP_EPSILON).floor();
        if !intervals.is_finite() || intervals >= usize::MAX as f64 {
            return usize::MAX;
        }
        (intervals as usize).saturating_add(1)
    }

    /// Values visited along this axis. `current` is used when disabled.
    pub fn values(&self, current: f64) -> Vec<f64> {
        if !self.enabled {
            return vec![current];
        }
        (0..self.point_count())
            .map(|i| self.min + i as f64 * self.step)
            .collect()
    }
}

impl std::fmt::Display for SearchAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.enabled {
            write!(
                f,
                "{} to {} step {} ({} points)",
                self.min,
                self.max,
                self.step,
                self.point_count()
            )
        } else {
            write!(f, "fixed")
        }
    }
}

/// Search ranges for all four alignable parameters.
///
/// Points are enumerated with `shift_x` as the outermost loop, then
/// `shift_y`, `rotation`, and `scale` innermost. Ties in score go to the
/// first point in that order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub shift_x: SearchAxis,
    pub shift_y: SearchAxis,
    /// Rotation range in degrees.
    pub rotation: SearchAxis,
    pub scale: SearchAxis,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            shift_x: SearchAxis::new(-20.0, 20.0, 1.0),
            shift_y: SearchAxis::new(-20.0, 20.0, 1.0),
            rotation: SearchAxis::disabled(-2.0, 2.0, 0.5),
            scale: SearchAxis::disabled(0.95, 1.05, 0.01),
        }
    }
}

impl SearchSpace {
    fn axes(&self) -> [(&'static str, &SearchAxis); 4] {
        [
            ("shift_x", &self.shift_x),
            ("shift_y", &self.shift_y),
            ("rotation", &self.rotation),
            ("scale", &self.scale),
        ]
    }

    pub fn validate(&self) -> Result<()> {
        for (name, axis) in self.axes() {
            axis.validate(name)?;
        }
        if self.scale.enabled && self.scale.min <= 0.0 {
            return Err(SessalignError::InvalidParameters(format!(
                "scale axis must stay positive, min is {}",
                self.scale.min
            )));
        }
        if self.point_count() > MAX_GRID_POINTS {
            return Err(SessalignError::InvalidParameters(format!(
                "search space exceeds {} points",
                MAX_GRID_POINTS
            )));
        }
        Ok(())
    }

    /// Total number of points in the combined space, saturating at
    /// `usize::MAX`.
    pub fn point_count(&self) -> usize {
        self.axes()
            .iter()
            .try_fold(1usize, |acc, (_, a)| acc.checked_mul(a.point_count()))
            .unwrap_or(usize::MAX)
    }

    /// Enumerate every candidate transform in search order. Disabled axes
    /// take their value from `base`.
    pub fn candidates(&self, base: &AlignmentParameters) -> Result<Vec<AlignmentParameters>> {
        self.validate()?;
        let axes = self.axes();
        if axes.iter().all(|(_, a)| !a.enabled) {
            return Err(SessalignError::EmptySearchSpace);
        }
        if axes.iter().any(|(_, a)| a.point_count() == 0) {
            return Err(SessalignError::EmptySearchSpace);
        }

        let xs = self.shift_x.values(base.shift_x);
        let ys = self.shift_y.values(base.shift_y);
        let rots = self.rotation.values(base.rotation_deg);
        let scales = self.scale.values(base.scale);

        let mut points = Vec::with_capacity(self.point_count());
        for &x in &xs {
            for &y in &ys {
                for &rot in &rots {
                    for &scale in &scales {
                        points.push(AlignmentParameters {
                            shift_x: x,
                            shift_y: y,
                            rotation_deg: rot,
                            scale,
                            alpha: base.alpha,
                        });
                    }
                }
            }
        }
        Ok(points)
    }
}

/// Best transform found by a grid search.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub params: AlignmentParameters,
    pub score: f64,
    pub points_evaluated: usize,
}

/// Exhaustively search `space` for the transform of `candidate` that best
/// matches `reference` inside `crop`.
pub fn grid_search(
    reference: &Array2<f32>,
    candidate: &Array2<f32>,
    space: &SearchSpace,
    crop: &CropRegion,
    base: &AlignmentParameters,
) -> Result<SearchOutcome> {
    grid_search_with_progress(reference, candidate, space, crop, base, |_| {})
}

/// Grid search with per-point progress reporting.
///
/// `on_point_done` receives the number of points scored so far. Points may
/// be scored in parallel; the winner is still chosen in enumeration order.
pub fn grid_search_with_progress<F>(
    reference: &Array2<f32>,
    candidate: &Array2<f32>,
    space: &SearchSpace,
    crop: &CropRegion,
    base: &AlignmentParameters,
    on_point_done: F,
) -> Result<SearchOutcome>
where
    F: Fn(usize) + Send + Sync,
{
    let (h, w) = reference.dim();
    let (ch, cw) = candidate.dim();
    if (h, w) != (ch, cw) {
        return Err(SessalignError::DimensionMismatch {
            expected_width: w,
            expected_height: h,
            width: cw,
            height: ch,
        });
    }
    crop.bounds(h, w)?;

    let points = space.candidates(base)?;
    let counter = AtomicUsize::new(0);
    let score_point = |params: &AlignmentParameters| -> Result<f64> {
        let moved = transform_array(candidate, params)?;
        let score = similarity(reference, &moved, crop)?;
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        on_point_done(done);
        Ok(score)
    };

    let scores: Vec<f64> = if points.len() >= PARALLEL_GRID_THRESHOLD {
        points
            .par_iter()
            .map(score_point)
            .collect::<Result<Vec<_>>>()?
    } else {
        points.iter().map(score_point).collect::<Result<Vec<_>>>()?
    };

    let (best_idx, best_score) = select_best(&scores).ok_or(SessalignError::EmptySearchSpace)?;
    let best = points[best_idx];
    debug!(
        points = points.len(),
        score = best_score,
        params = %best,
        "Grid search complete"
    );

    Ok(SearchOutcome {
        params: best,
        score: best_score,
        points_evaluated: points.len(),
    })
}

/// Index and value of the first maximum.
fn select_best(scores: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if score <= b => {}
            _ => best = Some((i, score)),
        }
    }
    best
}
