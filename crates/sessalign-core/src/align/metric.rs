use std::ops::Range;

use ndarray::{s, Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::consts::EPSILON;
use crate::error::{Result, SessalignError};

/// Symmetric margin, in pixels, excluded from scoring on each side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub margin_x: usize,
    pub margin_y: usize,
}

impl Default for CropRegion {
    fn default() -> Self {
        Self {
            margin_x: 32,
            margin_y: 32,
        }
    }
}

impl CropRegion {
    pub fn new(margin_x: usize, margin_y: usize) -> Self {
        Self { margin_x, margin_y }
    }

    /// Row and column ranges left after removing the margins from a
    /// `height x width` frame.
    pub fn bounds(&self, height: usize, width: usize) -> Result<(Range<usize>, Range<usize>)> {
        let no_pixels = || {
            SessalignError::ShapeMismatch(format!(
                "crop margins {}x{} leave no pixels in a {}x{} frame",
                self.margin_x, self.margin_y, width, height
            ))
        };
        let rows_left = self
            .margin_y
            .checked_mul(2)
            .and_then(|m| height.checked_sub(m))
            .ok_or_else(no_pixels)?;
        let cols_left = self
            .margin_x
            .checked_mul(2)
            .and_then(|m| width.checked_sub(m))
            .ok_or_else(no_pixels)?;
        if rows_left == 0 || cols_left == 0 {
            return Err(no_pixels());
        }
        Ok((
            self.margin_y..self.margin_y + rows_left,
            self.margin_x..self.margin_x + cols_left,
        ))
    }

    /// View of the scored center region.
    pub fn apply<'a>(&self, data: &'a Array2<f32>) -> Result<ArrayView2<'a, f32>> {
        let (h, w) = data.dim();
        let (rows, cols) = self.bounds(h, w)?;
        Ok(data.slice(s![rows, cols]))
    }
}

impl std::fmt::Display for CropRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} px x {} px", self.margin_x, self.margin_y)
    }
}

/// Zero-mean normalized cross-correlation of the cropped centers of two
/// frames. Ranges over [-1, 1], higher is better; a flat region scores 0.
pub fn similarity(
    reference: &Array2<f32>,
    candidate: &Array2<f32>,
    crop: &CropRegion,
) -> Result<f64> {
    if reference.dim() != candidate.dim() {
        let (h, w) = reference.dim();
        let (ch, cw) = candidate.dim();
        return Err(SessalignError::ShapeMismatch(format!(
            "reference is {}x{}, candidate is {}x{}",
            w, h, cw, ch
        )));
    }
    let a = crop.apply(reference)?;
    let b = crop.apply(candidate)?;
    Ok(zncc(&a, &b))
}

fn zncc(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = b.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cross = 0.0f64;
    let mut var_a = 0.0f64;
    let mut var_b = 0.0f64;
    for (&va, &vb) in a.iter().zip(b.iter()) {
        let da = va as f64 - mean_a;
        let db = vb as f64 - mean_b;
        cross += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom < EPSILON {
        0.0
    } else {
        cross / denom
    }
}
