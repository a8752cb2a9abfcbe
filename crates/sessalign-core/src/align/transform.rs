use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_OVERLAY_ALPHA, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{Result, SessalignError};
use crate::frame::Frame;

/// Similarity transform applied to a moving session.
///
/// The transform is composed as: scale about the frame center, rotate about
/// the frame center, then translate by `(shift_x, shift_y)`. Positive
/// `shift_x` moves content right, positive `shift_y` moves it down, and a
/// positive `rotation_deg` turns content counter-clockwise as displayed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignmentParameters {
    pub shift_x: f64,
    pub shift_y: f64,
    pub rotation_deg: f64,
    pub scale: f64,
    /// Overlay opacity for previews. Never used by numeric operations.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
}

fn default_alpha() -> f32 {
    DEFAULT_OVERLAY_ALPHA
}

impl Default for AlignmentParameters {
    fn default() -> Self {
        Self::identity()
    }
}

impl AlignmentParameters {
    pub fn identity() -> Self {
        Self {
            shift_x: 0.0,
            shift_y: 0.0,
            rotation_deg: 0.0,
            scale: 1.0,
            alpha: DEFAULT_OVERLAY_ALPHA,
        }
    }

    pub fn new(shift_x: f64, shift_y: f64, rotation_deg: f64, scale: f64) -> Self {
        Self {
            shift_x,
            shift_y,
            rotation_deg,
            scale,
            alpha: DEFAULT_OVERLAY_ALPHA,
        }
    }

    /// True when the numeric part equals `{0, 0, 0, 1}`.
    pub fn is_identity(&self) -> bool {
        self.shift_x == 0.0 && self.shift_y == 0.0 && self.rotation_deg == 0.0 && self.scale == 1.0
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [self.shift_x, self.shift_y, self.rotation_deg, self.scale];
        if fields.iter().any(|v| !v.is_finite()) {
            return Err(SessalignError::InvalidParameters(format!(
                "non-finite value in {}",
                self
            )));
        }
        if self.scale <= 0.0 {
            return Err(SessalignError::InvalidParameters(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// The transform that undoes `self`, expressed in the same family.
    pub fn inverse(&self) -> Result<Self> {
        self.validate()?;
        let theta = self.rotation_deg.to_radians();
        let (sin, cos) = theta.sin_cos();
        // Undo the translation in the rotated, scaled frame.
        let shift_x = -(cos * self.shift_x - sin * self.shift_y) / self.scale;
        let shift_y = -(sin * self.shift_x + cos * self.shift_y) / self.scale;
        Ok(Self {
            shift_x,
            shift_y,
            rotation_deg: -self.rotation_deg,
            scale: 1.0 / self.scale,
            alpha: self.alpha,
        })
    }
}

impl std::fmt::Display for AlignmentParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "dx={}, dy={}, rot={}\u{b0}, scale={}",
            self.shift_x, self.shift_y, self.rotation_deg, self.scale
        )
    }
}

/// Inverse mapping from an output pixel to the source pixel it samples.
struct InverseMap {
    cx: f64,
    cy: f64,
    sin: f64,
    cos: f64,
    inv_scale: f64,
    shift_x: f64,
    shift_y: f64,
}

impl InverseMap {
    fn new(params: &AlignmentParameters, height: usize, width: usize) -> Self {
        let (sin, cos) = params.rotation_deg.to_radians().sin_cos();
        Self {
            cx: (width as f64 - 1.0) / 2.0,
            cy: (height as f64 - 1.0) / 2.0,
            sin,
            cos,
            inv_scale: 1.0 / params.scale,
            shift_x: params.shift_x,
            shift_y: params.shift_y,
        }
    }

    /// Returns `(src_y, src_x)` for output pixel `(row, col)`.
    fn source(&self, row: usize, col: usize) -> (f64, f64) {
        let dx = col as f64 - self.cx - self.shift_x;
        let dy = row as f64 - self.cy - self.shift_y;
        let src_x = (self.cos * dx - self.sin * dy) * self.inv_scale + self.cx;
        let src_y = (self.sin * dx + self.cos * dy) * self.inv_scale + self.cy;
        (src_y, src_x)
    }
}

/// Nearest-neighbour sample; coordinates outside the array read `background`.
pub fn nearest_sample(data: &Array2<f32>, y: f64, x: f64, background: f32) -> f32 {
    let (h, w) = data.dim();
    let r = y.round();
    let c = x.round();
    if r >= 0.0 && c >= 0.0 && (r as usize) < h && (c as usize) < w {
        data[[r as usize, c as usize]]
    } else {
        background
    }
}

/// Resample `data` through the transform. Output has the same shape;
/// uncovered pixels are filled with zero.
pub fn transform_array(data: &Array2<f32>, params: &AlignmentParameters) -> Result<Array2<f32>> {
    params.validate()?;
    if params.is_identity() {
        return Ok(data.clone());
    }

    let (h, w) = data.dim();
    let map = InverseMap::new(params, h, w);

    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let rows: Vec<Vec<f32>> = (0..h)
            .into_par_iter()
            .map(|row| {
                (0..w)
                    .map(|col| {
                        let (y, x) = map.source(row, col);
                        nearest_sample(data, y, x, 0.0)
                    })
                    .collect()
            })
            .collect();

        let mut result = Array2::<f32>::zeros((h, w));
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }
        Ok(result)
    } else {
        let mut result = Array2::<f32>::zeros((h, w));
        for row in 0..h {
            for col in 0..w {
                let (y, x) = map.source(row, col);
                result[[row, col]] = nearest_sample(data, y, x, 0.0);
            }
        }
        Ok(result)
    }
}

/// Apply the transform to a frame, producing a new frame of the same shape
/// and sample type.
pub fn transform_frame(frame: &Frame, params: &AlignmentParameters) -> Result<Frame> {
    let data = transform_array(&frame.data, params)?;
    Ok(frame.with_data(data))
}

/// Blend an aligned candidate over a reference for visual inspection.
pub fn overlay_preview(
    reference: &Array2<f32>,
    aligned: &Array2<f32>,
    alpha: f32,
) -> Result<Array2<f32>> {
    if reference.dim() != aligned.dim() {
        let (h, w) = reference.dim();
        let (ah, aw) = aligned.dim();
        return Err(SessalignError::DimensionMismatch {
            expected_width: w,
            expected_height: h,
            width: aw,
            height: ah,
        });
    }
    let alpha = alpha.clamp(0.0, 1.0);
    Ok(ndarray::Zip::from(reference)
        .and(aligned)
        .map_collect(|&r, &a| r * (1.0 - alpha) + a * alpha))
}
