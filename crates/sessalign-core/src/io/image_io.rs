use std::path::Path;

use image::{GrayImage, ImageBuffer, ImageFormat, Luma};
use ndarray::Array2;

use crate::error::{Result, SessalignError};

/// Map data linearly so its minimum becomes 0.0 and its maximum 1.0.
fn stretch_to_unit(data: &Array2<f32>) -> Array2<f32> {
    let (lo, hi) = data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = hi - lo;
    if !range.is_finite() || range <= 0.0 {
        return Array2::zeros(data.dim());
    }
    data.mapv(|v| (v - lo) / range)
}

/// Save an array as a contrast-stretched 16-bit grayscale TIFF preview.
pub fn save_tiff(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let unit = stretch_to_unit(data);
    let pixels: Vec<u16> = unit
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0) as u16)
        .collect();

    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| SessalignError::InvalidDimensions {
            width: w as u32,
            height: h as u32,
        })?;
    img.save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

/// Save an array as a contrast-stretched 8-bit grayscale PNG preview.
pub fn save_png(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let unit = stretch_to_unit(data);

    let mut img = GrayImage::new(w as u32, h as u32);
    for ((row, col), &v) in unit.indexed_iter() {
        let val = (v.clamp(0.0, 1.0) * 255.0) as u8;
        img.put_pixel(col as u32, row as u32, Luma([val]));
    }

    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Save a preview, choosing the format from the file extension.
pub fn save_image(data: &Array2<f32>, path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("png") => save_png(data, path),
        _ => save_tiff(data, path),
    }
}
