use std::path::{Path, PathBuf};

use ndarray::Array2;
use sessalign_core::io::ser::SER_HEADER_SIZE;
use tiff::encoder::{colortype, TiffEncoder, TiffValue};

/// Build a 178-byte mono SER header.
pub fn build_ser_header(width: u32, height: u32, bit_depth: u32, num_frames: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(SER_HEADER_SIZE);

    buf.extend_from_slice(b"LUCAM-RECORDER");
    // LuID
    buf.extend_from_slice(&0i32.to_le_bytes());
    // ColorID: mono
    buf.extend_from_slice(&0i32.to_le_bytes());
    // LittleEndian = 0 (little-endian per Siril convention)
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(width as i32).to_le_bytes());
    buf.extend_from_slice(&(height as i32).to_le_bytes());
    buf.extend_from_slice(&(bit_depth as i32).to_le_bytes());
    buf.extend_from_slice(&(num_frames as i32).to_le_bytes());
    // Observer, Instrument, Telescope
    buf.extend_from_slice(&[0u8; 120]);
    // DateTime, DateTimeUTC
    buf.extend_from_slice(&[0u8; 16]);

    assert_eq!(buf.len(), SER_HEADER_SIZE);
    buf
}

/// Complete 16-bit SER file holding the given frames.
pub fn build_ser_u16(frames: &[Array2<f32>]) -> Vec<u8> {
    let (h, w) = frames[0].dim();
    let mut buf = build_ser_header(w as u32, h as u32, 16, frames.len());
    for frame in frames {
        for &v in frame.iter() {
            buf.extend_from_slice(&(v as u16).to_le_bytes());
        }
    }
    buf
}

/// Complete 8-bit SER file holding the given frames.
pub fn build_ser_u8(frames: &[Array2<f32>]) -> Vec<u8> {
    let (h, w) = frames[0].dim();
    let mut buf = build_ser_header(w as u32, h as u32, 8, frames.len());
    for frame in frames {
        buf.extend(frame.iter().map(|&v| v as u8));
    }
    buf
}

/// Classic multi-page TIFF, one page per frame, samples converted by `sample`.
pub fn build_tiff<C>(frames: &[Array2<f32>], sample: impl Fn(f32) -> C::Inner) -> Vec<u8>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut cursor).expect("tiff encoder");
        for frame in frames {
            let (h, w) = frame.dim();
            let page: Vec<C::Inner> = frame.iter().map(|&v| sample(v)).collect();
            encoder
                .write_image::<C>(w as u32, h as u32, &page)
                .expect("tiff page");
        }
    }
    cursor.into_inner()
}

pub fn build_tiff_u8(frames: &[Array2<f32>]) -> Vec<u8> {
    build_tiff::<colortype::Gray8>(frames, |v| v as u8)
}

pub fn build_tiff_u16(frames: &[Array2<f32>]) -> Vec<u8> {
    build_tiff::<colortype::Gray16>(frames, |v| v as u16)
}

pub fn build_tiff_f32(frames: &[Array2<f32>]) -> Vec<u8> {
    build_tiff::<colortype::Gray32Float>(frames, |v| v)
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create session dir");
    }
    std::fs::write(&path, bytes).expect("write session file");
    path
}

/// Deterministic texture defined on the whole integer plane, so shifted
/// copies can be built without edge effects.
pub fn texture(x: i64, y: i64) -> f32 {
    let v = (x * 73_856_093) ^ (y * 19_349_663);
    (v.rem_euclid(1000) + 100) as f32
}

/// `height x width` frame whose content is the texture moved by `(dx, dy)`.
pub fn shifted_texture(height: usize, width: usize, dx: i64, dy: i64) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        texture(c as i64 - dx, r as i64 - dy)
    })
}

/// Frame filled with a constant value.
pub fn flat(height: usize, width: usize, value: f32) -> Array2<f32> {
    Array2::from_elem((height, width), value)
}
