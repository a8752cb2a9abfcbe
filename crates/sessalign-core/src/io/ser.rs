use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Result, SessalignError};
use crate::frame::SampleType;

pub const SER_HEADER_SIZE: usize = 178;
pub const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// SER color IDs with three interleaved planes per pixel.
const SER_RGB_COLOR_IDS: [i32; 2] = [100, 101];

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Header for a mono little-endian stack written by this crate.
    ///
    /// The header stores every count as a signed 32-bit field; values that
    /// do not fit are rejected.
    pub fn mono(
        width: usize,
        height: usize,
        sample_type: SampleType,
        frame_count: usize,
    ) -> Result<Self> {
        Ok(Self {
            color_id: 0,
            little_endian: true,
            width: header_count(width, "width")?,
            height: header_count(height, "height")?,
            pixel_depth: sample_type.bit_depth(),
            frame_count: header_count(frame_count, "frame count")?,
            observer: String::new(),
            instrument: "sessalign".into(),
            telescope: String::new(),
            date_time: 0,
            date_time_utc: 0,
        })
    }

    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_pixel_plane(&self) -> usize {
        if self.pixel_depth <= 8 {
            1
        } else {
            2
        }
    }

    pub fn sample_type(&self) -> Result<SampleType> {
        if SER_RGB_COLOR_IDS.contains(&self.color_id) {
            return Err(SessalignError::UnsupportedSampleType(format!(
                "SER color id {} (interleaved RGB)",
                self.color_id
            )));
        }
        SampleType::from_bit_depth(self.pixel_depth).ok_or_else(|| {
            SessalignError::UnsupportedSampleType(format!("{}-bit SER data", self.pixel_depth))
        })
    }

    /// Total bytes per frame, or `None` if it does not fit in `usize`.
    pub fn frame_byte_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(self.bytes_per_pixel_plane())
    }
}

/// Parse and validate the header at the start of a SER file.
pub fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    if buf.len() < SER_HEADER_SIZE {
        return Err(SessalignError::InvalidSer(
            "File too small for SER header".into(),
        ));
    }
    if &buf[0..14] != SER_MAGIC {
        return Err(SessalignError::InvalidSer(
            "Missing LUCAM-RECORDER magic".into(),
        ));
    }

    let mut cursor = std::io::Cursor::new(&buf[14..]);
    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = read_count(&mut cursor, "width")?;
    let height = read_count(&mut cursor, "height")?;
    let pixel_depth = read_count(&mut cursor, "pixel depth")?;
    let frame_count = read_count(&mut cursor, "frame count")?;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..SER_HEADER_SIZE]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(SessalignError::InvalidDimensions { width, height });
    }

    // A zero flag is little-endian in practice (Siril convention).
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn header_count(value: usize, field: &str) -> Result<u32> {
    i32::try_from(value)
        .map(|v| v as u32)
        .map_err(|_| {
            SessalignError::InvalidSer(format!("{} {} exceeds the header range", field, value))
        })
}

/// Header counts are stored signed; negative values are corrupt.
fn read_count(cursor: &mut std::io::Cursor<&[u8]>, field: &str) -> Result<u32> {
    let value = cursor.read_i32::<LittleEndian>()?;
    u32::try_from(value)
        .map_err(|_| SessalignError::InvalidSer(format!("negative {} ({})", field, value)))
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
