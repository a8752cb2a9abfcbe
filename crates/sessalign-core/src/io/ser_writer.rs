use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Result, SessalignError};
use crate::frame::{Frame, SampleType};
use crate::io::ser::{SerHeader, SER_HEADER_SIZE, SER_MAGIC};
use crate::io::stack_writer::StackWriter;

/// Writes a mono SER file frame by frame.
pub struct SerWriter {
    writer: BufWriter<File>,
    header: SerHeader,
    sample_type: SampleType,
    frames_written: u32,
    row_buf: Vec<u8>,
}

impl SerWriter {
    /// Create a new SER file and write the header.
    pub fn create(path: &Path, header: &SerHeader) -> Result<Self> {
        let sample_type = header.sample_type()?;
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, header)?;
        Ok(Self {
            writer,
            header: header.clone(),
            sample_type,
            frames_written: 0,
            row_buf: Vec::with_capacity(header.width as usize * sample_type.bytes_per_sample()),
        })
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Encode and write a frame in the header's sample type.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let (h, w) = frame.data.dim();
        if h != self.header.height as usize || w != self.header.width as usize {
            return Err(SessalignError::DimensionMismatch {
                expected_width: self.header.width as usize,
                expected_height: self.header.height as usize,
                width: w,
                height: h,
            });
        }

        for row in frame.data.rows() {
            self.row_buf.clear();
            for &v in row {
                let v = self.sample_type.quantize(v);
                match self.sample_type {
                    SampleType::U8 => self.row_buf.push(v as u8),
                    _ => self.row_buf.extend_from_slice(&(v as u16).to_le_bytes()),
                }
            }
            self.writer.write_all(&self.row_buf)?;
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and finalize the file. Fails if fewer or more frames were
    /// written than the header announced.
    pub fn finalize(mut self) -> Result<()> {
        if self.frames_written != self.header.frame_count {
            return Err(SessalignError::FrameCountMismatch {
                expected: self.header.frame_count as usize,
                written: self.frames_written as usize,
            });
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

impl StackWriter for SerWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        SerWriter::write_frame(self, frame)
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.finalize()
    }
}

fn write_header(w: &mut impl Write, header: &SerHeader) -> Result<()> {
    w.write_all(SER_MAGIC)?;
    // LuID
    w.write_all(&0i32.to_le_bytes())?;
    w.write_all(&header.color_id.to_le_bytes())?;
    // LittleEndian flag: 0 = little-endian (Siril convention)
    let le_flag: i32 = if header.little_endian { 0 } else { 1 };
    w.write_all(&le_flag.to_le_bytes())?;
    w.write_all(&(header.width as i32).to_le_bytes())?;
    w.write_all(&(header.height as i32).to_le_bytes())?;
    w.write_all(&(header.pixel_depth as i32).to_le_bytes())?;
    w.write_all(&(header.frame_count as i32).to_le_bytes())?;
    write_fixed_string(w, &header.observer, 40)?;
    write_fixed_string(w, &header.instrument, 40)?;
    write_fixed_string(w, &header.telescope, 40)?;
    w.write_all(&header.date_time.to_le_bytes())?;
    w.write_all(&header.date_time_utc.to_le_bytes())?;

    debug_assert_eq!(
        14 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 40 + 40 + 40 + 8 + 8,
        SER_HEADER_SIZE
    );
    Ok(())
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> Result<()> {
    let bytes = s.as_bytes();
    let to_write = bytes.len().min(len);
    w.write_all(&bytes[..to_write])?;
    w.write_all(&vec![0u8; len - to_write])?;
    Ok(())
}
