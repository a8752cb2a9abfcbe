#[allow(dead_code)]
mod common;

use ndarray::Array2;
use tempfile::TempDir;

use sessalign_core::error::{Result, SessalignError};
use sessalign_core::frame::{Frame, SampleType, SourceFormat};
use sessalign_core::io::ser::{parse_header, SerHeader};
use sessalign_core::io::ser_writer::SerWriter;
use sessalign_core::io::source::{
    frames, open_with_fallback, AccessTier, BufferedStack, FileOpener, FrameSource, MappedStack,
    SourceOpener,
};
use sessalign_core::pipeline::NoOpReporter;
use sessalign_core::session::{discover_sessions, Session};
use sessalign_core::stack::mean::{compute_mean_frames, mean_of_leading_frames, mean_stack};

use common::{build_ser_header, build_ser_u16, build_ser_u8, write_file};

fn ramp(h: usize, w: usize, start: f32) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(r, c)| start + (r * w + c) as f32)
}

// ---------------------------------------------------------------------------
// SER
// ---------------------------------------------------------------------------

#[test]
fn test_ser_u16_frames_read_back_exactly() {
    let dir = TempDir::new().unwrap();
    let data = vec![ramp(4, 6, 1000.0), ramp(4, 6, 60000.0)];
    let path = write_file(dir.path(), "a.ser", &build_ser_u16(&data));
    let session = Session::new("a.ser", path, SourceFormat::Ser);

    let source = MappedStack::open(&session).unwrap();
    assert_eq!(source.frame_count(), 2);
    assert_eq!(source.dims(), (4, 6));
    assert_eq!(source.sample_type(), SampleType::U16);
    assert_eq!(source.read_frame(1).unwrap().data, data[1]);
    assert_eq!(source.read_frame(1).unwrap().metadata.frame_index, 1);
}

#[test]
fn test_ser_u8_frames_read_back_exactly() {
    let dir = TempDir::new().unwrap();
    let data = vec![ramp(3, 3, 0.0), ramp(3, 3, 200.0)];
    let path = write_file(dir.path(), "a.ser", &build_ser_u8(&data));
    let session = Session::new("a.ser", path, SourceFormat::Ser);

    let source = BufferedStack::open(&session).unwrap();
    assert_eq!(source.sample_type(), SampleType::U8);
    let read: Vec<_> = frames(&source).map(|f| f.unwrap().data).collect();
    assert_eq!(read, data);
}

#[test]
fn test_frame_index_out_of_range() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.ser", &build_ser_u8(&[ramp(2, 2, 0.0)]));
    let source = MappedStack::open(&Session::new("a", path, SourceFormat::Ser)).unwrap();
    assert!(matches!(
        source.read_frame(1),
        Err(SessalignError::FrameIndexOutOfRange { index: 1, total: 1 })
    ));
}

#[test]
fn test_truncated_ser_rejected() {
    let dir = TempDir::new().unwrap();
    let mut bytes = build_ser_u16(&[ramp(4, 4, 0.0), ramp(4, 4, 0.0)]);
    bytes.truncate(bytes.len() - 3);
    let path = write_file(dir.path(), "a.ser", &bytes);
    let session = Session::new("a", path, SourceFormat::Ser);
    assert!(matches!(
        BufferedStack::open(&session),
        Err(SessalignError::InvalidSer(_))
    ));
}

#[test]
fn test_negative_header_dimensions_rejected() {
    let dir = TempDir::new().unwrap();
    let mut bytes = build_ser_header(1, 1, 16, 1);
    // Width and height fields hold -1.
    bytes[26..34].copy_from_slice(&[0xff; 8]);
    bytes.extend_from_slice(&[0u8; 64]);
    let path = write_file(dir.path(), "a.ser", &bytes);
    let session = Session::new("a", path, SourceFormat::Ser);
    assert!(matches!(
        BufferedStack::open(&session),
        Err(SessalignError::InvalidSer(_))
    ));
}

#[test]
fn test_unaddressable_ser_size_rejected() {
    let dir = TempDir::new().unwrap();
    let max = i32::MAX as u32;
    let mut bytes = build_ser_header(max, max, 16, max as usize);
    bytes.extend_from_slice(&[0u8; 64]);
    let path = write_file(dir.path(), "a.ser", &bytes);
    let session = Session::new("a", path, SourceFormat::Ser);
    assert!(matches!(
        BufferedStack::open(&session),
        Err(SessalignError::InvalidSer(_))
    ));
    assert!(matches!(
        MappedStack::open(&session),
        Err(SessalignError::InvalidSer(_))
    ));
}

#[test]
fn test_sbx_unaddressable_frame_size_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "rec.sbx", &[0u8; 8]);
    let session = Session::new(
        "rec.sbx",
        path,
        SourceFormat::Sbx {
            width: u32::MAX,
            height: u32::MAX,
        },
    );
    assert!(matches!(
        BufferedStack::open(&session),
        Err(SessalignError::InvalidDimensions { .. })
    ));
}

#[test]
fn test_bad_magic_rejected() {
    let mut bytes = build_ser_u8(&[ramp(2, 2, 0.0)]);
    bytes[0] = b'X';
    assert!(parse_header(&bytes).is_err());
    assert!(parse_header(&bytes[..10]).is_err());
}

#[test]
fn test_ser_header_counts_must_fit_signed_fields() {
    let too_many = i32::MAX as usize + 1;
    assert!(matches!(
        SerHeader::mono(4, 4, SampleType::U16, too_many),
        Err(SessalignError::InvalidSer(_))
    ));
    assert!(matches!(
        SerHeader::mono(too_many, 4, SampleType::U16, 1),
        Err(SessalignError::InvalidSer(_))
    ));
    let header = SerHeader::mono(4, 4, SampleType::U8, i32::MAX as usize).unwrap();
    assert_eq!(header.frame_count, i32::MAX as u32);
}

#[test]
fn test_ser_writer_round_trip_and_frame_count_check() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.ser");
    let header = SerHeader::mono(3, 2, SampleType::U16, 2).unwrap();

    let mut writer = SerWriter::create(&path, &header).unwrap();
    let first = Frame::new(ramp(2, 3, 10.0), SampleType::U16);
    writer.write_frame(&first).unwrap();
    // Out-of-range and fractional values are snapped to the sample type.
    let second = Frame::new(Array2::from_elem((2, 3), 70000.4), SampleType::U16);
    writer.write_frame(&second).unwrap();
    assert_eq!(writer.frames_written(), 2);
    writer.finalize().unwrap();

    let source = MappedStack::open(&Session::new("out", &path, SourceFormat::Ser)).unwrap();
    assert_eq!(source.read_frame(0).unwrap().data, first.data);
    assert_eq!(source.read_frame(1).unwrap().data, Array2::from_elem((2, 3), 65535.0));

    let short = dir.path().join("short.ser");
    let mut writer = SerWriter::create(&short, &header).unwrap();
    writer.write_frame(&first).unwrap();
    assert!(matches!(
        writer.finalize(),
        Err(SessalignError::FrameCountMismatch {
            expected: 2,
            written: 1
        })
    ));
}

// ---------------------------------------------------------------------------
// SBX
// ---------------------------------------------------------------------------

#[test]
fn test_sbx_values_are_inverted_and_partial_frames_ignored() {
    let dir = TempDir::new().unwrap();
    let raw: Vec<u16> = vec![0, 1, 65535, 65000, 10, 20, 30, 40];
    let mut bytes: Vec<u8> = raw.iter().flat_map(|v| v.to_le_bytes()).collect();
    bytes.extend_from_slice(&[1, 2, 3]);
    let path = write_file(dir.path(), "rec.sbx", &bytes);
    let session = Session::new(
        "rec.sbx",
        path,
        SourceFormat::Sbx {
            width: 2,
            height: 2,
        },
    );

    let source = MappedStack::open(&session).unwrap();
    assert_eq!(source.frame_count(), 2);
    assert_eq!(source.sample_type(), SampleType::U16);
    let first = source.read_frame(0).unwrap().data;
    assert_eq!(first[[0, 0]], 65535.0);
    assert_eq!(first[[0, 1]], 65534.0);
    assert_eq!(first[[1, 0]], 0.0);
    assert_eq!(first[[1, 1]], 535.0);

    let buffered = BufferedStack::open(&session).unwrap();
    assert_eq!(buffered.read_frame(1).unwrap().data, source.read_frame(1).unwrap().data);
}

#[test]
fn test_sbx_zero_dimensions_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "rec.sbx", &[0u8; 8]);
    let session = Session::new(
        "rec.sbx",
        path,
        SourceFormat::Sbx {
            width: 0,
            height: 2,
        },
    );
    assert!(matches!(
        BufferedStack::open(&session),
        Err(SessalignError::InvalidDimensions { .. })
    ));
}

// ---------------------------------------------------------------------------
// Two-tier access
// ---------------------------------------------------------------------------

struct MapRefused;

impl SourceOpener for MapRefused {
    fn open_mapped(&self, _session: &Session) -> Result<Box<dyn FrameSource>> {
        Err(std::io::Error::other("mapping refused").into())
    }

    fn open_buffered(&self, session: &Session) -> Result<Box<dyn FrameSource>> {
        FileOpener.open_buffered(session)
    }
}

#[test]
fn test_mapped_tier_used_when_available() {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "a.ser", &build_ser_u8(&[ramp(2, 2, 0.0)]));
    let session = Session::new("a", path, SourceFormat::Ser);
    let opened = open_with_fallback(&FileOpener, &session).unwrap();
    assert_eq!(opened.tier, AccessTier::Mapped);
    assert!(opened.degraded_reason.is_none());
}

#[test]
fn test_falls_back_to_buffered_read() {
    let dir = TempDir::new().unwrap();
    let data = vec![ramp(2, 2, 5.0)];
    let path = write_file(dir.path(), "a.ser", &build_ser_u8(&data));
    let session = Session::new("a", path, SourceFormat::Ser);
    let opened = open_with_fallback(&MapRefused, &session).unwrap();
    assert_eq!(opened.tier, AccessTier::Buffered);
    assert!(opened.degraded_reason.unwrap().contains("mapping refused"));
    assert_eq!(opened.source.read_frame(0).unwrap().data, data[0]);
}

#[test]
fn test_missing_file_fails_both_tiers() {
    let dir = TempDir::new().unwrap();
    let session = Session::new("gone", dir.path().join("gone.ser"), SourceFormat::Ser);
    match open_with_fallback(&FileOpener, &session) {
        Err(SessalignError::SourceAccessFailed { path, .. }) => assert_eq!(path, session.path),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("missing file opened"),
    }
}

// ---------------------------------------------------------------------------
// Discovery and mean frames
// ---------------------------------------------------------------------------

#[test]
fn test_discovery_is_recursive_and_sorted() {
    let dir = TempDir::new().unwrap();
    let bytes = build_ser_u8(&[ramp(2, 2, 0.0)]);
    write_file(dir.path(), "b.ser", &bytes);
    write_file(dir.path(), "a/day2.SER", &bytes);
    write_file(dir.path(), "a/day1.ser", &bytes);
    write_file(dir.path(), "notes.txt", b"ignored");

    let sessions = discover_sessions(dir.path(), SourceFormat::Ser).unwrap();
    let names: Vec<&str> = sessions.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a/day1.ser", "a/day2.SER", "b.ser"]);
}

#[test]
fn test_mean_uses_leading_frames_only() {
    let dir = TempDir::new().unwrap();
    let data = vec![
        Array2::from_elem((2, 2), 10.0),
        Array2::from_elem((2, 2), 20.0),
        Array2::from_elem((2, 2), 90.0),
    ];
    let path = write_file(dir.path(), "a.ser", &build_ser_u8(&data));
    let session = Session::new("a.ser", path, SourceFormat::Ser);

    let source = BufferedStack::open(&session).unwrap();
    assert_eq!(mean_of_leading_frames(&source, 2).unwrap(), Array2::from_elem((2, 2), 15.0));
    assert_eq!(mean_of_leading_frames(&source, 100).unwrap(), Array2::from_elem((2, 2), 40.0));

    let means = compute_mean_frames(&[session], &FileOpener, 2, &NoOpReporter).unwrap();
    assert_eq!(means[0].frames_averaged, 2);
    assert_eq!(means[0].total_frames, 3);
    assert_eq!(means[0].sample_type, SampleType::U8);
}

#[test]
fn test_mean_stack_rejects_empty_and_mismatched() {
    assert!(matches!(mean_stack(&[]), Err(SessalignError::EmptySequence)));
    let frames = vec![
        Frame::new(Array2::zeros((2, 2)), SampleType::U8),
        Frame::new(Array2::zeros((2, 3)), SampleType::U8),
    ];
    assert!(matches!(
        mean_stack(&frames),
        Err(SessalignError::DimensionMismatch { .. })
    ));
}
