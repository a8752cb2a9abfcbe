#[allow(dead_code)]
mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use tempfile::TempDir;

use sessalign_core::align::AlignmentParameters;
use sessalign_core::error::{Result, SessalignError};
use sessalign_core::frame::SourceFormat;
use sessalign_core::frame::SampleType;
use sessalign_core::io::source::{AccessTier, BufferedStack, FileOpener, FrameSource, SourceOpener};
use sessalign_core::io::tiff_stack::BufferedTiff;
use sessalign_core::pipeline::{export_sessions, AccessEvent, ExportOptions, NoOpReporter};
use sessalign_core::repair::BlockDetectionConfig;
use sessalign_core::session::{discover_sessions, ParameterSet, Session};

use common::{build_ser_u16, build_ser_u8, build_tiff_f32, shifted_texture, write_file};

/// Two sessions: `a.ser` with 3 frames and `b.ser` with 2, 12x10 u16.
fn two_sessions(dir: &Path) -> (Vec<Session>, Vec<Array2<f32>>, Vec<Array2<f32>>) {
    let a: Vec<Array2<f32>> = (0..3).map(|i| shifted_texture(10, 12, i, 0)).collect();
    let b: Vec<Array2<f32>> = (0..2).map(|i| shifted_texture(10, 12, 0, i)).collect();
    write_file(dir, "a.ser", &build_ser_u16(&a));
    write_file(dir, "b.ser", &build_ser_u16(&b));
    let sessions = discover_sessions(dir, SourceFormat::Ser).unwrap();
    (sessions, a, b)
}

fn read_output(path: &Path) -> Vec<Array2<f32>> {
    let source = BufferedStack::open(&Session::new("out", path, SourceFormat::Ser)).unwrap();
    (0..source.frame_count())
        .map(|i| source.read_frame(i).unwrap().data)
        .collect()
}

fn options(dir: &Path) -> ExportOptions {
    ExportOptions {
        output: dir.join("aligned.ser"),
        repair: None,
    }
}

fn partial_exists(dir: &Path) -> bool {
    dir.join("aligned.ser.partial").exists()
}

// ---------------------------------------------------------------------------
// Output content
// ---------------------------------------------------------------------------

#[test]
fn test_export_concatenates_in_session_order() {
    let dir = TempDir::new().unwrap();
    let (sessions, a, b) = two_sessions(dir.path());
    let mut params = ParameterSet::for_sessions(&sessions).unwrap();
    params
        .set("b.ser", AlignmentParameters::new(2.0, 0.0, 0.0, 1.0))
        .unwrap();

    let opts = options(dir.path());
    let report = export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter).unwrap();
    assert_eq!(report.frames_written, 5);
    assert!(!report.degraded());
    assert!(!partial_exists(dir.path()));

    let out = read_output(&opts.output);
    assert_eq!(out.len(), 5);
    // Reference frames pass through unchanged.
    assert_eq!(&out[..3], &a[..]);
    // Moving frames are shifted right by two, zero-filled on the left.
    for (written, source) in out[3..].iter().zip(&b) {
        assert_ne!(written, source);
        for r in 0..10 {
            assert_eq!(written[[r, 0]], 0.0);
            assert_eq!(written[[r, 1]], 0.0);
            for c in 2..12 {
                assert_eq!(written[[r, c]], source[[r, c - 2]]);
            }
        }
    }

    assert_eq!(report.sessions.len(), 2);
    assert!(!report.sessions[0].transformed);
    assert!(report.sessions[1].transformed);
    assert_eq!(report.sessions[1].tier, AccessTier::Mapped);
}

#[test]
fn test_identity_export_copies_all_frames() {
    let dir = TempDir::new().unwrap();
    let (sessions, a, b) = two_sessions(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();
    let opts = options(dir.path());
    export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter).unwrap();

    let expected: Vec<Array2<f32>> = a.into_iter().chain(b).collect();
    assert_eq!(read_output(&opts.output), expected);
}

#[test]
fn test_reference_other_than_first_stays_unchanged() {
    let dir = TempDir::new().unwrap();
    let (sessions, a, b) = two_sessions(dir.path());
    let mut params = ParameterSet::for_sessions(&sessions).unwrap();
    params.set_reference("b.ser");
    params
        .set("a.ser", AlignmentParameters::new(0.0, 1.0, 0.0, 1.0))
        .unwrap();

    let opts = options(dir.path());
    export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter).unwrap();
    let out = read_output(&opts.output);
    assert_ne!(out[0], a[0]);
    assert_eq!(&out[3..], &b[..]);
}

#[test]
fn test_export_repairs_blocked_rows_within_session() {
    let dir = TempDir::new().unwrap();
    let mut frames: Vec<Array2<f32>> = [300.0, 500.0, 700.0]
        .iter()
        .map(|&v| Array2::from_elem((4, 4), v))
        .collect();
    frames[1].row_mut(2).fill(0.0);
    write_file(dir.path(), "a.ser", &build_ser_u16(&frames));
    let sessions = discover_sessions(dir.path(), SourceFormat::Ser).unwrap();
    let params = ParameterSet::for_sessions(&sessions).unwrap();

    let opts = ExportOptions {
        output: dir.path().join("aligned.ser"),
        repair: Some(BlockDetectionConfig::new(100.0, 1)),
    };
    let report = export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter).unwrap();
    assert_eq!(report.sessions[0].repaired_rows, 1);

    let out = read_output(&opts.output);
    assert_eq!(out[1].row(2).to_vec(), vec![500.0; 4]);
    assert_eq!(out[1].row(1).to_vec(), vec![500.0; 4]);
}

// ---------------------------------------------------------------------------
// Output formats
// ---------------------------------------------------------------------------

fn read_tiff_output(path: &Path) -> (SampleType, Vec<Array2<f32>>) {
    let source = BufferedTiff::open(&Session::new("out", path, SourceFormat::Tiff)).unwrap();
    let frames = (0..source.frame_count())
        .map(|i| source.read_frame(i).unwrap().data)
        .collect();
    (source.sample_type(), frames)
}

#[test]
fn test_tiff_output_holds_every_frame() {
    let dir = TempDir::new().unwrap();
    let (sessions, a, b) = two_sessions(dir.path());
    let mut params = ParameterSet::for_sessions(&sessions).unwrap();
    params
        .set("b.ser", AlignmentParameters::new(0.0, 1.0, 0.0, 1.0))
        .unwrap();
    let opts = ExportOptions {
        output: dir.path().join("aligned.tif"),
        repair: None,
    };
    let report = export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter).unwrap();
    assert_eq!(report.frames_written, 5);
    assert!(!dir.path().join("aligned.tif.partial").exists());

    let (sample_type, out) = read_tiff_output(&opts.output);
    assert_eq!(sample_type, SampleType::U16);
    assert_eq!(out.len(), 5);
    assert_eq!(&out[..3], &a[..]);
    // Shifted down by one, zero-filled on top.
    assert!(out[3].row(0).iter().all(|&v| v == 0.0));
    assert_eq!(out[3].row(1), b[0].row(0));
}

/// One float TIFF session of two 6x5 frames.
fn float_session(dir: &Path) -> (Vec<Session>, Vec<Array2<f32>>) {
    let frames: Vec<Array2<f32>> = (0..2)
        .map(|i| shifted_texture(5, 6, i, 0).mapv(|v| v / 7.0))
        .collect();
    write_file(dir, "a.tif", &build_tiff_f32(&frames));
    let sessions = discover_sessions(dir, SourceFormat::Tiff).unwrap();
    (sessions, frames)
}

#[test]
fn test_float_sources_export_to_tiff_unchanged() {
    let dir = TempDir::new().unwrap();
    let (sessions, frames) = float_session(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();
    let opts = ExportOptions {
        output: dir.path().join("out/aligned.tiff"),
        repair: None,
    };
    std::fs::create_dir_all(dir.path().join("out")).unwrap();
    export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter).unwrap();

    let (sample_type, out) = read_tiff_output(&opts.output);
    assert_eq!(sample_type, SampleType::F32);
    assert_eq!(out, frames);
}

#[test]
fn test_float_sources_cannot_become_ser() {
    let dir = TempDir::new().unwrap();
    let (sessions, _) = float_session(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();
    let opts = options(dir.path());
    assert!(matches!(
        export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter),
        Err(SessalignError::UnsupportedSampleType(_))
    ));
    assert!(!opts.output.exists());
    assert!(!partial_exists(dir.path()));
}

#[test]
fn test_unknown_output_extension_rejected() {
    let dir = TempDir::new().unwrap();
    let (sessions, _, _) = two_sessions(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();
    let opts = ExportOptions {
        output: dir.path().join("aligned.avi"),
        repair: None,
    };
    assert!(matches!(
        export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter),
        Err(SessalignError::InvalidParameters(_))
    ));
    assert!(!opts.output.exists());
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn test_mismatched_dimensions_rejected() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.ser", &build_ser_u16(&[shifted_texture(10, 12, 0, 0)]));
    write_file(dir.path(), "b.ser", &build_ser_u16(&[shifted_texture(10, 11, 0, 0)]));
    let sessions = discover_sessions(dir.path(), SourceFormat::Ser).unwrap();
    let params = ParameterSet::for_sessions(&sessions).unwrap();

    let opts = options(dir.path());
    assert!(matches!(
        export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter),
        Err(SessalignError::DimensionMismatch { .. })
    ));
    assert!(!opts.output.exists());
}

#[test]
fn test_mixed_sample_types_rejected() {
    let dir = TempDir::new().unwrap();
    let frame = Array2::from_elem((4, 4), 10.0);
    write_file(dir.path(), "a.ser", &build_ser_u16(&[frame.clone()]));
    write_file(dir.path(), "b.ser", &build_ser_u8(&[frame]));
    let sessions = discover_sessions(dir.path(), SourceFormat::Ser).unwrap();
    let params = ParameterSet::for_sessions(&sessions).unwrap();
    assert!(matches!(
        export_sessions(&sessions, &params, &options(dir.path()), &FileOpener, &NoOpReporter),
        Err(SessalignError::UnsupportedSampleType(_))
    ));
}

#[test]
fn test_reference_outside_session_list_rejected() {
    let dir = TempDir::new().unwrap();
    let (sessions, _, _) = two_sessions(dir.path());
    let params = ParameterSet::new("missing.ser", ["a.ser", "b.ser"]);
    assert!(matches!(
        export_sessions(&sessions, &params, &options(dir.path()), &FileOpener, &NoOpReporter),
        Err(SessalignError::InvalidParameters(_))
    ));
}

#[test]
fn test_invalid_repair_threshold_rejected() {
    let dir = TempDir::new().unwrap();
    let (sessions, _, _) = two_sessions(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();
    let opts = ExportOptions {
        output: dir.path().join("aligned.ser"),
        repair: Some(BlockDetectionConfig::new(-5.0, 1)),
    };
    assert!(matches!(
        export_sessions(&sessions, &params, &opts, &FileOpener, &NoOpReporter),
        Err(SessalignError::InvalidThreshold(_))
    ));
}

// ---------------------------------------------------------------------------
// Source access
// ---------------------------------------------------------------------------

/// Memory mapping always fails; full reads work.
struct MapRefused;

impl SourceOpener for MapRefused {
    fn open_mapped(&self, _session: &Session) -> Result<Box<dyn FrameSource>> {
        Err(std::io::Error::other("mapping refused").into())
    }

    fn open_buffered(&self, session: &Session) -> Result<Box<dyn FrameSource>> {
        FileOpener.open_buffered(session)
    }
}

/// Both tiers fail for one session once it has been opened `allowed` times.
struct BrokenAfter {
    session: &'static str,
    allowed: usize,
    opens: AtomicUsize,
}

impl BrokenAfter {
    fn new(session: &'static str, allowed: usize) -> Self {
        Self {
            session,
            allowed,
            opens: AtomicUsize::new(0),
        }
    }

    fn broken(&self, session: &Session) -> bool {
        session.name == self.session && self.opens.load(Ordering::SeqCst) >= self.allowed
    }
}

impl SourceOpener for BrokenAfter {
    fn open_mapped(&self, session: &Session) -> Result<Box<dyn FrameSource>> {
        if self.broken(session) {
            return Err(std::io::Error::other("device gone").into());
        }
        if session.name == self.session {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }
        FileOpener.open_mapped(session)
    }

    fn open_buffered(&self, session: &Session) -> Result<Box<dyn FrameSource>> {
        if self.broken(session) {
            return Err(std::io::Error::other("device gone").into());
        }
        FileOpener.open_buffered(session)
    }
}

#[test]
fn test_mapping_failure_degrades_but_succeeds() {
    let dir = TempDir::new().unwrap();
    let (sessions, a, b) = two_sessions(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();

    let opts = options(dir.path());
    let report = export_sessions(&sessions, &params, &opts, &MapRefused, &NoOpReporter).unwrap();

    assert!(report.degraded());
    assert_eq!(report.events.len(), 2);
    match &report.events[0] {
        AccessEvent::Degraded { session, reason } => {
            assert_eq!(session, "a.ser");
            assert!(reason.contains("mapping refused"));
        }
    }
    assert!(report.sessions.iter().all(|s| s.tier == AccessTier::Buffered));

    let expected: Vec<Array2<f32>> = a.into_iter().chain(b).collect();
    assert_eq!(read_output(&opts.output), expected);
}

#[test]
fn test_unreadable_session_fails_before_writing() {
    let dir = TempDir::new().unwrap();
    let (sessions, _, _) = two_sessions(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();

    let opts = options(dir.path());
    let opener = BrokenAfter::new("b.ser", 0);
    assert!(matches!(
        export_sessions(&sessions, &params, &opts, &opener, &NoOpReporter),
        Err(SessalignError::SourceAccessFailed { .. })
    ));
    assert!(!opts.output.exists());
    assert!(!partial_exists(dir.path()));
}

#[test]
fn test_failure_mid_export_removes_partial_output() {
    let dir = TempDir::new().unwrap();
    let (sessions, _, _) = two_sessions(dir.path());
    let params = ParameterSet::for_sessions(&sessions).unwrap();

    let opts = options(dir.path());
    // Readable while planning, gone by the time its frames are written.
    let opener = BrokenAfter::new("b.ser", 1);
    let result = export_sessions(&sessions, &params, &opts, &opener, &NoOpReporter);

    match result {
        Err(SessalignError::SourceAccessFailed { path, mapped, buffered }) => {
            assert!(path.ends_with("b.ser"));
            assert!(mapped.contains("device gone"));
            assert!(buffered.contains("device gone"));
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.frames_written)),
    }
    assert!(!opts.output.exists());
    assert!(!partial_exists(dir.path()));
}
