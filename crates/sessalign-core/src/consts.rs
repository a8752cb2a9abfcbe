/// Minimum number of grid points before the search fans out over Rayon.
pub const PARALLEL_GRID_THRESHOLD: usize = 8;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Number of leading frames averaged into a session's mean frame.
pub const DEFAULT_MEAN_FRAME_COUNT: usize = 100;

/// Tolerance used when counting grid points, so `(max - min) / step`
/// landing a hair below an integer still includes `max`.
pub const GRID_STEP_EPSILON: f64 = 1e-9;

/// Upper bound on the number of points a grid search may enumerate.
pub const MAX_GRID_POINTS: usize = 1_000_000;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;

/// Largest raw sample value in SBX recordings; stored values are inverted
/// against it on read.
pub const SBX_MAX_SAMPLE: u16 = u16::MAX;

/// Default overlay opacity for preview blending.
pub const DEFAULT_OVERLAY_ALPHA: f32 = 0.5;

/// Version tag written into persisted parameter files.
pub const PARAMETER_FILE_VERSION: u32 = 1;

/// Suffix appended to the export path while frames are still being written.
pub const PARTIAL_OUTPUT_SUFFIX: &str = "partial";
