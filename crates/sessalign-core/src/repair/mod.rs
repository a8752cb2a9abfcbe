pub mod blocked_rows;

pub use blocked_rows::{interpolate_blocked_rows, BlockDetectionConfig, BlockedRowMask};
