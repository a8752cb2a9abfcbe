pub mod grid_search;
pub mod metric;
mod sessions;
pub mod transform;

pub use grid_search::{
    grid_search, grid_search_with_progress, SearchAxis, SearchOutcome, SearchSpace,
};
pub use metric::{similarity, CropRegion};
pub use sessions::{align_all_sessions, align_current_session, SessionSearch};
pub use transform::{overlay_preview, transform_array, transform_frame, AlignmentParameters};
