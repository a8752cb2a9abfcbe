use tracing::{info, warn};

use crate::error::{Result, SessalignError};
use crate::pipeline::{PipelineStage, ProgressReporter};
use crate::session::ParameterSet;
use crate::stack::mean::MeanFrame;

use super::grid_search::{grid_search_with_progress, SearchOutcome, SearchSpace};
use super::metric::CropRegion;

/// Result of searching one moving session.
#[derive(Debug)]
pub struct SessionSearch {
    pub session: String,
    pub result: Result<SearchOutcome>,
}

fn find_mean<'a>(means: &'a [MeanFrame], session: &str) -> Result<&'a MeanFrame> {
    means
        .iter()
        .find(|m| m.session == session)
        .ok_or_else(|| {
            SessalignError::InvalidParameters(format!("no mean frame for session {}", session))
        })
}

/// Search the transform of one moving session against the reference and
/// store it in `params`.
///
/// The session's current transform seeds the disabled axes. `params` is
/// only updated when the search succeeds.
pub fn align_current_session(
    means: &[MeanFrame],
    moving: &str,
    params: &mut ParameterSet,
    space: &SearchSpace,
    crop: &CropRegion,
    reporter: &dyn ProgressReporter,
) -> Result<SearchOutcome> {
    if params.is_reference(moving) {
        return Err(SessalignError::InvalidParameters(format!(
            "{} is the reference session and stays fixed",
            moving
        )));
    }
    let reference = find_mean(means, &params.reference_session)?;
    let candidate = find_mean(means, moving)?;
    let base = params.get(moving);

    reporter.begin_stage(PipelineStage::Searching, Some(space.point_count()));
    let outcome = grid_search_with_progress(
        &reference.data,
        &candidate.data,
        space,
        crop,
        &base,
        |done| reporter.advance(done),
    );
    reporter.finish_stage();

    let outcome = outcome?;
    params.set(moving, outcome.params)?;
    info!(
        session = moving,
        score = outcome.score,
        params = %outcome.params,
        "Session aligned"
    );
    Ok(outcome)
}

/// Search every non-reference session against the fixed reference.
///
/// A failure in one session is reported in its `SessionSearch` and leaves
/// its stored transform untouched; the other sessions still run. Fails as a
/// whole only when the reference mean frame is missing.
pub fn align_all_sessions(
    means: &[MeanFrame],
    params: &mut ParameterSet,
    space: &SearchSpace,
    crop: &CropRegion,
    reporter: &dyn ProgressReporter,
) -> Result<Vec<SessionSearch>> {
    find_mean(means, &params.reference_session)?;

    let moving: Vec<String> = means
        .iter()
        .map(|m| m.session.clone())
        .filter(|s| !params.is_reference(s))
        .collect();

    let mut results = Vec::with_capacity(moving.len());
    for session in moving {
        let result = align_current_session(means, &session, params, space, crop, reporter);
        if let Err(ref e) = result {
            warn!(session = %session, error = %e, "Session search failed");
        }
        results.push(SessionSearch { session, result });
    }
    Ok(results)
}
