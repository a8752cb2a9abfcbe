use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use sessalign_core::align::{
    align_all_sessions, align_current_session, overlay_preview, transform_array, SessionSearch,
};
use sessalign_core::io::image_io::save_image;
use sessalign_core::io::source::FileOpener;
use sessalign_core::session::{ParameterSet, Session};
use sessalign_core::stack::mean::{compute_mean_frames, MeanFrame};

use crate::progress::BarReporter;
use crate::summary::{print_parameters, print_search_results, print_search_space};

use super::{find_session, SessionArgs};

#[derive(Args)]
pub struct AlignArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Align only this session (relative path or unique file name)
    #[arg(long = "session", value_name = "NAME", conflicts_with = "all")]
    pub target: Option<String>,

    /// Align every non-reference session (the default)
    #[arg(long)]
    pub all: bool,

    /// Save a reference/aligned overlay of the searched session
    #[arg(long, requires = "target")]
    pub preview: Option<PathBuf>,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let config = args.session.load_config()?;
    let sessions = args.session.sessions()?;
    let mut params = args.session.load_params(&sessions, &config)?;

    println!("Reference:   {}", params.reference_session);
    print_search_space(&config.search);
    println!();

    let reporter = BarReporter::new();
    let results = match args.target {
        Some(ref name) => {
            let moving = find_session(&sessions, name)?;
            if params.is_reference(&moving.name) {
                bail!("{} is the reference session and stays fixed", moving.name);
            }
            let reference = find_session(&sessions, &params.reference_session)?;
            let subset: Vec<Session> = vec![reference.clone(), moving.clone()];
            let means =
                compute_mean_frames(&subset, &FileOpener, config.mean_frame_count, &reporter)?;

            let result = align_current_session(
                &means,
                &moving.name,
                &mut params,
                &config.search,
                &config.crop,
                &reporter,
            );
            if let (Ok(_), Some(ref path)) = (&result, &args.preview) {
                save_preview(&means, &moving.name, &params, path)?;
            }
            vec![SessionSearch {
                session: moving.name.clone(),
                result,
            }]
        }
        None => {
            let means =
                compute_mean_frames(&sessions, &FileOpener, config.mean_frame_count, &reporter)?;
            align_all_sessions(&means, &mut params, &config.search, &config.crop, &reporter)?
        }
    };

    print_search_results(&results);
    args.session.save_params(&params)?;
    print_parameters(&params, &sessions);
    println!("Parameters saved to {}", args.session.params_path().display());

    if results.iter().any(|r| r.result.is_err()) {
        bail!("Some sessions could not be aligned");
    }
    Ok(())
}

fn save_preview(
    means: &[MeanFrame],
    moving: &str,
    params: &ParameterSet,
    path: &Path,
) -> Result<()> {
    let mean_of = |name: &str| {
        means
            .iter()
            .find(|m| m.session == name)
            .with_context(|| format!("Mean frame of {} is missing", name))
    };
    let reference = mean_of(&params.reference_session)?;
    let candidate = mean_of(moving)?;
    let p = params.get(moving);
    let aligned = transform_array(&candidate.data, &p)?;
    let preview = overlay_preview(&reference.data, &aligned, p.alpha)?;
    save_image(&preview, path).with_context(|| format!("Failed to save {}", path.display()))?;
    println!("Overlay preview saved to {}", path.display());
    Ok(())
}
