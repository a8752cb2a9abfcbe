use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sessalign_core::io::image_io::save_image;
use sessalign_core::io::source::FileOpener;
use sessalign_core::stack::mean::compute_mean_frames;

use crate::progress::BarReporter;

use super::SessionArgs;

#[derive(Args)]
pub struct MeanArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Directory for the preview images [default: <folder>/mean]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Preview image format
    #[arg(long, default_value = "tiff")]
    pub extension: String,
}

pub fn run(args: &MeanArgs) -> Result<()> {
    let config = args.session.load_config()?;
    let sessions = args.session.sessions()?;
    let out_dir = args
        .output
        .clone()
        .unwrap_or_else(|| args.session.folder.join("mean"));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let reporter = BarReporter::new();
    let means = compute_mean_frames(&sessions, &FileOpener, config.mean_frame_count, &reporter)?;

    for mean in &means {
        let file_name = format!("{}.{}", mean.session.replace('/', "_"), args.extension);
        let path = out_dir.join(file_name);
        save_image(&mean.data, &path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        println!(
            "{:<30} {} of {} frames -> {}",
            mean.session,
            mean.frames_averaged,
            mean.total_frames,
            path.display()
        );
    }

    Ok(())
}
