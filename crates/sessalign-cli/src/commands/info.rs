use anyhow::{Context, Result};
use clap::Args;
use sessalign_core::io::source::{open_with_fallback, FileOpener};

use super::SessionArgs;

#[derive(Args)]
pub struct InfoArgs {
    #[command(flatten)]
    pub session: SessionArgs,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let sessions = args.session.sessions()?;

    println!("Folder:      {}", args.session.folder.display());
    println!("Sessions:    {}", sessions.len());
    println!();

    let mut total_frames = 0usize;
    for session in &sessions {
        let opened = open_with_fallback(&FileOpener, session)
            .with_context(|| format!("Failed to open {}", session.path.display()))?;
        let info = opened.source.info();
        total_frames += info.total_frames;

        println!("Session:     {}", session.name);
        println!("  Format:    {}", info.format);
        println!("  Frames:    {}", info.total_frames);
        println!("  Size:      {}x{}", info.width, info.height);
        println!("  Samples:   {}", info.sample_type);
        println!("  Access:    {}", opened.tier);

        let frame_bytes = info.width as f64
            * info.height as f64
            * info.sample_type.bytes_per_sample() as f64;
        let total_mb = frame_bytes * info.total_frames as f64 / (1024.0 * 1024.0);
        println!("  Data size: {:.1} MB", total_mb);
    }

    println!();
    println!("Total frames: {}", total_frames);
    Ok(())
}
