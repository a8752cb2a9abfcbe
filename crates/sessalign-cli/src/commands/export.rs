use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sessalign_core::io::source::FileOpener;
use sessalign_core::pipeline::{export_sessions, ExportOptions};

use crate::progress::BarReporter;
use crate::summary::{print_export_report, print_parameters};

use super::SessionArgs;

#[derive(Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Output stack, BigTIFF (.tif/.tiff) or SER (.ser) [default: <folder>/aligned.tif]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Repair shutter-blocked rows before transforming
    #[arg(long)]
    pub interpolate: bool,
}

pub fn run(args: &ExportArgs) -> Result<()> {
    let mut config = args.session.load_config()?;
    if args.interpolate {
        config.interpolate_on_export = true;
    }
    let sessions = args.session.sessions()?;
    let params = args.session.load_params(&sessions, &config)?;
    print_parameters(&params, &sessions);

    let options = ExportOptions {
        output: args
            .output
            .clone()
            .unwrap_or_else(|| args.session.folder.join("aligned.tif")),
        repair: config.export_repair(),
    };
    if let Some(ref repair) = options.repair {
        println!("Blocked-row repair: {}", repair);
    }

    let reporter = BarReporter::new();
    let report = export_sessions(&sessions, &params, &options, &FileOpener, &reporter)
        .with_context(|| format!("Export to {} failed", options.output.display()))?;

    print_export_report(&report);
    Ok(())
}
