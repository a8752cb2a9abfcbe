use anyhow::Result;
use clap::Args;

use crate::summary::print_parameters;

use super::{find_session, SessionArgs};

#[derive(Args)]
pub struct ParamsArgs {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Session to edit (relative path or unique file name)
    #[arg(long = "session", value_name = "NAME")]
    pub target: Option<String>,

    /// Make this session the reference
    #[arg(long, value_name = "NAME", conflicts_with = "target")]
    pub reference: Option<String>,

    /// Horizontal shift in pixels
    #[arg(long, requires = "target", allow_hyphen_values = true)]
    pub shift_x: Option<f64>,

    /// Vertical shift in pixels
    #[arg(long, requires = "target", allow_hyphen_values = true)]
    pub shift_y: Option<f64>,

    /// Rotation in degrees, counter-clockwise as displayed
    #[arg(long, requires = "target", allow_hyphen_values = true)]
    pub rotation: Option<f64>,

    /// Isotropic scale factor
    #[arg(long, requires = "target")]
    pub scale: Option<f64>,

    /// Overlay opacity used for previews
    #[arg(long, requires = "target")]
    pub alpha: Option<f32>,

    /// Reset the session to the identity transform
    #[arg(long, requires = "target")]
    pub reset: bool,
}

impl ParamsArgs {
    fn edits(&self) -> bool {
        self.reset
            || self.shift_x.is_some()
            || self.shift_y.is_some()
            || self.rotation.is_some()
            || self.scale.is_some()
            || self.alpha.is_some()
    }
}

pub fn run(args: &ParamsArgs) -> Result<()> {
    let config = args.session.load_config()?;
    let sessions = args.session.sessions()?;
    let mut params = args.session.load_params(&sessions, &config)?;
    let mut changed = false;

    if let Some(ref name) = args.reference {
        let session = find_session(&sessions, name)?;
        params.set_reference(session.name.clone());
        changed = true;
    }

    if let Some(ref name) = args.target {
        let session = find_session(&sessions, name)?;
        if args.edits() {
            let mut p = if args.reset {
                Default::default()
            } else {
                params.get(&session.name)
            };
            p.shift_x = args.shift_x.unwrap_or(p.shift_x);
            p.shift_y = args.shift_y.unwrap_or(p.shift_y);
            p.rotation_deg = args.rotation.unwrap_or(p.rotation_deg);
            p.scale = args.scale.unwrap_or(p.scale);
            p.alpha = args.alpha.unwrap_or(p.alpha);
            params.set(&session.name, p)?;
            changed = true;
        } else {
            println!("{}: {}", session.name, params.get(&session.name));
            return Ok(());
        }
    }

    if changed {
        args.session.save_params(&params)?;
        println!("Parameters saved to {}", args.session.params_path().display());
    }
    print_parameters(&params, &sessions);
    Ok(())
}
