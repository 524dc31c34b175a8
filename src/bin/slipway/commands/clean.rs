//! `slipway clean` command

use anyhow::Result;

use crate::cli::CleanArgs;
use slipway::util::fs::remove_dir_all_if_exists;

pub fn execute(args: CleanArgs) -> Result<()> {
    let out_dir = args.root.join("out");

    remove_dir_all_if_exists(&out_dir)?;
    eprintln!("     Removed {}", out_dir.display());

    Ok(())
}
