//! `slipway list` command

use anyhow::Result;

use crate::cli::ListArgs;
use slipway::ops;

pub fn execute(args: ListArgs) -> Result<()> {
    let listings = ops::list(&args.root)?;

    if listings.is_empty() {
        eprintln!("no modules found under {}", args.root.display());
        return Ok(());
    }

    for module in &listings {
        println!("{}", module.path);
        for rule in &module.rules {
            if rule.deps.is_empty() {
                println!("  :{} ({})", rule.name, rule.kind);
            } else {
                println!(
                    "  :{} ({}) deps: {}",
                    rule.name,
                    rule.kind,
                    rule.deps.join(", ")
                );
            }
        }
    }

    Ok(())
}
