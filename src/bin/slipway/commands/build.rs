//! `slipway build` command

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::BuildArgs;
use slipway::ops::{self, BuildOptions};
use slipway::resolver::errors::EvalError;

pub fn execute(args: BuildArgs) -> Result<()> {
    let mut vars = HashMap::new();
    for pair in &args.vars {
        match pair.split_once('=') {
            Some((name, value)) => {
                vars.insert(name.to_string(), value.to_string());
            }
            None => bail!("--var takes NAME=VALUE, got `{}`", pair),
        }
    }

    let opts = BuildOptions {
        root: args.root,
        targets: args.targets,
        vars,
        plan_only: args.plan,
    };

    let start = Instant::now();

    let spinner = if !args.plan {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message("building");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let result = ops::build(&opts);

    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(eval) = err.downcast_ref::<EvalError>() {
                eprintln!("{}", eval.to_diagnostic().format());
                std::process::exit(1);
            }
            return Err(err);
        }
    };

    if let Some(plan) = outcome.plan {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let elapsed = start.elapsed();
    eprintln!(
        "    Finished {} target(s) in {:.2}s",
        outcome.built.len(),
        elapsed.as_secs_f64()
    );

    Ok(())
}
