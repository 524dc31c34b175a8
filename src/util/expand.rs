//! Make-style `$(VAR)` expansion for flag lists.
//!
//! Variables are supplied per invocation (`--var NAME=VALUE`); flags in
//! descriptor files may reference them, e.g. `-mmcu=$(AVR_CHIP)`.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;

static RE_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([A-Za-z0-9_-]+)\)").unwrap());

/// Expand every `$(NAME)` reference in `text`.
///
/// An undefined variable is an authoring error and aborts the invocation.
pub fn expand_vars(text: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for caps in RE_VAR.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let name = &caps[1];

        match vars.get(name) {
            Some(value) => {
                out.push_str(&text[last..whole.start()]);
                out.push_str(value);
                last = whole.end();
            }
            None => bail!("undefined variable `{}` in `{}`", name, text),
        }
    }

    out.push_str(&text[last..]);
    Ok(out)
}

/// Expand a whole flag list.
pub fn expand_flags(flags: &[String], vars: &HashMap<String, String>) -> Result<Vec<String>> {
    flags.iter().map(|f| expand_vars(f, vars)).collect()
}
