//! Resolution error types and diagnostics.

use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error during target resolution.
///
/// All variants are terminal for the build invocation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("module `{path}` does not exist (no descriptor at {descriptor})")]
    ModuleNotFound { path: String, descriptor: String },

    #[error("target `{module}:{rule}` could not be resolved")]
    UnresolvedTarget {
        module: String,
        rule: String,
        available: Vec<String>,
    },

    #[error("circular dependency: {}", .cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
}

impl EvalError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            EvalError::ModuleNotFound { path, descriptor } => {
                Diagnostic::error(format!("module `{}` does not exist", path))
                    .with_context(format!("no descriptor at {}", descriptor))
                    .with_suggestion(suggestions::MODULE_NOT_FOUND)
            }

            EvalError::UnresolvedTarget {
                module,
                rule,
                available,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "target `{}:{}` could not be resolved",
                    module, rule
                ));

                if !available.is_empty() {
                    diag = diag.with_context(format!(
                        "module {} declares: {}",
                        module,
                        available.join(", ")
                    ));
                }

                diag.with_suggestion(suggestions::TARGET_NOT_FOUND)
            }

            EvalError::CircularDependency { cycle } => {
                Diagnostic::error("circular dependency detected")
                    .with_context(cycle.join(" -> "))
                    .with_suggestion(suggestions::CYCLE)
            }
        }
    }
}
