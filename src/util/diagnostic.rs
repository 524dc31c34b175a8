//! User-friendly diagnostic messages.
//!
//! Every terminal error should name the offending module:rule or target and
//! suggest the next step where one exists.

use std::fmt;
use std::path::PathBuf;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when a target string does not parse.
    pub const MALFORMED_TARGET: &str =
        "help: Targets look like `/module/path`, `:rule`, or `/module/path:rule`";

    /// Suggestion when a module has no descriptor file.
    pub const MODULE_NOT_FOUND: &str =
        "help: Run `slipway list` to see the modules under this build root";

    /// Suggestion when a rule is missing from an existing module.
    pub const TARGET_NOT_FOUND: &str =
        "help: Run `slipway list` to see the rules each module declares";

    /// Suggestion when a dependency cycle is detected.
    pub const CYCLE: &str = "help: Break the cycle by removing one of the listed dependencies";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
            Severity::Help => write!(f, "help"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Warning,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("{}: {}", self.severity, self.message));

        if let Some(ref location) = self.location {
            output.push_str(&format!("\n  --> {}", location.display()));
        }

        for line in &self.context {
            output.push_str(&format!("\n  {}", line));
        }

        for suggestion in &self.suggestions {
            output.push_str(&format!("\n  {}", suggestion));
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}
