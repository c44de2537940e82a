use regex::Regex;

use crate::error::PageError;

/// Route grammar: an operation prefix followed by an alphanumeric title.
pub const DEFAULT_PATTERN: &str = r"^/(edit|save|view)/([a-zA-Z0-9]+)$";

/// Extracts and validates the page title embedded in a request path.
///
/// This is the only gate between the request path and the filesystem: every
/// title it returns matches the title group of the pattern, so with the
/// default grammar no title can contain `/`, `.` or any other separator.
#[derive(Debug, Clone)]
pub struct TitleValidator {
    pattern: Regex,
}

impl TitleValidator {
    /// Compiles the default route grammar.
    ///
    /// # Panics
    ///
    /// Cannot panic. [`DEFAULT_PATTERN`] is a valid, constant regex.
    #[must_use]
    pub fn new() -> Self {
        Self::with_pattern(DEFAULT_PATTERN).expect("default title pattern is a valid regex")
    }

    /// Uses a substitute grammar. The title must be capture group 2.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regex or has fewer than
    /// two capture groups.
    pub fn with_pattern(pattern: &str) -> anyhow::Result<Self> {
        let pattern = Regex::new(pattern)?;
        anyhow::ensure!(
            pattern.captures_len() > 2,
            "title pattern needs an operation group and a title group"
        );
        Ok(Self { pattern })
    }

    /// Returns the title captured from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::InvalidPath`] when `path` does not match the
    /// route grammar. The caller must answer "not found" and stop.
    pub fn extract_title(&self, path: &str) -> Result<String, PageError> {
        self.pattern
            .captures(path)
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| PageError::InvalidPath(path.to_string()))
    }

    #[must_use]
    pub fn is_valid(&self, path: &str) -> bool {
        self.extract_title(path).is_ok()
    }
}

impl Default for TitleValidator {
    fn default() -> Self {
        Self::new()
    }
}
