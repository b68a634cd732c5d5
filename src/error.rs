//! Fatal, run-aborting errors.
//!
//! Per-row problems (coverage gaps, failed fits) are *not* `AppError`s: they
//! are typed separately (`CoverageError`, `FitError`) and recorded next to the
//! data they affect. An `AppError` always ends the process with its exit code.

/// Invalid configuration or an I/O failure (missing table, unwritable output).
pub const EXIT_CONFIG: u8 = 2;
/// Nothing left to process (empty grid, empty fake dataset after the cutoff).
pub const EXIT_EMPTY: u8 = 3;
/// Internal numerical failure.
pub const EXIT_NUMERIC: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn empty(message: impl Into<String>) -> Self {
        Self::new(EXIT_EMPTY, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(EXIT_NUMERIC, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_exit_codes() {
        assert_eq!(AppError::config("x").exit_code(), EXIT_CONFIG);
        assert_eq!(AppError::empty("x").exit_code(), EXIT_EMPTY);
        assert_eq!(AppError::numeric("x").exit_code(), EXIT_NUMERIC);
        assert_eq!(AppError::config("bad range").to_string(), "bad range");
    }
}
