//! Project output directory.

use std::fs;
use std::path::PathBuf;

use crate::domain::OutputConfig;
use crate::error::AppError;

/// Create `<outdir>/<project>` if needed and return it.
///
/// An existing non-directory at that path is fatal.
pub fn ensure_project_dir(output: &OutputConfig) -> Result<PathBuf, AppError> {
    let dir = output.project_dir();
    if dir.exists() && !dir.is_dir() {
        return Err(AppError::config(format!(
            "Output path '{}' exists and is not a directory.",
            dir.display()
        )));
    }
    fs::create_dir_all(&dir).map_err(|e| {
        AppError::config(format!("Failed to create output directory '{}': {e}", dir.display()))
    })?;
    log::debug!("project directory {}", dir.display());
    Ok(dir)
}
