//! Output path resolution

use super::error::{RecorderError, RecorderResult};
use std::path::{Path, PathBuf};

/// Directory name used under the platform data directory
pub const APP_DIR_NAME: &str = "stream-recorder";

/// Get the default directory relative output paths are resolved against
pub fn default_data_dir() -> RecorderResult<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| RecorderError::Configuration("Could not find data directory".to_string()))
}

/// Resolve a configured output path into an absolute base path
///
/// Relative paths are joined onto `data_dir`. The returned path has no
/// extension; dataset file names are derived from it.
pub fn resolve_output_base(output: &str, data_dir: &Path) -> RecorderResult<PathBuf> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(RecorderError::Configuration(
            "Output file path is empty".to_string(),
        ));
    }

    let path = Path::new(trimmed);
    if path.file_name().is_none() {
        return Err(RecorderError::Configuration(format!(
            "Output path has no file name: {}",
            trimmed
        )));
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_dir.join(path)
    };

    // Strip a known dataset extension so "run1.set" and "run1" name the same dataset
    let base = match absolute.extension().and_then(|e| e.to_str()) {
        Some("set") | Some("fdt") => absolute.with_extension(""),
        _ => absolute,
    };

    Ok(base)
}

/// Make sure the parent directory of `base` exists and is writable
pub fn ensure_writable_parent(base: &Path) -> RecorderResult<()> {
    let parent = base
        .parent()
        .ok_or_else(|| RecorderError::Configuration(format!("No parent directory for {:?}", base)))?;

    std::fs::create_dir_all(parent).map_err(|e| {
        RecorderError::Configuration(format!("Cannot create output directory {:?}: {}", parent, e))
    })?;

    let metadata = std::fs::metadata(parent)
        .map_err(|e| RecorderError::Configuration(format!("Cannot inspect {:?}: {}", parent, e)))?;
    if metadata.permissions().readonly() {
        return Err(RecorderError::Configuration(format!(
            "Output directory is not writable: {:?}",
            parent
        )));
    }

    Ok(())
}
