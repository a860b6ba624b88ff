use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use std::fs;
use std::path::Path;

use crate::error::{ConvError, Result};

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Create the output directory if it is missing. Existing content is left alone.
pub fn ensure_output_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        debug!("Writing into existing directory {}", path.display());
        return Ok(());
    }
    fs::create_dir_all(path).map_err(|source| ConvError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_output_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out = temp_dir.path().join("nested/out");
        ensure_output_directory(&out).unwrap();
        assert!(out.is_dir());
        ensure_output_directory(&out).unwrap();
    }
}
