//! Reading and writing datasets as plain JSON, the representation the binary works on.

use log::info;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{ConvError, Result};
use crate::types::AnnotatedFiles;

/// Read a dataset, resolving relative image paths against `image_dir` if given.
pub fn read_dataset(path: &Path, image_dir: Option<&Path>) -> Result<AnnotatedFiles> {
    // Parse directly from the file stream
    let file = File::open(path).map_err(|source| ConvError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut data: AnnotatedFiles =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConvError::Json {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(dir) = image_dir {
        for f in data.iter_mut().filter(|f| f.file_path.is_relative()) {
            f.file_path = dir.join(&f.file_path);
        }
    }

    info!(
        "Read {} files with {} labels from {}",
        data.len(),
        data.num_annotations(),
        path.display()
    );
    Ok(data)
}

/// Write a dataset, creating missing parent directories.
pub fn write_dataset(path: &Path, data: &AnnotatedFiles) -> Result<()> {
    let io_err = |source| ConvError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    serde_json::to_writer_pretty(&mut writer, data).map_err(|source| ConvError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)
}
