//! Concurrent image processing: load, optionally crop, optionally resize, save.
//!
//! A fixed pool of workers pulls files from a bounded queue, so at most a few decoded images
//! per worker are in memory at any time. Without cropping each worker updates its file in
//! place and the dataset keeps its order. With cropping the workers send the derived files to
//! a single collector thread, which is the only writer of the new dataset; their order is the
//! completion order.
//!
//! A failing item does not stop the others. Only the first error is kept and returned once
//! all work is done. Images already written stay on disk.

use crossbeam_channel::{bounded, Sender};
use image::DynamicImage;
use log::{debug, error, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;

use crate::error::{ConvError, Result};
use crate::image_ops::{
    crop_objects, crop_path, load_image, output_path, resize_image, save_image, Encoding, ResampleFilter,
};
use crate::types::{AnnotatedFile, AnnotatedFiles};
use crate::utils::{create_progress_bar, ensure_output_directory};

/// Image processing settings. Filter and encoding names are parsed before this is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    pub output_dir: PathBuf,
    /// Target length of the longer side, 0 derives it from the aspect ratio.
    pub longer_side: u32,
    /// Target length of the shorter side, 0 derives it from the aspect ratio.
    pub shorter_side: u32,
    pub downsample: ResampleFilter,
    pub upsample: ResampleFilter,
    pub encoding: Encoding,
    /// JPEG quality in [1, 100].
    pub quality: u8,
    pub crop_objects: bool,
    /// Upper bound on the worker count, defaults to twice the number of cores.
    pub workers: Option<usize>,
}

impl ImageOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            longer_side: 0,
            shorter_side: 0,
            downsample: ResampleFilter::Box,
            upsample: ResampleFilter::Linear,
            encoding: Encoding::Jpeg,
            quality: 90,
            crop_objects: false,
            workers: None,
        }
    }

    pub fn resize_enabled(&self) -> bool {
        self.longer_side > 0 || self.shorter_side > 0
    }

    /// Whether there is anything to do at all.
    pub fn is_active(&self) -> bool {
        self.resize_enabled() || self.crop_objects
    }
}

/// Keeps the first reported error and drops the rest.
#[derive(Debug, Default)]
pub struct FirstError(OnceLock<ConvError>);

impl FirstError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `err` unless an error is already stored. Returns whether it was stored.
    pub fn record(&self, err: ConvError) -> bool {
        match self.0.set(err) {
            Ok(()) => true,
            Err(dropped) => {
                debug!("Dropping subsequent error: {}", dropped);
                false
            }
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    pub fn into_inner(self) -> Option<ConvError> {
        self.0.into_inner()
    }
}

/// Number of workers for `num_files` files: `min(cap, num_files)` with `cap` defaulting to
/// twice the number of cores.
pub fn worker_count(num_files: usize, cap: Option<usize>) -> usize {
    let cap = cap.unwrap_or_else(|| 2 * num_cpus::get()).max(1);
    cap.min(num_files)
}

/// Every image path `file` may be saved to. With cropping this covers a derived name for each
/// annotation, whether or not its crop ends up non-empty.
fn destinations(file: &AnnotatedFile, options: &ImageOptions) -> Vec<PathBuf> {
    let out = |path: &Path| output_path(&options.output_dir, path, options.encoding);
    if options.crop_objects {
        (0..file.annotations.len())
            .map(|i| out(&crop_path(&file.file_path, i)))
            .collect()
    } else {
        vec![out(&file.file_path)]
    }
}

/// Fail if two source images would be written to the same output path.
pub fn check_output_paths(data: &AnnotatedFiles, options: &ImageOptions) -> Result<()> {
    let mut seen: HashMap<PathBuf, &Path> = HashMap::new();
    for file in data.iter() {
        for dest in destinations(file, options) {
            if let Some(other) = seen.insert(dest.clone(), &file.file_path) {
                return Err(ConvError::InvalidConfig {
                    msg: format!(
                        "{} and {} would both be written to {}",
                        other.display(),
                        file.file_path.display(),
                        dest.display()
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Resize and/or crop every referenced image and write the results to `options.output_dir`.
///
/// File paths are updated to the written images and coordinates rescaled to match them. With
/// `crop_objects` the dataset is replaced by the single-object crops. Returns the first
/// per-item error after all items have been processed. Colliding output paths are rejected
/// before any image is read.
pub fn process_images(data: &mut AnnotatedFiles, options: &ImageOptions) -> Result<()> {
    if !options.is_active() || data.is_empty() {
        return Ok(());
    }
    info!("Processing images");
    check_output_paths(data, options)?;
    ensure_output_directory(&options.output_dir)?;

    let num_workers = worker_count(data.len(), options.workers);
    let queue_size = 2 * num_workers;
    debug!(
        "Using {} workers with a queue of {}",
        num_workers, queue_size
    );

    let pb = create_progress_bar(data.len() as u64, "Images");
    let errors = FirstError::new();

    let cropped = thread::scope(|s| {
        let (work_tx, work_rx) = bounded::<&mut AnnotatedFile>(queue_size);

        let (crop_tx, collector) = if options.crop_objects {
            let (tx, rx) = bounded::<AnnotatedFile>(queue_size);
            let collector = s.spawn(move || rx.iter().collect::<Vec<_>>());
            (Some(tx), Some(collector))
        } else {
            (None, None)
        };

        let workers: Vec<_> = (0..num_workers)
            .map(|_| {
                let work_rx = work_rx.clone();
                let crop_tx = crop_tx.clone();
                let errors = &errors;
                let pb = &pb;
                s.spawn(move || {
                    for file in work_rx {
                        let source = file.file_path.clone();
                        if let Err(e) = process_file(file, options, crop_tx.as_ref()) {
                            error!("Failed to process image {}: {}", source.display(), e);
                            errors.record(e);
                        }
                        pb.inc(1);
                    }
                })
            })
            .collect();
        drop(work_rx);
        drop(crop_tx);

        for file in data.iter_mut() {
            if work_tx.send(file).is_err() {
                break;
            }
        }
        drop(work_tx);

        for worker in workers {
            if let Err(panic) = worker.join() {
                std::panic::resume_unwind(panic);
            }
        }

        // All senders are gone once the workers have finished.
        collector.map(|c| match c.join() {
            Ok(files) => files,
            Err(panic) => std::panic::resume_unwind(panic),
        })
    });

    pb.finish_with_message("Image processing complete");

    if let Some(files) = cropped {
        info!("Cropped {} objects from {} images", files.len(), data.len());
        *data = AnnotatedFiles::from(files);
    }

    match errors.into_inner() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Run the full load / crop / resize / save sequence for one source file.
fn process_file(
    file: &mut AnnotatedFile,
    options: &ImageOptions,
    crop_tx: Option<&Sender<AnnotatedFile>>,
) -> Result<()> {
    let img = load_image(&file.file_path)?;

    match crop_tx {
        Some(tx) => {
            for (crop, mut derived) in crop_objects(file, &img) {
                save_processed(&mut derived, crop, options)?;
                // The collector outlives every worker.
                let _ = tx.send(derived);
            }
            Ok(())
        }
        None => save_processed(file, img, options),
    }
}

/// Resize if configured, save, then point `file` at the saved image with matching coordinates.
fn save_processed(file: &mut AnnotatedFile, img: DynamicImage, options: &ImageOptions) -> Result<()> {
    let (img, scale) = if options.resize_enabled() {
        let (resized, scale_x, scale_y) = resize_image(
            &img,
            options.longer_side,
            options.shorter_side,
            options.downsample,
            options.upsample,
        );
        (resized, Some((scale_x, scale_y)))
    } else {
        (img, None)
    };

    let out_path = output_path(&options.output_dir, &file.file_path, options.encoding);
    save_image(&out_path, &img, options.encoding, options.quality)?;

    file.file_path = out_path;
    if let Some((scale_x, scale_y)) = scale {
        file.scale_coords(scale_x, scale_y);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_wins() {
        let errors = FirstError::new();
        assert!(!errors.is_set());
        assert!(errors.record(ConvError::UnsupportedImageType {
            path: "a.jpg".into()
        }));
        assert!(!errors.record(ConvError::UnsupportedImageType {
            path: "b.jpg".into()
        }));
        match errors.into_inner() {
            Some(ConvError::UnsupportedImageType { path }) => assert_eq!(path, PathBuf::from("a.jpg")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_worker_count() {
        assert_eq!(worker_count(3, Some(8)), 3);
        assert_eq!(worker_count(100, Some(8)), 8);
        assert_eq!(worker_count(100, Some(0)), 1);
        assert!(worker_count(1_000_000, None) <= 2 * num_cpus::get());
    }

    #[test]
    fn test_check_output_paths() {
        let options = ImageOptions::new("out");
        let distinct: AnnotatedFiles = vec![
            AnnotatedFile::new("a/x.png", vec![]),
            AnnotatedFile::new("a/y.png", vec![]),
        ]
        .into();
        assert!(check_output_paths(&distinct, &options).is_ok());

        // Same stem, different extension.
        let same_stem: AnnotatedFiles = vec![
            AnnotatedFile::new("foo.jpg", vec![]),
            AnnotatedFile::new("foo.png", vec![]),
        ]
        .into();
        assert!(matches!(
            check_output_paths(&same_stem, &options),
            Err(ConvError::InvalidConfig { .. })
        ));

        // With cropping only the derived names count.
        let boxes = vec![crate::types::Annotation::new("car", [0.0, 0.0, 4.0, 4.0])];
        let shared: AnnotatedFiles = vec![
            AnnotatedFile::new("a/x.png", boxes.clone()),
            AnnotatedFile::new("b/x.png", vec![]),
        ]
        .into();
        assert!(check_output_paths(&shared, &options).is_err());
        let cropping = ImageOptions {
            crop_objects: true,
            ..options
        };
        assert!(check_output_paths(&shared, &cropping).is_ok());

        let both: AnnotatedFiles = vec![
            AnnotatedFile::new("a/x.png", boxes.clone()),
            AnnotatedFile::new("b/x.png", boxes),
        ]
        .into();
        assert!(matches!(
            check_output_paths(&both, &cropping),
            Err(ConvError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_inactive_options_do_nothing() {
        let mut data: AnnotatedFiles =
            vec![AnnotatedFile::new("does/not/exist.jpg", vec![])].into();
        let options = ImageOptions::new("unused-output-dir");
        process_images(&mut data, &options).unwrap();
        assert_eq!(data[0].file_path, PathBuf::from("does/not/exist.jpg"));
        assert!(!std::path::Path::new("unused-output-dir").exists());
    }
}
