//! Annotation dataset transformation
//!
//! This library transforms object-detection annotations held in memory: label remapping,
//! bounding-box adjustment, filtering, concurrent image cropping/resizing and random
//! dataset splitting. Every stage takes and returns the same [`AnnotatedFiles`] dataset, so
//! stages compose freely and can be skipped.

pub mod bbox;
pub mod config;
pub mod error;
pub mod filter;
pub mod image_ops;
pub mod io;
pub mod labels;
pub mod pipeline;
pub mod split;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use bbox::{transform_bboxes, BboxTransform};
pub use config::Args;
pub use error::{ConvError, Result};
pub use filter::{filter_annotations, FilterConfig, FilterReport};
pub use image_ops::{Encoding, ResampleFilter};
pub use labels::{apply_rules, map_labels, LabelRule};
pub use pipeline::{process_images, ImageOptions};
pub use split::{split_dataset, split_dataset_seeded};
pub use types::{AnnotatedFile, AnnotatedFiles, Annotation, AttributeValue};
