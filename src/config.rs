use clap::Parser;
use log::warn;
use std::path::PathBuf;
use std::str::FromStr;

use crate::bbox::BboxTransform;
use crate::error::{ConvError, Result};
use crate::filter::FilterConfig;
use crate::image_ops::{Encoding, ResampleFilter};
use crate::labels::{parse_rules, LabelRule};
use crate::pipeline::ImageOptions;
use crate::split::cumulative_boundaries;

/// JPEG quality used when the configured one is out of range.
pub const FALLBACK_JPEG_QUALITY: u8 = 92;

/// Transform an annotation dataset: map labels, adjust bounding boxes, filter, crop and
/// resize images, and split the result into several output datasets.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Input dataset (JSON)
    #[arg(short = 'l', long = "labels")]
    pub labels: PathBuf,

    /// Output dataset paths, one per value in --split
    #[arg(short = 'o', long = "labels-out", value_delimiter = ',', required = true)]
    pub labels_out: Vec<PathBuf>,

    /// Output split percentages, must add up to 100
    #[arg(long = "split", value_delimiter = ',', default_value = "100")]
    pub split: Vec<u32>,

    /// Seed for the random split (random if not set)
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Directory that relative image paths in the input are resolved against
    #[arg(long = "images")]
    pub images: Option<PathBuf>,

    /// Output directory for processed images (required when resizing or cropping)
    #[arg(long = "images-out")]
    pub images_out: Option<PathBuf>,

    /// Label (sub-)string replacements, old=new
    #[arg(long = "map-labels", value_delimiter = ',')]
    pub map_labels: Vec<String>,

    /// Scale factor for the width of all bounding boxes
    #[arg(long = "bbox-scale-x", default_value_t = 1.0, value_parser = validate_scale)]
    pub bbox_scale_x: f64,

    /// Scale factor for the height of all bounding boxes
    #[arg(long = "bbox-scale-y", default_value_t = 1.0, value_parser = validate_scale)]
    pub bbox_scale_y: f64,

    /// Grow bounding boxes to this aspect ratio (width/height), 0 disables
    #[arg(long = "bbox-aspect-ratio", default_value_t = 0.0, value_parser = validate_non_negative)]
    pub bbox_aspect_ratio: f64,

    /// Labels to keep, after label mapping (empty keeps all)
    #[arg(long = "filter-labels", value_delimiter = ',')]
    pub filter_labels: Vec<String>,

    /// Attributes to keep (empty keeps all)
    #[arg(long = "filter-attributes", value_delimiter = ',')]
    pub filter_attributes: Vec<String>,

    /// Attributes that must be present with a non-empty value
    #[arg(long = "filter-required-attrs", value_delimiter = ',')]
    pub filter_required_attrs: Vec<String>,

    /// Minimum confidence to keep a label, in [0.0, 1.0)
    #[arg(long = "min-confidence", default_value_t = 0.0, value_parser = validate_confidence)]
    pub min_confidence: f64,

    /// Drop files without labels after filtering
    #[arg(long = "require-label")]
    pub require_label: bool,

    /// Minimum bounding box width in pixels, before resizing
    #[arg(long = "min-bbox-width", default_value_t = 0.0)]
    pub min_bbox_width: f64,

    /// Minimum bounding box height in pixels, before resizing
    #[arg(long = "min-bbox-height", default_value_t = 0.0)]
    pub min_bbox_height: f64,

    /// Minimum bounding box aspect ratio (width/height), 0 disables
    #[arg(long = "min-bbox-aspect-ratio", default_value_t = 0.0)]
    pub min_bbox_aspect_ratio: f64,

    /// Maximum bounding box aspect ratio (width/height), 0 disables
    #[arg(long = "max-bbox-aspect-ratio", default_value_t = 0.0)]
    pub max_bbox_aspect_ratio: f64,

    /// Encoding of output images: jpg or png
    #[arg(long = "image-enc", default_value = "jpg")]
    pub image_enc: String,

    /// Target length of the longer image side (0 keeps the aspect ratio)
    #[arg(long = "resize-longer", default_value_t = 0)]
    pub resize_longer: u32,

    /// Target length of the shorter image side (0 keeps the aspect ratio)
    #[arg(long = "resize-shorter", default_value_t = 0)]
    pub resize_shorter: u32,

    /// Filter used when downsampling: nearest, box, linear, gaussian or lanczos
    #[arg(long = "downsample-filter", default_value = "box")]
    pub downsample_filter: String,

    /// Filter used when upsampling: nearest, box, linear, gaussian or lanczos
    #[arg(long = "upsample-filter", default_value = "linear")]
    pub upsample_filter: String,

    /// JPEG quality in [1, 100]
    #[arg(long = "jpeg-quality", default_value_t = 90)]
    pub jpeg_quality: i64,

    /// Crop annotated objects and output those instead of the full images
    #[arg(long = "crop-objects")]
    pub crop_objects: bool,

    /// Maximum number of image workers (defaults to twice the number of cores)
    #[arg(long = "workers")]
    pub workers: Option<usize>,
}

// Validate that a bounding box scale factor is positive
fn validate_scale(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if val > 0.0 => Ok(val),
        _ => Err("scale factor must be larger than 0".to_string()),
    }
}

fn validate_non_negative(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if val >= 0.0 => Ok(val),
        _ => Err("value must not be negative".to_string()),
    }
}

// Validate that the confidence is in [0.0, 1.0)
fn validate_confidence(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..1.0).contains(&val) => Ok(val),
        _ => Err("confidence must be in [0.0, 1.0)".to_string()),
    }
}

impl Args {
    /// Whether the image pipeline has any work to do.
    pub fn processes_images(&self) -> bool {
        self.resize_longer > 0 || self.resize_shorter > 0 || self.crop_objects
    }

    /// Check the combination of options. An out-of-range JPEG quality is replaced.
    pub fn validate(&mut self) -> Result<()> {
        if self.split.len() != self.labels_out.len() {
            return Err(invalid(
                "the number of --split values and --labels-out paths must match",
            ));
        }
        cumulative_boundaries(&self.split)?;
        self.label_rules()?;

        if self.processes_images() {
            let out = self
                .images_out
                .as_ref()
                .ok_or_else(|| invalid("missing image output directory (--images-out)"))?;
            if self.images.as_ref() == Some(out) {
                return Err(invalid("the image input and output paths cannot be identical"));
            }
            // Fail before touching any image.
            self.image_options()?;
        }

        if self.labels_out.iter().any(|p| *p == self.labels) {
            return Err(invalid("the label input and output paths cannot be identical"));
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            warn!(
                "Invalid JPEG quality {}, setting it to {}",
                self.jpeg_quality, FALLBACK_JPEG_QUALITY
            );
            self.jpeg_quality = FALLBACK_JPEG_QUALITY as i64;
        }
        Ok(())
    }

    /// Parse `--map-labels`; a rule without exactly one `=` is an error.
    pub fn label_rules(&self) -> Result<Vec<LabelRule>> {
        parse_rules(&self.map_labels)
    }

    pub fn bbox_transform(&self) -> BboxTransform {
        BboxTransform {
            scale_x: self.bbox_scale_x,
            scale_y: self.bbox_scale_y,
            aspect_ratio: self.bbox_aspect_ratio,
        }
    }

    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            labels: self.filter_labels.clone(),
            attributes: self.filter_attributes.clone(),
            required_attributes: self.filter_required_attrs.clone(),
            min_confidence: self.min_confidence,
            require_label: self.require_label,
            min_bbox_width: self.min_bbox_width,
            min_bbox_height: self.min_bbox_height,
            min_aspect_ratio: self.min_bbox_aspect_ratio,
            max_aspect_ratio: self.max_bbox_aspect_ratio,
        }
    }

    /// Parse the image options; unknown filter or encoding names are errors.
    pub fn image_options(&self) -> Result<ImageOptions> {
        let quality = u8::try_from(self.jpeg_quality)
            .ok()
            .filter(|q| (1..=100).contains(q))
            .unwrap_or(FALLBACK_JPEG_QUALITY);
        Ok(ImageOptions {
            output_dir: self.images_out.clone().unwrap_or_default(),
            longer_side: self.resize_longer,
            shorter_side: self.resize_shorter,
            downsample: self.downsample_filter.parse::<ResampleFilter>()?,
            upsample: self.upsample_filter.parse::<ResampleFilter>()?,
            encoding: self.image_enc.parse::<Encoding>()?,
            quality,
            crop_objects: self.crop_objects,
            workers: self.workers,
        })
    }

    pub fn split_boundaries(&self) -> Result<Vec<u32>> {
        cumulative_boundaries(&self.split)
    }
}

fn invalid(msg: &str) -> ConvError {
    ConvError::InvalidConfig {
        msg: msg.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("labelconv").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_validate_confidence() {
        assert!(validate_confidence("0.0").is_ok());
        assert!(validate_confidence("0.99").is_ok());
        assert!(validate_confidence("1.0").is_err());
        assert!(validate_confidence("-0.1").is_err());
        assert!(validate_confidence("abc").is_err());
    }

    #[test]
    fn test_validate_scale() {
        assert!(validate_scale("0.5").is_ok());
        assert!(validate_scale("0").is_err());
        assert!(validate_non_negative("0").is_ok());
        assert!(validate_non_negative("-1").is_err());
    }

    #[test]
    fn test_defaults() {
        let mut args = parse(&["-l", "in.json", "-o", "out.json"]);
        args.validate().unwrap();
        assert_eq!(args.split, [100]);
        assert!(args.bbox_transform().is_neutral());
        assert_eq!(args.filter_config(), FilterConfig::default());
        let options = args.image_options().unwrap();
        assert_eq!(options.downsample, ResampleFilter::Box);
        assert_eq!(options.upsample, ResampleFilter::Linear);
        assert_eq!(options.encoding, Encoding::Jpeg);
        assert_eq!(options.quality, 90);
        assert!(!options.is_active());
    }

    #[test]
    fn test_lists_and_splits() {
        let mut args = parse(&[
            "-l",
            "in.json",
            "-o",
            "train.json,val.json,test.json",
            "--split",
            "70,20,10",
            "--map-labels",
            "car=vehicle,truck=vehicle",
            "--filter-labels",
            "vehicle,person",
        ]);
        args.validate().unwrap();
        assert_eq!(args.split_boundaries().unwrap(), [70, 90, 100]);
        assert_eq!(args.map_labels, ["car=vehicle", "truck=vehicle"]);
        let rules = args.label_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!((rules[1].old.as_str(), rules[1].new.as_str()), ("truck", "vehicle"));
        assert_eq!(args.filter_config().labels, ["vehicle", "person"]);
    }

    #[test]
    fn test_invalid_combinations() {
        let mut args = parse(&["-l", "in.json", "-o", "a.json,b.json", "--split", "50"]);
        assert!(matches!(args.validate(), Err(ConvError::InvalidConfig { .. })));

        let mut args = parse(&["-l", "in.json", "-o", "a.json,b.json", "--split", "50,40"]);
        assert!(matches!(args.validate(), Err(ConvError::InvalidSplit { .. })));

        let mut args = parse(&["-l", "in.json", "-o", "out.json", "--crop-objects"]);
        assert!(matches!(args.validate(), Err(ConvError::InvalidConfig { .. })));

        let mut args = parse(&[
            "-l",
            "in.json",
            "-o",
            "out.json",
            "--resize-longer",
            "100",
            "--images-out",
            "out",
            "--downsample-filter",
            "bicubic",
        ]);
        assert!(matches!(args.validate(), Err(ConvError::UnsupportedFilter { .. })));

        let mut args = parse(&["-l", "in.json", "-o", "out.json", "--map-labels", "car"]);
        assert!(matches!(args.validate(), Err(ConvError::MalformedRule { .. })));

        let mut args = parse(&["-l", "in.json", "-o", "in.json"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_jpeg_quality_fallback() {
        let mut args = parse(&["-l", "in.json", "-o", "out.json", "--jpeg-quality", "0"]);
        args.validate().unwrap();
        assert_eq!(args.jpeg_quality, FALLBACK_JPEG_QUALITY as i64);
        assert_eq!(args.image_options().unwrap().quality, FALLBACK_JPEG_QUALITY);
    }
}
