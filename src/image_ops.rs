//! Single-image operations used by the pipeline: load, crop objects, resize and save.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader};
use log::warn;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConvError, Result};
use crate::types::{AnnotatedFile, Annotation, AttributeValue, CROP_COORDS};

/// Resampling algorithm used when resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleFilter {
    Nearest,
    /// Area averaging.
    Box,
    Linear,
    Gaussian,
    Lanczos,
}

impl FromStr for ResampleFilter {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "nearest" => Ok(ResampleFilter::Nearest),
            "box" => Ok(ResampleFilter::Box),
            "linear" => Ok(ResampleFilter::Linear),
            "gaussian" => Ok(ResampleFilter::Gaussian),
            "lanczos" => Ok(ResampleFilter::Lanczos),
            _ => Err(ConvError::UnsupportedFilter {
                name: s.to_string(),
            }),
        }
    }
}

impl ResampleFilter {
    fn resize(self, img: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        let filter = match self {
            ResampleFilter::Box => return img.thumbnail_exact(width, height),
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Linear => FilterType::Triangle,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos => FilterType::Lanczos3,
        };
        img.resize_exact(width, height, filter)
    }
}

/// Raster encoding of output images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Jpeg,
    Png,
}

impl FromStr for Encoding {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Encoding::Jpeg),
            "png" => Ok(Encoding::Png),
            _ => Err(ConvError::UnsupportedEncoding {
                name: s.to_string(),
            }),
        }
    }
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Jpeg => "jpg",
            Encoding::Png => "png",
        }
    }
}

/// Read and decode the image at `path`.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|source| ConvError::ImageIo {
            path: path.to_path_buf(),
            source,
        })?;
    if reader.format().is_none() {
        return Err(ConvError::UnsupportedImageType {
            path: path.to_path_buf(),
        });
    }
    reader.decode().map_err(|source| ConvError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })
}

/// Path of the crop for annotation `index`: `dir/foo.jpg` becomes `dir/foo_07.jpg`.
pub fn crop_path(path: &Path, index: usize) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{}_{:02}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}_{:02}", stem, index),
    };
    path.with_file_name(name)
}

/// Integer crop rectangle `(x1, y1, x2, y2)` of an annotation clipped to `width` x `height`.
///
/// Returns `None` when the box lies entirely outside the image.
pub fn crop_rect(a: &Annotation, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let [x1, y1, x2, y2] = a.coords.map(|c| c.round());
    let (x1, x2) = (x1.min(x2), x1.max(x2));
    let (y1, y2) = (y1.min(y2), y1.max(y2));

    let x1 = x1.max(0.0);
    let y1 = y1.max(0.0);
    let x2 = x2.min(width as f64);
    let y2 = y2.min(height as f64);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1 as u32, y1 as u32, x2 as u32, y2 as u32))
}

/// Crop every annotated object out of `img`.
///
/// Each crop comes with a new single-annotation file whose box covers the whole crop and
/// whose attributes record the crop rectangle in the source image. Boxes entirely outside
/// the image produce nothing.
pub fn crop_objects(file: &AnnotatedFile, img: &DynamicImage) -> Vec<(DynamicImage, AnnotatedFile)> {
    let (width, height) = img.dimensions();
    let mut crops = Vec::with_capacity(file.annotations.len());

    for (i, a) in file.annotations.iter().enumerate() {
        let Some((x1, y1, x2, y2)) = crop_rect(a, width, height) else {
            warn!(
                "Skipping annotation {} of {}: box {:?} is outside the {}x{} image",
                i,
                file.file_path.display(),
                a.coords,
                width,
                height
            );
            continue;
        };
        let (w, h) = (x2 - x1, y2 - y1);

        let mut attributes = a.attributes.clone();
        attributes.insert(
            CROP_COORDS.to_string(),
            AttributeValue::Text(format!("({},{})({},{})", x1, y1, x2, y2)),
        );
        let annotation = Annotation {
            coords: [0.0, 0.0, w as f64, h as f64],
            label: a.label.clone(),
            attributes,
        };

        crops.push((
            img.crop_imm(x1, y1, w, h),
            AnnotatedFile::new(crop_path(&file.file_path, i), vec![annotation]),
        ));
    }

    crops
}

/// Target `(width, height)` for an image of `width` x `height`.
///
/// A zero `longer_side` or `shorter_side` is derived from the image's aspect ratio and is at
/// least one pixel.
pub fn target_size(width: u32, height: u32, longer_side: u32, shorter_side: u32) -> (u32, u32) {
    let landscape = width >= height;
    let (img_longer, img_shorter) = if landscape {
        (width, height)
    } else {
        (height, width)
    };

    let (mut longer, mut shorter) = (longer_side, shorter_side);
    if longer == 0 {
        longer = ((shorter as f64 * (img_longer as f64 / img_shorter as f64)).round() as u32).max(1);
    } else if shorter == 0 {
        shorter = ((longer as f64 * (img_shorter as f64 / img_longer as f64)).round() as u32).max(1);
    }

    if landscape {
        (longer, shorter)
    } else {
        (shorter, longer)
    }
}

/// Resize `img` to the configured side lengths.
///
/// Returns the resized image and the horizontal and vertical scale factors.
pub fn resize_image(
    img: &DynamicImage,
    longer_side: u32,
    shorter_side: u32,
    downsample: ResampleFilter,
    upsample: ResampleFilter,
) -> (DynamicImage, f64, f64) {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = target_size(width, height, longer_side, shorter_side);

    let filter = if (new_width as u64) * (new_height as u64) < (width as u64) * (height as u64) {
        downsample
    } else {
        upsample
    };

    let resized = filter.resize(img, new_width, new_height);
    let scale_x = new_width as f64 / width as f64;
    let scale_y = new_height as f64 / height as f64;
    (resized, scale_x, scale_y)
}

/// Output path in `out_dir` for an image originally at `path`.
pub fn output_path(out_dir: &Path, path: &Path, encoding: Encoding) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    out_dir.join(format!("{}.{}", stem, encoding.extension()))
}

/// Encode `img` to `path`. `quality` only applies to JPEG.
pub fn save_image(path: &Path, img: &DynamicImage, encoding: Encoding, quality: u8) -> Result<()> {
    let file = File::create(path).map_err(|source| ConvError::ImageIo {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);

    let result = match encoding {
        Encoding::Jpeg => {
            // No alpha channel in JPEG.
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, quality))
        }
        Encoding::Png => img.write_with_encoder(PngEncoder::new(&mut writer)),
    };
    result.map_err(|source| ConvError::ImageEncode {
        path: path.to_path_buf(),
        source,
    })?;
    writer.flush().map_err(|source| ConvError::ImageIo {
        path: path.to_path_buf(),
        source,
    })
}
