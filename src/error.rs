use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConvError>;

/// Errors raised while transforming a dataset.
///
/// Configuration errors (`MalformedRule`, `UnsupportedFilter`, `UnsupportedEncoding`,
/// `InvalidSplit`, `InvalidConfig`) are raised before any work starts. The `Image*` and
/// `UnsupportedImageType` variants are per-item failures of the image pipeline.
#[derive(Debug, Error)]
pub enum ConvError {
    #[error("invalid label mapping {rule:?}, expected old=new")]
    MalformedRule { rule: String },

    #[error("unknown resampling filter {name:?}")]
    UnsupportedFilter { name: String },

    #[error("unsupported output encoding {name:?}")]
    UnsupportedEncoding { name: String },

    #[error("invalid split: {msg}")]
    InvalidSplit { msg: String },

    #[error("invalid configuration: {msg}")]
    InvalidConfig { msg: String },

    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("image io error at {path}: {source}")]
    ImageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the image type of {path} cannot be determined or cropped")]
    UnsupportedImageType { path: PathBuf },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
