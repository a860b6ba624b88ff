use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

// Keys for well-known annotation attributes
/// Ancestors in the label taxonomy, a `TextList`.
pub const ANCESTOR_LABELS: &str = "Ancestors";
/// Detection confidence, a `Float` in [0.0, 1.0).
pub const CONFIDENCE: &str = "Confidence";
/// Absolute crop rectangle `(x1,y1)(x2,y2)` in the source image, a `Text`.
pub const CROP_COORDS: &str = "CropCoords";
/// Text associated with the bounding box, a `Text`.
pub const DETECTED_TEXT: &str = "Text";

/// The value of an annotation attribute.
///
/// The set of kinds is closed so that filtering and projection stay exhaustive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Float(f64),
    Bool(bool),
    Text(String),
    TextList(Vec<String>),
}

impl AttributeValue {
    /// Whether the value is the empty value of its kind.
    ///
    /// A list only counts as empty when it has no elements; a list holding
    /// nothing but empty strings is a real value.
    pub fn is_default(&self) -> bool {
        match self {
            AttributeValue::Float(v) => *v == 0.0,
            AttributeValue::Bool(v) => !*v,
            AttributeValue::Text(v) => v.is_empty(),
            AttributeValue::TextList(v) => v.is_empty(),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::Text(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::Text(v.to_string())
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        AttributeValue::TextList(v)
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

// A single labelled object: absolute x1, y1, x2, y2 offsets from the top-left corner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub coords: [f64; 4],
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl Annotation {
    pub fn new(label: impl Into<String>, coords: [f64; 4]) -> Self {
        Self {
            coords,
            label: label.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn width(&self) -> f64 {
        self.coords[2] - self.coords[0]
    }

    pub fn height(&self) -> f64 {
        self.coords[3] - self.coords[1]
    }

    /// The confidence attribute, if present and a float.
    pub fn confidence(&self) -> Option<f64> {
        self.attributes.get(CONFIDENCE).and_then(AttributeValue::as_float)
    }
}

// The annotations of one image file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedFile {
    pub annotations: Vec<Annotation>,
    pub file_path: PathBuf,
}

impl AnnotatedFile {
    pub fn new(file_path: impl Into<PathBuf>, annotations: Vec<Annotation>) -> Self {
        Self {
            annotations,
            file_path: file_path.into(),
        }
    }

    /// Multiply x coordinates by `scale_x` and y coordinates by `scale_y`.
    pub fn scale_coords(&mut self, scale_x: f64, scale_y: f64) {
        for a in &mut self.annotations {
            a.coords[0] *= scale_x;
            a.coords[1] *= scale_y;
            a.coords[2] *= scale_x;
            a.coords[3] *= scale_y;
        }
    }
}

/// The dataset every stage consumes and produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotatedFiles(pub Vec<AnnotatedFile>);

impl AnnotatedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Vec<AnnotatedFile> {
        self.0
    }

    /// Total number of annotations over all files.
    pub fn num_annotations(&self) -> usize {
        self.0.iter().map(|f| f.annotations.len()).sum()
    }
}

impl Deref for AnnotatedFiles {
    type Target = Vec<AnnotatedFile>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for AnnotatedFiles {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<AnnotatedFile>> for AnnotatedFiles {
    fn from(files: Vec<AnnotatedFile>) -> Self {
        Self(files)
    }
}

impl FromIterator<AnnotatedFile> for AnnotatedFiles {
    fn from_iter<I: IntoIterator<Item = AnnotatedFile>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for AnnotatedFiles {
    type Item = AnnotatedFile;
    type IntoIter = std::vec::IntoIter<AnnotatedFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
