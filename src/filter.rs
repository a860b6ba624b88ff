//! Annotation and file filtering.
//!
//! Removal uses swap-with-last deletion, so neither the order of the surviving annotations
//! inside a file nor the order of the surviving files is preserved. Callers that need a
//! stable order must sort afterwards.

use log::info;
use rayon::prelude::*;

use crate::types::{AnnotatedFile, AnnotatedFiles, Annotation};

/// Selection criteria for annotations and files. Empty lists and zero bounds disable a check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterConfig {
    /// Labels to keep (empty keeps all).
    pub labels: Vec<String>,
    /// Attributes to keep on surviving annotations (empty keeps all).
    pub attributes: Vec<String>,
    /// Attributes that must be present with a non-default value.
    pub required_attributes: Vec<String>,
    pub min_confidence: f64,
    /// Drop files left without annotations.
    pub require_label: bool,
    pub min_bbox_width: f64,
    pub min_bbox_height: f64,
    pub min_aspect_ratio: f64,
    pub max_aspect_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub removed_annotations: usize,
    pub removed_files: usize,
}

impl FilterConfig {
    /// Whether the annotation passes every predicate, checked in a fixed order.
    pub fn keep(&self, a: &Annotation) -> bool {
        if let Some(c) = a.confidence() {
            if c < self.min_confidence {
                return false;
            }
        }

        let width = a.width();
        let height = a.height();
        if self.min_bbox_width > width || self.min_bbox_height > height {
            return false;
        }

        if self.min_aspect_ratio != 0.0 || self.max_aspect_ratio != 0.0 {
            if height == 0.0 {
                return false;
            }
            let ratio = width / height;
            if (self.min_aspect_ratio != 0.0 && ratio < self.min_aspect_ratio)
                || (self.max_aspect_ratio != 0.0 && ratio > self.max_aspect_ratio)
            {
                return false;
            }
        }

        if !self.labels.is_empty() && !self.labels.contains(&a.label) {
            return false;
        }

        self.required_attributes
            .iter()
            .all(|k| a.attributes.get(k).is_some_and(|v| !v.is_default()))
    }

    /// Filter one file's annotations and project their attributes.
    ///
    /// Returns the number of removed annotations.
    pub fn filter_file(&self, file: &mut AnnotatedFile) -> usize {
        let before = file.annotations.len();
        let mut i = 0;
        while i < file.annotations.len() {
            if self.keep(&file.annotations[i]) {
                i += 1;
            } else {
                // The last element moves into slot i and is checked next.
                file.annotations.swap_remove(i);
            }
        }

        if !self.attributes.is_empty() {
            for a in &mut file.annotations {
                a.attributes.retain(|k, _| self.attributes.contains(k));
            }
        }

        before - file.annotations.len()
    }
}

/// Remove annotations, and optionally files, that do not match `config`.
pub fn filter_annotations(data: &mut AnnotatedFiles, config: &FilterConfig) -> FilterReport {
    let removed_annotations: usize = data
        .par_iter_mut()
        .map(|file| config.filter_file(file))
        .sum();

    let mut removed_files = 0;
    if config.require_label {
        let mut i = 0;
        while i < data.len() {
            if data[i].annotations.is_empty() {
                data.swap_remove(i);
                removed_files += 1;
            } else {
                i += 1;
            }
        }
    }

    info!(
        "Filtered out {} labels and {} files",
        removed_annotations, removed_files
    );
    FilterReport {
        removed_annotations,
        removed_files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeValue, CONFIDENCE, DETECTED_TEXT};

    fn file(annotations: Vec<Annotation>) -> AnnotatedFile {
        AnnotatedFile::new("img.jpg", annotations)
    }

    #[test]
    fn test_min_confidence() {
        let config = FilterConfig {
            min_confidence: 0.5,
            ..Default::default()
        };
        let mut data: AnnotatedFiles = vec![file(vec![
            Annotation::new("low", [0.0, 0.0, 10.0, 10.0]).with_attribute(CONFIDENCE, 0.4),
            Annotation::new("high", [0.0, 0.0, 10.0, 10.0]).with_attribute(CONFIDENCE, 0.6),
            Annotation::new("none", [0.0, 0.0, 10.0, 10.0]),
        ])]
        .into();

        let report = filter_annotations(&mut data, &config);
        let mut labels: Vec<_> = data[0].annotations.iter().map(|a| a.label.clone()).collect();
        labels.sort();
        assert_eq!(labels, ["high", "none"]);
        assert_eq!(report.removed_annotations, 1);
        assert_eq!(report.removed_files, 0);
    }

    #[test]
    fn test_bbox_size_and_aspect_ratio() {
        let config = FilterConfig {
            min_bbox_width: 5.0,
            min_bbox_height: 5.0,
            min_aspect_ratio: 0.5,
            max_aspect_ratio: 2.0,
            ..Default::default()
        };
        assert!(config.keep(&Annotation::new("a", [0.0, 0.0, 10.0, 10.0])));
        assert!(!config.keep(&Annotation::new("a", [0.0, 0.0, 4.0, 10.0])));
        assert!(!config.keep(&Annotation::new("a", [0.0, 0.0, 30.0, 10.0])));
        assert!(!config.keep(&Annotation::new("a", [0.0, 0.0, 10.0, 30.0])));

        let only_max = FilterConfig {
            max_aspect_ratio: 2.0,
            ..Default::default()
        };
        assert!(!only_max.keep(&Annotation::new("a", [0.0, 0.0, 10.0, 0.0])));
        assert!(only_max.keep(&Annotation::new("a", [0.0, 0.0, 1.0, 10.0])));
    }

    #[test]
    fn test_required_attributes() {
        let config = FilterConfig {
            required_attributes: vec![DETECTED_TEXT.to_string()],
            ..Default::default()
        };
        assert!(!config.keep(&Annotation::new("a", [0.0, 0.0, 1.0, 1.0])));
        assert!(!config.keep(&Annotation::new("a", [0.0, 0.0, 1.0, 1.0]).with_attribute(DETECTED_TEXT, "")));
        assert!(config.keep(&Annotation::new("a", [0.0, 0.0, 1.0, 1.0]).with_attribute(DETECTED_TEXT, "STOP")));
    }

    #[test]
    fn test_attribute_projection_and_require_label() {
        let config = FilterConfig {
            labels: vec!["car".into()],
            attributes: vec![CONFIDENCE.into()],
            require_label: true,
            ..Default::default()
        };
        let mut data: AnnotatedFiles = vec![
            file(vec![Annotation::new("person", [0.0, 0.0, 1.0, 1.0])]),
            file(vec![Annotation::new("car", [0.0, 0.0, 1.0, 1.0])
                .with_attribute(CONFIDENCE, 0.9)
                .with_attribute(DETECTED_TEXT, "plate")]),
        ]
        .into();

        let report = filter_annotations(&mut data, &config);
        assert_eq!(report.removed_annotations, 1);
        assert_eq!(report.removed_files, 1);
        assert_eq!(data.len(), 1);
        let attrs = &data[0].annotations[0].attributes;
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[CONFIDENCE], AttributeValue::Float(0.9));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let config = FilterConfig {
            min_confidence: 0.3,
            min_bbox_width: 2.0,
            labels: vec!["a".into(), "b".into()],
            require_label: true,
            ..Default::default()
        };
        let mut data: AnnotatedFiles = (0..20)
            .map(|i| {
                let annotations = (0..6)
                    .map(|j| {
                        let label = ["a", "b", "c"][(i + j) % 3];
                        Annotation::new(label, [0.0, 0.0, j as f64, 3.0])
                            .with_attribute(CONFIDENCE, ((i * j) % 10) as f64 / 10.0)
                    })
                    .collect();
                file(annotations)
            })
            .collect();

        filter_annotations(&mut data, &config);
        let once = data.clone();
        let report = filter_annotations(&mut data, &config);
        assert_eq!(report, FilterReport::default());
        assert_eq!(data, once);
    }
}
