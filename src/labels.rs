use log::info;
use rayon::prelude::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use crate::error::{ConvError, Result};
use crate::types::AnnotatedFiles;

/// A label (sub-)string replacement, written as `old=new`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRule {
    pub old: String,
    pub new: String,
}

impl FromStr for LabelRule {
    type Err = ConvError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(old), Some(new), None) => Ok(LabelRule {
                old: old.to_string(),
                new: new.to_string(),
            }),
            _ => Err(ConvError::MalformedRule {
                rule: s.to_string(),
            }),
        }
    }
}

/// Parse all rules, failing on the first malformed one.
pub fn parse_rules<S: AsRef<str>>(mappings: &[S]) -> Result<Vec<LabelRule>> {
    mappings.iter().map(|m| m.as_ref().parse()).collect()
}

/// Apply the `old=new` mappings, in order, to every label in the dataset.
///
/// Later rules see the output of earlier ones. Returns the number of labels that changed.
pub fn map_labels<S: AsRef<str>>(data: &mut AnnotatedFiles, mappings: &[S]) -> Result<usize> {
    if mappings.is_empty() {
        return Ok(0);
    }
    let rules = parse_rules(mappings)?;
    Ok(apply_rules(data, &rules))
}

/// Apply already parsed rules and return the number of changed labels.
pub fn apply_rules(data: &mut AnnotatedFiles, rules: &[LabelRule]) -> usize {
    if rules.is_empty() {
        return 0;
    }
    let changed = AtomicUsize::new(0);
    data.par_iter_mut().for_each(|file| {
        for annotation in &mut file.annotations {
            let mut label = annotation.label.clone();
            for rule in rules {
                label = label.replace(&rule.old, &rule.new);
            }
            if label != annotation.label {
                annotation.label = label;
                changed.fetch_add(1, Relaxed);
            }
        }
    });
    let count = changed.into_inner();
    info!("The label mappings changed {} labels", count);
    count
}
