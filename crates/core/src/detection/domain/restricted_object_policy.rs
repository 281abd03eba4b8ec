use crate::detection::domain::object_detector::ObjectDetection;
use crate::shared::constants::{DEFAULT_MAX_OBJECT_DETECTIONS, DEFAULT_RESTRICTED_LABELS};

/// Decides whether a frame's object detections contain a disallowed item.
///
/// Only the `max_detections` highest-scoring detections are considered,
/// matching how the detector reports its top results. Labels compare
/// case-insensitively.
#[derive(Clone, Debug, PartialEq)]
pub struct RestrictedObjectPolicy {
    labels: Vec<String>,
    max_detections: usize,
}

impl RestrictedObjectPolicy {
    pub fn new<I, S>(labels: I, max_detections: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|l| l.as_ref().trim().to_lowercase())
                .filter(|l| !l.is_empty())
                .collect(),
            max_detections: max_detections.max(1),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn max_detections(&self) -> usize {
        self.max_detections
    }

    pub fn is_restricted(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.labels.iter().any(|l| *l == label)
    }

    /// First restricted detection among the top results, if any.
    pub fn find_violation<'a>(
        &self,
        detections: &'a [ObjectDetection],
    ) -> Option<&'a ObjectDetection> {
        let mut ranked: Vec<&ObjectDetection> = detections.iter().collect();
        ranked.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
            .into_iter()
            .take(self.max_detections)
            .find(|d| self.is_restricted(&d.label))
    }
}

impl Default for RestrictedObjectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RESTRICTED_LABELS, DEFAULT_MAX_OBJECT_DETECTIONS)
    }
}
