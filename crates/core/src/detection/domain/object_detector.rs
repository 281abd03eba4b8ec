use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// One classified object in a frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDetection {
    pub label: String,
    pub bbox: BoundingBox,
}

impl ObjectDetection {
    pub fn score(&self) -> f64 {
        self.bbox.score
    }
}

/// Domain interface for general object detection.
pub trait ObjectDetector: Send {
    fn detect(&mut self, frame: &Frame)
        -> Result<Vec<ObjectDetection>, Box<dyn std::error::Error>>;
}
