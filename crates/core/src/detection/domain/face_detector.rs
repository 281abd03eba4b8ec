use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Backends hold inference sessions that need exclusive access while
/// running, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>>;
}
