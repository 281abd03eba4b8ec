//! Shared post-processing for the ONNX detection backends.

use crate::shared::bounding_box::BoundingBox;

/// Greedy NMS: visit boxes by descending score, suppress any later box whose
/// IoU with a kept box exceeds `iou_thresh`.
///
/// Returns indices into `boxes` of the kept entries, highest score first.
pub fn nms(boxes: &[BoundingBox], iou_thresh: f64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        boxes[b]
            .score
            .partial_cmp(&boxes[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);
        for &j in &order[pos + 1..] {
            if !suppressed[j] && boxes[i].iou(&boxes[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2, score)
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let boxes = vec![
            bx(0.0, 0.0, 100.0, 100.0, 0.9),
            bx(5.0, 5.0, 105.0, 105.0, 0.8),
        ];
        assert_eq!(nms(&boxes, 0.3), vec![0]);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let boxes = vec![
            bx(0.0, 0.0, 50.0, 50.0, 0.9),
            bx(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(nms(&boxes, 0.3), vec![0, 1]);
    }

    #[test]
    fn test_nms_empty_input() {
        assert!(nms(&[], 0.3).is_empty());
    }

    #[test]
    fn test_nms_confidence_ordering() {
        let boxes = vec![
            bx(0.0, 0.0, 100.0, 100.0, 0.5),
            bx(2.0, 2.0, 102.0, 102.0, 0.9),
        ];
        // Higher confidence (index 1) wins
        assert_eq!(nms(&boxes, 0.3), vec![1]);
    }

    #[test]
    fn test_sigmoid_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }
}
