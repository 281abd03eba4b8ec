/// Axis-aligned detection box in source-frame pixels, with its score.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub score: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
        }
    }

    pub fn width(&self) -> f64 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Intersection over union. Returns 0.0 for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_iou_identical() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.9);
        assert_relative_eq!(b.iou(&b), 1.0);
    }

    #[test]
    fn test_iou_disjoint() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0, 0.9);
        assert_relative_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 100.0, 100.0, 0.9);
        let b = BoundingBox::new(50.0, 0.0, 150.0, 100.0, 0.9);
        assert_relative_eq!(a.iou(&b), 5000.0 / 15000.0);
    }

    #[test]
    fn test_inverted_box_has_zero_area() {
        let b = BoundingBox::new(10.0, 10.0, 0.0, 0.0, 0.5);
        assert_relative_eq!(b.area(), 0.0);
    }
}
