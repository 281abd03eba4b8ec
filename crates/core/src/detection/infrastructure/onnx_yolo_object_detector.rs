/// COCO object detector (YOLO family) using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, per-row class selection and
/// NMS. Class indices map to names through [`COCO_LABELS`].
use std::path::Path;

use crate::detection::domain::object_detector::{ObjectDetection, ObjectDetector};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::COCO_LABELS;
use crate::shared::frame::Frame;

use super::math::nms;
use super::onnx_session::open_session;

/// Fallback model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Leading box values per row: cx, cy, w, h.
const BOX_VALUES: usize = 4;

/// YOLO object detector backed by an ONNX Runtime session.
pub struct OnnxYoloObjectDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloObjectDetector {
    /// Load a YOLO ONNX model trained on COCO.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // shape is [N, C, H, W]; square input, so H is enough
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }
}

impl ObjectDetector for OnnxYoloObjectDetector {
    fn detect(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<ObjectDetection>, Box<dyn std::error::Error>> {
        // 1. Preprocess: letterbox + normalize → NCHW float32
        let letterboxed = letterbox(frame, self.input_size);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(letterboxed.tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;

        // 3. Parse + NMS
        let candidates = parse_detections(data, &shape, self.confidence, &letterboxed.mapping);
        let keep = class_nms(&candidates, NMS_IOU_THRESH);

        Ok(keep
            .into_iter()
            .map(|i| {
                let (class_id, bbox) = &candidates[i];
                ObjectDetection {
                    label: class_label(*class_id),
                    bbox: bbox.clone(),
                }
            })
            .collect())
    }
}

/// NMS within each class; boxes of different classes never suppress each
/// other. Returns indices into `candidates`, highest score first.
fn class_nms(candidates: &[(usize, BoundingBox)], iou_thresh: f64) -> Vec<usize> {
    let mut classes: Vec<usize> = candidates.iter().map(|(class_id, _)| *class_id).collect();
    classes.sort_unstable();
    classes.dedup();

    let mut keep = Vec::new();
    for class_id in classes {
        let members: Vec<usize> = (0..candidates.len())
            .filter(|&i| candidates[i].0 == class_id)
            .collect();
        let boxes: Vec<BoundingBox> = members.iter().map(|&i| candidates[i].1.clone()).collect();
        keep.extend(nms(&boxes, iou_thresh).into_iter().map(|k| members[k]));
    }

    keep.sort_by(|&a, &b| {
        candidates[b]
            .1
            .score
            .partial_cmp(&candidates[a].1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keep
}

fn class_label(class_id: usize) -> String {
    COCO_LABELS
        .get(class_id)
        .map(|l| l.to_string())
        .unwrap_or_else(|| format!("class {class_id}"))
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// How letterbox coordinates map back to the source frame.
#[derive(Clone, Copy, Debug, PartialEq)]
struct LetterboxMapping {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

impl LetterboxMapping {
    fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    mapping: LetterboxMapping,
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
fn letterbox(frame: &Frame, target_size: u32) -> Letterboxed {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray(); // [H, W, C] u8
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbor resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    Letterboxed {
        tensor,
        mapping: LetterboxMapping {
            scale,
            pad_x,
            pad_y,
        },
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Parses raw YOLO output into `(class_id, box)` pairs above `confidence`.
///
/// Output is `[1, 4 + classes, detections]` (transposed, the usual export)
/// or `[1, detections, 4 + classes]`. Each row holds a box followed by one
/// score per class; the best class wins.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    confidence: f64,
    mapping: &LetterboxMapping,
) -> Vec<(usize, BoundingBox)> {
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats <= BOX_VALUES || data.len() < num_dets * num_feats {
        return Vec::new();
    }

    let value = |det: usize, feat: usize| -> f32 {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut out = Vec::new();
    for i in 0..num_dets {
        let (class_id, score) = (BOX_VALUES..num_feats)
            .map(|f| (f - BOX_VALUES, value(i, f)))
            .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        let score = score as f64;
        if score < confidence {
            continue;
        }

        let cx = value(i, 0) as f64;
        let cy = value(i, 1) as f64;
        let w = value(i, 2) as f64;
        let h = value(i, 3) as f64;

        let (x1, y1) = mapping.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = mapping.to_frame(cx + w / 2.0, cy + h / 2.0);
        out.push((class_id, BoundingBox::new(x1, y1, x2, y2, score)));
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
