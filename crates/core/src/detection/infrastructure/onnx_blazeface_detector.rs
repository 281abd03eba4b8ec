/// BlazeFace face detector using ONNX Runtime via `ort`.
///
/// A lightweight short-range face model. The monitor only needs to count
/// faces, so boxes are returned without landmarks.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

use super::math::{nms, sigmoid};
use super::onnx_session::open_session;

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

/// Values per anchor in the regressor output (box + 6 keypoints).
const REGRESSOR_STRIDE: usize = 16;

/// BlazeFace face detector backed by an ONNX Runtime session.
pub struct OnnxBlazefaceDetector {
    session: ort::session::Session,
    confidence: f64,
    anchors: Vec<[f32; 2]>,
}

impl OnnxBlazefaceDetector {
    /// Load a BlazeFace ONNX model.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = open_session(model_path)?;
        Ok(Self {
            session,
            confidence,
            anchors: generate_anchors(),
        })
    }
}

impl FaceDetector for OnnxBlazefaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
        // 1. Preprocess: resize to 128x128, normalize to [0,1], NCHW
        let input_tensor = preprocess(frame, INPUT_SIZE);

        // 2. Inference
        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;

        // BlazeFace outputs two tensors:
        // - regressors: [1, 896, 16] (box deltas + keypoints)
        // - classificators: [1, 896, 1] (confidence scores)
        if outputs.len() < 2 {
            return Err(
                format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into(),
            );
        }

        let regressors = outputs[0].try_extract_array::<f32>()?;
        let scores = outputs[1].try_extract_array::<f32>()?;
        let reg_data = regressors.as_slice().ok_or("Cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("Cannot get score slice")?;

        // 3. Decode anchor boxes + filter by confidence
        let boxes = decode(
            reg_data,
            score_data,
            &self.anchors,
            self.confidence,
            frame.width(),
            frame.height(),
        );

        // 4. NMS
        let keep = nms(&boxes, NMS_IOU_THRESH);
        Ok(keep.into_iter().map(|i| boxes[i].clone()).collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Turns raw regressor/score outputs into frame-space boxes above `confidence`.
fn decode(
    reg_data: &[f32],
    score_data: &[f32],
    anchors: &[[f32; 2]],
    confidence: f64,
    fw: u32,
    fh: u32,
) -> Vec<BoundingBox> {
    let mut boxes = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if (score as f64) < confidence {
            continue;
        }

        let anchor = &anchors[i];
        let reg_offset = i * REGRESSOR_STRIDE;
        if reg_offset + 4 > reg_data.len() {
            break;
        }

        // Box center + size relative to anchor
        let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

        let x1 = ((cx - w / 2.0) * fw as f32).max(0.0);
        let y1 = ((cy - h / 2.0) * fh as f32).max(0.0);
        let x2 = ((cx + w / 2.0) * fw as f32).min(fw as f32);
        let y2 = ((cy + h / 2.0) * fh as f32).min(fh as f32);

        boxes.push(BoundingBox::new(
            x1 as f64,
            y1 as f64,
            x2 as f64,
            y2 as f64,
            score as f64,
        ));
    }

    boxes
}

// ---------------------------------------------------------------------------
// Anchor generation (BlazeFace short-range)
// ---------------------------------------------------------------------------

/// Generate BlazeFace anchors for the short-range model.
///
/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
