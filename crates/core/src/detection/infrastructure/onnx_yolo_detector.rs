/// YOLO face-pose detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference, NMS post-processing and
/// keypoint decoding into [`Detection`]s.
use std::path::Path;

use crate::detection::domain::detection::{BoundingBox, Detection, FaceKeypoints, Point};
use crate::detection::domain::face_detector::{DetectionError, FaceDetector};
use crate::shared::frame::Frame;

use super::execution_provider::preferred_execution_providers;
use super::math::bbox_iou;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// Default confidence threshold for face detection.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// Number of keypoint values per detection (5 landmarks × x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
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

        log::debug!("Face model loaded, input size {input_size}");

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, Box<dyn std::error::Error>> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }

        // Output is [1, features, detections] (transposed) or [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats < 5 + NUM_KEYPOINT_VALUES {
            return Err(format!("Model has no face keypoints ({num_feats} features)").into());
        }

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let mut raw_dets = Vec::new();
        for i in 0..num_dets {
            let feature = |f: usize| -> f64 {
                if transposed {
                    data[f * num_dets + i] as f64
                } else {
                    data[i * num_feats + f] as f64
                }
            };

            // row format: [cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]
            let conf = feature(4);
            if conf < self.confidence {
                continue;
            }

            let to_frame = |x: f64, y: f64| {
                Point::new((x - pad_x as f64) / scale, (y - pad_y as f64) / scale)
            };

            let (cx, cy, w, h) = (feature(0), feature(1), feature(2), feature(3));
            let top_left = to_frame(cx - w / 2.0, cy - h / 2.0);
            let bottom_right = to_frame(cx + w / 2.0, cy + h / 2.0);

            let mut keypoints = [Point::default(); 5];
            for (k, kp) in keypoints.iter_mut().enumerate() {
                *kp = to_frame(feature(5 + k * 3), feature(5 + k * 3 + 1));
            }

            raw_dets.push(RawDetection {
                corners: [top_left.x, top_left.y, bottom_right.x, bottom_right.y],
                confidence: conf,
                keypoints,
            });
        }

        Ok(nms(&mut raw_dets, NMS_IOU_THRESH))
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError> {
        let raw = self
            .infer(frame)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        Ok(raw.into_iter().map(RawDetection::into_detection).collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, the YOLO convention.
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

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

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    /// `[x1, y1, x2, y2]` in frame pixels.
    corners: [f64; 4],
    confidence: f64,
    /// Image-space order: left eye, right eye, nose, left mouth, right mouth.
    keypoints: [Point; 5],
}

impl RawDetection {
    /// Image-left landmarks belong to the subject's right side.
    fn into_detection(self) -> Detection {
        let [x1, y1, x2, y2] = self.corners;
        let [eye_a, eye_b, nose, mouth_a, mouth_b] = self.keypoints;
        let keypoints = FaceKeypoints {
            mouth_right: Some(mouth_a),
            mouth_left: Some(mouth_b),
            ..FaceKeypoints::new(eye_a, eye_b, nose)
        };
        Detection::new(
            BoundingBox::from_corners(x1, y1, x2, y2),
            keypoints,
            self.confidence,
        )
    }
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if !suppressed[j] && bbox_iou(&dets[i].corners, &dets[j].corners) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
