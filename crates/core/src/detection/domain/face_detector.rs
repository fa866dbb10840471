use thiserror::Error;

use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// A single inference call failed. The monitor treats this as transient.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    Output(String),
}

/// Domain interface for face detection.
///
/// Implementations may hold inference state, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionError>;
}
