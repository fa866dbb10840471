//! One face found in a frame: box, named keypoints, and score.
//!
//! Eye names follow the subject's perspective, so on an unmirrored camera
//! image the right eye appears on the left side.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(&self, other: &Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates `(x1, y1, x2, y2)`.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::new(x1, y1, (x2 - x1).max(0.0), (y2 - y1).max(0.0))
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceKeypoints {
    pub right_eye: Point,
    pub left_eye: Point,
    pub nose_tip: Point,
    pub mouth_right: Option<Point>,
    pub mouth_left: Option<Point>,
}

impl FaceKeypoints {
    pub fn new(right_eye: Point, left_eye: Point, nose_tip: Point) -> Self {
        Self {
            right_eye,
            left_eye,
            nose_tip,
            mouth_right: None,
            mouth_left: None,
        }
    }

    pub fn eye_midpoint(&self) -> Point {
        self.right_eye.midpoint(&self.left_eye)
    }

    pub fn eye_distance(&self) -> f64 {
        self.right_eye.distance(&self.left_eye)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub keypoints: FaceKeypoints,
    /// Detector score in `[0, 1]`.
    pub confidence: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, keypoints: FaceKeypoints, confidence: f64) -> Self {
        Self {
            bbox,
            keypoints,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
