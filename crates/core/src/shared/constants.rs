pub const FACE_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Directory name under the platform cache/config dirs.
pub const APP_DIR_NAME: &str = "Proctor";

/// Reference sampling cadence: one tick per second.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;

/// Reference readiness poll: every three seconds.
pub const DEFAULT_READINESS_POLL_MS: u64 = 3_000;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi"];
