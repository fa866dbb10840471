pub mod detector_loader;
mod execution_provider;
mod math;
pub mod model_resolver;
pub mod onnx_yolo_detector;
