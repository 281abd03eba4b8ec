pub mod detector_service;
pub mod math;
pub mod onnx_blazeface_detector;
pub mod onnx_model_loader;
pub mod onnx_session;
pub mod onnx_yolo_object_detector;
