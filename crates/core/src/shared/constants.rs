pub const FACE_MODEL_NAME: &str = "blazeface.onnx";
pub const OBJECT_MODEL_NAME: &str = "yolo11n.onnx";

/// Detector input after normalization (the size the source models were fed).
pub const DEFAULT_SAMPLE_WIDTH: u32 = 224;
pub const DEFAULT_SAMPLE_HEIGHT: u32 = 224;

/// Roughly one display refresh at 60 Hz.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 16;

pub const DEFAULT_FACE_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_OBJECT_CONFIDENCE: f64 = 0.5;

/// Number of top-scoring object detections considered per frame.
pub const DEFAULT_MAX_OBJECT_DETECTIONS: usize = 20;

pub const DEFAULT_RESTRICTED_LABELS: &[&str] = &["cell phone", "remote"];

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

/// COCO class names in model output order.
pub const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
