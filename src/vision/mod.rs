//! Vision Layer
//!
//! Everything that touches pixels: coordinate scaling, the rendering
//! surface, dHash fingerprints, region partitioning, the OCR boundary and
//! worker pool, and the orchestrator tying them together.

pub mod coords;
pub mod dhash;
pub mod ocr;
pub mod partition;
pub mod pool;
pub mod recognizer;
pub mod surface;
pub mod tesseract;

pub use dhash::HashMatch;
pub use ocr::{OcrEngine, OcrText, OcrWorker};
pub use pool::OcrWorkerPool;
pub use recognizer::{FailureKind, RecognitionOutput, Recognizer, RegionFailure, RegionValue};
pub use tesseract::TesseractEngine;
