//! Services that sit beside the rendering core
//!
//! - [`io`]: upload validation, decoding and file access
//! - [`progress`]: progress reporting for renders and segmentation

pub mod io;
pub mod progress;

pub use io::{ImageIOService, Upload, MAX_UPLOAD_BYTES};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
