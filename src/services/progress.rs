//! Progress reporting service
//!
//! Keeps progress reporting out of the rendering code so frontends can plug
//! in their own handling. Progress is best-effort and never affects results.

use crate::{effects::StageKind, types::RenderTimings};
use instant::Instant;

/// Stages reported while preparing and rendering an edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Loading and decoding the input images
    ImageLoading,
    /// Waiting on the background-removal worker
    Segmentation,
    /// Checking out and clearing the canvas
    SurfacePreparation,
    Background,
    Blur,
    Grayscale,
    Foreground,
    Border,
    /// Serialising the canvas to PNG
    Encoding,
    /// Render completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::ImageLoading => "Loading input images",
            ProcessingStage::Segmentation => "Removing background",
            ProcessingStage::SurfacePreparation => "Preparing canvas",
            ProcessingStage::Background => "Drawing background",
            ProcessingStage::Blur => "Blurring background",
            ProcessingStage::Grayscale => "Converting background to grayscale",
            ProcessingStage::Foreground => "Drawing subject",
            ProcessingStage::Border => "Drawing outline",
            ProcessingStage::Encoding => "Encoding PNG",
            ProcessingStage::Completed => "Render completed",
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::ImageLoading => 5,
            ProcessingStage::Segmentation => 10, // Variable, reported by the worker
            ProcessingStage::SurfacePreparation => 20,
            ProcessingStage::Background => 30,
            ProcessingStage::Blur => 45,
            ProcessingStage::Grayscale => 60,
            ProcessingStage::Foreground => 70,
            ProcessingStage::Border => 85,
            ProcessingStage::Encoding => 95,
            ProcessingStage::Completed => 100,
        }
    }
}

impl From<StageKind> for ProcessingStage {
    fn from(kind: StageKind) -> Self {
        match kind {
            StageKind::Background => Self::Background,
            StageKind::Blur => Self::Blur,
            StageKind::Grayscale => Self::Grayscale,
            StageKind::Foreground => Self::Foreground,
            StageKind::Border => Self::Border,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Current processing stage
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since tracking started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    /// Create a new progress update
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }

    /// Create a progress update with an explicit percentage and description
    #[must_use]
    pub fn with_progress(
        stage: ProcessingStage,
        progress: u8,
        description: String,
        start_time: Instant,
    ) -> Self {
        Self {
            progress: progress.min(100),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
            description,
        }
    }
}

/// Trait for reporting progress during renders
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report render completion with final timings
    fn report_completion(&self, timings: &RenderTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &RenderTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {} ({}ms elapsed)",
                update.progress,
                update.description,
                update.elapsed_ms
            );
        } else {
            log::info!("[{}%] {}", update.progress, update.description);
        }
    }

    fn report_completion(&self, timings: &RenderTimings) {
        log::info!("✅ Render completed in {}ms", timings.total_ms);

        if self.verbose {
            log::info!("  📊 Detailed timings:");
            log::info!("    • Setup: {}ms", timings.setup_ms);
            log::info!("    • Background: {}ms", timings.background_ms);
            log::info!("    • Blur: {}ms", timings.blur_ms);
            log::info!("    • Grayscale: {}ms", timings.grayscale_ms);
            log::info!("    • Foreground: {}ms", timings.foreground_ms);
            log::info!("    • Border: {}ms", timings.border_ms);
            if let Some(encode_ms) = timings.encode_ms {
                log::info!("    • Encode: {}ms", encode_ms);
            }
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage.description(), error);
    }
}

/// Progress tracker that manages timing and progress reporting
pub struct ProgressTracker {
    reporter: Box<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified reporter
    #[must_use]
    pub fn new(reporter: Box<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Box::new(NoOpProgressReporter))
    }

    /// Create a progress tracker with console reporter
    #[must_use]
    pub fn console(verbose: bool) -> Self {
        Self::new(Box::new(ConsoleProgressReporter::new(verbose)))
    }

    /// Restart the elapsed-time clock for a new render
    pub fn restart(&mut self) {
        self.start_time = Instant::now();
        self.current_stage = None;
    }

    /// Report progress for a specific stage
    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::new(stage, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report progress with an explicit percentage
    pub fn report_percent(&mut self, stage: ProcessingStage, progress: u8, description: String) {
        self.current_stage = Some(stage);
        let update = ProgressUpdate::with_progress(stage, progress, description, self.start_time);
        self.reporter.report_progress(update);
    }

    /// Report completion with final timings
    pub fn report_completion(&self, timings: &RenderTimings) {
        self.reporter.report_completion(timings);
    }

    /// Report an error during processing
    pub fn report_error(&self, error: &str) {
        let stage = self
            .current_stage
            .unwrap_or(ProcessingStage::SurfacePreparation);
        self.reporter.report_error(stage, error);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Get the current processing stage
    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}
