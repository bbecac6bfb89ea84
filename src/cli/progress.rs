//! Terminal progress bar for a single render

use crate::{
    services::progress::{ProcessingStage, ProgressReporter, ProgressUpdate},
    types::RenderTimings,
};
use indicatif::{ProgressBar, ProgressStyle};

/// Drives an `indicatif` bar from pipeline progress updates
pub(crate) struct ProgressBarReporter {
    bar: ProgressBar,
}

impl ProgressBarReporter {
    pub(crate) fn new() -> Self {
        Self::with_bar(ProgressBar::new(100))
    }

    pub(crate) fn with_bar(bar: ProgressBar) -> Self {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for ProgressBarReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.bar.set_position(u64::from(update.progress));
        self.bar.set_message(update.description);
    }

    fn report_completion(&self, timings: &RenderTimings) {
        self.bar
            .finish_with_message(format!("Done in {}ms", timings.total_ms));
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        self.bar
            .abandon_with_message(format!("{} failed: {}", stage.description(), error));
    }
}
