//! Shared result types for render timing and artifact metadata

use crate::effects::StageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-stage timing breakdown for one render
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTimings {
    /// Surface checkout and clear
    pub setup_ms: u64,
    pub background_ms: u64,
    pub blur_ms: u64,
    pub grayscale_ms: u64,
    pub foreground_ms: u64,
    pub border_ms: u64,
    /// PNG encoding (absent for raw renders)
    pub encode_ms: Option<u64>,
    /// Total end-to-end render time
    pub total_ms: u64,
}

impl RenderTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the time spent in one stage
    pub fn record(&mut self, kind: StageKind, elapsed_ms: u64) {
        let slot = match kind {
            StageKind::Background => &mut self.background_ms,
            StageKind::Blur => &mut self.blur_ms,
            StageKind::Grayscale => &mut self.grayscale_ms,
            StageKind::Foreground => &mut self.foreground_ms,
            StageKind::Border => &mut self.border_ms,
        };
        *slot += elapsed_ms;
    }

    #[must_use]
    pub fn stage_ms(&self, kind: StageKind) -> u64 {
        match kind {
            StageKind::Background => self.background_ms,
            StageKind::Blur => self.blur_ms,
            StageKind::Grayscale => self.grayscale_ms,
            StageKind::Foreground => self.foreground_ms,
            StageKind::Border => self.border_ms,
        }
    }

    fn measured_ms(&self) -> u64 {
        self.setup_ms
            + self.background_ms
            + self.blur_ms
            + self.grayscale_ms
            + self.foreground_ms
            + self.border_ms
            + self.encode_ms.unwrap_or(0)
    }

    /// Time not attributed to any stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        self.total_ms.saturating_sub(self.measured_ms())
    }

    /// Share of the total spent in each phase
    #[must_use]
    pub fn breakdown_percentages(&self) -> TimingBreakdown {
        if self.total_ms == 0 {
            return TimingBreakdown::default();
        }

        let total = self.total_ms as f64;
        let pct = |ms: u64| (ms as f64 / total) * 100.0;
        TimingBreakdown {
            setup_pct: pct(self.setup_ms),
            background_pct: pct(self.background_ms),
            blur_pct: pct(self.blur_ms),
            grayscale_pct: pct(self.grayscale_ms),
            foreground_pct: pct(self.foreground_ms),
            border_pct: pct(self.border_ms),
            encode_pct: pct(self.encode_ms.unwrap_or(0)),
            other_pct: pct(self.other_overhead_ms()),
        }
    }
}

/// Percentage breakdown of timing phases
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingBreakdown {
    pub setup_pct: f64,
    pub background_pct: f64,
    pub blur_pct: f64,
    pub grayscale_pct: f64,
    pub foreground_pct: f64,
    pub border_pct: f64,
    pub encode_pct: f64,
    pub other_pct: f64,
}

/// Description of how an artifact was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderMetadata {
    pub width: u32,
    pub height: u32,
    /// Effects that ran, in render order
    pub effects: Vec<String>,
    pub timings: RenderTimings,
    pub created_at: DateTime<Utc>,
}

impl RenderMetadata {
    #[must_use]
    pub fn new(width: u32, height: u32, effects: &[&str], timings: RenderTimings) -> Self {
        Self {
            width,
            height,
            effects: effects.iter().map(ToString::to_string).collect(),
            timings,
            created_at: Utc::now(),
        }
    }
}
