//! Compositing pipeline
//!
//! [`CompositePipeline`] turns an original photo, its background-removed
//! foreground and an [`EffectConfig`] into a PNG artifact. It owns the surface
//! pool, the mask builder and the artifact store, so repeated edits reuse
//! buffers and only the latest result stays alive.

use crate::{
    config::{EffectConfig, PipelineConfig},
    effects::{stages_for, RenderInputs, StageResources},
    error::{CompositeError, Result},
    export::{output_filename, ArtifactHandle, ArtifactStore, OutputArtifact},
    mask::MaskBuilder,
    pool::SurfacePool,
    services::progress::{ProcessingStage, ProgressTracker},
    surface::RasterSurface,
    types::{RenderMetadata, RenderTimings},
};
use image::RgbaImage;
use instant::Instant;
use log::{debug, info};
use std::sync::Arc;
use tracing::{debug as trace_debug, instrument, span, Level};

/// Renders edits onto pooled surfaces and tracks the resulting artifacts
#[derive(Debug)]
pub struct CompositePipeline {
    config: PipelineConfig,
    pool: SurfacePool,
    masks: MaskBuilder,
    store: ArtifactStore,
    progress_tracker: Option<ProgressTracker>,
    renders_completed: u64,
}

impl CompositePipeline {
    /// Create a pipeline from a validated configuration
    ///
    /// # Errors
    /// - Invalid limits, pool capacity or checkerboard style
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "Creating compositing pipeline: {} MP limit, {} pooled surfaces",
            config.limits.max_megapixels, config.pool_capacity
        );

        let progress_tracker = config
            .verbose_progress
            .then(|| ProgressTracker::console(true));

        Ok(Self {
            pool: SurfacePool::new(config.pool_capacity, config.limits),
            masks: MaskBuilder::new(),
            store: ArtifactStore::new(),
            progress_tracker,
            renders_completed: 0,
            config,
        })
    }

    /// Attach a progress tracker, replacing any existing one
    #[must_use]
    pub fn with_progress_tracker(mut self, tracker: ProgressTracker) -> Self {
        self.progress_tracker = Some(tracker);
        self
    }

    pub fn set_progress_tracker(&mut self, tracker: Option<ProgressTracker>) {
        self.progress_tracker = tracker;
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    #[must_use]
    pub fn artifacts(&self) -> &ArtifactStore {
        &self.store
    }

    /// Handle of the most recent successful render
    #[must_use]
    pub fn current_artifact(&self) -> Option<ArtifactHandle> {
        self.store.current()
    }

    /// Release an artifact the caller no longer needs
    pub fn release_artifact(&mut self, handle: ArtifactHandle) -> bool {
        self.store.release(handle)
    }

    /// Number of renders that produced an artifact
    #[must_use]
    pub fn renders_completed(&self) -> u64 {
        self.renders_completed
    }

    /// Start a progress run for decoding new inputs
    pub fn report_loading(&mut self) {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.restart();
            tracker.report_stage(ProcessingStage::ImageLoading);
        }
    }

    /// Forward a worker progress report
    pub fn report_segmentation(&mut self, percent: u8, phase: &str) {
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.report_percent(
                ProcessingStage::Segmentation,
                percent,
                format!("{} ({})", ProcessingStage::Segmentation.description(), phase),
            );
        }
    }

    /// Drop pooled surfaces, e.g. once the input size changes
    pub fn release_idle_surfaces(&mut self) {
        let idle = self.pool.idle();
        if idle > 0 {
            debug!("Releasing {} idle scratch surfaces", idle);
            self.pool.shrink();
        }
    }

    /// Render and encode, superseding the previous artifact
    ///
    /// # Errors
    /// - `InputMismatch` when the images differ in size
    /// - `Allocation` or `SurfaceUnavailable` when no surface can be obtained
    /// - `Encoding` when PNG serialisation fails
    ///
    /// A failed render leaves the previous artifact in place.
    pub fn render(
        &mut self,
        original: &RgbaImage,
        foreground: &RgbaImage,
        effects: &EffectConfig,
    ) -> Result<OutputArtifact> {
        self.render_named(original, foreground, effects, None)
    }

    /// Like [`render`](Self::render), naming the artifact after the upload
    #[instrument(
        skip(self, original, foreground, effects),
        fields(
            dimensions = %format!("{}x{}", foreground.width(), foreground.height()),
            effects = ?effects.enabled_effects()
        )
    )]
    pub fn render_named(
        &mut self,
        original: &RgbaImage,
        foreground: &RgbaImage,
        effects: &EffectConfig,
        source_name: Option<&str>,
    ) -> Result<OutputArtifact> {
        let result = self.encode_render(original, foreground, effects, source_name);
        if let Err(e) = &result {
            self.report_failure(e);
        }
        result
    }

    /// Render without encoding and return the composited pixels
    ///
    /// Does not touch the artifact store.
    pub fn render_image(
        &mut self,
        original: &RgbaImage,
        foreground: &RgbaImage,
        effects: &EffectConfig,
    ) -> Result<RgbaImage> {
        self.render_timed(original, foreground, effects)
            .map(|(image, _)| image)
    }

    /// Render without encoding, keeping the stage timings for a later commit
    pub(crate) fn render_timed(
        &mut self,
        original: &RgbaImage,
        foreground: &RgbaImage,
        effects: &EffectConfig,
    ) -> Result<(RgbaImage, RenderTimings)> {
        let total_start = Instant::now();
        let mut timings = RenderTimings::new();
        let canvas = match self.compose(original, foreground, effects, &mut timings) {
            Ok(canvas) => canvas,
            Err(e) => {
                self.report_failure(&e);
                return Err(e);
            },
        };

        let image = canvas.as_image().clone();
        self.pool.checkin(canvas);
        timings.total_ms = total_start.elapsed().as_millis() as u64;
        Ok((image, timings))
    }

    /// Encode an already composited image and make it the current artifact
    pub(crate) fn commit_image(
        &mut self,
        image: &RgbaImage,
        effects: &EffectConfig,
        mut timings: RenderTimings,
        source_name: Option<&str>,
    ) -> Result<OutputArtifact> {
        let encode_start = Instant::now();
        let bytes = match crate::export::encode_png(image) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.report_failure(&e);
                return Err(e);
            },
        };
        let encode_ms = encode_start.elapsed().as_millis() as u64;
        timings.encode_ms = Some(encode_ms);
        timings.total_ms += encode_ms;

        Ok(self.publish(bytes.into(), image.dimensions(), effects, timings, source_name))
    }

    fn encode_render(
        &mut self,
        original: &RgbaImage,
        foreground: &RgbaImage,
        effects: &EffectConfig,
        source_name: Option<&str>,
    ) -> Result<OutputArtifact> {
        let total_start = Instant::now();
        let mut timings = RenderTimings::new();
        let canvas = self.compose(original, foreground, effects, &mut timings)?;

        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.report_stage(ProcessingStage::Encoding);
        }
        let encode_start = Instant::now();
        let encoded = {
            let _span = span!(Level::DEBUG, "encode_png").entered();
            canvas.encode_png()
        };
        let dimensions = canvas.dimensions();
        self.pool.checkin(canvas);
        let bytes: Arc<[u8]> = encoded?.into();
        timings.encode_ms = Some(encode_start.elapsed().as_millis() as u64);
        timings.total_ms = total_start.elapsed().as_millis() as u64;

        Ok(self.publish(bytes, dimensions, effects, timings, source_name))
    }

    /// Register encoded bytes as the current artifact, releasing the previous one
    fn publish(
        &mut self,
        bytes: Arc<[u8]>,
        (width, height): (u32, u32),
        effects: &EffectConfig,
        timings: RenderTimings,
        source_name: Option<&str>,
    ) -> OutputArtifact {
        let handle = self.store.replace_current(Arc::clone(&bytes));
        self.renders_completed += 1;

        trace_debug!(
            %handle,
            bytes = bytes.len(),
            total_ms = timings.total_ms,
            "Render committed"
        );

        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.report_stage(ProcessingStage::Completed);
            tracker.report_completion(&timings);
        }

        let metadata = RenderMetadata::new(width, height, &effects.enabled_effects(), timings);
        OutputArtifact::new(handle, bytes, output_filename(source_name), metadata)
    }

    /// Run every stage on a fresh canvas
    ///
    /// On success the caller owns the canvas and must check it back in. On
    /// error every surface has already been returned.
    fn compose(
        &mut self,
        original: &RgbaImage,
        foreground: &RgbaImage,
        effects: &EffectConfig,
        timings: &mut RenderTimings,
    ) -> Result<RasterSurface> {
        if original.dimensions() != foreground.dimensions() {
            return Err(CompositeError::dimension_mismatch(
                original.dimensions(),
                foreground.dimensions(),
            ));
        }
        effects.validate()?;

        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.restart();
            tracker.report_stage(ProcessingStage::SurfacePreparation);
        }

        let setup_start = Instant::now();
        let (width, height) = foreground.dimensions();
        let mut canvas = self.pool.checkout(width, height)?;
        canvas.clear();
        timings.setup_ms = setup_start.elapsed().as_millis() as u64;

        let inputs = RenderInputs {
            original,
            foreground,
        };
        let mut resources = StageResources {
            pool: &mut self.pool,
            masks: &mut self.masks,
            checkerboard: &self.config.checkerboard,
        };

        for stage in stages_for(effects) {
            let kind = stage.kind();
            if let Some(tracker) = self.progress_tracker.as_mut() {
                tracker.report_stage(ProcessingStage::from(kind));
            }

            let _span = span!(Level::DEBUG, "effect_stage", stage = %kind).entered();
            let stage_start = Instant::now();
            if let Err(e) = stage.apply(&mut canvas, &inputs, &mut resources) {
                resources.pool.checkin(canvas);
                return Err(e);
            }
            timings.record(kind, stage_start.elapsed().as_millis() as u64);
        }

        info!(
            "Composited {}x{} image with effects {:?}",
            width,
            height,
            effects.enabled_effects()
        );
        Ok(canvas)
    }

    fn report_failure(&self, error: &CompositeError) {
        tracing::warn!(error = %error, "Render failed");
        if let Some(tracker) = self.progress_tracker.as_ref() {
            tracker.report_error(&error.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackgroundEffect, BlurEffect, Color};
    use image::Rgba;

    fn pipeline(pool_capacity: usize) -> CompositePipeline {
        let config = PipelineConfig::builder()
            .pool_capacity(pool_capacity)
            .build()
            .unwrap();
        CompositePipeline::new(config).unwrap()
    }

    fn opaque(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let mut pipeline = pipeline(4);
        let result = pipeline.render(
            &opaque(10, 10, [0, 0, 0, 255]),
            &opaque(10, 11, [0, 0, 0, 255]),
            &EffectConfig::default(),
        );
        assert!(matches!(result, Err(CompositeError::InputMismatch(_))));
        assert_eq!(pipeline.pool().outstanding(), 0);
    }

    #[test]
    fn test_opaque_foreground_over_black_fill() {
        let mut pipeline = pipeline(4);
        let foreground = RgbaImage::from_fn(100, 100, |x, y| Rgba([x as u8, y as u8, 7, 255]));
        let original = opaque(100, 100, [1, 2, 3, 255]);
        let effects =
            EffectConfig::default().with_background(BackgroundEffect::Fill(Color::BLACK));

        let image = pipeline.render_image(&original, &foreground, &effects).unwrap();
        assert_eq!(image, foreground);
    }

    #[test]
    fn test_render_registers_and_releases_artifacts() {
        let mut pipeline = pipeline(4);
        let original = opaque(8, 8, [9, 9, 9, 255]);
        let foreground = RgbaImage::new(8, 8);
        let effects = EffectConfig::default();

        let first = pipeline.render(&original, &foreground, &effects).unwrap();
        let second = pipeline.render(&original, &foreground, &effects).unwrap();

        assert!(!pipeline.artifacts().is_live(first.handle()));
        assert_eq!(pipeline.current_artifact(), Some(second.handle()));
        assert_eq!(pipeline.artifacts().live_count(), 1);
        assert_eq!(pipeline.renders_completed(), 2);
        assert_eq!(second.file_name(), "image_removebg.png");
    }

    #[test]
    fn test_failed_render_keeps_previous_artifact() {
        let mut pipeline = pipeline(1);
        let original = opaque(8, 8, [9, 9, 9, 255]);
        let foreground = RgbaImage::new(8, 8);

        let kept = pipeline
            .render(&original, &foreground, &EffectConfig::default())
            .unwrap();

        let blurred = EffectConfig::default().with_blur(BlurEffect {
            enabled: true,
            radius_px: 2,
        });
        let result = pipeline.render(&original, &foreground, &blurred);
        assert!(matches!(result, Err(CompositeError::SurfaceUnavailable(_))));

        assert_eq!(pipeline.current_artifact(), Some(kept.handle()));
        assert!(pipeline.artifacts().is_live(kept.handle()));
        assert_eq!(pipeline.pool().outstanding(), 0);

        // still usable after the failure
        assert!(pipeline
            .render(&original, &foreground, &EffectConfig::default())
            .is_ok());
    }

    #[test]
    fn test_invalid_effects_rejected() {
        let mut pipeline = pipeline(4);
        let image = opaque(4, 4, [0, 0, 0, 255]);
        let effects = EffectConfig::default().with_blur(BlurEffect {
            enabled: true,
            radius_px: 10_000,
        });

        let result = pipeline.render_image(&image, &image, &effects);
        assert!(matches!(result, Err(CompositeError::InvalidConfig(_))));
    }

    #[test]
    fn test_artifact_metadata() {
        let mut pipeline = pipeline(4);
        let image = opaque(6, 4, [0, 0, 0, 255]);
        let effects = EffectConfig::default().with_grayscale(true);

        let artifact = pipeline
            .render_named(&image, &image, &effects, Some("portrait.jpg"))
            .unwrap();

        assert_eq!(artifact.dimensions(), (6, 4));
        assert_eq!(artifact.file_name(), "portrait_removebg.png");
        assert_eq!(artifact.metadata().effects, vec!["grayscale".to_string()]);
        assert!(artifact.metadata().timings.encode_ms.is_some());
    }

    struct StageRecorder(Arc<std::sync::Mutex<Vec<(ProcessingStage, u8)>>>);

    impl crate::services::progress::ProgressReporter for StageRecorder {
        fn report_progress(&self, update: crate::services::progress::ProgressUpdate) {
            self.0.lock().unwrap().push((update.stage, update.progress));
        }

        fn report_completion(&self, _timings: &RenderTimings) {}

        fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
    }

    #[test]
    fn test_loading_and_segmentation_reported_before_render() {
        let stages = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut pipeline = pipeline(4).with_progress_tracker(ProgressTracker::new(Box::new(
            StageRecorder(Arc::clone(&stages)),
        )));
        let image = opaque(4, 4, [0, 0, 0, 255]);

        pipeline.report_loading();
        pipeline.report_segmentation(40, "inference");
        pipeline
            .render(&image, &image, &EffectConfig::default())
            .unwrap();

        let stages = stages.lock().unwrap();
        assert_eq!(stages[0], (ProcessingStage::ImageLoading, 5));
        assert_eq!(stages[1], (ProcessingStage::Segmentation, 40));
        assert_eq!(stages[2].0, ProcessingStage::SurfacePreparation);
        assert_eq!(stages.last(), Some(&(ProcessingStage::Completed, 100)));
    }

    #[test]
    fn test_release_idle_surfaces() {
        let mut pipeline = pipeline(4);
        let image = opaque(4, 4, [0, 0, 0, 255]);
        let blurred = EffectConfig::default().with_blur(BlurEffect {
            enabled: true,
            radius_px: 1,
        });
        pipeline.render(&image, &image, &blurred).unwrap();
        assert!(pipeline.pool().idle() > 0);

        pipeline.release_idle_surfaces();
        assert_eq!(pipeline.pool().idle(), 0);
        assert_eq!(pipeline.pool().outstanding(), 0);

        // the pool refills on the next render
        pipeline.render(&image, &image, &blurred).unwrap();
        assert!(pipeline.pool().idle() > 0);
    }
}
