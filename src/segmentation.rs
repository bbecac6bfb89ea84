//! Consumer side of the background-removal worker
//!
//! Segmentation itself runs elsewhere (a model runtime, a web worker, a
//! remote service). This module defines the contract with that collaborator:
//! a request goes in, and a finite stream of progress events comes back,
//! terminated by exactly one completion carrying the foreground image bytes
//! or a failure reason.

use crate::error::{CompositeError, Result};
use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use image::GrayImage;
use std::{future::Future, io::Cursor, sync::Arc};
use tokio::{sync::mpsc, task::AbortHandle};
use tracing::{debug, warn};

/// Buffered events per job before the worker is back-pressured
const EVENT_BUFFER: usize = 64;

/// One message from the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentationEvent {
    /// Advisory progress, 0 to 100
    Progress { percent: u8, phase: String },
    /// Terminal event: encoded foreground bytes or a failure reason
    Complete(std::result::Result<Vec<u8>, String>),
}

/// Progress as seen by the consumer after coalescing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationProgress {
    pub percent: u8,
    pub phase: String,
}

/// Drops progress that does not move forward
///
/// Percentages are clamped to 100 and only strictly increasing values pass.
#[derive(Debug, Default, Clone)]
pub struct ProgressCoalescer {
    last: Option<u8>,
}

impl ProgressCoalescer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the clamped percentage when it advances
    pub fn accept(&mut self, percent: u8) -> Option<u8> {
        let percent = percent.min(100);
        match self.last {
            Some(last) if percent <= last => None,
            _ => {
                self.last = Some(percent);
                Some(percent)
            },
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}

/// Binary hint marking pixels that belong to the subject
///
/// Same size as the image being segmented; every value is 0 or 255.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuidanceMask {
    pixels: GrayImage,
}

impl GuidanceMask {
    /// Wrap a single-channel mask
    ///
    /// # Errors
    /// - `InvalidConfig` if any value is neither 0 nor 255
    pub fn new(pixels: GrayImage) -> Result<Self> {
        if let Some(value) = pixels.as_raw().iter().find(|&&v| v != 0 && v != u8::MAX) {
            return Err(CompositeError::invalid_config(format!(
                "guidance mask must be binary (0 or 255), found {}",
                value
            )));
        }
        Ok(Self { pixels })
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.pixels
    }
}

/// Everything the worker needs to segment one image
#[derive(Debug, Clone)]
pub struct SegmentationRequest {
    /// Encoded source image
    pub image: Arc<[u8]>,
    pub guidance: Option<GuidanceMask>,
}

impl SegmentationRequest {
    #[must_use]
    pub fn new(image: Arc<[u8]>) -> Self {
        Self {
            image,
            guidance: None,
        }
    }

    /// Attach a guidance mask, checking it matches the image size
    ///
    /// # Errors
    /// - The image header cannot be read
    /// - `InputMismatch` when the mask and image sizes differ
    pub fn with_guidance(mut self, guidance: GuidanceMask) -> Result<Self> {
        let image_dimensions = image::ImageReader::new(Cursor::new(self.image.as_ref()))
            .with_guessed_format()?
            .into_dimensions()?;

        if image_dimensions != guidance.dimensions() {
            let (mask_w, mask_h) = guidance.dimensions();
            return Err(CompositeError::input_mismatch(format!(
                "guidance mask is {}x{} but image is {}x{}",
                mask_w, mask_h, image_dimensions.0, image_dimensions.1
            )));
        }

        self.guidance = Some(guidance);
        Ok(self)
    }
}

/// A running segmentation
///
/// Dropping the job or calling [`cancel`](Self::cancel) aborts the worker
/// task; a fresh job must be started afterwards.
pub struct SegmentationJob {
    events: BoxStream<'static, SegmentationEvent>,
    abort: Option<AbortHandle>,
}

impl SegmentationJob {
    /// Wrap an event stream with no task to abort
    #[must_use]
    pub fn new(events: BoxStream<'static, SegmentationEvent>) -> Self {
        Self {
            events,
            abort: None,
        }
    }

    /// Build a job fed by a channel receiver
    #[must_use]
    pub fn from_receiver(receiver: mpsc::Receiver<SegmentationEvent>) -> Self {
        let events = futures::stream::unfold(receiver, |mut receiver| async move {
            receiver.recv().await.map(|event| (event, receiver))
        });
        Self::new(events.boxed())
    }

    /// Run `worker` on the tokio runtime, feeding events through a channel
    pub fn spawn<F, Fut>(worker: F) -> Self
    where
        F: FnOnce(mpsc::Sender<SegmentationEvent>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(worker(sender));
        Self::from_receiver(receiver).with_abort_handle(task.abort_handle())
    }

    #[must_use]
    pub fn with_abort_handle(mut self, handle: AbortHandle) -> Self {
        self.abort = Some(handle);
        self
    }

    /// Abort the worker and discard any pending events
    pub fn cancel(mut self) {
        self.abort_worker();
    }

    /// Consume events until completion
    ///
    /// `on_progress` sees only coalesced, strictly increasing progress.
    ///
    /// # Errors
    /// - `Segmentation` when the worker reports failure or the stream ends
    ///   without a completion event
    pub async fn wait<F>(&mut self, mut on_progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(SegmentationProgress) + Send,
    {
        let mut coalescer = ProgressCoalescer::new();

        while let Some(event) = self.events.next().await {
            match event {
                SegmentationEvent::Progress { percent, phase } => {
                    if let Some(percent) = coalescer.accept(percent) {
                        on_progress(SegmentationProgress { percent, phase });
                    }
                },
                SegmentationEvent::Complete(Ok(bytes)) => {
                    debug!(bytes = bytes.len(), "Segmentation completed");
                    return Ok(bytes);
                },
                SegmentationEvent::Complete(Err(reason)) => {
                    warn!(%reason, "Segmentation failed");
                    return Err(CompositeError::segmentation(reason));
                },
            }
        }

        Err(CompositeError::segmentation(
            "worker stopped without reporting completion",
        ))
    }

    fn abort_worker(&mut self) {
        if let Some(handle) = self.abort.take() {
            handle.abort();
        }
    }
}

impl Drop for SegmentationJob {
    fn drop(&mut self) {
        self.abort_worker();
    }
}

impl std::fmt::Debug for SegmentationJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationJob")
            .field("abortable", &self.abort.is_some())
            .finish_non_exhaustive()
    }
}

/// The background-removal collaborator
#[async_trait]
pub trait SegmentationBackend: Send + Sync {
    /// Start segmenting `request.image`
    async fn start(&self, request: SegmentationRequest) -> Result<SegmentationJob>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba, RgbaImage};

    fn progress(percent: u8) -> SegmentationEvent {
        SegmentationEvent::Progress {
            percent,
            phase: "inference".to_string(),
        }
    }

    fn png(width: u32, height: u32) -> Arc<[u8]> {
        let image = RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 255]));
        crate::export::encode_png(&image).unwrap().into()
    }

    #[test]
    fn test_coalescer_is_monotonic_and_clamped() {
        let mut coalescer = ProgressCoalescer::new();
        assert_eq!(coalescer.accept(0), Some(0));
        assert_eq!(coalescer.accept(10), Some(10));
        assert_eq!(coalescer.accept(10), None);
        assert_eq!(coalescer.accept(5), None);
        assert_eq!(coalescer.accept(250), Some(100));
        assert_eq!(coalescer.accept(100), None);
        assert_eq!(coalescer.last(), Some(100));
    }

    #[test]
    fn test_guidance_mask_must_be_binary() {
        assert!(GuidanceMask::new(GrayImage::from_pixel(2, 2, Luma([255]))).is_ok());
        assert!(matches!(
            GuidanceMask::new(GrayImage::from_pixel(2, 2, Luma([128]))),
            Err(CompositeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_guidance_mask_must_match_image() {
        let request = SegmentationRequest::new(png(4, 3));
        let matching = GuidanceMask::new(GrayImage::new(4, 3)).unwrap();
        assert!(request.clone().with_guidance(matching).is_ok());

        let wrong = GuidanceMask::new(GrayImage::new(3, 4)).unwrap();
        assert!(matches!(
            request.with_guidance(wrong),
            Err(CompositeError::InputMismatch(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_coalesces_progress() {
        let events = futures::stream::iter(vec![
            progress(10),
            progress(5),
            progress(40),
            progress(40),
            progress(90),
            SegmentationEvent::Complete(Ok(vec![1, 2, 3])),
        ]);
        let mut job = SegmentationJob::new(events.boxed());

        let mut seen = Vec::new();
        let bytes = job.wait(|p| seen.push(p.percent)).await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(seen, vec![10, 40, 90]);
    }

    #[tokio::test]
    async fn test_wait_reports_failure() {
        let events = futures::stream::iter(vec![
            progress(50),
            SegmentationEvent::Complete(Err("model crashed".to_string())),
        ]);
        let mut job = SegmentationJob::new(events.boxed());

        let err = job.wait(|_| {}).await.unwrap_err();
        assert!(matches!(err, CompositeError::Segmentation(ref r) if r == "model crashed"));
    }

    #[tokio::test]
    async fn test_stream_without_completion_is_error() {
        let mut job = SegmentationJob::new(futures::stream::iter(vec![progress(30)]).boxed());
        let err = job.wait(|_| {}).await.unwrap_err();
        assert!(matches!(err, CompositeError::Segmentation(_)));
    }

    #[tokio::test]
    async fn test_spawned_worker() {
        let mut job = SegmentationJob::spawn(|sender| async move {
            let _ = sender.send(progress(25)).await;
            let _ = sender
                .send(SegmentationEvent::Complete(Ok(vec![7])))
                .await;
        });

        let bytes = job.wait(|_| {}).await.unwrap();
        assert_eq!(bytes, vec![7]);
    }

    #[tokio::test]
    async fn test_cancel_aborts_worker() {
        let (done_tx, mut done_rx) = mpsc::channel::<()>(1);
        let job = SegmentationJob::spawn(|_sender| async move {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            let _ = done_tx.send(()).await;
        });

        job.cancel();
        // the aborted task drops its sender without sending
        assert!(done_rx.recv().await.is_none());
    }
}
