//! Per-user editing session
//!
//! An [`EditSession`] ties one uploaded photo, its segmented foreground and
//! the current effect selection to a [`CompositePipeline`]. Every load and
//! every effect change takes a ticket from a monotonically increasing
//! counter; work that finishes after a newer request was made is reported as
//! [`RenderOutcome::Superseded`] and never replaces the current artifact.

use crate::{
    config::{EffectConfig, PipelineConfig},
    error::{CompositeError, Result},
    export::OutputArtifact,
    pipeline::CompositePipeline,
    segmentation::{GuidanceMask, SegmentationBackend, SegmentationRequest},
    services::io::{ImageIOService, Upload},
};
use image::RgbaImage;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tracing::{debug, info, instrument, warn};

/// Where the session is in its upload and segmentation lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ProcessingState {
    /// Nothing loaded, or the last load failed
    Idle,
    /// Waiting on the background-removal worker
    Segmenting { percent: u8, phase: String },
    /// Foreground available, effects can be applied
    Ready,
}

/// Result of a session request
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// The request was the latest and its artifact is now current
    Committed(OutputArtifact),
    /// A newer request was made before this one finished
    Superseded { ticket: u64 },
}

impl RenderOutcome {
    #[must_use]
    pub fn artifact(&self) -> Option<&OutputArtifact> {
        match self {
            Self::Committed(artifact) => Some(artifact),
            Self::Superseded { .. } => None,
        }
    }

    #[must_use]
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded { .. })
    }
}

#[derive(Debug, Clone)]
struct LoadedImages {
    upload: Upload,
    original: Arc<RgbaImage>,
    foreground: Arc<RgbaImage>,
}

/// One user's photo, effect selection and latest result
pub struct EditSession {
    pipeline: Arc<Mutex<CompositePipeline>>,
    backend: Arc<dyn SegmentationBackend>,
    images: RwLock<Option<LoadedImages>>,
    effects: RwLock<EffectConfig>,
    latest: RwLock<Option<OutputArtifact>>,
    state: watch::Sender<ProcessingState>,
    render_requests: AtomicU64,
    load_requests: AtomicU64,
    cancel_load: Notify,
}

impl EditSession {
    /// Create a session with its own pipeline
    pub fn new(backend: Arc<dyn SegmentationBackend>, config: PipelineConfig) -> Result<Self> {
        let pipeline = CompositePipeline::new(config)?;
        let (state, _) = watch::channel(ProcessingState::Idle);

        Ok(Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            backend,
            images: RwLock::new(None),
            effects: RwLock::new(EffectConfig::default()),
            latest: RwLock::new(None),
            state,
            render_requests: AtomicU64::new(0),
            load_requests: AtomicU64::new(0),
            cancel_load: Notify::new(),
        })
    }

    #[must_use]
    pub fn state(&self) -> ProcessingState {
        self.state.borrow().clone()
    }

    /// Watch state changes, including segmentation progress
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ProcessingState> {
        self.state.subscribe()
    }

    pub async fn effects(&self) -> EffectConfig {
        *self.effects.read().await
    }

    /// The artifact of the latest committed render
    pub async fn latest_artifact(&self) -> Option<OutputArtifact> {
        self.latest.read().await.clone()
    }

    /// Shared access to the pipeline, e.g. to inspect the artifact store
    #[must_use]
    pub fn pipeline(&self) -> Arc<Mutex<CompositePipeline>> {
        Arc::clone(&self.pipeline)
    }

    /// Validate an upload, segment it and render it with the current effects
    ///
    /// # Errors
    /// - Upload validation errors (`InputTooLarge`, `UnsupportedFormat`)
    /// - `Segmentation` when the worker fails; the session returns to idle
    /// - `InputMismatch` when the foreground does not match the upload
    /// - Any render error
    pub async fn load(&self, name: Option<&str>, bytes: Vec<u8>) -> Result<RenderOutcome> {
        self.load_with_guidance(name, bytes, None).await
    }

    /// Like [`load`](Self::load), passing a user-painted keep/remove mask to
    /// the worker
    ///
    /// Starting a load supersedes any load still in flight.
    ///
    /// # Errors
    /// - `InputMismatch` when the guidance mask and the upload differ in size;
    ///   the session is left untouched
    /// - Everything [`load`](Self::load) reports
    #[instrument(skip(self, bytes, guidance), fields(bytes = bytes.len(), guided = guidance.is_some()))]
    pub async fn load_with_guidance(
        &self,
        name: Option<&str>,
        bytes: Vec<u8>,
        guidance: Option<GuidanceMask>,
    ) -> Result<RenderOutcome> {
        let upload = ImageIOService::ingest(name, bytes)?;
        let mut request = SegmentationRequest::new(Arc::clone(&upload.bytes));
        if let Some(guidance) = guidance {
            request = request.with_guidance(guidance)?;
        }

        let ticket = self.load_requests.fetch_add(1, Ordering::SeqCst) + 1;
        self.cancel_load.notify_waiters();
        self.set_state_if_latest(
            ticket,
            ProcessingState::Segmenting {
                percent: 0,
                phase: "starting".to_string(),
            },
        );
        if let Ok(mut pipeline) = self.pipeline.try_lock() {
            pipeline.report_loading();
        }

        let segmented = self.segment(ticket, request).await;
        if !self.is_latest_load(ticket) {
            debug!(ticket, "Discarding superseded load");
            return Ok(RenderOutcome::Superseded { ticket });
        }
        let foreground_bytes = match segmented {
            Ok(bytes) => bytes,
            Err(e) => {
                self.set_state_if_latest(ticket, ProcessingState::Idle);
                return Err(e);
            },
        };

        let original_bytes = Arc::clone(&upload.bytes);
        let decoded = tokio::task::spawn_blocking(move || {
            let original = ImageIOService::decode(&original_bytes)?;
            let foreground = ImageIOService::decode(&foreground_bytes)?;
            if original.dimensions() != foreground.dimensions() {
                return Err(CompositeError::dimension_mismatch(
                    original.dimensions(),
                    foreground.dimensions(),
                ));
            }
            Ok((original, foreground))
        })
        .await
        .map_err(|e| join_error("decode", &e))
        .and_then(|decoded| decoded);

        if !self.is_latest_load(ticket) {
            debug!(ticket, "Discarding superseded load after decode");
            return Ok(RenderOutcome::Superseded { ticket });
        }
        let (original, foreground) = match decoded {
            Ok(images) => images,
            Err(e) => {
                self.set_state_if_latest(ticket, ProcessingState::Idle);
                return Err(e);
            },
        };

        let mut images = self.images.write().await;
        let resized = images
            .as_ref()
            .is_some_and(|loaded| loaded.original.dimensions() != original.dimensions());
        if !self.set_state_if_latest(ticket, ProcessingState::Ready) {
            debug!(ticket, "Discarding load cancelled before commit");
            return Ok(RenderOutcome::Superseded { ticket });
        }
        info!(
            width = original.width(),
            height = original.height(),
            "Foreground ready"
        );
        *images = Some(LoadedImages {
            upload,
            original: Arc::new(original),
            foreground: Arc::new(foreground),
        });
        drop(images);

        if resized {
            self.pipeline.lock().await.release_idle_surfaces();
        }

        let effects = self.effects().await;
        self.render_with(effects).await
    }

    /// Abort an in-flight segmentation
    ///
    /// The pending load resolves as superseded and the session returns to
    /// idle. A fresh load is required afterwards.
    pub fn cancel_load(&self) {
        // bump under the state lock so no stale progress lands after Idle
        self.state.send_modify(|state| {
            self.load_requests.fetch_add(1, Ordering::SeqCst);
            *state = ProcessingState::Idle;
        });
        self.cancel_load.notify_waiters();
    }

    /// Change the effect selection and re-render
    ///
    /// # Errors
    /// - `InvalidConfig` for invalid effect parameters or when nothing is
    ///   loaded yet
    /// - Any render error; the previous artifact stays current
    pub async fn apply_effects(&self, effects: EffectConfig) -> Result<RenderOutcome> {
        effects.validate()?;
        *self.effects.write().await = effects;
        self.render_with(effects).await
    }

    async fn segment(&self, ticket: u64, request: SegmentationRequest) -> Result<Vec<u8>> {
        // registered before the ticket check so a cancel can't slip in between
        let cancelled = self.cancel_load.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();
        if !self.is_latest_load(ticket) {
            return Err(cancelled_error());
        }

        let mut job = tokio::select! {
            started = self.backend.start(request) => started?,
            () = cancelled.as_mut() => {
                warn!(ticket, "Segmentation cancelled while starting");
                return Err(cancelled_error());
            },
        };

        let pipeline = &self.pipeline;
        let wait = job.wait(|progress| {
            if let Ok(mut pipeline) = pipeline.try_lock() {
                pipeline.report_segmentation(progress.percent, &progress.phase);
            }
            self.set_state_if_latest(
                ticket,
                ProcessingState::Segmenting {
                    percent: progress.percent,
                    phase: progress.phase,
                },
            );
        });

        tokio::select! {
            result = wait => result,
            () = cancelled.as_mut() => {
                warn!(ticket, "Segmentation cancelled");
                Err(cancelled_error())
            },
        }
    }

    #[instrument(skip(self, effects), fields(effects = ?effects.enabled_effects()))]
    async fn render_with(&self, effects: EffectConfig) -> Result<RenderOutcome> {
        let ticket = self.render_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let images = self
            .images
            .read()
            .await
            .clone()
            .ok_or_else(|| CompositeError::invalid_config("no image has been loaded"))?;

        let mut pipeline = Arc::clone(&self.pipeline).lock_owned().await;
        if !self.is_latest_render(ticket) {
            return Ok(RenderOutcome::Superseded { ticket });
        }

        let (pipeline, rendered) = tokio::task::spawn_blocking(move || {
            let rendered = pipeline.render_timed(&images.original, &images.foreground, &effects);
            (pipeline, rendered.map(|r| (r, images.upload)))
        })
        .await
        .map_err(|e| join_error("render", &e))?;
        let ((image, timings), upload) = rendered?;

        if !self.is_latest_render(ticket) {
            debug!(ticket, "Discarding superseded render");
            return Ok(RenderOutcome::Superseded { ticket });
        }

        let mut pipeline = pipeline;
        let artifact = pipeline.commit_image(&image, &effects, timings, upload.name.as_deref())?;
        drop(pipeline);

        *self.latest.write().await = Some(artifact.clone());
        Ok(RenderOutcome::Committed(artifact))
    }

    fn is_latest_render(&self, ticket: u64) -> bool {
        self.render_requests.load(Ordering::SeqCst) == ticket
    }

    fn is_latest_load(&self, ticket: u64) -> bool {
        self.load_requests.load(Ordering::SeqCst) == ticket
    }

    /// Publish `next` only while `ticket` is the latest load
    fn set_state_if_latest(&self, ticket: u64, next: ProcessingState) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_latest_load(ticket) {
                return false;
            }
            *state = next;
            true
        })
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("state", &*self.state.borrow())
            .field("render_requests", &self.render_requests)
            .field("load_requests", &self.load_requests)
            .finish_non_exhaustive()
    }
}

fn cancelled_error() -> CompositeError {
    CompositeError::segmentation("segmentation was cancelled")
}

fn join_error(task: &str, error: &tokio::task::JoinError) -> CompositeError {
    CompositeError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("{} task failed: {}", task, error),
    ))
}
