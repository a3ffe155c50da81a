//! Frame pipeline driver
//!
//! Frames are handled strictly one after another: preprocess, then seed the
//! model with the first usable frame, or register and merge every later one.
//! A stop request is only looked at between frames, so a merge is never cut
//! short.

use crate::accumulator::{AccumulatorState, MergeOutcome, ModelAccumulator, RejectReason};
use crate::config::{FusionConfig, PreprocessConfig};
use crate::error::{Error, Result};
use crate::preprocess::preprocess_frame;
use crate::slot::FrameSlot;
use scan3d_core::{GeometryFrame, Model};
use scan3d_registration::{Registrar, RegistrationResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Where frames come from. `Ok(None)` ends the stream.
pub trait FrameSource {
    fn next_frame(&mut self) -> scan3d_core::Result<Option<GeometryFrame>>;
}

impl FrameSource for std::vec::IntoIter<GeometryFrame> {
    fn next_frame(&mut self) -> scan3d_core::Result<Option<GeometryFrame>> {
        Ok(self.next())
    }
}

/// Receives the model after every accepted frame (viewer hook).
pub trait ModelObserver {
    fn model_updated(&mut self, model: &Model);
}

impl ModelObserver for () {
    fn model_updated(&mut self, _model: &Model) {}
}

impl<F: FnMut(&Model)> ModelObserver for F {
    fn model_updated(&mut self, model: &Model) {
        self(model)
    }
}

/// Persists the final model.
pub trait ModelSink {
    fn persist(&mut self, model: &Model) -> scan3d_core::Result<()>;
}

/// What happened to one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub index: u64,
    /// Points before preprocessing
    pub input_points: usize,
    /// Points that went into registration / merging
    pub filtered_points: usize,
    /// `None` when the frame seeded the model or was rejected before registration
    pub registration: Option<RegistrationResult>,
    pub outcome: MergeOutcome,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub frames: usize,
    pub merged: usize,
    pub rejected: usize,
    pub model_points: usize,
    /// The stop flag ended the run
    pub stopped: bool,
    /// A source failure after the first frame ended the run
    pub ingestion_error: Option<Error>,
}

/// How long `run_slot` waits for a frame before looking at the stop flag again.
const SLOT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Pipeline {
    registrar: Registrar,
    accumulator: ModelAccumulator,
    preprocess: PreprocessConfig,
    model: Model,
}

impl Pipeline {
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registrar: Registrar::new(config.registration),
            accumulator: ModelAccumulator::new(config.accumulator),
            preprocess: config.preprocess,
            model: Model::new(),
        })
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn state(&self) -> AccumulatorState {
        self.accumulator.state()
    }

    /// Refuse further frames; the model is kept.
    pub fn stop(&mut self) {
        self.accumulator.stop();
    }

    /// Run one frame through preprocessing, registration and merging.
    pub fn process(&mut self, frame: GeometryFrame) -> Result<FrameReport> {
        let index = frame.index();
        let input_points = frame.len();

        if self.accumulator.state() == AccumulatorState::Stopped {
            return Ok(FrameReport {
                index,
                input_points,
                filtered_points: input_points,
                registration: None,
                outcome: MergeOutcome::Rejected(RejectReason::Stopped),
            });
        }

        let frame = preprocess_frame(frame, &self.preprocess);
        let filtered_points = frame.len();

        let (registration, outcome) = if frame.is_empty() {
            tracing::warn!(frame = index, "frame has no points, skipped");
            (None, MergeOutcome::Rejected(RejectReason::EmptyFrame))
        } else if self.accumulator.state() == AccumulatorState::Empty {
            (None, self.accumulator.seed(&frame, &mut self.model))
        } else {
            let result = self.registrar.register(&frame, &self.model)?;
            let outcome = self.accumulator.merge(&frame, &result, &mut self.model);
            (Some(result), outcome)
        };

        Ok(FrameReport {
            index,
            input_points,
            filtered_points,
            registration,
            outcome,
        })
    }

    /// Pull frames from `source` until it ends or `stop` is raised.
    ///
    /// # Errors
    ///
    /// `Error::NoInitialFrame` if the source cannot deliver a first frame.
    /// Later source failures end the run normally and are reported in
    /// [`RunSummary::ingestion_error`].
    pub fn run<S, O>(&mut self, source: &mut S, observer: &mut O, stop: &AtomicBool) -> Result<RunSummary>
    where
        S: FrameSource + ?Sized,
        O: ModelObserver + ?Sized,
    {
        let mut summary = RunSummary::default();
        loop {
            if stop.load(Ordering::Acquire) {
                tracing::info!(frames = summary.frames, "stop requested");
                summary.stopped = true;
                break;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) if summary.frames == 0 => {
                    return Err(Error::NoInitialFrame(
                        "source ended before delivering a frame".to_string(),
                    ))
                }
                Ok(None) => break,
                Err(e) if summary.frames == 0 => return Err(Error::NoInitialFrame(e.to_string())),
                Err(e) => {
                    tracing::error!(error = %e, frames = summary.frames, "frame source failed, ending run");
                    summary.ingestion_error = Some(Error::Ingestion(e.to_string()));
                    break;
                }
            };

            self.handle(frame, observer, &mut summary)?;
        }

        summary.model_points = self.model.len();
        Ok(summary)
    }

    /// Consume frames from `slot` until it is closed and drained, or `stop`
    /// is raised.
    pub fn run_slot<O>(&mut self, slot: &FrameSlot, observer: &mut O, stop: &AtomicBool) -> Result<RunSummary>
    where
        O: ModelObserver + ?Sized,
    {
        let mut summary = RunSummary::default();
        loop {
            if stop.load(Ordering::Acquire) {
                summary.stopped = true;
                break;
            }
            match slot.take_timeout(SLOT_POLL_INTERVAL) {
                Some(frame) => self.handle(frame, observer, &mut summary)?,
                None if slot.is_finished() => break,
                None => continue,
            }
        }

        if summary.frames == 0 && !summary.stopped {
            return Err(Error::NoInitialFrame(
                "slot closed before delivering a frame".to_string(),
            ));
        }
        if slot.dropped() > 0 {
            tracing::info!(dropped = slot.dropped(), "frames replaced before processing");
        }
        summary.model_points = self.model.len();
        Ok(summary)
    }

    fn handle<O>(&mut self, frame: GeometryFrame, observer: &mut O, summary: &mut RunSummary) -> Result<()>
    where
        O: ModelObserver + ?Sized,
    {
        let report = self.process(frame)?;
        summary.frames += 1;
        match &report.outcome {
            MergeOutcome::Seeded { .. } | MergeOutcome::Merged { .. } => {
                summary.merged += 1;
                observer.model_updated(&self.model);
            }
            MergeOutcome::Rejected(reason) => {
                summary.rejected += 1;
                tracing::debug!(frame = report.index, %reason, "frame not merged");
            }
        }
        Ok(())
    }

    /// Stop accepting frames and persist the model once.
    ///
    /// The model is always handed back, also when persisting fails.
    pub fn shutdown<K>(mut self, sink: &mut K) -> (Model, Result<()>)
    where
        K: ModelSink + ?Sized,
    {
        self.accumulator.stop();
        let persisted = match sink.persist(&self.model) {
            Ok(()) => {
                tracing::info!(
                    points = self.model.len(),
                    frames = self.model.frames_merged(),
                    "model persisted"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "persisting the model failed, keeping it in memory");
                Err(Error::Persistence(e.to_string()))
            }
        };
        (self.model, persisted)
    }
}
