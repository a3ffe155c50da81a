//! Incremental scan fusion
//!
//! - `accumulator`: seeds and grows the global model from registered frames
//! - `pipeline`: sequential frame driver with source / observer / sink seams
//! - `slot`: latest-wins single-frame buffer between a producer and the pipeline
//! - `config`: TOML configuration

pub mod accumulator;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod preprocess;
pub mod sinks;
pub mod slot;

pub use accumulator::{AccumulatorState, MergeOutcome, ModelAccumulator, RejectReason};
pub use config::{AccumulatorConfig, FusionConfig, PreprocessConfig, RangeBox};
pub use error::{Error, Result};
pub use pipeline::{FrameReport, FrameSource, ModelObserver, ModelSink, Pipeline, RunSummary};
pub use preprocess::preprocess_frame;
pub use sinks::PointCloudFile;
pub use slot::FrameSlot;
