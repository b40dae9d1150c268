//! Temporal rate classification for variable-rate shading.
//!
//! Each frame a depth pre-pass fills the current slot of a depth history
//! ring; a compute stage reprojects it against the previous frame's depth and
//! color and sorts every screen tile into a shading-rate class; the main pass
//! of the *next* frame shades each tile at that rate.
//!
//! - [`scheduler::FrameScheduler`] orders the work across a graphics and a
//!   compute queue and owns the fence handshake.
//! - [`rate`] holds the rate palette, the threshold table and the reference
//!   classifier.
//! - [`resources`] holds the history ring and the classification buffer.
//! - [`headless`] is a complete CPU device; `gpu` (feature `gpu`) runs the
//!   same pipeline on wgpu.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod errors;
pub mod headless;
pub mod rate;
pub mod resources;
pub mod scene;
pub mod scheduler;
pub mod settings;

#[cfg(feature = "gpu")]
pub mod gpu;

#[cfg(feature = "gpu")]
pub use gpu::GpuBackend;

pub use errors::{Result, VrsError};
pub use headless::{FrameStats, HeadlessBackend};
pub use rate::{RateClass, RateClassifier, ThresholdTable};
pub use resources::{ClassificationBuffer, Extent, HistoryStore, TemporalTransform, TileSize};
pub use scene::{FirstPersonCamera, Scene, SceneProvider};
pub use scheduler::{FrameBackend, FrameReport, FrameScheduler};
pub use settings::{PipelineSettings, RenderVariant};
