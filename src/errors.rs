//! Error Types
//!
//! This module defines the error type shared by every stage of the pipeline.
//!
//! # Overview
//!
//! [`VrsError`] is grouped by how the scheduler reacts to a failure:
//! - Startup errors (missing capability, bad configuration, allocation)
//!   abort construction of the pipeline.
//! - Per-frame fatal errors (queue submission, fence timeout, device loss)
//!   halt the scheduler; every later frame returns [`VrsError::PipelineHalted`].
//!
//! Surface out-of-date / lost is not an error at this level: it is an
//! [`AcquireError`](crate::scheduler::AcquireError) that the scheduler
//! resolves by recreating the swap chain and retrying.
//!
//! # Usage
//!
//! ```rust,ignore
//! use temporal_vrs::errors::{Result, VrsError};
//!
//! fn start() -> Result<()> {
//!     Err(VrsError::MissingCapability("R32Uint storage textures".into()))
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

/// The main error type for the temporal VRS pipeline.
#[derive(Error, Debug)]
pub enum VrsError {
    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// A settings field is out of its valid range.
    #[error("Invalid pipeline settings: {0}")]
    InvalidSettings(String),

    /// The rate threshold table is not a strict total order.
    #[error("Invalid threshold table: {0}")]
    InvalidThresholds(String),

    /// The device lacks a capability the classifier or main pass needs.
    #[error("Missing device capability: {0}")]
    MissingCapability(String),

    /// A history, classification or framebuffer resource could not be created.
    #[error("Failed to allocate {resource}: {reason}")]
    AllocationFailed {
        /// Resource being allocated
        resource: &'static str,
        /// Backend-provided reason
        reason: String,
    },

    /// A zero-sized surface was requested.
    #[error("Surface extent must be non-zero, got {width}x{height}")]
    ZeroExtent {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },

    /// Failed to request a compatible GPU adapter.
    #[cfg(feature = "gpu")]
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[cfg(feature = "gpu")]
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),

    // ========================================================================
    // Per-Frame Fatal Errors
    // ========================================================================
    /// A queue refused a submission.
    #[error("Submission to the {queue} queue failed: {reason}")]
    QueueSubmit {
        /// Queue name
        queue: &'static str,
        /// Failure description
        reason: String,
    },

    /// The previous classifier dispatch never signaled its fence.
    #[error("Classifier fence not signaled after {waited:?}")]
    FenceTimeout {
        /// How long the host waited
        waited: Duration,
    },

    /// The device (or one of its queues) stopped executing work.
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// An image was used in a layout it had not been transitioned to.
    #[error("Image `{image}` expected in {expected} layout, found {actual}")]
    LayoutMismatch {
        /// Image label
        image: &'static str,
        /// Layout the operation requires
        expected: &'static str,
        /// Layout the image is actually in
        actual: &'static str,
    },

    /// A copy between images of different sizes was attempted.
    #[error("Copy into `{image}` with mismatched extent: {detail}")]
    ExtentMismatch {
        /// Destination image label
        image: &'static str,
        /// Source and destination sizes
        detail: String,
    },

    /// The surface stayed out-of-date after every recreation attempt.
    #[error("Surface unavailable after {attempts} recreation attempts")]
    SurfaceUnavailable {
        /// Number of recreate-and-retry attempts made
        attempts: u32,
    },

    /// A previous fatal error stopped the pipeline.
    #[error("Pipeline halted by an earlier fatal error")]
    PipelineHalted,
}

impl VrsError {
    /// Returns `true` for errors raised while rendering a frame that leave
    /// the pipeline unable to continue.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::QueueSubmit { .. }
                | Self::FenceTimeout { .. }
                | Self::DeviceLost(_)
                | Self::LayoutMismatch { .. }
                | Self::ExtentMismatch { .. }
                | Self::SurfaceUnavailable { .. }
                | Self::PipelineHalted
        )
    }
}

/// Alias for `Result<T, VrsError>`.
pub type Result<T> = std::result::Result<T, VrsError>;
