//! GPU Context
//!
//! [`GpuContext`] holds the device and queue. The classifier and both raster
//! passes share the one hardware queue wgpu exposes; they are ordered by
//! submission order.

use std::time::{Duration, Instant};

use log::info;

use super::uniforms::MAX_GPU_THRESHOLDS;
use crate::errors::{Result, VrsError};
use crate::scheduler::CompletionToken;
use crate::settings::PipelineSettings;

/// Invocations per classifier workgroup along each axis (see
/// `rate_classify.wgsl`).
pub const CLASSIFY_WORKGROUP: u32 = 8;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const RATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Uint;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
}

impl GpuContext {
    pub async fn new(settings: &PipelineSettings) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| VrsError::AdapterRequestFailed(e.to_string()))?;

        Self::validate_adapter(&adapter, settings)?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Temporal VRS Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let adapter_name = adapter.get_info().name;
        info!("GPU device ready: {adapter_name}");
        Ok(Self {
            device,
            queue,
            adapter_name,
        })
    }

    /// Fails with [`VrsError::MissingCapability`] if the classifier cannot
    /// run on `adapter` with `settings`.
    fn validate_adapter(adapter: &wgpu::Adapter, settings: &PipelineSettings) -> Result<()> {
        let features = adapter.get_texture_format_features(RATE_FORMAT);
        if !features
            .allowed_usages
            .contains(wgpu::TextureUsages::STORAGE_BINDING)
        {
            return Err(VrsError::MissingCapability(
                "R32Uint storage textures for the classification buffer".into(),
            ));
        }

        let limits = adapter.limits();
        if limits.max_compute_workgroup_size_x < CLASSIFY_WORKGROUP
            || limits.max_compute_workgroup_size_y < CLASSIFY_WORKGROUP
            || limits.max_compute_invocations_per_workgroup < CLASSIFY_WORKGROUP * CLASSIFY_WORKGROUP
        {
            return Err(VrsError::MissingCapability(format!(
                "compute workgroups of {CLASSIFY_WORKGROUP}x{CLASSIFY_WORKGROUP} invocations"
            )));
        }

        let tile = settings.tile_size;
        if tile.width < CLASSIFY_WORKGROUP || tile.height < CLASSIFY_WORKGROUP {
            return Err(VrsError::MissingCapability(format!(
                "shading-rate texel size {}x{} below the {CLASSIFY_WORKGROUP}x{CLASSIFY_WORKGROUP} classifier workgroup",
                tile.width, tile.height
            )));
        }

        if settings.thresholds.thresholds().len() > MAX_GPU_THRESHOLDS {
            return Err(VrsError::InvalidThresholds(format!(
                "the GPU classifier holds at most {MAX_GPU_THRESHOLDS} thresholds, got {}",
                settings.thresholds.thresholds().len()
            )));
        }
        Ok(())
    }

    /// Polls the device until `token` is signaled.
    pub fn poll_until(&self, token: &CompletionToken, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !token.is_signaled() {
            self.device
                .poll(wgpu::PollType::Poll)
                .map_err(|e| VrsError::DeviceLost(e.to_string()))?;
            if token.is_signaled() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(VrsError::FenceTimeout { waited: timeout });
            }
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Signals `token` once every submission made so far has finished.
    pub fn signal_on_completion(&self, token: &CompletionToken) {
        let token = token.clone();
        self.queue.on_submitted_work_done(move || token.signal());
    }

    /// Blocks until the queue drains.
    pub fn wait_idle(&self, timeout: Duration) -> Result<()> {
        let token = CompletionToken::new();
        self.signal_on_completion(&token);
        self.poll_until(&token, timeout)
    }
}
