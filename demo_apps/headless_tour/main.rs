//! Headless Tour
//!
//! Drives the temporal VRS pipeline on the headless device through a short
//! scripted camera path over the demo courtyard and logs how the per-tile
//! shading rates follow the motion.
//!
//! Script:
//! - hold still (rates settle on the coarsest class)
//! - slow pan (moderate rates along depth edges)
//! - instant half turn (everything finest, one frame late)
//! - window resize (history and classification reset)
//! - baseline variant, then rate visualization
//!
//! Usage:
//!   cargo run -p headless_tour -- [settings.json]
//!
//! Run with `RUST_LOG=info` for the per-frame log, `RUST_LOG=debug` for
//! every scheduling decision.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use glam::Vec3;
use log::info;

use temporal_vrs::headless::HeadlessBackend;
use temporal_vrs::rate::RateClass;
use temporal_vrs::resources::Extent;
use temporal_vrs::scene::{FirstPersonCamera, Scene};
use temporal_vrs::scheduler::{FrameReport, FrameScheduler};
use temporal_vrs::settings::PipelineSettings;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 180;

#[derive(Debug, Clone, Copy)]
enum Step {
    Hold(u32),
    Pan { frames: u32, degrees_per_frame: f32 },
    Turn(f32),
    Resize(u32, u32),
    RateAdaptive(bool),
    Visualize(bool),
}

const SCRIPT: &[Step] = &[
    Step::Hold(6),
    Step::Pan {
        frames: 12,
        degrees_per_frame: 1.5,
    },
    Step::Hold(4),
    Step::Turn(180.0),
    Step::Hold(3),
    Step::Turn(-180.0),
    Step::Resize(480, 270),
    Step::Hold(4),
    Step::RateAdaptive(false),
    Step::Hold(3),
    Step::RateAdaptive(true),
    Step::Visualize(true),
    Step::Hold(3),
];

fn load_settings() -> anyhow::Result<PipelineSettings> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(PipelineSettings::default());
    };
    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let settings: PipelineSettings =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;
    settings.validate()?;
    info!("Loaded settings from {path}");
    Ok(settings)
}

/// Compact `class:count` listing of the non-empty histogram buckets.
fn describe(histogram: &[u32]) -> String {
    histogram
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .filter_map(|(index, count)| {
            let class = RateClass::from_index(index as u8)?;
            Some(format!("{class:?}:{count}"))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

struct Tour {
    pipeline: FrameScheduler<HeadlessBackend>,
    camera: FirstPersonCamera,
}

impl Tour {
    fn frame(&mut self) -> anyhow::Result<FrameReport> {
        let report = self.pipeline.render_frame(self.camera.view_projection())?;
        let stats = self.pipeline.backend().last_stats();
        info!(
            "frame {:>3} slot {}/{} dispatched={:<5} {:?} | main pass #{}: ratio {:.3}, {}",
            report.frame_index,
            report.current_slot,
            report.previous_slot,
            report.dispatched,
            report.variant,
            stats.frame_index,
            stats.shading_ratio(),
            describe(&stats.class_histogram),
        );
        Ok(report)
    }

    fn run(&mut self, step: Step) -> anyhow::Result<()> {
        match step {
            Step::Hold(frames) => {
                for _ in 0..frames {
                    self.frame()?;
                }
            }
            Step::Pan {
                frames,
                degrees_per_frame,
            } => {
                for _ in 0..frames {
                    self.camera.rotate(Vec3::new(0.0, degrees_per_frame, 0.0));
                    self.frame()?;
                }
            }
            Step::Turn(degrees) => {
                self.camera.rotate(Vec3::new(0.0, degrees, 0.0));
                self.frame()?;
            }
            Step::Resize(width, height) => {
                // The window changes size; the pipeline notices on acquire.
                self.camera.set_aspect(width as f32 / height as f32);
                self.pipeline
                    .backend_mut()
                    .surface_mut()
                    .request_resize(Extent::new(width, height));
                let report = self.frame()?;
                info!("Resized to {width}x{height} (recreated: {})", report.surface_recreated);
            }
            Step::RateAdaptive(enabled) => self.pipeline.set_rate_adaptive(enabled),
            Step::Visualize(enabled) => self.pipeline.set_visualize_rates(enabled),
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = load_settings()?;
    let backend = HeadlessBackend::new(
        &settings,
        Extent::new(WIDTH, HEIGHT),
        Arc::new(Scene::demo()),
    )?;
    let mut tour = Tour {
        pipeline: FrameScheduler::new(backend, &settings)?,
        camera: FirstPersonCamera::new(60.0, WIDTH as f32 / HEIGHT as f32, 0.1, 256.0),
    };
    tour.camera.set_position(Vec3::new(0.0, 1.6, 4.0));

    let start = Instant::now();
    for step in SCRIPT {
        info!("--- {step:?}");
        tour.run(*step)?;
    }
    tour.pipeline.flush()?;

    let elapsed = start.elapsed();
    let frames = tour.pipeline.frame_index();
    info!(
        "{frames} frames in {:.2?} ({:.1} ms/frame), {} command re-records",
        elapsed,
        elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64,
        tour.pipeline.command_rebuilds()
    );
    info!(
        "Final classification: {}",
        describe(&tour.pipeline.backend().bound_classification().histogram())
    );
    Ok(())
}
