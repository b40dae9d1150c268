//! End-to-End Pipeline Tests
//!
//! Tests for:
//! - Start-up rate (finest everywhere until the first publication)
//! - Convergence of a static camera and the skip bucket
//! - One-frame staleness after a sudden camera turn
//! - Baseline / rate-adaptive toggling
//! - Double-buffered depth history
//! - Surface resize, loss and minimization
//! - Device capability validation and device faults
//!
//! Every test runs the full scheduler on the headless device.

use std::sync::Arc;

use glam::Vec3;

use temporal_vrs::errors::VrsError;
use temporal_vrs::headless::{DeviceInfo, HeadlessBackend};
use temporal_vrs::rate::{RateClass, ThresholdTable};
use temporal_vrs::resources::{Extent, ImageLayout, TileSize};
use temporal_vrs::scene::{FirstPersonCamera, Scene};
use temporal_vrs::scheduler::{FrameBackend, FrameScheduler};
use temporal_vrs::settings::PipelineSettings;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;
/// 64x48 screen in 16x16 tiles.
const TILES: usize = 4 * 3;

fn camera() -> FirstPersonCamera {
    FirstPersonCamera::new(60.0, WIDTH as f32 / HEIGHT as f32, 0.1, 256.0)
}

fn pipeline_with(settings: &PipelineSettings) -> FrameScheduler<HeadlessBackend> {
    let backend = HeadlessBackend::new(
        settings,
        Extent::new(WIDTH, HEIGHT),
        Arc::new(Scene::demo()),
    )
    .unwrap();
    FrameScheduler::new(backend, settings).unwrap()
}

fn pipeline() -> FrameScheduler<HeadlessBackend> {
    pipeline_with(&PipelineSettings::default())
}

fn render_static(pipeline: &mut FrameScheduler<HeadlessBackend>, camera: &FirstPersonCamera, frames: usize) {
    for _ in 0..frames {
        pipeline.render_frame(camera.view_projection()).unwrap();
    }
}

// ============================================================================
// Start-up
// ============================================================================

#[test]
fn first_frame_shades_at_full_rate() {
    let mut p = pipeline();
    let report = p.render_frame(camera().view_projection()).unwrap();
    p.flush().unwrap();

    assert!(!report.dispatched);
    let backend = p.backend();
    assert!(backend.bound_classification().all(RateClass::FINEST));
    let stats = backend.last_stats();
    assert_eq!(stats.class_histogram[RateClass::FINEST.index() as usize], TILES as u32);
    assert!(stats.covered_pixels > 0);
    assert!((stats.shading_ratio() - 1.0).abs() < 1e-6, "ratio {}", stats.shading_ratio());
}

#[test]
fn presented_image_holds_the_scene() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 2);
    p.flush().unwrap();

    let backend = p.backend();
    assert_eq!(backend.surface().presented(), 2);
    let image = backend.presented_image();
    let clear = image.get(0, 0);
    assert!(
        image.texels().iter().any(|texel| *texel != clear),
        "presented image is a single flat color"
    );
}

#[test]
fn color_history_stays_in_general_layout() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 3);
    p.flush().unwrap();
    assert_eq!(p.backend().color_history_layout(), ImageLayout::General);
}

// ============================================================================
// Convergence
// ============================================================================

#[test]
fn static_camera_converges_to_coarsest_rate() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 3);
    p.flush().unwrap();

    let grid = p.backend().bound_classification();
    assert_eq!(grid.len(), TILES);
    assert!(
        grid.all(RateClass::PerFourByFour),
        "static scene should settle on the coarsest rate: {:?}",
        grid.histogram()
    );
}

#[test]
fn converged_frame_shades_fewer_invocations() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 4);
    p.flush().unwrap();

    let stats = p.backend().last_stats();
    assert_eq!(stats.frame_index, 3);
    assert_eq!(stats.class_histogram[RateClass::PerFourByFour.index() as usize], TILES as u32);
    assert!(stats.shading_ratio() < 0.5, "ratio {}", stats.shading_ratio());
}

#[test]
fn skip_bucket_suppresses_shading_of_static_tiles() {
    let settings = PipelineSettings {
        thresholds: ThresholdTable::default().with_skip(1e-3).unwrap(),
        ..Default::default()
    };
    let mut p = pipeline_with(&settings);
    render_static(&mut p, &camera(), 4);
    p.flush().unwrap();

    let stats = p.backend().last_stats();
    assert_eq!(stats.class_histogram[RateClass::NoInvocations.index() as usize], TILES as u32);
    assert_eq!(stats.shaded_invocations, 0);
    assert!(stats.skipped_tiles >= TILES as u32);
}

#[test]
fn double_buffered_history_converges() {
    let settings = PipelineSettings {
        history_slots: 2,
        ..Default::default()
    };
    let mut p = pipeline_with(&settings);
    let slots: Vec<usize> = (0..5)
        .map(|_| p.render_frame(camera().view_projection()).unwrap().current_slot)
        .collect();
    p.flush().unwrap();

    assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    let backend = p.backend();
    assert_eq!(backend.history().slot_count(), 2);
    assert!(
        backend.bound_classification().all(RateClass::PerFourByFour),
        "{:?}",
        backend.bound_classification().histogram()
    );
    assert_eq!(
        backend.last_stats().class_histogram[RateClass::PerFourByFour.index() as usize],
        TILES as u32
    );
}

// ============================================================================
// Staleness
// ============================================================================

#[test]
fn camera_turn_reaches_main_pass_one_frame_late() {
    let mut p = pipeline();
    let mut cam = camera();
    render_static(&mut p, &cam, 3);

    cam.rotate(Vec3::new(0.0, 180.0, 0.0));
    let report = p.render_frame(cam.view_projection()).unwrap();
    assert!(report.dispatched);
    p.flush().unwrap();

    let backend = p.backend();
    let stats = backend.last_stats();
    assert_eq!(
        stats.class_histogram[RateClass::PerFourByFour.index() as usize],
        TILES as u32,
        "turn frame must still bind the previous classification"
    );
    assert!(
        backend.bound_classification().all(RateClass::X1PerPixel),
        "everything seen after a half turn is disoccluded: {:?}",
        backend.bound_classification().histogram()
    );
}

// ============================================================================
// Toggles
// ============================================================================

#[test]
fn baseline_variant_does_not_bind_classification() {
    let mut p = pipeline();
    assert!(p.backend().main_commands().binds_shading_rate_image());

    p.set_rate_adaptive(false);
    render_static(&mut p, &camera(), 4);
    p.flush().unwrap();

    let backend = p.backend();
    assert!(!backend.main_commands().binds_shading_rate_image());
    assert!(
        backend.bound_classification().all(RateClass::PerFourByFour),
        "classifier keeps running under the baseline variant"
    );
    let stats = backend.last_stats();
    assert!((stats.shading_ratio() - 1.0).abs() < 1e-6, "ratio {}", stats.shading_ratio());
}

#[test]
fn toggling_back_restores_rate_adaptive_commands() {
    let mut p = pipeline();
    p.set_rate_adaptive(false);
    p.render_frame(camera().view_projection()).unwrap();
    p.set_rate_adaptive(true);
    p.set_visualize_rates(true);
    let report = p.render_frame(camera().view_projection()).unwrap();
    p.flush().unwrap();

    assert!(report.commands_rebuilt);
    assert!(report.visualize_rates);
    assert!(p.backend().main_commands().binds_shading_rate_image());
    assert_eq!(p.command_rebuilds(), 2);
}

// ============================================================================
// Surface
// ============================================================================

#[test]
fn explicit_resize_rebuilds_classification_grid() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 3);

    p.resize(48, 32).unwrap();
    assert!(p.is_first_frame());
    let backend = p.backend();
    assert_eq!(backend.classification().grid_extent(), Extent::new(3, 2));
    assert!(backend.bound_classification().all(RateClass::FINEST));
    assert_eq!(backend.history().current_index(), 0);

    let report = p.render_frame(camera().view_projection()).unwrap();
    assert!(!report.dispatched);
    let report = p.render_frame(camera().view_projection()).unwrap();
    assert!(report.dispatched);
    p.flush().unwrap();
}

#[test]
fn resize_round_trip_restores_tile_count() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 2);
    let before = p.backend().classification().tile_count();

    p.resize(100, 70).unwrap();
    assert_eq!(p.backend().classification().tile_count(), 7 * 5);
    p.resize(WIDTH, HEIGHT).unwrap();

    assert_eq!(p.backend().classification().tile_count(), before);
    assert_eq!(before, TILES);
    render_static(&mut p, &camera(), 2);
    p.flush().unwrap();
}

#[test]
fn window_resize_is_picked_up_on_acquire() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 2);

    p.backend_mut().surface_mut().request_resize(Extent::new(96, 64));
    let report = p.render_frame(camera().view_projection()).unwrap();
    p.flush().unwrap();

    assert!(report.surface_recreated);
    assert!(!report.dispatched);
    let backend = p.backend();
    assert_eq!(backend.surface().extent(), Extent::new(96, 64));
    assert_eq!(backend.classification().tile_count(), 6 * 4);
    assert_eq!(backend.presented_image().extent(), Extent::new(96, 64));
}

#[test]
fn lost_surface_is_recreated_at_same_size() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 2);

    p.backend_mut().surface_mut().mark_lost();
    let report = p.render_frame(camera().view_projection()).unwrap();
    assert!(report.surface_recreated);
    assert_eq!(p.backend().surface().extent(), Extent::new(WIDTH, HEIGHT));
    p.flush().unwrap();
}

#[test]
fn minimized_window_pauses_rendering_until_restored() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 2);

    p.backend_mut().surface_mut().request_resize(Extent::new(0, 0));
    for _ in 0..2 {
        let report = p.render_frame(camera().view_projection()).unwrap();
        assert!(report.skipped);
    }
    assert!(!p.is_halted());
    assert_eq!(p.backend().surface().presented(), 2);

    p.backend_mut().surface_mut().request_resize(Extent::new(WIDTH, HEIGHT));
    let report = p.render_frame(camera().view_projection()).unwrap();
    assert!(!report.skipped);
    assert!(report.surface_recreated);
    assert!(!report.dispatched);
    assert!(p.render_frame(camera().view_projection()).unwrap().dispatched);
    p.flush().unwrap();

    assert_eq!(p.backend().surface().presented(), 4);
    assert_eq!(p.backend().classification().tile_count(), TILES);
}

// ============================================================================
// Device Validation
// ============================================================================

#[test]
fn device_without_compute_queue_is_rejected() {
    let device = DeviceInfo {
        dedicated_compute_queue: false,
        ..Default::default()
    };
    let result = HeadlessBackend::with_device(
        &device,
        &PipelineSettings::default(),
        Extent::new(WIDTH, HEIGHT),
        Arc::new(Scene::demo()),
    );
    assert!(matches!(result, Err(VrsError::MissingCapability(_))));
}

#[test]
fn unsupported_tile_size_is_rejected() {
    let settings = PipelineSettings {
        tile_size: TileSize::square(12),
        ..Default::default()
    };
    let result = HeadlessBackend::new(&settings, Extent::new(WIDTH, HEIGHT), Arc::new(Scene::demo()));
    assert!(matches!(result, Err(VrsError::MissingCapability(_))));
}

#[test]
fn zero_extent_is_rejected() {
    let result = HeadlessBackend::new(
        &PipelineSettings::default(),
        Extent::new(0, HEIGHT),
        Arc::new(Scene::demo()),
    );
    assert!(matches!(result, Err(VrsError::ZeroExtent { .. })));
}

#[test]
fn classifier_fault_halts_with_device_lost() {
    let mut p = pipeline();
    render_static(&mut p, &camera(), 2);
    p.flush().unwrap();

    // Next dispatch reads slot 1 as its previous depth; leave it in a layout
    // the classifier cannot sample.
    let next = p.backend().history().current_index();
    let previous = p.backend().history().previous_index();
    assert_eq!((next, previous), (2, 1));
    p.backend()
        .history()
        .depth_slot(previous)
        .write()
        .transition(ImageLayout::ShaderRead, ImageLayout::TransferDst)
        .unwrap();

    let err = (0..2)
        .find_map(|_| p.render_frame(camera().view_projection()).err())
        .expect("a classifier fault must surface within two frames");
    assert!(matches!(err, VrsError::DeviceLost(_)), "got {err:?}");
    assert!(err.is_fatal());
    assert!(p.is_halted());
    assert!(matches!(
        p.render_frame(camera().view_projection()),
        Err(VrsError::PipelineHalted)
    ));
}
